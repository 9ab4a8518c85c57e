// Execution results and trace entries

//! # Execution Results
//!
//! [`ExecutionResult`] is what the surrounding underwriting service receives.
//! Its shape is fixed: downstream routing (manual-review queues, webhooks)
//! works off `decision` and `reason` only.
//!
//! [`TraceEntry`] records one node execution attempt, successful or not. The
//! trace is append-only and is returned even when the execution failed, so a
//! reviewer can see how far the policy got.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::graph::NodeKind;
use super::variables::Variables;

/// Final underwriting outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
    ManualReview,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
            Decision::ManualReview => "manual_review",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    pub node_id: String,
    pub node_kind: NodeKind,
    pub timestamp: DateTime<Utc>,
    /// Variables as they were before the node ran
    pub variables_before: Variables,
    /// Handler output; `None` when the handler failed
    pub output: Option<Value>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TraceEntry {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Caller-facing result of one policy execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// `true` iff a decision node was reached
    pub success: bool,
    pub decision: Decision,
    pub reason: String,
    pub details: Value,
    pub trace: Vec<TraceEntry>,
    pub total_duration_ms: u64,
    pub variables: Variables,
}
