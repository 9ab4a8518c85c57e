// Per-execution mutable state

//! # Execution Context
//!
//! All mutable state of one policy execution lives in an [`ExecutionContext`]:
//! the variable map, the in-execution connector cache, the trace and the id of
//! the node currently running.
//!
//! A context is created by [`WorkflowEngine::execute`](super::WorkflowEngine::execute),
//! lent to handlers as `&mut ExecutionContext` one node at a time, and finally
//! consumed by the result assembler. It is never stored on the engine and
//! never shared between executions, so concurrent executions need no locking.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

use crate::models::{NodeKind, TraceEntry, Variables};

/// Mutable state owned by exactly one execution
#[derive(Debug, Default)]
pub struct ExecutionContext {
    /// Seeded from the application input, mutated by handlers
    pub variables: Variables,
    /// Connector responses fetched during this execution only
    connector_cache: HashMap<String, Value>,
    trace: Vec<TraceEntry>,
    /// Node currently executing, for diagnostics
    pub current_node: Option<String>,
}

impl ExecutionContext {
    pub fn new(variables: Variables) -> Self {
        Self {
            variables,
            ..Self::default()
        }
    }

    pub fn cached_response(&self, key: &str) -> Option<&Value> {
        self.connector_cache.get(key)
    }

    pub fn cache_response(&mut self, key: String, response: Value) {
        self.connector_cache.insert(key, response);
    }

    /// Set a variable, overwriting any previous binding
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Append one node attempt to the trace
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &mut self,
        node_id: &str,
        node_kind: NodeKind,
        timestamp: DateTime<Utc>,
        variables_before: Variables,
        output: Option<Value>,
        duration_ms: u64,
        error: Option<String>,
    ) {
        self.trace.push(TraceEntry {
            node_id: node_id.to_string(),
            node_kind,
            timestamp,
            variables_before,
            output,
            duration_ms,
            error,
        });
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Hand the accumulated trace and variables to the result assembler
    pub fn into_parts(self) -> (Vec<TraceEntry>, Variables) {
        (self.trace, self.variables)
    }
}
