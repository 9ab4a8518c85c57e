// Packages a finished execution into the caller-facing result

use serde_json::json;
use std::time::Duration;

use super::context::ExecutionContext;
use super::handlers::DecisionOutcome;
use crate::models::{Decision, ExecutionResult};
use crate::Result;

/// Build the [`ExecutionResult`] for a finished execution
///
/// A reached decision becomes a successful result. Any error becomes a
/// `manual_review` result whose reason is the error message. Either way the
/// trace and variables accumulated so far are kept.
pub fn assemble_result(
    context: ExecutionContext,
    outcome: Result<DecisionOutcome>,
    elapsed: Duration,
) -> ExecutionResult {
    let (trace, variables) = context.into_parts();
    let total_duration_ms = elapsed.as_millis() as u64;

    match outcome {
        Ok(outcome) => ExecutionResult {
            success: true,
            decision: outcome.decision,
            reason: outcome.reason,
            details: outcome.details,
            trace,
            total_duration_ms,
            variables,
        },
        Err(error) => {
            let message = error.to_string();
            ExecutionResult {
                success: false,
                decision: Decision::ManualReview,
                details: json!({ "error": message }),
                reason: message,
                trace,
                total_duration_ms,
                variables,
            }
        }
    }
}
