// Condition evaluation for condition nodes

//! # Condition Evaluator
//!
//! Evaluates a [`Condition`] tree against the execution's variables.
//!
//! - **Groups**: `AND` needs every sub-condition, `OR` needs at least one.
//!   Evaluation stops at the first sub-condition that settles the group, so a
//!   later sub-condition that would fail is never reached.
//! - **Leaves**: both operands go through variable resolution (a string that
//!   names a variable becomes that variable's value), then the operator is
//!   applied with loose, coercing semantics (see [`crate::models::variables`]).
//!
//! Besides the boolean result, every evaluation produces a short explanation
//! that ends up in the trace, e.g. `income (60000) >= 50000 -> true`.

use serde_json::Value;
use std::cmp::Ordering;

use crate::models::variables::{compare, loose_eq, render, resolve_operand, strict_eq};
use crate::models::{ComparisonOperator, Condition, LogicalOperator, Variables};
use crate::{Result, UnderwriterError};

/// Result of evaluating a condition, with a human-readable explanation
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionEvaluation {
    pub passed: bool,
    pub explanation: String,
}

/// Stateless evaluator for condition trees
#[derive(Debug, Clone, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a condition tree to a boolean
    pub fn evaluate(&self, condition: &Condition, variables: &Variables) -> Result<bool> {
        Ok(self.evaluate_detailed(condition, variables)?.passed)
    }

    /// Evaluate a condition tree and explain the outcome
    pub fn evaluate_detailed(
        &self,
        condition: &Condition,
        variables: &Variables,
    ) -> Result<ConditionEvaluation> {
        match condition {
            Condition::Group {
                operator,
                conditions,
            } => self.evaluate_group(*operator, conditions, variables),
            Condition::Comparison {
                left,
                operator,
                right,
            } => {
                let left_value = resolve_operand(left, variables);
                let right_value = resolve_operand(right, variables);
                let passed = apply_operator(&left_value, *operator, &right_value)?;

                Ok(ConditionEvaluation {
                    passed,
                    explanation: format!(
                        "{} {} {} -> {}",
                        describe_operand(left, &left_value),
                        operator,
                        describe_operand(right, &right_value),
                        passed
                    ),
                })
            }
        }
    }

    fn evaluate_group(
        &self,
        operator: LogicalOperator,
        conditions: &[Condition],
        variables: &Variables,
    ) -> Result<ConditionEvaluation> {
        // AND settles on the first false, OR on the first true
        let settles_on = matches!(operator, LogicalOperator::Or);
        let mut passed = !settles_on;
        let mut explanations = Vec::with_capacity(conditions.len());

        for condition in conditions {
            let evaluation = self.evaluate_detailed(condition, variables)?;
            explanations.push(evaluation.explanation);
            if evaluation.passed == settles_on {
                passed = settles_on;
                break;
            }
        }

        let label = match operator {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        };

        Ok(ConditionEvaluation {
            passed,
            explanation: format!(
                "{}: {} of {} evaluated [{}] -> {}",
                label,
                explanations.len(),
                conditions.len(),
                explanations.join("; "),
                passed
            ),
        })
    }
}

fn apply_operator(left: &Value, operator: ComparisonOperator, right: &Value) -> Result<bool> {
    let ordering = || compare(left, right);

    Ok(match operator {
        ComparisonOperator::GreaterThan => ordering() == Some(Ordering::Greater),
        ComparisonOperator::LessThan => ordering() == Some(Ordering::Less),
        ComparisonOperator::GreaterOrEqual => {
            matches!(ordering(), Some(Ordering::Greater | Ordering::Equal))
        }
        ComparisonOperator::LessOrEqual => {
            matches!(ordering(), Some(Ordering::Less | Ordering::Equal))
        }
        ComparisonOperator::Equal => loose_eq(left, right),
        ComparisonOperator::NotEqual => !loose_eq(left, right),
        ComparisonOperator::In => contains(operator, left, right)?,
        ComparisonOperator::NotIn => !contains(operator, left, right)?,
    })
}

fn contains(operator: ComparisonOperator, needle: &Value, haystack: &Value) -> Result<bool> {
    match haystack {
        Value::Array(items) => Ok(items.iter().any(|item| strict_eq(item, needle))),
        other => Err(UnderwriterError::ConditionEvaluation(format!(
            "'{}' needs an array on the right-hand side, got {}",
            operator, other
        ))),
    }
}

fn describe_operand(configured: &Value, resolved: &Value) -> String {
    if configured == resolved {
        render(resolved)
    } else {
        format!("{} ({})", render(configured), render(resolved))
    }
}
