// Node handlers - one behavior per node kind

//! # Node Handlers
//!
//! Each handler takes a node's validated configuration plus the execution
//! context, may read and write `context.variables`, and returns a
//! [`NodeOutcome`]. The traversal controller turns the outcome into a trace
//! entry ([`NodeOutcome::to_value`]) and uses it for edge selection.
//!
//! | Kind | Outcome |
//! |---|---|
//! | `start`, `end`, `dbQuery`, unconfigured `apiCall` | [`NodeOutcome::Passed`] |
//! | `condition` | [`NodeOutcome::Branched`] |
//! | `calculation` | [`NodeOutcome::Calculated`], writes `outputVariable` |
//! | `score` | [`NodeOutcome::Scored`], writes `outputVariable` |
//! | `decision` | [`NodeOutcome::Decided`], the only terminal outcome |
//! | `dataSource`, configured `apiCall` | [`NodeOutcome::Resolved`] (see [`super::data_source`]) |
//!
//! ## Rust Learning Notes:
//!
//! ### Enums Carrying Data
//! `NodeOutcome` keeps each handler's result typed. The engine matches on
//! `Branched` to pick an edge and on `Decided` to stop; everything else only
//! matters for the trace.
//!
//! ### lazy_static
//! The placeholder regex is compiled once on first use and shared afterwards.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::{json, Value};

use super::conditions::ConditionEvaluator;
use super::context::ExecutionContext;
use super::expression::ExpressionEvaluator;
use crate::models::variables::{number_value, render, to_number};
use crate::models::{
    CalculationConfig, ConditionConfig, Decision, DecisionConfig, ScoreConfig, Variables,
};
use crate::{Result, UnderwriterError};

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{([^{}]+)\}").unwrap();
}

/// What a handler produced for one node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// No-op nodes
    Passed,
    /// Condition evaluated; drives `"true"` / `"false"` edge selection
    Branched { result: bool, explanation: String },
    /// Formula evaluated and stored
    Calculated { variable: String, value: Value },
    Scored(ScoreOutcome),
    Resolved(ResolvedData),
    /// Terminal decision reached
    Decided(DecisionOutcome),
}

/// Total and breakdown of a score node
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub total: f64,
    pub output_variable: String,
    pub breakdown: Vec<FactorScore>,
}

/// Contribution of one factor to a score
#[derive(Debug, Clone, PartialEq)]
pub struct FactorScore {
    pub variable: String,
    pub raw_score: f64,
    pub weight: f64,
    pub weighted_score: f64,
}

/// Result of an external data lookup
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedData {
    /// Response returned by the connector gateway
    Fetched { data: Value },
    /// Response served from this execution's connector cache
    Cached { data: Value },
    /// Connector failed and the node's `onError` policy is `skip`
    Skipped,
}

/// Decision, interpolated reason and supporting details
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutcome {
    pub decision: Decision,
    pub reason: String,
    pub details: Value,
}

impl NodeOutcome {
    /// JSON form recorded as the trace entry's `output`
    pub fn to_value(&self) -> Value {
        match self {
            NodeOutcome::Passed => json!({ "success": true }),
            NodeOutcome::Branched {
                result,
                explanation,
            } => json!({
                "success": true,
                "conditionResult": result,
                "explanation": explanation,
            }),
            NodeOutcome::Calculated { variable, value } => json!({
                "success": true,
                "variable": variable,
                "value": value,
            }),
            NodeOutcome::Scored(score) => json!({
                "success": true,
                "score": number_value(score.total).unwrap_or(Value::Null),
                "breakdown": score
                    .breakdown
                    .iter()
                    .map(|factor| json!({
                        "variable": factor.variable,
                        "rawScore": factor.raw_score,
                        "weight": factor.weight,
                        "weightedScore": factor.weighted_score,
                    }))
                    .collect::<Vec<_>>(),
            }),
            NodeOutcome::Resolved(ResolvedData::Fetched { data }) => json!({
                "success": true,
                "data": data,
                "fromCache": false,
            }),
            NodeOutcome::Resolved(ResolvedData::Cached { data }) => json!({
                "success": true,
                "data": data,
                "fromCache": true,
            }),
            NodeOutcome::Resolved(ResolvedData::Skipped) => json!({
                "success": true,
                "skipped": true,
            }),
            NodeOutcome::Decided(outcome) => json!({
                "decision": outcome.decision,
                "reason": outcome.reason,
                "details": outcome.details,
            }),
        }
    }
}

/// Evaluate the node's condition tree
pub fn condition(
    evaluator: &ConditionEvaluator,
    config: &ConditionConfig,
    context: &ExecutionContext,
) -> Result<NodeOutcome> {
    let evaluation = evaluator.evaluate_detailed(&config.condition, &context.variables)?;
    Ok(NodeOutcome::Branched {
        result: evaluation.passed,
        explanation: evaluation.explanation,
    })
}

/// Evaluate the formula and store the result in `outputVariable`
pub fn calculation(
    evaluator: &ExpressionEvaluator,
    config: &CalculationConfig,
    context: &mut ExecutionContext,
) -> Result<NodeOutcome> {
    let result = evaluator.evaluate(&config.formula, &context.variables)?;
    let value = number_value(result).ok_or_else(|| UnderwriterError::Expression {
        formula: config.formula.clone(),
        message: format!("result is not finite ({})", result),
    })?;

    context.set_variable(config.output_variable.clone(), value.clone());
    Ok(NodeOutcome::Calculated {
        variable: config.output_variable.clone(),
        value,
    })
}

/// Sum weighted range scores and store the total in `outputVariable`
///
/// For each factor the first range containing the variable's value wins; no
/// match scores `0`. An absent variable matches no range.
pub fn score(config: &ScoreConfig, context: &mut ExecutionContext) -> Result<NodeOutcome> {
    let breakdown: Vec<FactorScore> = config
        .factors
        .iter()
        .map(|factor| {
            let value = context
                .variables
                .get(&factor.variable)
                .map(to_number)
                .unwrap_or(f64::NAN);
            let raw_score = factor
                .ranges
                .iter()
                .find(|range| range.contains(value))
                .map_or(0.0, |range| range.score);

            FactorScore {
                variable: factor.variable.clone(),
                raw_score,
                weight: factor.weight,
                weighted_score: raw_score * factor.weight,
            }
        })
        .collect();

    let total: f64 = breakdown.iter().map(|factor| factor.weighted_score).sum();
    let value = number_value(total).ok_or_else(|| {
        UnderwriterError::InvalidGraph(format!(
            "score '{}' is not a finite number",
            config.output_variable
        ))
    })?;
    context.set_variable(config.output_variable.clone(), value);

    Ok(NodeOutcome::Scored(ScoreOutcome {
        total,
        output_variable: config.output_variable.clone(),
        breakdown,
    }))
}

/// Produce the terminal decision with its interpolated reason
pub fn decision(config: &DecisionConfig, context: &ExecutionContext) -> Result<NodeOutcome> {
    Ok(NodeOutcome::Decided(DecisionOutcome {
        decision: config.decision,
        reason: interpolate(&config.reason, &context.variables),
        details: json!({
            "conditions": config.conditions,
            "variables": context.variables,
        }),
    }))
}

/// Replace `{name}` placeholders with rendered variable values
///
/// Placeholders naming an unknown variable are left untouched.
pub fn interpolate(template: &str, variables: &Variables) -> String {
    PLACEHOLDER
        .replace_all(template, |captures: &Captures| {
            let name = captures[1].trim();
            match variables.get(name) {
                Some(value) => render(value),
                None => captures[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComparisonOperator, Condition, ScoreFactor, ScoreRange};

    fn context(value: Value) -> ExecutionContext {
        ExecutionContext::new(value.as_object().cloned().unwrap_or_default())
    }

    fn factor(variable: &str, ranges: Vec<(f64, f64, f64)>, weight: f64) -> ScoreFactor {
        ScoreFactor {
            variable: variable.to_string(),
            ranges: ranges
                .into_iter()
                .map(|(min, max, score)| ScoreRange { min, max, score })
                .collect(),
            weight,
        }
    }

    #[test]
    fn test_condition_handler_reports_branch() {
        let ctx = context(json!({"income": 60000}));
        let config = ConditionConfig {
            condition: Condition::compare(json!("income"), ComparisonOperator::GreaterOrEqual, json!(50000)),
        };

        let outcome = condition(&ConditionEvaluator::new(), &config, &ctx).unwrap();
        assert!(matches!(outcome, NodeOutcome::Branched { result: true, .. }));
        assert_eq!(outcome.to_value()["conditionResult"], json!(true));
    }

    #[test]
    fn test_calculation_writes_output_variable() {
        let mut ctx = context(json!({"income": 24000}));
        let config = CalculationConfig {
            formula: "income/12".to_string(),
            output_variable: "monthlyIncome".to_string(),
        };

        calculation(&ExpressionEvaluator::default(), &config, &mut ctx).unwrap();
        assert_eq!(ctx.variables["monthlyIncome"], json!(2000));
    }

    #[test]
    fn test_calculation_rejects_division_by_zero() {
        let mut ctx = context(json!({"income": 1, "zero": 0}));
        let config = CalculationConfig {
            formula: "income / zero".to_string(),
            output_variable: "ratio".to_string(),
        };

        assert!(calculation(&ExpressionEvaluator::default(), &config, &mut ctx).is_err());
        assert!(!ctx.variables.contains_key("ratio"));
    }

    #[test]
    fn test_score_single_factor() {
        let mut ctx = context(json!({"x": 5}));
        let config = ScoreConfig {
            factors: vec![factor("x", vec![(0.0, 10.0, 1.0)], 2.0)],
            output_variable: "risk_score".to_string(),
        };

        let outcome = score(&config, &mut ctx).unwrap();
        assert_eq!(ctx.variables["risk_score"], json!(2));

        let output = outcome.to_value();
        assert_eq!(output["score"], json!(2));
        assert_eq!(output["breakdown"][0]["rawScore"], json!(1.0));
        assert_eq!(output["breakdown"][0]["weightedScore"], json!(2.0));
    }

    #[test]
    fn test_score_first_matching_range_and_bounds() {
        let mut ctx = context(json!({"dti": "0.4", "age": 70, "history": 10}));
        let config = ScoreConfig {
            factors: vec![
                // 0.4 sits on the shared bound; the first listed range wins
                factor("dti", vec![(0.0, 0.4, 10.0), (0.4, 1.0, 50.0)], 1.0),
                factor("age", vec![(18.0, 65.0, 5.0)], 1.0),
                factor("missing", vec![(0.0, 100.0, 7.0)], 1.0),
                factor("history", vec![(10.0, 20.0, 3.0)], 0.5),
            ],
            output_variable: "total".to_string(),
        };

        let outcome = score(&config, &mut ctx).unwrap();
        match outcome {
            NodeOutcome::Scored(score) => {
                let raw: Vec<f64> = score.breakdown.iter().map(|f| f.raw_score).collect();
                assert_eq!(raw, vec![10.0, 0.0, 0.0, 3.0]);
                assert_eq!(score.total, 11.5);
            }
            other => panic!("expected score outcome, got {:?}", other),
        }
        assert_eq!(ctx.variables["total"], json!(11.5));
    }

    #[test]
    fn test_decision_interpolates_reason() {
        let ctx = context(json!({"income": 60000, "name": "Ada"}));
        let config = DecisionConfig {
            decision: Decision::Approved,
            reason: "{name} earns {income}; {unknown} stays".to_string(),
            conditions: json!(["income >= 50000"]),
        };

        match decision(&config, &ctx).unwrap() {
            NodeOutcome::Decided(outcome) => {
                assert_eq!(outcome.decision, Decision::Approved);
                assert_eq!(outcome.reason, "Ada earns 60000; {unknown} stays");
                assert_eq!(outcome.details["conditions"], json!(["income >= 50000"]));
                assert_eq!(outcome.details["variables"]["name"], json!("Ada"));
            }
            other => panic!("expected decision outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_interpolation_is_not_evaluated() {
        let variables = json!({"a": 1, "b": "{a}"}).as_object().cloned().unwrap();

        // substituted text is not scanned again
        assert_eq!(interpolate("{b} {a + 1}", &variables), "{a} {a + 1}");
    }

    #[test]
    fn test_resolved_outputs() {
        let fetched = NodeOutcome::Resolved(ResolvedData::Fetched { data: json!({"s": 1}) });
        let cached = NodeOutcome::Resolved(ResolvedData::Cached { data: json!({"s": 1}) });
        let skipped = NodeOutcome::Resolved(ResolvedData::Skipped);

        assert_eq!(fetched.to_value()["fromCache"], json!(false));
        assert_eq!(cached.to_value()["fromCache"], json!(true));
        assert_eq!(skipped.to_value(), json!({"success": true, "skipped": true}));
    }
}
