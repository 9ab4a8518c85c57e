// Arithmetic formula evaluation for calculation nodes

//! # Expression Evaluator
//!
//! Formulas such as `income / 12` or `max(debt, 0) / (income + 1)` are
//! evaluated by an embedded [`rhai`] engine in expression-only mode.
//!
//! Variables are **bound**, not substituted: each call builds a fresh
//! [`rhai::Scope`] from the variable map, so a variable whose value happens
//! to contain another variable's name can never be expanded twice.
//!
//! Binding rules:
//! - numbers, and strings that read as numbers, are bound as floats
//! - booleans are bound as booleans, other strings as strings
//! - null, arrays, objects and names that are not identifiers are left unbound
//!
//! Arithmetic is always real-valued, including between integer literals:
//! `3 / 2` is `1.5` and `income * (1/2)` halves the income. `^` means
//! exponentiation (`2^3` is `8`) and binds tighter than `*` and `/`.

use rhai::{Dynamic, Engine, Scope, FLOAT, INT};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::models::variables::to_number;
use crate::models::Variables;
use crate::{Result, UnderwriterError};

/// Evaluates arithmetic formulas against the variable map
pub struct ExpressionEvaluator {
    engine: Engine,
}

impl ExpressionEvaluator {
    pub fn new(config: &EngineConfig) -> Self {
        let mut engine = Engine::new();
        // built-in integer operators would otherwise bypass the overrides below
        engine.set_fast_operators(false);
        engine.set_max_operations(config.expression_max_operations);
        engine.set_max_expr_depths(config.expression_max_depth, config.expression_max_depth);
        register_math(&mut engine);
        Self { engine }
    }

    /// Evaluate `formula` to a number
    pub fn evaluate(&self, formula: &str, variables: &Variables) -> Result<f64> {
        let mut scope = bind_variables(variables);
        // rhai's `^` is XOR with low precedence; `**` is power with the usual one
        let script = formula.replace('^', "**");

        let result = self
            .engine
            .eval_expression_with_scope::<Dynamic>(&mut scope, &script)
            .map_err(|e| expression_error(formula, e.to_string()))?;

        if let Ok(value) = result.as_float() {
            return Ok(value);
        }
        if let Ok(value) = result.as_int() {
            return Ok(value as f64);
        }
        Err(expression_error(
            formula,
            format!("result is not a number ({})", result.type_name()),
        ))
    }
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

fn expression_error(formula: &str, message: String) -> UnderwriterError {
    UnderwriterError::Expression {
        formula: formula.to_string(),
        message,
    }
}

fn bind_variables(variables: &Variables) -> Scope<'static> {
    let mut scope = Scope::new();

    for (name, value) in variables {
        if !is_identifier(name) {
            continue;
        }
        match value {
            Value::Number(_) => {
                scope.push_constant(name.as_str(), to_number(value));
            }
            Value::Bool(flag) => {
                scope.push_constant(name.as_str(), *flag);
            }
            Value::String(text) => {
                let numeric = to_number(value);
                if !text.trim().is_empty() && numeric.is_finite() {
                    scope.push_constant(name.as_str(), numeric);
                } else {
                    scope.push_constant(name.as_str(), text.clone());
                }
            }
            Value::Null | Value::Array(_) | Value::Object(_) => {}
        }
    }

    scope
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

// Literals like `12` are rhai integers while bound variables are floats, so
// every helper is registered for each integer/float combination.
fn register_math(engine: &mut Engine) {
    engine.register_fn("/", |a: INT, b: INT| a as FLOAT / b as FLOAT);
    engine.register_fn("/", |a: INT, b: FLOAT| a as FLOAT / b);
    engine.register_fn("/", |a: FLOAT, b: INT| a / b as FLOAT);

    engine.register_fn("**", |a: INT, b: INT| (a as FLOAT).powf(b as FLOAT));
    engine.register_fn("**", |a: INT, b: FLOAT| (a as FLOAT).powf(b));
    engine.register_fn("**", |a: FLOAT, b: INT| a.powf(b as FLOAT));
    engine.register_fn("**", |a: FLOAT, b: FLOAT| a.powf(b));

    engine.register_fn("min", |a: FLOAT, b: FLOAT| a.min(b));
    engine.register_fn("min", |a: INT, b: FLOAT| (a as FLOAT).min(b));
    engine.register_fn("min", |a: FLOAT, b: INT| a.min(b as FLOAT));
    engine.register_fn("min", |a: INT, b: INT| a.min(b));

    engine.register_fn("max", |a: FLOAT, b: FLOAT| a.max(b));
    engine.register_fn("max", |a: INT, b: FLOAT| (a as FLOAT).max(b));
    engine.register_fn("max", |a: FLOAT, b: INT| a.max(b as FLOAT));
    engine.register_fn("max", |a: INT, b: INT| a.max(b));

    engine.register_fn("pow", |a: FLOAT, b: FLOAT| a.powf(b));
    engine.register_fn("pow", |a: INT, b: FLOAT| (a as FLOAT).powf(b));
    engine.register_fn("pow", |a: FLOAT, b: INT| a.powf(b as FLOAT));
    engine.register_fn("pow", |a: INT, b: INT| (a as FLOAT).powf(b as FLOAT));

    engine.register_fn("ceil", |a: FLOAT| a.ceil());
    engine.register_fn("ceil", |a: INT| a as FLOAT);
    engine.register_fn("floor", |a: FLOAT| a.floor());
    engine.register_fn("floor", |a: INT| a as FLOAT);
    engine.register_fn("round", |a: FLOAT| a.round());
    engine.register_fn("round", |a: INT| a as FLOAT);
    engine.register_fn("sqrt", |a: FLOAT| a.sqrt());
    engine.register_fn("sqrt", |a: INT| (a as FLOAT).sqrt());
    engine.register_fn("abs", |a: FLOAT| a.abs());
    engine.register_fn("abs", |a: INT| (a as FLOAT).abs());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Variables {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_simple_division() {
        let evaluator = ExpressionEvaluator::default();
        let variables = vars(json!({"income": 24000}));

        assert_eq!(evaluator.evaluate("income/12", &variables).unwrap(), 2000.0);
    }

    #[test]
    fn test_division_is_not_truncated() {
        let evaluator = ExpressionEvaluator::default();
        let variables = vars(json!({"income": 25000}));

        let monthly = evaluator.evaluate("income / 12", &variables).unwrap();
        assert!((monthly - 2083.333).abs() < 0.001);
    }

    #[test]
    fn test_integer_literals_divide_exactly() {
        let evaluator = ExpressionEvaluator::default();
        let variables = vars(json!({"income": 24000}));

        assert_eq!(evaluator.evaluate("3/2", &variables).unwrap(), 1.5);
        assert_eq!(evaluator.evaluate("income * (1/2)", &variables).unwrap(), 12000.0);
        assert_eq!(evaluator.evaluate("7 / 2.0", &variables).unwrap(), 3.5);
    }

    #[test]
    fn test_caret_is_exponentiation() {
        let evaluator = ExpressionEvaluator::default();
        let variables = vars(json!({"rate": 0.5}));

        assert_eq!(evaluator.evaluate("2^3", &variables).unwrap(), 8.0);
        assert_eq!(evaluator.evaluate("2 * 3^2", &variables).unwrap(), 18.0);
        assert_eq!(evaluator.evaluate("(1+rate)^2", &variables).unwrap(), 2.25);
        assert_eq!(evaluator.evaluate("2^-1", &variables).unwrap(), 0.5);
    }

    #[test]
    fn test_integer_division_by_zero_is_not_finite() {
        let evaluator = ExpressionEvaluator::default();

        let result = evaluator.evaluate("1/0", &Variables::new()).unwrap();
        assert!(!result.is_finite());
    }

    #[test]
    fn test_precedence_parentheses_and_functions() {
        let evaluator = ExpressionEvaluator::default();
        let variables = vars(json!({"debt": 1500, "income": "6000"}));

        assert_eq!(evaluator.evaluate("2 + 3 * 4", &variables).unwrap(), 14.0);
        assert_eq!(evaluator.evaluate("(2 + 3) * 4", &variables).unwrap(), 20.0);
        assert_eq!(evaluator.evaluate("debt / income", &variables).unwrap(), 0.25);
        assert_eq!(evaluator.evaluate("max(debt, 2000)", &variables).unwrap(), 2000.0);
        assert_eq!(evaluator.evaluate("round(debt / 7)", &variables).unwrap(), 214.0);
        assert_eq!(evaluator.evaluate("pow(2, 10)", &variables).unwrap(), 1024.0);
    }

    #[test]
    fn test_values_containing_other_names_are_not_expanded() {
        let evaluator = ExpressionEvaluator::default();
        // a text substitution engine would rewrite "rate" inside "base_rate"
        let variables = vars(json!({"rate": 2, "base_rate": 3, "label": "rate"}));

        assert_eq!(evaluator.evaluate("base_rate * rate", &variables).unwrap(), 6.0);
    }

    #[test]
    fn test_unknown_variable_fails() {
        let evaluator = ExpressionEvaluator::default();

        let err = evaluator.evaluate("income / 12", &Variables::new()).unwrap_err();
        assert!(matches!(err, UnderwriterError::Expression { .. }));
    }

    #[test]
    fn test_malformed_formula_fails() {
        let evaluator = ExpressionEvaluator::default();
        let variables = vars(json!({"income": 1}));

        assert!(evaluator.evaluate("income / ", &variables).is_err());
        assert!(evaluator.evaluate("let x = 1", &variables).is_err());
    }

    #[test]
    fn test_non_numeric_result_fails() {
        let evaluator = ExpressionEvaluator::default();
        let variables = vars(json!({"income": 1}));

        let err = evaluator.evaluate("income > 0", &variables).unwrap_err();
        assert!(err.to_string().contains("not a number"));
    }
}
