// Condition trees - the boolean logic behind condition nodes

//! # Condition Models
//!
//! A condition is either a **comparison leaf** (`left operator right`) or a
//! **group** that combines sub-conditions with `AND` / `OR`:
//!
//! ```json
//! {
//!   "operator": "AND",
//!   "conditions": [
//!     { "left": "income", "operator": ">=", "right": 50000 },
//!     { "left": "state", "operator": "IN", "right": ["CA", "NY"] }
//!   ]
//! }
//! ```
//!
//! Operators are parsed when the graph is loaded, so an unknown operator is a
//! load failure rather than a surprise halfway through an execution.
//!
//! ## Rust Learning Notes:
//!
//! ### Recursive Enums
//! `Condition::Group` holds a `Vec<Condition>`. The vector stores its items on
//! the heap, so no explicit `Box` is needed to give the enum a finite size.
//!
//! ### `try_from` Deserialization
//! `#[serde(try_from = "RawCondition")]` lets serde parse a loose shape first
//! and then run our validating `TryFrom` conversion.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::UnderwriterError;

/// Comparison operators supported in condition leaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
    /// Loose (coercing) equality
    #[serde(rename = "==")]
    Equal,
    /// Loose (coercing) inequality
    #[serde(rename = "!=")]
    NotEqual,
    /// Membership in an array
    #[serde(rename = "IN")]
    In,
    /// Negated membership
    #[serde(rename = "NOT IN")]
    NotIn,
}

impl ComparisonOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::GreaterOrEqual => ">=",
            ComparisonOperator::LessOrEqual => "<=",
            ComparisonOperator::Equal => "==",
            ComparisonOperator::NotEqual => "!=",
            ComparisonOperator::In => "IN",
            ComparisonOperator::NotIn => "NOT IN",
        }
    }
}

impl FromStr for ComparisonOperator {
    type Err = UnderwriterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" => Ok(ComparisonOperator::GreaterThan),
            "<" => Ok(ComparisonOperator::LessThan),
            ">=" => Ok(ComparisonOperator::GreaterOrEqual),
            "<=" => Ok(ComparisonOperator::LessOrEqual),
            "==" => Ok(ComparisonOperator::Equal),
            "!=" => Ok(ComparisonOperator::NotEqual),
            "IN" => Ok(ComparisonOperator::In),
            "NOT IN" => Ok(ComparisonOperator::NotIn),
            other => Err(UnderwriterError::UnknownOperator(other.to_string())),
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical operators for condition groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
}

impl FromStr for LogicalOperator {
    type Err = UnderwriterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AND" => Ok(LogicalOperator::And),
            "OR" => Ok(LogicalOperator::Or),
            other => Err(UnderwriterError::UnknownOperator(other.to_string())),
        }
    }
}

/// A validated condition tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCondition", untagged)]
pub enum Condition {
    /// `AND` / `OR` over nested conditions
    Group {
        operator: LogicalOperator,
        conditions: Vec<Condition>,
    },
    /// `left operator right`; string operands naming a variable are resolved at evaluation time
    Comparison {
        left: Value,
        operator: ComparisonOperator,
        right: Value,
    },
}

/// Loose wire shape accepted before validation
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCondition {
    Group {
        operator: String,
        conditions: Vec<RawCondition>,
    },
    Comparison {
        #[serde(default)]
        left: Value,
        operator: String,
        #[serde(default)]
        right: Value,
    },
}

impl TryFrom<RawCondition> for Condition {
    type Error = UnderwriterError;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        match raw {
            RawCondition::Group {
                operator,
                conditions,
            } => Ok(Condition::Group {
                operator: operator.parse()?,
                conditions: conditions
                    .into_iter()
                    .map(Condition::try_from)
                    .collect::<Result<Vec<_>, _>>()?,
            }),
            RawCondition::Comparison {
                left,
                operator,
                right,
            } => Ok(Condition::Comparison {
                left,
                operator: operator.parse()?,
                right,
            }),
        }
    }
}

impl Condition {
    /// Build a comparison leaf
    ///
    /// ## Example:
    /// ```
    /// use underwriter::models::condition::{Condition, ComparisonOperator};
    ///
    /// let rule = Condition::compare("income", ComparisonOperator::GreaterOrEqual, 50000);
    /// ```
    pub fn compare(
        left: impl Into<Value>,
        operator: ComparisonOperator,
        right: impl Into<Value>,
    ) -> Self {
        Condition::Comparison {
            left: left.into(),
            operator,
            right: right.into(),
        }
    }

    /// Combine conditions so that all must hold
    pub fn all(conditions: Vec<Condition>) -> Self {
        Condition::Group {
            operator: LogicalOperator::And,
            conditions,
        }
    }

    /// Combine conditions so that at least one must hold
    pub fn any(conditions: Vec<Condition>) -> Self {
        Condition::Group {
            operator: LogicalOperator::Or,
            conditions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_leaf_condition() {
        let condition: Condition =
            serde_json::from_value(json!({"left": "income", "operator": ">=", "right": 50000}))
                .unwrap();

        assert_eq!(
            condition,
            Condition::compare("income", ComparisonOperator::GreaterOrEqual, 50000)
        );
    }

    #[test]
    fn test_parse_nested_group() {
        let condition: Condition = serde_json::from_value(json!({
            "operator": "OR",
            "conditions": [
                {"left": "state", "operator": "NOT IN", "right": ["CA"]},
                {"operator": "AND", "conditions": [
                    {"left": "age", "operator": ">", "right": 21}
                ]}
            ]
        }))
        .unwrap();

        match condition {
            Condition::Group {
                operator,
                conditions,
            } => {
                assert_eq!(operator, LogicalOperator::Or);
                assert_eq!(conditions.len(), 2);
                assert!(matches!(conditions[1], Condition::Group { .. }));
            }
            other => panic!("expected group, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_operator_is_rejected_at_load() {
        let err = serde_json::from_value::<Condition>(
            json!({"left": "income", "operator": "LIKE", "right": 1}),
        )
        .unwrap_err();

        assert!(err.to_string().contains("LIKE"));
    }

    #[test]
    fn test_serializes_operators_as_symbols() {
        let condition = Condition::any(vec![Condition::compare(
            "state",
            ComparisonOperator::In,
            json!(["CA", "NY"]),
        )]);

        assert_eq!(
            serde_json::to_value(&condition).unwrap(),
            json!({
                "operator": "OR",
                "conditions": [{"left": "state", "operator": "IN", "right": ["CA", "NY"]}]
            })
        );
    }
}
