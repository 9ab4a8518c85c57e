// Core domain models for Underwriter
// These are plain data structures with no I/O

//! # Domain Models Module
//!
//! This module contains the data that flows through a policy execution:
//! the graph being interpreted, the condition trees inside it, the variable
//! bindings it reads and writes, and the result handed back to the caller.
//!
//! ## Rust Learning Notes:
//!
//! ### Re-exports for Clean APIs
//! The `pub use` statements at the bottom create a clean, flat API.
//! Users can import `use underwriter::models::Graph` instead of
//! `use underwriter::models::graph::Graph`.

// Graph, Node, Edge and the per-kind node configuration
pub mod graph;

// Condition trees evaluated by condition nodes
pub mod condition;

// Variable map plus coercion/rendering helpers
pub mod variables;

// ExecutionResult, TraceEntry and Decision
pub mod result;

// Retry policy used by connector gateways
pub mod retry;

pub use graph::{
    CalculationConfig, ConditionConfig, DataSourceConfig, DecisionConfig, Edge, Graph, Node,
    NodeConfig, NodeKind, OnErrorPolicy, ScoreConfig, ScoreFactor, ScoreRange,
};

pub use condition::{ComparisonOperator, Condition, LogicalOperator};

pub use variables::Variables;

pub use result::{Decision, ExecutionResult, TraceEntry};

pub use retry::{BackoffStrategy, RetryConfig};
