// Underwriter - Rust Edition
// A policy-graph execution engine for automated loan underwriting decisions

//! # Underwriter Library
//!
//! This is the main library crate for Underwriter. A lender composes an approval
//! policy as a directed graph of nodes (conditions, formulas, scorecards, external
//! data lookups, decisions) and this crate walks that graph against a submitted
//! application to produce an automated decision.
//!
//! ## Core Components
//!
//! ### Domain Models
//! - [`Graph`]: The policy definition as nodes plus edges, validated at load time
//! - [`Node`] / [`NodeConfig`]: One closed variant per node kind
//! - [`Condition`]: Boolean expression tree used by condition nodes
//! - [`ExecutionResult`] / [`TraceEntry`]: The caller-facing outcome and its audit trail
//!
//! ### Execution Engine
//!
//! #### [`WorkflowEngine`] - Traversal Controller
//!
//! Walks the graph node by node from the `start` node until a `decision` node
//! is reached. It **never** returns an error to the caller: every failure
//! (missing start node, dead end, handler failure, exhausted step budget)
//! becomes a `manual_review` result so that uncertainty always degrades to a
//! human decision.
//!
//! **Usage Example:**
//! ```rust,no_run
//! use std::sync::Arc;
//! use underwriter::{StaticConnectorGateway, WorkflowEngine, Graph};
//!
//! # async fn run(graph: Graph) {
//! let engine = WorkflowEngine::new(Arc::new(StaticConnectorGateway::new()));
//! let input = serde_json::json!({ "income": 60000 });
//! let result = engine.execute(&graph, &input, "policy-1", "application-1").await;
//! println!("{:?}: {}", result.decision, result.reason);
//! # }
//! ```
//!
//! ### Connector Gateways
//! External data (credit bureaus, verification APIs) is reached only through
//! the [`ConnectorGateway`] trait. [`HttpConnectorGateway`] adds cross-invocation
//! caching and retry with backoff; [`StaticConnectorGateway`] serves fixtures.
//!
//! ## Rust Learning Notes:
//!
//! ### Module System
//! Rust organizes code into modules. Each `mod` declaration tells Rust to include
//! code from either a `.rs` file or a directory with a `mod.rs` file.
//!
//! ### Re-exports
//! `pub use` statements create shortcuts so users don't need to know the internal
//! module structure. Instead of `use underwriter::models::graph::Graph`,
//! users can write `use underwriter::Graph`.

// Core domain models (pure data, no I/O)
pub mod models;

// Execution engine: traversal, handlers, evaluators and gateways
pub mod engine;

// Layered configuration (file + environment)
pub mod config;

// Re-export core domain types for easy access
pub use models::{
    Condition, Decision, Edge, ExecutionResult, Graph, Node, NodeConfig, NodeKind, TraceEntry,
    Variables,
};

// Re-export engine types for convenience
pub use engine::{
    ConditionEvaluator, ConnectorGateway, ExecutionContext, ExpressionEvaluator,
    HttpConnectorGateway, StaticConnectorGateway, WorkflowEngine,
};

pub use config::{AppConfig, EngineConfig, GatewayConfig};

// Core error types
use thiserror::Error;

/// Custom error types for Underwriter operations
///
/// Every variant can surface inside an execution, and every one of them is
/// converted into a `manual_review` result by [`WorkflowEngine::execute`].
///
/// ## Rust Learning Notes:
///
/// ### The `thiserror` Crate
/// - `#[derive(Error)]` implements the `std::error::Error` trait
/// - `#[error("...")]` provides human-readable error messages
/// - `#[from]` enables automatic conversion from other error types
#[derive(Error, Debug)]
pub enum UnderwriterError {
    /// The policy graph could not be loaded (bad node config, duplicate ids, ...)
    #[error("Invalid policy graph: {0}")]
    InvalidGraph(String),

    /// The application input could not seed the variable map
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A condition leaf used an operator the evaluator does not know
    #[error("Unknown condition operator: {0}")]
    UnknownOperator(String),

    /// A condition could not be evaluated against the current variables
    #[error("Condition evaluation failed: {0}")]
    ConditionEvaluation(String),

    /// A calculation formula failed to parse or evaluate
    #[error("Formula evaluation failed for '{formula}': {message}")]
    Expression { formula: String, message: String },

    /// A connector call failed
    #[error("Connector '{connector_id}' failed: {message}")]
    Connector {
        connector_id: String,
        message: String,
    },

    /// A data source failed under the `manual_review` error policy
    #[error("Data source '{connector_id}' unavailable, manual review required: {message}")]
    ManualReviewRequested {
        connector_id: String,
        message: String,
    },

    /// The graph has no node of kind `start`
    #[error("Workflow has no start node")]
    MissingStartNode,

    /// Traversal reached a node with no usable outgoing edge
    #[error("Workflow incomplete: ended without reaching a decision after node '{node_id}'")]
    WorkflowIncomplete { node_id: String },

    /// A condition node has no edge for the branch its condition produced
    #[error("Workflow incomplete: condition node '{node_id}' has no '{branch}' branch")]
    UnmatchedBranch { node_id: String, branch: bool },

    /// Traversal exceeded its step budget, usually because the graph has a cycle
    #[error("Workflow incomplete: ended without reaching a decision within {budget} steps")]
    StepBudgetExceeded { budget: usize },

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for UnderwriterError {
    fn from(err: std::io::Error) -> Self {
        UnderwriterError::Internal(err.to_string())
    }
}

/// Type alias for Results that use our custom error type
pub type Result<T> = std::result::Result<T, UnderwriterError>;
