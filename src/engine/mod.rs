// Underwriter Engine
// Everything that runs while a policy graph is being executed

//! # Engine Module
//!
//! This module interprets policy graphs. The domain models in `models/` are
//! plain data; this layer gives them behavior.
//!
//! ## Architecture Overview
//!
//! ```text
//! WorkflowEngine (executor)
//!   ├── ExecutionContext      per-execution variables, cache, trace
//!   ├── handlers              one behavior per node kind
//!   │     ├── ConditionEvaluator
//!   │     └── ExpressionEvaluator
//!   ├── data_source           external data with onError policies
//!   │     └── ConnectorGateway (Static / Http)
//!   └── assembler             ExecutionResult packaging
//! ```
//!
//! ## Rust Learning Notes:
//!
//! ### Module Organization Pattern
//! Each concern lives in its own file and `mod.rs` declares them. The
//! `pub use` statements below flatten the hierarchy, so callers write
//! `underwriter::engine::WorkflowEngine` instead of
//! `underwriter::engine::executor::WorkflowEngine`.

/// Per-execution mutable state
pub mod context;

/// Condition tree evaluation
pub mod conditions;

/// Arithmetic formula evaluation with bound variables
pub mod expression;

/// Connector gateway trait and the in-memory gateway
pub mod connectors;

/// HTTP connector gateway with caching and retry
pub mod http_gateway;

/// Node handlers and their outcomes
pub mod handlers;

/// External data resolution for dataSource / apiCall nodes
pub mod data_source;

/// Result packaging
pub mod assembler;

/// Traversal controller
pub mod executor;

pub use conditions::{ConditionEvaluation, ConditionEvaluator};
pub use connectors::{ConnectorGateway, RecordedCall, StaticConnectorGateway};
pub use context::ExecutionContext;
pub use executor::WorkflowEngine;
pub use expression::ExpressionEvaluator;
pub use handlers::{DecisionOutcome, NodeOutcome};
pub use http_gateway::HttpConnectorGateway;
