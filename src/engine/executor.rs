// Traversal controller - walks a policy graph to a decision

//! # Workflow Engine
//!
//! [`WorkflowEngine::execute`] interprets one policy graph against one
//! application:
//!
//! 1. seed a fresh [`ExecutionContext`] from the input data
//! 2. start at the `start` node
//! 3. run the node's handler and append a trace entry, success or failure
//! 4. stop at a `decision` node, otherwise follow the next edge
//! 5. turn any failure into a `manual_review` result
//!
//! ## Edge Selection
//!
//! - condition nodes follow the outgoing edge whose `sourceHandle` is
//!   `"true"` or `"false"`, matching the evaluated condition
//! - every other node follows its first outgoing edge in graph order
//! - `end` nodes are not terminal; they are followed like any other node
//!
//! A missing edge, or an edge whose target does not exist, ends the
//! execution as incomplete.
//!
//! ## Step Budget
//!
//! Traversal stops after `max(node count, 1) * max_steps_per_node` steps,
//! so a graph with a cycle ends in manual review instead of looping forever.
//!
//! ## Rust Learning Notes:
//!
//! ### Ownership of the Context
//! The context is created inside `execute`, lent out as `&mut` to one
//! handler at a time and finally moved into the result assembler. The
//! engine itself holds no per-execution state, so one `Arc<WorkflowEngine>`
//! can serve any number of concurrent executions without locks.
//!
//! ### Instrumenting Futures
//! `.instrument(span)` attaches the execution's span to every log line
//! emitted while the future runs, including across `.await` points.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::assembler::assemble_result;
use super::conditions::ConditionEvaluator;
use super::connectors::ConnectorGateway;
use super::context::ExecutionContext;
use super::data_source;
use super::expression::ExpressionEvaluator;
use super::handlers::{self, DecisionOutcome, NodeOutcome};
use crate::config::EngineConfig;
use crate::models::{ExecutionResult, Graph, Node, NodeConfig, NodeKind, Variables};
use crate::{Result, UnderwriterError};

/// Interprets policy graphs
pub struct WorkflowEngine {
    gateway: Arc<dyn ConnectorGateway>,
    config: EngineConfig,
    conditions: ConditionEvaluator,
    expressions: ExpressionEvaluator,
}

impl WorkflowEngine {
    /// Create an engine with default limits
    pub fn new(gateway: Arc<dyn ConnectorGateway>) -> Self {
        Self::with_config(gateway, &EngineConfig::default())
    }

    pub fn with_config(gateway: Arc<dyn ConnectorGateway>, config: &EngineConfig) -> Self {
        Self {
            gateway,
            config: config.clone(),
            conditions: ConditionEvaluator::new(),
            expressions: ExpressionEvaluator::new(config),
        }
    }

    /// Execute `graph` against `input`
    ///
    /// Never fails: every error is reported as a `manual_review` result.
    pub async fn execute(
        &self,
        graph: &Graph,
        input: &Value,
        policy_id: &str,
        application_id: &str,
    ) -> ExecutionResult {
        let execution_id = Uuid::new_v4();
        let span = info_span!(
            "policy_execution",
            policy_id,
            application_id,
            execution_id = %execution_id
        );

        self.run(graph, input).instrument(span).await
    }

    /// Load a graph from JSON and execute it
    ///
    /// A graph that fails to load yields a `manual_review` result with an
    /// empty trace.
    pub async fn execute_json(
        &self,
        graph: &Value,
        input: &Value,
        policy_id: &str,
        application_id: &str,
    ) -> ExecutionResult {
        let started = Instant::now();
        match Graph::from_json(graph) {
            Ok(graph) => self.execute(&graph, input, policy_id, application_id).await,
            Err(error) => {
                warn!(policy_id, application_id, error = %error, "Policy graph failed to load");
                load_failure(input, error, started)
            }
        }
    }

    async fn run(&self, graph: &Graph, input: &Value) -> ExecutionResult {
        let started = Instant::now();

        let mut context = match initial_variables(input) {
            Ok(variables) => ExecutionContext::new(variables),
            Err(error) => {
                warn!(error = %error, "Rejected application input");
                return assemble_result(ExecutionContext::default(), Err(error), started.elapsed());
            }
        };

        let outcome = self.traverse(graph, &mut context).await;
        match &outcome {
            Ok(decided) => info!(
                decision = %decided.decision,
                steps = context.trace().len(),
                "Policy decision reached"
            ),
            Err(error) => warn!(
                error = %error,
                node_id = context.current_node.as_deref().unwrap_or("-"),
                "Policy execution failed, routing to manual review"
            ),
        }

        assemble_result(context, outcome, started.elapsed())
    }

    async fn traverse(&self, graph: &Graph, context: &mut ExecutionContext) -> Result<DecisionOutcome> {
        let mut node = graph.start_node().ok_or(UnderwriterError::MissingStartNode)?;
        let budget = graph
            .nodes
            .len()
            .max(1)
            .saturating_mul(self.config.max_steps_per_node.max(1));

        for _ in 0..budget {
            match self.step(node, context).await? {
                NodeOutcome::Decided(decided) => return Ok(decided),
                outcome => node = next_node(graph, node, &outcome)?,
            }
        }

        Err(UnderwriterError::StepBudgetExceeded { budget })
    }

    /// Run one node and record the attempt in the trace
    async fn step(&self, node: &Node, context: &mut ExecutionContext) -> Result<NodeOutcome> {
        context.current_node = Some(node.id.clone());
        let variables_before = context.variables.clone();
        let timestamp = Utc::now();
        let started = Instant::now();

        debug!(node_id = %node.id, kind = %node.kind(), "Executing node");
        let result = self.dispatch(node, context).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(outcome) => {
                debug!(node_id = %node.id, duration_ms, "Node completed");
                context.record(
                    &node.id,
                    node.kind(),
                    timestamp,
                    variables_before,
                    Some(outcome.to_value()),
                    duration_ms,
                    None,
                );
            }
            Err(error) => {
                warn!(node_id = %node.id, kind = %node.kind(), error = %error, "Node failed");
                context.record(
                    &node.id,
                    node.kind(),
                    timestamp,
                    variables_before,
                    None,
                    duration_ms,
                    Some(error.to_string()),
                );
            }
        }

        result
    }

    async fn dispatch(&self, node: &Node, context: &mut ExecutionContext) -> Result<NodeOutcome> {
        match &node.config {
            NodeConfig::Start | NodeConfig::End | NodeConfig::ApiCall(None) | NodeConfig::DbQuery(_) => {
                Ok(NodeOutcome::Passed)
            }
            NodeConfig::Condition(config) => handlers::condition(&self.conditions, config, context),
            NodeConfig::Calculation(config) => {
                handlers::calculation(&self.expressions, config, context)
            }
            NodeConfig::Score(config) => handlers::score(config, context),
            NodeConfig::Decision(config) => handlers::decision(config, context),
            NodeConfig::DataSource(config) | NodeConfig::ApiCall(Some(config)) => {
                data_source::resolve(self.gateway.as_ref(), config, context)
                    .await
                    .map(NodeOutcome::Resolved)
            }
        }
    }
}

fn load_failure(input: &Value, error: UnderwriterError, started: Instant) -> ExecutionResult {
    let context = ExecutionContext::new(initial_variables(input).unwrap_or_default());
    assemble_result(context, Err(error), started.elapsed())
}

fn initial_variables(input: &Value) -> Result<Variables> {
    match input {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Variables::new()),
        other => Err(UnderwriterError::InvalidInput(format!(
            "application data must be a JSON object, got {}",
            other
        ))),
    }
}

fn next_node<'g>(graph: &'g Graph, node: &'g Node, outcome: &NodeOutcome) -> Result<&'g Node> {
    let edge = match outcome {
        NodeOutcome::Branched { result, .. } => {
            let handle = result.to_string();
            graph
                .outgoing(&node.id)
                .find(|edge| edge.source_handle.as_deref() == Some(handle.as_str()))
                .ok_or_else(|| UnderwriterError::UnmatchedBranch {
                    node_id: node.id.clone(),
                    branch: *result,
                })?
        }
        _ => {
            if node.kind() == NodeKind::End {
                debug!(node_id = %node.id, "Continuing past end node");
            }
            graph
                .outgoing(&node.id)
                .next()
                .ok_or_else(|| UnderwriterError::WorkflowIncomplete {
                    node_id: node.id.clone(),
                })?
        }
    };

    graph
        .node(&edge.target)
        .ok_or_else(|| UnderwriterError::WorkflowIncomplete {
            node_id: node.id.clone(),
        })
}
