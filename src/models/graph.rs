// Policy graph definitions - nodes, edges and their kind-specific configuration

//! # Policy Graphs
//!
//! A policy is a directed graph. Each [`Node`] has a kind (`start`,
//! `condition`, `calculation`, `score`, `decision`, `dataSource`, `apiCall`,
//! `dbQuery`, `end`) and a kind-specific configuration; each [`Edge`] links a
//! source node to a target node, optionally tagged with a `sourceHandle` of
//! `"true"` / `"false"` when it leaves a condition node.
//!
//! ## Load-Time Validation
//!
//! The editor stores node configuration as loosely-typed JSON. When a graph is
//! deserialized, every node's JSON is converted into a closed [`NodeConfig`]
//! variant, so a missing formula or an empty connector id is reported while
//! loading the graph instead of when execution reaches that node.
//!
//! What is deliberately **not** validated here:
//! - presence of a `start` node (the engine fails on it at run time)
//! - edge targets (an edge to an unknown node is a traversal error)
//!
//! ## Rust Learning Notes:
//!
//! ### Closed Sum Types
//! `NodeConfig` has exactly one variant per node kind. A `match` over it must
//! handle every kind, so adding a kind is a compile error until every handler
//! knows about it.
//!
//! ### Custom Serialize
//! `Node` serializes back to the same `{id, kind, config}` shape it was read
//! from by implementing `Serialize` by hand instead of deriving it.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

use super::condition::Condition;
use super::result::Decision;
use crate::{Result, UnderwriterError};

/// Node kinds understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Start,
    DataSource,
    Condition,
    Calculation,
    Score,
    Decision,
    ApiCall,
    DbQuery,
    End,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::DataSource => "dataSource",
            NodeKind::Condition => "condition",
            NodeKind::Calculation => "calculation",
            NodeKind::Score => "score",
            NodeKind::Decision => "decision",
            NodeKind::ApiCall => "apiCall",
            NodeKind::DbQuery => "dbQuery",
            NodeKind::End => "end",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of a `condition` node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub condition: Condition,
}

/// Configuration of a `calculation` node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationConfig {
    /// Arithmetic formula over variable names, e.g. `income / 12`
    pub formula: String,
    /// Variable that receives the numeric result
    pub output_variable: String,
}

/// One inclusive score band of a factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
    pub score: f64,
}

impl ScoreRange {
    /// Inclusive on both ends
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

/// A variable inspected by a `score` node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactor {
    pub variable: String,
    #[serde(default)]
    pub ranges: Vec<ScoreRange>,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// Configuration of a `score` node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreConfig {
    #[serde(default)]
    pub factors: Vec<ScoreFactor>,
    #[serde(default = "default_score_variable")]
    pub output_variable: String,
}

fn default_score_variable() -> String {
    "risk_score".to_string()
}

/// Configuration of a `decision` node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionConfig {
    pub decision: Decision,
    /// Reason template; `{variable}` placeholders are filled from the variable map
    #[serde(default)]
    pub reason: String,
    /// Free-form description of the conditions that led here, echoed into the result
    #[serde(default)]
    pub conditions: Value,
}

/// What a data source does when its connector call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnErrorPolicy {
    /// Swallow the failure and continue without data
    Skip,
    /// Fall back to a response cached earlier in this execution
    UseCached,
    /// Fail with an error that asks for manual review
    ManualReview,
}

/// Configuration of a `dataSource` node (and of a connector-backed `apiCall` node)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceConfig {
    pub connector_id: String,
    /// Request parameters; string values naming a variable are resolved first
    #[serde(default)]
    pub params: Map<String, Value>,
    /// `variableName -> dot.separated.response.path`
    #[serde(default)]
    pub field_mapping: Option<Map<String, Value>>,
    /// Caching hint forwarded to the connector gateway
    #[serde(default = "default_cache_response")]
    pub cache_response: bool,
    #[serde(default)]
    pub on_error: Option<OnErrorPolicy>,
}

fn default_cache_response() -> bool {
    true
}

/// Kind-specific node configuration
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    Start,
    DataSource(DataSourceConfig),
    Condition(ConditionConfig),
    Calculation(CalculationConfig),
    Score(ScoreConfig),
    Decision(DecisionConfig),
    /// Connector-backed when configured with a `connectorId`, otherwise a no-op
    ApiCall(Option<DataSourceConfig>),
    /// Reserved extension point; carries its raw configuration untouched
    DbQuery(Value),
    End,
}

impl NodeConfig {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeConfig::Start => NodeKind::Start,
            NodeConfig::DataSource(_) => NodeKind::DataSource,
            NodeConfig::Condition(_) => NodeKind::Condition,
            NodeConfig::Calculation(_) => NodeKind::Calculation,
            NodeConfig::Score(_) => NodeKind::Score,
            NodeConfig::Decision(_) => NodeKind::Decision,
            NodeConfig::ApiCall(_) => NodeKind::ApiCall,
            NodeConfig::DbQuery(_) => NodeKind::DbQuery,
            NodeConfig::End => NodeKind::End,
        }
    }

    /// Parse and validate a node's raw configuration for the given kind
    pub fn from_raw(kind: NodeKind, config: Value) -> std::result::Result<Self, String> {
        let config = match config {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        let parsed = match kind {
            NodeKind::Start => NodeConfig::Start,
            NodeKind::End => NodeConfig::End,
            NodeKind::DbQuery => NodeConfig::DbQuery(config),
            NodeKind::Condition => {
                if config.get("condition").map_or(true, Value::is_null) {
                    return Err("no condition configured".to_string());
                }
                NodeConfig::Condition(parse(config)?)
            }
            NodeKind::Calculation => {
                let calculation: CalculationConfig = parse(config)?;
                require_text("formula", &calculation.formula)?;
                require_text("outputVariable", &calculation.output_variable)?;
                NodeConfig::Calculation(calculation)
            }
            NodeKind::Score => {
                let score: ScoreConfig = parse(config)?;
                require_text("outputVariable", &score.output_variable)?;
                NodeConfig::Score(score)
            }
            NodeKind::Decision => NodeConfig::Decision(parse(config)?),
            NodeKind::DataSource => NodeConfig::DataSource(parse_data_source(config)?),
            NodeKind::ApiCall => {
                if config.get("connectorId").is_some() {
                    NodeConfig::ApiCall(Some(parse_data_source(config)?))
                } else {
                    NodeConfig::ApiCall(None)
                }
            }
        };

        Ok(parsed)
    }

    fn to_raw(&self) -> std::result::Result<Value, serde_json::Error> {
        match self {
            NodeConfig::Start | NodeConfig::End | NodeConfig::ApiCall(None) => {
                Ok(Value::Object(Map::new()))
            }
            NodeConfig::DataSource(config) | NodeConfig::ApiCall(Some(config)) => {
                serde_json::to_value(config)
            }
            NodeConfig::Condition(config) => serde_json::to_value(config),
            NodeConfig::Calculation(config) => serde_json::to_value(config),
            NodeConfig::Score(config) => serde_json::to_value(config),
            NodeConfig::Decision(config) => serde_json::to_value(config),
            NodeConfig::DbQuery(raw) => Ok(raw.clone()),
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(config: Value) -> std::result::Result<T, String> {
    serde_json::from_value(config).map_err(|e| e.to_string())
}

fn parse_data_source(config: Value) -> std::result::Result<DataSourceConfig, String> {
    let data_source: DataSourceConfig = parse(config)?;
    require_text("connectorId", &data_source.connector_id)?;
    if let Some(mapping) = &data_source.field_mapping {
        if let Some((variable, _)) = mapping.iter().find(|(_, path)| !path.is_string()) {
            return Err(format!(
                "fieldMapping entry '{}' must be a response path string",
                variable
            ));
        }
    }
    Ok(data_source)
}

fn require_text(field: &str, value: &str) -> std::result::Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("missing {}", field))
    } else {
        Ok(())
    }
}

/// A single policy node
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawNode")]
pub struct Node {
    /// Unique within its graph
    pub id: String,
    pub config: NodeConfig,
}

/// Wire shape of a node before its configuration is validated
#[derive(Debug, Deserialize)]
struct RawNode {
    id: String,
    #[serde(alias = "type")]
    kind: NodeKind,
    #[serde(default)]
    config: Value,
}

impl TryFrom<RawNode> for Node {
    type Error = String;

    fn try_from(raw: RawNode) -> std::result::Result<Self, Self::Error> {
        let config = NodeConfig::from_raw(raw.kind, raw.config)
            .map_err(|message| format!("node '{}' ({}): {}", raw.id, raw.kind, message))?;
        Ok(Node { id: raw.id, config })
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let config = self.config.to_raw().map_err(serde::ser::Error::custom)?;
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("kind", &self.kind())?;
        map.serialize_entry("config", &config)?;
        map.end()
    }
}

impl Node {
    pub fn new(id: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id: id.into(),
            config,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.config.kind()
    }
}

/// A directed connection between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    /// `"true"` / `"false"` on edges leaving a condition node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    /// Edge leaving a condition node on the given branch
    pub fn branch(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        branch: bool,
    ) -> Self {
        Self {
            source_handle: Some(branch.to_string()),
            ..Self::new(id, source, target)
        }
    }
}

/// The policy definition: ordered nodes plus ordered edges
///
/// Edge order is significant: a non-condition node follows its **first**
/// outgoing edge in this order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGraph")]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Deserialize)]
struct RawGraph {
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

impl TryFrom<RawGraph> for Graph {
    type Error = String;

    fn try_from(raw: RawGraph) -> std::result::Result<Self, Self::Error> {
        Graph::new(raw.nodes, raw.edges).map_err(|e| match e {
            UnderwriterError::InvalidGraph(message) => message,
            other => other.to_string(),
        })
    }
}

impl Graph {
    /// Build a graph, rejecting duplicate node ids
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self> {
        let mut seen = HashSet::new();
        if let Some(duplicate) = nodes.iter().find(|node| !seen.insert(node.id.as_str())) {
            return Err(UnderwriterError::InvalidGraph(format!(
                "duplicate node id '{}'",
                duplicate.id
            )));
        }
        Ok(Self { nodes, edges })
    }

    /// Load a graph from its JSON form
    pub fn from_json(value: &Value) -> Result<Self> {
        Graph::deserialize(value).map_err(|e| UnderwriterError::InvalidGraph(e.to_string()))
    }

    /// The first node of kind `start`
    pub fn start_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|node| node.kind() == NodeKind::Start)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Outgoing edges of a node, in graph order
    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |edge| edge.source == node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_graph_with_every_kind() {
        let graph = Graph::from_json(&json!({
            "nodes": [
                {"id": "s", "kind": "start"},
                {"id": "ds", "kind": "dataSource", "config": {"connectorId": "bureau", "params": {"ssn": "ssn"}}},
                {"id": "c", "kind": "condition", "config": {"condition": {"left": "income", "operator": ">", "right": 1}}},
                {"id": "calc", "kind": "calculation", "config": {"formula": "income / 12", "outputVariable": "monthly"}},
                {"id": "sc", "kind": "score", "config": {"factors": []}},
                {"id": "d", "kind": "decision", "config": {"decision": "approved", "reason": "ok"}},
                {"id": "api", "type": "apiCall"},
                {"id": "db", "kind": "dbQuery", "config": {"query": "select 1"}},
                {"id": "e", "kind": "end"}
            ],
            "edges": [{"id": "e1", "source": "s", "target": "ds"}]
        }))
        .unwrap();

        assert_eq!(graph.nodes.len(), 9);
        assert_eq!(graph.start_node().unwrap().id, "s");
        assert_eq!(graph.node("api").unwrap().config, NodeConfig::ApiCall(None));

        match &graph.node("sc").unwrap().config {
            NodeConfig::Score(score) => assert_eq!(score.output_variable, "risk_score"),
            other => panic!("expected score config, got {:?}", other),
        }
        match &graph.node("ds").unwrap().config {
            NodeConfig::DataSource(ds) => {
                assert!(ds.cache_response);
                assert_eq!(ds.on_error, None);
            }
            other => panic!("expected data source config, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_formula_fails_at_load() {
        let err = Graph::from_json(&json!({
            "nodes": [{"id": "calc", "kind": "calculation", "config": {"formula": "", "outputVariable": "x"}}]
        }))
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("calc"));
        assert!(message.contains("missing formula"));
    }

    #[test]
    fn test_missing_condition_fails_at_load() {
        let err = Graph::from_json(&json!({
            "nodes": [{"id": "c", "kind": "condition", "config": {}}]
        }))
        .unwrap_err();

        assert!(err.to_string().contains("no condition configured"));
    }

    #[test]
    fn test_unknown_kind_fails_at_load() {
        let err = Graph::from_json(&json!({
            "nodes": [{"id": "x", "kind": "webhook"}]
        }))
        .unwrap_err();

        assert!(matches!(err, UnderwriterError::InvalidGraph(_)));
    }

    #[test]
    fn test_duplicate_node_ids_rejected() {
        let err = Graph::new(
            vec![Node::new("a", NodeConfig::Start), Node::new("a", NodeConfig::End)],
            vec![],
        )
        .unwrap_err();

        assert!(err.to_string().contains("duplicate node id 'a'"));
    }

    #[test]
    fn test_non_string_field_mapping_rejected() {
        let err = Graph::from_json(&json!({
            "nodes": [{"id": "ds", "kind": "dataSource", "config": {
                "connectorId": "bureau",
                "fieldMapping": {"score": 5}
            }}]
        }))
        .unwrap_err();

        assert!(err.to_string().contains("fieldMapping entry 'score'"));
    }

    #[test]
    fn test_node_round_trips_through_json() {
        let node = Node::new(
            "calc",
            NodeConfig::Calculation(CalculationConfig {
                formula: "a + b".to_string(),
                output_variable: "total".to_string(),
            }),
        );

        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(
            value,
            json!({"id": "calc", "kind": "calculation", "config": {"formula": "a + b", "outputVariable": "total"}})
        );
        assert_eq!(serde_json::from_value::<Node>(value).unwrap(), node);
    }

    #[test]
    fn test_outgoing_edges_keep_graph_order() {
        let graph = Graph::new(
            vec![Node::new("s", NodeConfig::Start)],
            vec![
                Edge::new("e2", "s", "b"),
                Edge::new("e1", "s", "a"),
                Edge::new("e3", "x", "s"),
            ],
        )
        .unwrap();

        let targets: Vec<&str> = graph.outgoing("s").map(|e| e.target.as_str()).collect();
        assert_eq!(targets, vec!["b", "a"]);
    }
}
