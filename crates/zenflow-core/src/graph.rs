//! Flow graph model.
//!
//! A flow is a set of typed [`Node`]s connected by [`Edge`]s. Each edge leaves
//! its source through an optional named port (`sourceHandle`), which is how
//! branching nodes such as `condition` pick their successor.
//!
//! Graphs are validated when they are built: every node and edge must carry
//! its identity fields, node ids must be unique, and every edge must reference
//! nodes of the same flow. Anything else surfaces as
//! [`ZenflowError::MalformedGraph`] before the flow is ever stored or run.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, ZenflowError};

/// Built-in node type tags.
pub mod node_types {
    pub const TRIGGER: &str = "trigger";
    pub const MESSAGE: &str = "message";
    pub const CONDITION: &str = "condition";
    pub const AGENT: &str = "agent";
    pub const DELAY: &str = "delay";
    pub const TAG: &str = "tag";
    pub const END: &str = "end";
}

/// Editor canvas coordinates. Never read by the executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

/// A typed step in a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within the flow.
    pub id: String,
    /// Type tag used to pick the handler.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Handler-specific payload.
    #[serde(default = "empty_object")]
    pub data: Value,
    #[serde(default)]
    pub position: Position,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data: empty_object(),
            position: Position::default(),
        }
    }

    /// Set the data payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Build a node from a raw JSON specification, checking required fields.
    pub fn from_spec(spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .ok_or_else(|| ZenflowError::malformed("node specification must be an object"))?;

        let id = required_str(obj, "id", "node")?;
        let node_type = required_str(obj, "type", &format!("node '{}'", id))?;

        let data = match obj.get("data") {
            None | Some(Value::Null) => empty_object(),
            Some(v) => v.clone(),
        };

        let position = match obj.get("position") {
            None | Some(Value::Null) => Position::default(),
            Some(p) => serde_json::from_value(p.clone()).map_err(|e| {
                ZenflowError::malformed(format!("node '{}' has an invalid position: {}", id, e))
            })?,
        };

        Ok(Self {
            id,
            node_type,
            data,
            position,
        })
    }

    /// Read a string field from the node data.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn is_trigger(&self) -> bool {
        self.node_type == node_types::TRIGGER
    }
}

/// A directed connection from a node's output port to another node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Output port on the source node. `None` matches any port as a fallback.
    #[serde(
        default,
        rename = "sourceHandle",
        alias = "source_handle",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_handle: Option<String>,
    /// Input port on the target node.
    #[serde(
        default,
        rename = "targetHandle",
        alias = "target_handle",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_handle: Option<String>,
}

impl Edge {
    /// Create a port-less edge.
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    /// Bind the edge to a source port.
    pub fn from_port(mut self, port: impl Into<String>) -> Self {
        self.source_handle = Some(port.into());
        self
    }

    /// Build an edge from a raw JSON specification, checking required fields.
    pub fn from_spec(spec: &Value) -> Result<Self> {
        let obj = spec
            .as_object()
            .ok_or_else(|| ZenflowError::malformed("edge specification must be an object"))?;

        let id = required_str(obj, "id", "edge")?;
        let what = format!("edge '{}'", id);
        let source = required_str(obj, "source", &what)?;
        let target = required_str(obj, "target", &what)?;

        Ok(Self {
            id,
            source,
            target,
            source_handle: optional_port(obj, "sourceHandle", "source_handle"),
            target_handle: optional_port(obj, "targetHandle", "target_handle"),
        })
    }

    /// Whether this edge leaves through the given port.
    pub fn is_port(&self, port: &str) -> bool {
        self.source_handle.as_deref() == Some(port)
    }
}

fn required_str(obj: &Map<String, Value>, key: &str, what: &str) -> Result<String> {
    match obj.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        _ => Err(ZenflowError::malformed(format!(
            "{} is missing required field '{}'",
            what, key
        ))),
    }
}

// Empty handles are treated as absent so they act as fallback edges.
fn optional_port(obj: &Map<String, Value>, key: &str, alias: &str) -> Option<String> {
    obj.get(key)
        .or_else(|| obj.get(alias))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Check that node ids are unique and every edge references known nodes.
pub fn validate_graph(nodes: &[Node], edges: &[Edge]) -> Result<()> {
    let mut ids = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if node.id.trim().is_empty() {
            return Err(ZenflowError::malformed("node with an empty id"));
        }
        if !ids.insert(node.id.as_str()) {
            return Err(ZenflowError::malformed(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
    }

    let mut edge_ids = HashSet::with_capacity(edges.len());
    for edge in edges {
        if !edge_ids.insert(edge.id.as_str()) {
            return Err(ZenflowError::malformed(format!(
                "duplicate edge id '{}'",
                edge.id
            )));
        }
        for endpoint in [&edge.source, &edge.target] {
            if !ids.contains(endpoint.as_str()) {
                return Err(ZenflowError::malformed(format!(
                    "edge '{}' references unknown node '{}'",
                    edge.id, endpoint
                )));
            }
        }
    }

    Ok(())
}

/// Parse and validate raw node and edge specifications.
pub fn parse_graph(node_specs: &[Value], edge_specs: &[Value]) -> Result<(Vec<Node>, Vec<Edge>)> {
    let nodes = node_specs
        .iter()
        .map(Node::from_spec)
        .collect::<Result<Vec<_>>>()?;
    let edges = edge_specs
        .iter()
        .map(Edge::from_spec)
        .collect::<Result<Vec<_>>>()?;
    validate_graph(&nodes, &edges)?;
    Ok((nodes, edges))
}

/// Lifecycle status of a flow. Only the executor moves a flow out of `Inactive`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    #[default]
    Inactive,
    Active,
    Running,
    Error,
}

impl FlowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Running => "running",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowStatus {
    type Err = ZenflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inactive" => Ok(Self::Inactive),
            "active" => Ok(Self::Active),
            "running" => Ok(Self::Running),
            "error" => Ok(Self::Error),
            other => Err(ZenflowError::Database(format!(
                "unknown flow status '{}'",
                other
            ))),
        }
    }
}

/// A stored workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    #[serde(default)]
    pub status: FlowStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
}

impl Flow {
    /// Create a flow from already-built nodes and edges.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) -> Result<Self> {
        validate_graph(&nodes, &edges)?;
        Ok(Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            nodes,
            edges,
            status: FlowStatus::Inactive,
            created_at: Utc::now(),
            last_run: None,
        })
    }

    /// Create a flow from raw JSON node and edge specifications.
    pub fn from_specs(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        node_specs: &[Value],
        edge_specs: &[Value],
    ) -> Result<Self> {
        let (nodes, edges) = parse_graph(node_specs, edge_specs)?;
        Self::new(id, name, description, nodes, edges)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Find a node by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Outbound edges of a node in declaration order, optionally restricted to one port.
    pub fn outbound<'a>(
        &'a self,
        node_id: &'a str,
        port: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| {
            e.source == node_id && port.map_or(true, |p| e.is_port(p))
        })
    }

    /// The first node of type `trigger`, if any.
    pub fn trigger(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.is_trigger())
    }

    /// Replace the whole node and edge set, validating the result first.
    pub fn replace_graph(&mut self, nodes: Vec<Node>, edges: Vec<Edge>) -> Result<()> {
        validate_graph(&nodes, &edges)?;
        self.nodes = nodes;
        self.edges = edges;
        Ok(())
    }

    /// Validate a deserialized flow (e.g. one loaded from a file).
    pub fn validate(&self) -> Result<()> {
        validate_graph(&self.nodes, &self.edges)
    }
}

/// Generate a new flow identifier: creation time plus a random suffix.
pub fn new_flow_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("flow_{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_specs() -> (Vec<Value>, Vec<Value>) {
        let nodes = vec![
            json!({"id": "t", "type": "trigger", "data": {}, "position": {"x": 10, "y": 20}}),
            json!({"id": "c", "type": "condition", "data": {"condition": "contains", "value": "post"}}),
            json!({"id": "e", "type": "end"}),
        ];
        let edges = vec![
            json!({"id": "e1", "source": "t", "target": "c"}),
            json!({"id": "e2", "source": "c", "target": "e", "sourceHandle": "true"}),
            json!({"id": "e3", "source": "c", "target": "e", "sourceHandle": ""}),
        ];
        (nodes, edges)
    }

    #[test]
    fn test_from_specs() {
        let (nodes, edges) = sample_specs();
        let flow = Flow::from_specs("f1", "Leads", "", &nodes, &edges).unwrap();

        assert_eq!(flow.nodes().len(), 3);
        assert_eq!(flow.edges().len(), 3);
        assert_eq!(flow.status, FlowStatus::Inactive);
        assert!(flow.last_run.is_none());
        assert_eq!(flow.node("t").unwrap().position, Position { x: 10.0, y: 20.0 });
        assert_eq!(flow.node("e").unwrap().data, json!({}));
        assert_eq!(flow.trigger().unwrap().id, "t");
    }

    #[test]
    fn test_empty_handle_is_portless() {
        let (nodes, edges) = sample_specs();
        let flow = Flow::from_specs("f1", "Leads", "", &nodes, &edges).unwrap();
        let e3 = flow.edges().iter().find(|e| e.id == "e3").unwrap();
        assert!(e3.source_handle.is_none());
    }

    #[test]
    fn test_outbound_filters_by_port() {
        let (nodes, edges) = sample_specs();
        let flow = Flow::from_specs("f1", "Leads", "", &nodes, &edges).unwrap();

        let all: Vec<_> = flow.outbound("c", None).map(|e| e.id.as_str()).collect();
        assert_eq!(all, vec!["e2", "e3"]);

        let on_true: Vec<_> = flow.outbound("c", Some("true")).map(|e| e.id.as_str()).collect();
        assert_eq!(on_true, vec!["e2"]);

        assert_eq!(flow.outbound("e", None).count(), 0);
    }

    #[test]
    fn test_node_missing_id() {
        let err = Node::from_spec(&json!({"type": "end"})).unwrap_err();
        assert!(matches!(err, ZenflowError::MalformedGraph(_)));
    }

    #[test]
    fn test_node_missing_type() {
        let err = Node::from_spec(&json!({"id": "n1"})).unwrap_err();
        assert!(err.to_string().contains("'type'"));
    }

    #[test]
    fn test_edge_missing_target() {
        let err = Edge::from_spec(&json!({"id": "e1", "source": "a"})).unwrap_err();
        assert!(err.to_string().contains("'target'"));
    }

    #[test]
    fn test_dangling_edge_rejected() {
        let nodes = vec![json!({"id": "t", "type": "trigger"})];
        let edges = vec![json!({"id": "e1", "source": "t", "target": "ghost"})];
        let err = Flow::from_specs("f1", "Broken", "", &nodes, &edges).unwrap_err();
        assert!(matches!(err, ZenflowError::MalformedGraph(_)));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let nodes = vec![
            json!({"id": "a", "type": "trigger"}),
            json!({"id": "a", "type": "end"}),
        ];
        let err = Flow::from_specs("f1", "Dup", "", &nodes, &[]).unwrap_err();
        assert!(err.to_string().contains("duplicate node id 'a'"));
    }

    #[test]
    fn test_replace_graph_keeps_old_graph_on_error() {
        let (nodes, edges) = sample_specs();
        let mut flow = Flow::from_specs("f1", "Leads", "", &nodes, &edges).unwrap();

        let result = flow.replace_graph(vec![Node::new("x", "end")], vec![Edge::new("e", "x", "y")]);
        assert!(result.is_err());
        assert_eq!(flow.nodes().len(), 3);
    }

    #[test]
    fn test_serde_uses_handle_names() {
        let edge = Edge::new("e1", "a", "b").from_port("true");
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["sourceHandle"], "true");
        assert!(json.get("targetHandle").is_none());

        let node = Node::new("n1", "tag");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "tag");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("running".parse::<FlowStatus>().unwrap(), FlowStatus::Running);
        assert!("paused".parse::<FlowStatus>().is_err());
        assert_eq!(FlowStatus::Error.to_string(), "error");
    }

    #[test]
    fn test_new_flow_id_unique() {
        let a = new_flow_id();
        let b = new_flow_id();
        assert!(a.starts_with("flow_"));
        assert_ne!(a, b);
    }
}
