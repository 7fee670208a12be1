//! Mocks and fixtures shared by the zenflow test suites.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;

use zenflow_core::error::{Result, ZenflowError};
use zenflow_core::traits::AgentCapability;

/// Agent that answers `"{id}: {text}"` and counts its calls.
pub struct EchoAgent {
    id: String,
    calls: AtomicUsize,
}

impl EchoAgent {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AgentCapability for EchoAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn respond(&self, text: String) -> BoxFuture<'_, Result<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(format!("{}: {}", self.id, text)) })
    }
}

/// Agent whose every request fails.
pub struct FailingAgent {
    id: String,
}

impl FailingAgent {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

impl AgentCapability for FailingAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn respond(&self, _text: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            Err(ZenflowError::AgentRequest(format!(
                "{}: upstream unavailable",
                self.id
            )))
        })
    }
}

/// Agent that sleeps before answering. Pair with paused tokio time.
pub struct SlowAgent {
    id: String,
    delay: Duration,
}

impl SlowAgent {
    pub fn new(id: &str, delay: Duration) -> Self {
        Self {
            id: id.to_string(),
            delay,
        }
    }
}

impl AgentCapability for SlowAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn respond(&self, text: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(text)
        })
    }
}

/// Write `contents` to a `zenflow.toml` inside a fresh temp dir.
/// Keep the returned guard alive for as long as the file is needed.
pub fn temp_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("zenflow.toml");
    std::fs::write(&path, contents).expect("write config");
    (dir, path)
}

pub mod fixtures {
    use serde_json::{json, Value};
    use zenflow_core::graph::{Edge, Flow, Node};

    pub fn node(id: &str, node_type: &str, data: Value) -> Node {
        Node::new(id, node_type).with_data(data)
    }

    pub fn edge(id: &str, source: &str, target: &str) -> Edge {
        Edge::new(id, source, target)
    }

    pub fn port_edge(id: &str, source: &str, target: &str, port: &str) -> Edge {
        Edge::new(id, source, target).from_port(port)
    }

    /// trigger -> condition(contains "urgent")
    ///   true  -> tag("priority") -> end
    ///   false -> done
    pub fn triage_flow(id: &str) -> Flow {
        Flow::new(
            id,
            "Triage",
            "Tag urgent messages",
            vec![
                node("trigger", "trigger", json!({})),
                node(
                    "check",
                    "condition",
                    json!({"condition": "contains", "value": "urgent"}),
                ),
                node("tag", "tag", json!({"tag": "priority"})),
                node("end", "end", json!({})),
                node("done", "end", json!({})),
            ],
            vec![
                edge("e1", "trigger", "check"),
                port_edge("e2", "check", "tag", "true"),
                port_edge("e3", "check", "done", "false"),
                edge("e4", "tag", "end"),
            ],
        )
        .expect("triage fixture is a valid graph")
    }

    /// The triage graph as raw JSON specs, the shape clients submit.
    pub fn triage_specs() -> (Vec<Value>, Vec<Value>) {
        let nodes = vec![
            json!({"id": "trigger", "type": "trigger", "data": {}, "position": {"x": 0, "y": 0}}),
            json!({"id": "check", "type": "condition", "data": {"condition": "contains", "value": "urgent"}}),
            json!({"id": "tag", "type": "tag", "data": {"tag": "priority"}}),
            json!({"id": "end", "type": "end"}),
            json!({"id": "done", "type": "end"}),
        ];
        let edges = vec![
            json!({"id": "e1", "source": "trigger", "target": "check"}),
            json!({"id": "e2", "source": "check", "target": "tag", "sourceHandle": "true"}),
            json!({"id": "e3", "source": "check", "target": "done", "sourceHandle": "false"}),
            json!({"id": "e4", "source": "tag", "target": "end"}),
        ];
        (nodes, edges)
    }
}
