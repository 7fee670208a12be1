use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use zenflow_core::error::{Result, ZenflowError};
use zenflow_core::graph::{new_flow_id, Edge, Flow, FlowStatus, Node};
use zenflow_core::traits::FlowStore;

use crate::context::ExecutionContext;
use crate::executor::{ExecutionResult, FlowExecutor};

/// Input for creating a flow.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlowDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub nodes: Vec<Value>,
    #[serde(default)]
    pub edges: Vec<Value>,
}

/// Partial update of a flow. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlowUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Option<Vec<Value>>,
    #[serde(default)]
    pub edges: Option<Vec<Value>>,
}

/// Flow definitions on top of a [`FlowStore`].
pub struct FlowRegistry {
    store: Arc<dyn FlowStore>,
}

impl FlowRegistry {
    pub fn new(store: Arc<dyn FlowStore>) -> Self {
        Self { store }
    }

    /// Validate and store a new flow with a fresh id and status `inactive`.
    pub async fn create(&self, draft: FlowDraft) -> Result<Flow> {
        let flow = Flow::from_specs(
            new_flow_id(),
            draft.name,
            draft.description,
            &draft.nodes,
            &draft.edges,
        )?;
        self.store.insert(flow.clone()).await?;
        info!(flow_id = %flow.id, nodes = flow.nodes().len(), "Flow created");
        Ok(flow)
    }

    /// Store an already-built flow (e.g. one read from a file), keeping its id.
    pub async fn import(&self, mut flow: Flow) -> Result<Flow> {
        flow.validate()?;
        flow.status = FlowStatus::Inactive;
        flow.last_run = None;
        self.store.insert(flow.clone()).await?;
        info!(flow_id = %flow.id, "Flow imported");
        Ok(flow)
    }

    pub async fn get(&self, id: &str) -> Result<Flow> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ZenflowError::FlowNotFound(id.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<Flow>> {
        self.store.list().await
    }

    /// Apply a partial update. A new node or edge set is validated against the
    /// other half of the graph before anything is stored.
    pub async fn update(&self, id: &str, update: FlowUpdate) -> Result<Flow> {
        let mut flow = self.get(id).await?;

        if let Some(name) = update.name.filter(|n| !n.trim().is_empty()) {
            flow.name = name;
        }
        if let Some(description) = update.description {
            flow.description = description;
        }

        if update.nodes.is_some() || update.edges.is_some() {
            let nodes = match update.nodes {
                Some(specs) => specs.iter().map(Node::from_spec).collect::<Result<Vec<_>>>()?,
                None => flow.nodes().to_vec(),
            };
            let edges = match update.edges {
                Some(specs) => specs.iter().map(Edge::from_spec).collect::<Result<Vec<_>>>()?,
                None => flow.edges().to_vec(),
            };
            flow.replace_graph(nodes, edges)?;
        }

        if !self.store.update(&flow).await? {
            return Err(ZenflowError::FlowNotFound(id.to_string()));
        }
        info!(flow_id = %id, "Flow updated");
        self.get(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        if self.store.delete(id).await? {
            info!(flow_id = %id, "Flow deleted");
            Ok(())
        } else {
            Err(ZenflowError::FlowNotFound(id.to_string()))
        }
    }

    /// Load a flow, run it, and persist its lifecycle transitions.
    pub async fn execute(
        &self,
        executor: &FlowExecutor,
        id: &str,
        ctx: ExecutionContext,
    ) -> Result<ExecutionResult> {
        let mut flow = self.get(id).await?;

        if flow.trigger().is_some() {
            self.store
                .set_status(id, FlowStatus::Running, flow.last_run)
                .await?;
        }

        let result = executor.run_with(&mut flow, ctx).await;

        // A run without a trigger leaves the flow untouched.
        if flow.last_run.is_some() {
            if let Err(e) = self.store.set_status(id, flow.status, flow.last_run).await {
                warn!(flow_id = %id, error = %e, "Failed to persist flow status");
            }
        }

        Ok(result)
    }
}
