use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::error::Result;
use crate::graph::{Flow, FlowStatus};
use crate::types::ExecutionRecord;

/// Agent capability: given text, produce text.
pub trait AgentCapability: Send + Sync + 'static {
    /// Agent identifier referenced by `agent` nodes.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str {
        self.id()
    }

    /// Produce a response to the given text.
    fn respond(&self, text: String) -> BoxFuture<'_, Result<String>>;
}

/// Flow store: persistence backend for flow definitions.
pub trait FlowStore: Send + Sync + 'static {
    /// Insert a new flow.
    fn insert(&self, flow: Flow) -> BoxFuture<'_, Result<()>>;

    /// Load a flow by id.
    fn get(&self, id: &str) -> BoxFuture<'_, Result<Option<Flow>>>;

    /// List all flows, oldest first.
    fn list(&self) -> BoxFuture<'_, Result<Vec<Flow>>>;

    /// Replace the definition (name, description, nodes, edges) of an existing flow.
    /// Returns false if the flow does not exist.
    fn update(&self, flow: &Flow) -> BoxFuture<'_, Result<bool>>;

    /// Record a lifecycle transition without touching the definition.
    fn set_status(
        &self,
        id: &str,
        status: FlowStatus,
        last_run: Option<DateTime<Utc>>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Delete a flow. Returns false if it did not exist.
    fn delete(&self, id: &str) -> BoxFuture<'_, Result<bool>>;
}

/// Execution log: append-only record of flow runs.
pub trait ExecutionLog: Send + Sync + 'static {
    /// Append a finished record.
    fn append(&self, record: ExecutionRecord) -> BoxFuture<'_, Result<()>>;

    /// List records in append order, optionally only those of one flow.
    fn list(&self, flow_id: Option<&str>) -> BoxFuture<'_, Result<Vec<ExecutionRecord>>>;
}
