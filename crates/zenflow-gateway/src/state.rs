use std::sync::Arc;

use zenflow_core::directory::AgentDirectory;
use zenflow_engine::{FlowExecutor, FlowRegistry};

/// Shared application state for axum handlers.
pub struct AppState {
    pub flows: Arc<FlowRegistry>,
    pub executor: Arc<FlowExecutor>,
    pub agents: AgentDirectory,
}
