use std::collections::HashMap;
use std::sync::Arc;

use crate::traits::AgentCapability;

/// Agents addressable by `agent` nodes, keyed by id.
#[derive(Default, Clone)]
pub struct AgentDirectory {
    agents: HashMap<String, Arc<dyn AgentCapability>>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent. Replaces any agent with the same id.
    pub fn register(&mut self, agent: Arc<dyn AgentCapability>) {
        self.agents.insert(agent.id().to_string(), agent);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, agent: Arc<dyn AgentCapability>) -> Self {
        self.register(agent);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn AgentCapability>> {
        self.agents.get(id).cloned()
    }

    /// Registered agent ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.agents.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl std::fmt::Debug for AgentDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDirectory")
            .field("agents", &self.ids())
            .finish()
    }
}
