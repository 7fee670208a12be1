pub mod chat;
pub mod retry;

use std::sync::Arc;

use tracing::info;

use zenflow_core::config::AppConfig;
use zenflow_core::directory::AgentDirectory;

pub use chat::{fallback_reply, ChatAgent, HISTORY_WINDOW};
pub use retry::{calculate_backoff, is_retryable, with_retry};

/// Build the agent directory from the `[[agents]]` config section.
pub fn build_directory(config: &AppConfig) -> AgentDirectory {
    let mut directory = AgentDirectory::new();
    for profile in &config.agents {
        let model = config.model_for(profile);
        let agent_model = model.model_id.clone();
        let agent = ChatAgent::new(profile.clone(), model);
        info!(
            agent_id = %profile.id,
            kind = %profile.kind,
            model = %agent_model,
            online = agent.has_api_key(),
            "Agent registered"
        );
        directory.register(Arc::new(agent));
    }
    directory
}
