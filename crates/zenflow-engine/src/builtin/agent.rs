use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{debug, warn};

use zenflow_core::directory::AgentDirectory;
use zenflow_core::error::{Result, ZenflowError};
use zenflow_core::graph::Node;

use crate::context::ExecutionContext;
use crate::handler::{ports, NodeHandler, NodeOutcome};

use super::node_data;

/// Sends the current input to an agent and forwards its reply.
///
/// An unknown agent id is reported in the output and the run continues.
/// A failing or timed-out agent call aborts the run.
pub struct AgentHandler {
    agents: AgentDirectory,
    timeout: Duration,
}

#[derive(Deserialize)]
struct AgentData {
    #[serde(default)]
    agent_id: String,
}

impl AgentHandler {
    pub fn new(agents: AgentDirectory, timeout: Duration) -> Self {
        Self { agents, timeout }
    }
}

impl NodeHandler for AgentHandler {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<NodeOutcome>> {
        Box::pin(async move {
            let data: AgentData = node_data(node)?;

            let Some(agent) = self.agents.get(&data.agent_id) else {
                warn!(node_id = %node.id, agent_id = %data.agent_id, "Agent not found");
                return Ok(NodeOutcome::port(
                    serde_json::json!({ "error": "Agent not found", "agent_id": data.agent_id }),
                    ports::RESPONSE,
                ));
            };

            debug!(node_id = %node.id, agent_id = %data.agent_id, "Calling agent");

            let call = tokio::time::timeout(self.timeout, agent.respond(ctx.input_text()));
            let response = tokio::select! {
                result = call => match result {
                    Ok(Ok(text)) => text,
                    Ok(Err(e)) => return Err(ZenflowError::handler(node.id.clone(), e.to_string())),
                    Err(_) => {
                        return Err(ZenflowError::HandlerTimeout {
                            node: node.id.clone(),
                            timeout_secs: self.timeout.as_secs(),
                        })
                    }
                },
                _ = ctx.cancel_token().cancelled() => return Err(ZenflowError::Cancelled),
            };

            Ok(NodeOutcome::port(
                serde_json::json!({ "response": response }),
                ports::RESPONSE,
            ))
        })
    }
}
