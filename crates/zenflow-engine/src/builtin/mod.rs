//! Built-in node handlers.

pub mod agent;
pub mod condition;
pub mod control;
pub mod delay;
pub mod message;
pub mod tag;

pub use agent::AgentHandler;
pub use condition::{ConditionHandler, Operator};
pub use control::{EndHandler, PassThroughHandler, TriggerHandler};
pub use delay::DelayHandler;
pub use message::{render_template, MessageHandler};
pub use tag::TagHandler;

use serde::de::DeserializeOwned;

use zenflow_core::error::{Result, ZenflowError};
use zenflow_core::graph::Node;

/// Deserialize a node's data payload into a handler's typed settings.
pub(crate) fn node_data<T: DeserializeOwned>(node: &Node) -> Result<T> {
    serde_json::from_value(node.data.clone()).map_err(|e| {
        ZenflowError::handler(
            node.id.clone(),
            format!("invalid {} node data: {}", node.node_type, e),
        )
    })
}
