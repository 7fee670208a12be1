use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use zenflow_core::error::{Result, ZenflowError};
use zenflow_core::graph::Node;

use crate::context::ExecutionContext;
use crate::handler::{NodeHandler, NodeOutcome};

use super::node_data;

/// Suspends the run without blocking the worker thread.
pub struct DelayHandler {
    default_secs: f64,
}

#[derive(Deserialize)]
struct DelayData {
    #[serde(default)]
    seconds: Option<f64>,
}

impl DelayHandler {
    pub fn new(default_secs: f64) -> Self {
        Self { default_secs }
    }
}

impl Default for DelayHandler {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl NodeHandler for DelayHandler {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<NodeOutcome>> {
        Box::pin(async move {
            let data: DelayData = node_data(node)?;
            let secs = data.seconds.unwrap_or(self.default_secs).max(0.0);
            let delay = Duration::try_from_secs_f64(secs).map_err(|e| {
                ZenflowError::handler(node.id.clone(), format!("invalid delay {}: {}", secs, e))
            })?;

            if !delay.is_zero() {
                debug!(node_id = %node.id, secs, "Delaying");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = ctx.cancel_token().cancelled() => return Err(ZenflowError::Cancelled),
                }
            }

            Ok(NodeOutcome::next(ctx.input.clone()))
        })
    }
}
