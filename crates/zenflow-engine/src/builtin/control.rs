use futures::future::BoxFuture;

use zenflow_core::error::Result;
use zenflow_core::graph::Node;

use crate::context::ExecutionContext;
use crate::handler::{NodeHandler, NodeOutcome};

/// Entry point of every run: forwards the trigger payload.
pub struct TriggerHandler;

impl NodeHandler for TriggerHandler {
    fn execute<'a>(
        &'a self,
        _node: &'a Node,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<NodeOutcome>> {
        Box::pin(async move { Ok(NodeOutcome::next(ctx.input.clone())) })
    }
}

/// Terminal node: keeps the input and stops the run.
pub struct EndHandler;

impl NodeHandler for EndHandler {
    fn execute<'a>(
        &'a self,
        _node: &'a Node,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<NodeOutcome>> {
        Box::pin(async move { Ok(NodeOutcome::terminal(ctx.input.clone())) })
    }
}

/// Fallback for unregistered node types: input passes through to `next`.
pub struct PassThroughHandler;

impl NodeHandler for PassThroughHandler {
    fn execute<'a>(
        &'a self,
        _node: &'a Node,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<NodeOutcome>> {
        Box::pin(async move { Ok(NodeOutcome::next(ctx.input.clone())) })
    }
}
