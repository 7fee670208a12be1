use futures::future::BoxFuture;
use serde_json::Value;

use zenflow_core::error::Result;
use zenflow_core::graph::Node;

use crate::context::ExecutionContext;

/// Well-known port names.
pub mod ports {
    pub const NEXT: &str = "next";
    pub const TRUE: &str = "true";
    pub const FALSE: &str = "false";
    pub const RESPONSE: &str = "response";
}

/// What a handler produced for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutcome {
    /// New context input. `None` leaves the input unchanged.
    pub output: Option<Value>,
    /// Outbound port to follow. `None` ends the run.
    pub port: Option<String>,
}

impl NodeOutcome {
    /// Continue through `port` with the given output.
    pub fn port(output: Value, port: impl Into<String>) -> Self {
        Self {
            output: Some(output),
            port: Some(port.into()),
        }
    }

    /// Continue through the `next` port.
    pub fn next(output: Value) -> Self {
        Self::port(output, ports::NEXT)
    }

    /// Finish the run after this node.
    pub fn terminal(output: Value) -> Self {
        Self {
            output: Some(output),
            port: None,
        }
    }
}

/// Behavior bound to a node type.
///
/// Handlers read the node's data and the run context, and report an output
/// plus the outbound port. Returning an error aborts the whole run.
pub trait NodeHandler: Send + Sync + 'static {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<NodeOutcome>>;
}
