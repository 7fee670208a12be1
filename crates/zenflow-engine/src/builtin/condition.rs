use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use zenflow_core::error::Result;
use zenflow_core::graph::Node;

use crate::context::{text_projection, ExecutionContext};
use crate::handler::{ports, NodeHandler, NodeOutcome};

use super::node_data;

/// Branches on the current input: `true` or `false` port.
pub struct ConditionHandler;

#[derive(Deserialize)]
struct ConditionData {
    #[serde(default)]
    condition: String,
    #[serde(default)]
    value: Value,
}

/// Comparison operators understood by `condition` nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Contains,
    Equals,
    NotEmpty,
    /// Anything else. Always evaluates to false.
    Unknown,
}

impl Operator {
    pub fn parse(s: &str) -> Self {
        match s {
            "contains" => Self::Contains,
            "equals" => Self::Equals,
            "not_empty" => Self::NotEmpty,
            _ => Self::Unknown,
        }
    }

    /// Evaluate case-insensitively against the text projection of `input`.
    pub fn evaluate(&self, input: &Value, value: &Value) -> bool {
        let input = text_projection(input).to_lowercase();
        let value = text_projection(value).to_lowercase();

        match self {
            Self::Contains => input.contains(&value),
            Self::Equals => input == value,
            Self::NotEmpty => !input.trim().is_empty(),
            Self::Unknown => false,
        }
    }
}

impl NodeHandler for ConditionHandler {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<NodeOutcome>> {
        Box::pin(async move {
            let data: ConditionData = node_data(node)?;
            let op = Operator::parse(&data.condition);
            let matched = op.evaluate(&ctx.input, &data.value);

            debug!(node_id = %node.id, operator = %data.condition, matched, "Condition evaluated");

            let port = if matched { ports::TRUE } else { ports::FALSE };
            Ok(NodeOutcome::port(ctx.input.clone(), port))
        })
    }
}
