use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value};

use zenflow_core::error::Result;
use zenflow_core::graph::Node;

use crate::context::ExecutionContext;
use crate::handler::{NodeHandler, NodeOutcome};

use super::node_data;

/// Key under which the tag label is stored in the payload.
pub const TAG_KEY: &str = "tag";

/// Labels the current payload.
///
/// Object payloads get a `tag` field; any other payload is wrapped as
/// `{"input": <payload>, "tag": <label>}`.
pub struct TagHandler;

#[derive(Deserialize)]
struct TagData {
    #[serde(default)]
    tag: String,
}

impl NodeHandler for TagHandler {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<NodeOutcome>> {
        Box::pin(async move {
            let data: TagData = node_data(node)?;
            Ok(NodeOutcome::next(apply_tag(&ctx.input, data.tag)))
        })
    }
}

fn apply_tag(input: &Value, tag: String) -> Value {
    let mut obj = match input {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("input".to_string(), other.clone());
            map
        }
    };
    obj.insert(TAG_KEY.to_string(), Value::String(tag));
    Value::Object(obj)
}
