use std::collections::HashMap;
use std::sync::OnceLock;

use futures::future::BoxFuture;
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;

use zenflow_core::error::Result;
use zenflow_core::graph::Node;

use crate::context::{text_projection, ExecutionContext};
use crate::handler::{NodeHandler, NodeOutcome};

use super::node_data;

/// Renders the node's message template against the run variables.
pub struct MessageHandler;

#[derive(Deserialize, Default)]
struct MessageData {
    #[serde(default)]
    message: String,
}

impl NodeHandler for MessageHandler {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<NodeOutcome>> {
        Box::pin(async move {
            let data: MessageData = node_data(node)?;
            let message = render_template(&data.message, ctx.variables());
            Ok(NodeOutcome::next(serde_json::json!({ "message": message })))
        })
    }
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder pattern is valid"))
}

/// Substitute `{name}` placeholders. Unknown names are left verbatim.
pub fn render_template(template: &str, variables: &HashMap<String, Value>) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures| match variables.get(&caps[1]) {
            Some(value) => text_projection(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_render_known_variable() {
        let v = vars(&[("name", json!("Ana"))]);
        assert_eq!(render_template("Hello {name}", &v), "Hello Ana");
    }

    #[test]
    fn test_render_unknown_variable_verbatim() {
        assert_eq!(render_template("Hello {name}", &HashMap::new()), "Hello {name}");
    }

    #[test]
    fn test_render_mixed() {
        let v = vars(&[("name", json!("Ana")), ("count", json!(3))]);
        assert_eq!(
            render_template("{name} has {count} posts in {queue}", &v),
            "Ana has 3 posts in {queue}"
        );
    }

    #[tokio::test]
    async fn test_handler_output() {
        let node = Node::new("m", "message").with_data(json!({"message": "Hello {name}"}));
        let mut ctx = ExecutionContext::new(json!("ignored"));
        ctx.set_str("name", "Ana");

        let out = MessageHandler.execute(&node, &mut ctx).await.unwrap();
        assert_eq!(out, NodeOutcome::next(json!({"message": "Hello Ana"})));
    }

    #[tokio::test]
    async fn test_handler_missing_template() {
        let node = Node::new("m", "message");
        let mut ctx = ExecutionContext::new(Value::Null);
        let out = MessageHandler.execute(&node, &mut ctx).await.unwrap();
        assert_eq!(out.output, Some(json!({"message": ""})));
    }
}
