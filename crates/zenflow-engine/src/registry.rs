use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use zenflow_core::config::EngineConfig;
use zenflow_core::directory::AgentDirectory;
use zenflow_core::graph::node_types;

use crate::builtin::{
    AgentHandler, ConditionHandler, DelayHandler, EndHandler, MessageHandler,
    PassThroughHandler, TagHandler, TriggerHandler,
};
use crate::handler::NodeHandler;

/// Settings for the built-in handlers.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub agent_timeout: Duration,
    pub default_delay_secs: f64,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl HandlerSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            agent_timeout: Duration::from_secs(config.agent_timeout_secs),
            default_delay_secs: config.default_delay_secs,
        }
    }
}

/// Maps node type tags to handlers.
///
/// Lookups never fail: unregistered tags resolve to a pass-through handler, so
/// flows that reference node types this build does not know still run.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
    fallback: Arc<dyn NodeHandler>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(PassThroughHandler),
        }
    }

    /// Register a handler for a type tag. The last registration wins.
    pub fn register(&mut self, node_type: impl Into<String>, handler: impl NodeHandler) {
        self.handlers.insert(node_type.into(), Arc::new(handler));
    }

    /// Unregister a handler by tag.
    pub fn unregister(&mut self, node_type: &str) -> bool {
        self.handlers.remove(node_type).is_some()
    }

    /// Handler for a type tag, or the pass-through fallback.
    pub fn get(&self, node_type: &str) -> Arc<dyn NodeHandler> {
        self.handlers
            .get(node_type)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.handlers.contains_key(node_type)
    }

    /// Registered type tags, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        tags.sort_unstable();
        tags
    }

    /// Create a registry with all built-in handlers registered.
    pub fn with_builtins(agents: AgentDirectory, settings: HandlerSettings) -> Self {
        let mut registry = Self::new();

        registry.register(node_types::TRIGGER, TriggerHandler);
        registry.register(node_types::MESSAGE, MessageHandler);
        registry.register(node_types::CONDITION, ConditionHandler);
        registry.register(
            node_types::AGENT,
            AgentHandler::new(agents, settings.agent_timeout),
        );
        registry.register(
            node_types::DELAY,
            DelayHandler::new(settings.default_delay_secs),
        );
        registry.register(node_types::TAG, TagHandler);
        registry.register(node_types::END, EndHandler);

        registry
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::handler::NodeOutcome;
    use futures::future::BoxFuture;
    use serde_json::json;
    use zenflow_core::error::Result;
    use zenflow_core::graph::Node;

    struct Constant(&'static str);

    impl NodeHandler for Constant {
        fn execute<'a>(
            &'a self,
            _node: &'a Node,
            _ctx: &'a mut ExecutionContext,
        ) -> BoxFuture<'a, Result<NodeOutcome>> {
            Box::pin(async move { Ok(NodeOutcome::next(json!(self.0))) })
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = HandlerRegistry::with_builtins(AgentDirectory::new(), HandlerSettings::default());
        assert_eq!(
            registry.list(),
            vec!["agent", "condition", "delay", "end", "message", "tag", "trigger"]
        );
    }

    #[tokio::test]
    async fn test_unknown_type_falls_back() {
        let registry = HandlerRegistry::new();
        assert!(!registry.contains("webhook"));

        let node = Node::new("w", "webhook");
        let mut ctx = ExecutionContext::new(json!({"a": 1}));
        let out = registry.get("webhook").execute(&node, &mut ctx).await.unwrap();
        assert_eq!(out, NodeOutcome::next(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut registry = HandlerRegistry::new();
        registry.register("custom", Constant("first"));
        registry.register("custom", Constant("second"));

        let node = Node::new("c", "custom");
        let mut ctx = ExecutionContext::default();
        let out = registry.get("custom").execute(&node, &mut ctx).await.unwrap();
        assert_eq!(out.output, Some(json!("second")));
    }

    #[test]
    fn test_unregister() {
        let mut registry = HandlerRegistry::new();
        registry.register("custom", Constant("x"));
        assert!(registry.unregister("custom"));
        assert!(!registry.unregister("custom"));
    }

    #[test]
    fn test_settings_from_config() {
        let config = EngineConfig {
            agent_timeout_secs: 15,
            default_delay_secs: 0.5,
            ..EngineConfig::default()
        };
        let settings = HandlerSettings::from_config(&config);
        assert_eq!(settings.agent_timeout, Duration::from_secs(15));
        assert_eq!(settings.default_delay_secs, 0.5);
    }
}
