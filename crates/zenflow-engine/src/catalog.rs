use serde::Serialize;

use zenflow_core::graph::node_types;

use crate::handler::ports;

/// Editor metadata for one built-in node type.
#[derive(Debug, Clone, Serialize)]
pub struct NodeTypeInfo {
    #[serde(rename = "type")]
    pub node_type: &'static str,
    pub label: &'static str,
    pub color: &'static str,
    pub icon: &'static str,
    pub inputs: &'static [&'static str],
    pub outputs: &'static [&'static str],
}

const INPUT: &[&str] = &["input"];
const NONE: &[&str] = &[];

static NODE_TYPES: &[NodeTypeInfo] = &[
    NodeTypeInfo {
        node_type: node_types::TRIGGER,
        label: "Trigger",
        color: "#22c55e",
        icon: "Zap",
        inputs: NONE,
        outputs: &[ports::NEXT],
    },
    NodeTypeInfo {
        node_type: node_types::MESSAGE,
        label: "Send Message",
        color: "#3b82f6",
        icon: "MessageSquare",
        inputs: INPUT,
        outputs: &[ports::NEXT],
    },
    NodeTypeInfo {
        node_type: node_types::CONDITION,
        label: "Condition",
        color: "#f59e0b",
        icon: "GitBranch",
        inputs: INPUT,
        outputs: &[ports::TRUE, ports::FALSE],
    },
    NodeTypeInfo {
        node_type: node_types::AGENT,
        label: "AI Agent",
        color: "#8b5cf6",
        icon: "Bot",
        inputs: INPUT,
        outputs: &[ports::RESPONSE],
    },
    NodeTypeInfo {
        node_type: node_types::DELAY,
        label: "Delay",
        color: "#64748b",
        icon: "Clock",
        inputs: INPUT,
        outputs: &[ports::NEXT],
    },
    NodeTypeInfo {
        node_type: node_types::TAG,
        label: "Add Tag",
        color: "#22c55e",
        icon: "Tag",
        inputs: INPUT,
        outputs: &[ports::NEXT],
    },
    NodeTypeInfo {
        node_type: node_types::END,
        label: "End",
        color: "#ef4444",
        icon: "Square",
        inputs: INPUT,
        outputs: NONE,
    },
];

/// All built-in node types, in palette order.
pub fn node_types() -> &'static [NodeTypeInfo] {
    NODE_TYPES
}

/// Metadata for one node type.
pub fn lookup(node_type: &str) -> Option<&'static NodeTypeInfo> {
    NODE_TYPES.iter().find(|info| info.node_type == node_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{HandlerRegistry, HandlerSettings};
    use zenflow_core::directory::AgentDirectory;

    #[test]
    fn test_catalog_matches_builtins() {
        let registry = HandlerRegistry::with_builtins(AgentDirectory::new(), HandlerSettings::default());
        let mut tags: Vec<&str> = node_types().iter().map(|i| i.node_type).collect();
        tags.sort_unstable();
        assert_eq!(tags, registry.list());
    }

    #[test]
    fn test_ports() {
        assert_eq!(lookup("condition").unwrap().outputs, &["true", "false"]);
        assert_eq!(lookup("agent").unwrap().outputs, &["response"]);
        assert!(lookup("trigger").unwrap().inputs.is_empty());
        assert!(lookup("end").unwrap().outputs.is_empty());
        assert!(lookup("webhook").is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(lookup("delay").unwrap()).unwrap();
        assert_eq!(value["type"], "delay");
        assert_eq!(value["icon"], "Clock");
        assert_eq!(value["outputs"], serde_json::json!(["next"]));
    }
}
