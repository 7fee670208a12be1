use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZenflowError {
    // Definition errors
    #[error("Malformed flow graph: {0}")]
    MalformedGraph(String),

    #[error("Flow not found: {0}")]
    FlowNotFound(String),

    // Run errors
    #[error("No trigger node found in flow {0}")]
    NoTrigger(String),

    #[error("Node handler failed: {node}: {message}")]
    HandlerFailure { node: String, message: String },

    #[error("Node handler timeout after {timeout_secs}s: {node}")]
    HandlerTimeout { node: String, timeout_secs: u64 },

    #[error("Flow exceeded max steps ({0})")]
    MaxStepsExceeded(usize),

    #[error("Run cancelled")]
    Cancelled,

    // Agent errors
    #[error("Agent request failed: {0}")]
    AgentRequest(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ZenflowError {
    /// Shorthand for a `MalformedGraph` error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedGraph(message.into())
    }

    /// Shorthand for a `HandlerFailure` on a given node.
    pub fn handler(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerFailure {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Errors raised while loading or saving a flow definition, before any run starts.
    pub fn is_definition_error(&self) -> bool {
        matches!(self, Self::MalformedGraph(_) | Self::Json(_))
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedGraph(_) => "malformed_graph",
            Self::FlowNotFound(_) => "flow_not_found",
            Self::NoTrigger(_) => "no_trigger",
            Self::HandlerFailure { .. } | Self::HandlerTimeout { .. } => "handler_failure",
            Self::MaxStepsExceeded(_) => "max_steps_exceeded",
            Self::Cancelled => "cancelled",
            Self::AgentRequest(_) => "agent_request",
            Self::Config(_) | Self::ConfigNotFound(_) => "config",
            Self::Database(_) => "database",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, ZenflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_groups_timeouts_with_handler_failures() {
        let timeout = ZenflowError::HandlerTimeout {
            node: "a1".into(),
            timeout_secs: 5,
        };
        assert_eq!(timeout.kind(), "handler_failure");
        assert_eq!(ZenflowError::handler("a1", "boom").kind(), "handler_failure");
    }

    #[test]
    fn test_definition_errors() {
        assert!(ZenflowError::malformed("edge e1 has no source").is_definition_error());
        assert!(!ZenflowError::NoTrigger("flow_1".into()).is_definition_error());
        assert!(!ZenflowError::Cancelled.is_definition_error());
    }

    #[test]
    fn test_display() {
        let err = ZenflowError::handler("agent-1", "connection refused");
        assert_eq!(
            err.to_string(),
            "Node handler failed: agent-1: connection refused"
        );
    }
}
