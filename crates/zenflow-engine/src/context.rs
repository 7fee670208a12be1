use std::collections::HashMap;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Per-run mutable state threaded through every node of a single run.
///
/// `input` is the payload the next node receives; it is replaced by each
/// handler's output. Variables are free-form and read by `message` templates.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Current payload.
    pub input: Value,
    variables: HashMap<String, Value>,
    cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(input: Value) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }

    /// Seed the run with variables.
    pub fn with_variables(mut self, variables: HashMap<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Attach a cancellation token checked between nodes and inside delays.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.variables.get(key).and_then(|v| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.variables.insert(key.into(), value);
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables
            .insert(key.into(), Value::String(value.into()));
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    /// Text view of the current input, see [`text_projection`].
    pub fn input_text(&self) -> String {
        text_projection(&self.input)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Project a JSON value to text: strings as-is, null as empty, anything else as JSON.
pub fn text_projection(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
