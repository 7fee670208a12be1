use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::graph::FlowStatus;

/// Unique identifier of a single flow run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of executing one node during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub node_id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    /// Raw handler output.
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    /// Port the handler selected. `None` for terminal nodes.
    #[serde(default)]
    pub port: Option<String>,
}

/// Failure attached to an unsuccessful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    /// Error kind, see [`crate::ZenflowError::kind`].
    pub kind: String,
    pub message: String,
    /// Node that was executing when the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

/// Audit trail of one flow run. Immutable once appended to the execution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub run_id: RunId,
    pub flow_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Payload that triggered the run.
    #[serde(default)]
    pub trigger: serde_json::Value,
    pub steps: Vec<StepResult>,
    /// Context input after the last executed step.
    #[serde(default)]
    pub output: serde_json::Value,
    pub success: bool,
    #[serde(default)]
    pub error: Option<RunError>,
}

impl ExecutionRecord {
    /// Start a new record for a run of `flow_id`.
    pub fn start(flow_id: impl Into<String>, trigger: serde_json::Value) -> Self {
        Self {
            run_id: RunId::new(),
            flow_id: flow_id.into(),
            started_at: Utc::now(),
            completed_at: None,
            output: trigger.clone(),
            trigger,
            steps: Vec::new(),
            success: false,
            error: None,
        }
    }

    /// Node ids of the executed steps, in order.
    pub fn path(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.node_id.as_str()).collect()
    }

    pub fn elapsed_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|done| (done - self.started_at).num_milliseconds())
    }
}

/// Events emitted by the executor while flows run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FlowEvent {
    /// A run passed its trigger check and started executing.
    RunStarted { run_id: RunId, flow_id: String },
    /// A node finished and selected an outbound port.
    NodeCompleted {
        run_id: RunId,
        flow_id: String,
        node_id: String,
        node_type: String,
        port: Option<String>,
    },
    /// A run finished successfully.
    RunCompleted {
        run_id: RunId,
        flow_id: String,
        steps: usize,
    },
    /// A run ended unsuccessfully.
    RunFailed {
        run_id: RunId,
        flow_id: String,
        error: String,
    },
    /// A flow's lifecycle status changed.
    StatusChanged { flow_id: String, status: FlowStatus },
    /// A scheduled trigger fired.
    ScheduleFired { schedule: String, flow_id: String },
}

impl FlowEvent {
    pub fn flow_id(&self) -> &str {
        match self {
            Self::RunStarted { flow_id, .. }
            | Self::NodeCompleted { flow_id, .. }
            | Self::RunCompleted { flow_id, .. }
            | Self::RunFailed { flow_id, .. }
            | Self::StatusChanged { flow_id, .. }
            | Self::ScheduleFired { flow_id, .. } => flow_id,
        }
    }
}
