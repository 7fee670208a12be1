use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use zenflow_core::event::EventBus;
use zenflow_core::types::FlowEvent;

/// JSONL run logger.
///
/// Subscribes to the EventBus and appends one JSON object per line to
/// `{log_dir}/{timestamp}.jsonl`. Lines already written survive a crash.
/// `level` controls verbosity: 1 = run summaries, 2 = also per-node steps
/// and status changes.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    event_type: &'static str,
    flow_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    /// Write events until cancelled or the bus closes.
    pub async fn run(self, event_bus: Arc<EventBus>, cancel: CancellationToken) {
        let mut rx = event_bus.subscribe();

        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, "Failed to create log directory");
            return;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_path = self.log_dir.join(format!("{}.jsonl", timestamp));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");

        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                biased;
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            let Some(entry) = self.event_to_entry(&event) else {
                                continue;
                            };
                            if let Ok(json) = serde_json::to_string(&entry) {
                                let line = format!("{}\n", json);
                                if let Err(e) = writer.write_all(line.as_bytes()).await {
                                    error!(error = %e, "Failed to write log entry");
                                    break;
                                }
                                if let Err(e) = writer.flush().await {
                                    error!(error = %e, "Failed to flush log");
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
    }

    /// Convert an event to a log entry, or None if filtered by level.
    fn event_to_entry(&self, event: &FlowEvent) -> Option<LogEntry> {
        let entry = |event_type, run_id: Option<String>, detail| LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            event_type,
            flow_id: event.flow_id().to_string(),
            run_id,
            detail,
        };

        match event {
            FlowEvent::RunStarted { run_id, .. } => {
                Some(entry("run_started", Some(run_id.to_string()), None))
            }
            FlowEvent::RunCompleted { run_id, steps, .. } => Some(entry(
                "run_completed",
                Some(run_id.to_string()),
                Some(serde_json::json!({ "steps": steps })),
            )),
            FlowEvent::RunFailed { run_id, error, .. } => Some(entry(
                "run_failed",
                Some(run_id.to_string()),
                Some(serde_json::json!({ "error": error })),
            )),

            FlowEvent::NodeCompleted {
                run_id,
                node_id,
                node_type,
                port,
                ..
            } if self.level >= 2 => Some(entry(
                "node_completed",
                Some(run_id.to_string()),
                Some(serde_json::json!({
                    "node_id": node_id,
                    "type": node_type,
                    "port": port,
                })),
            )),
            FlowEvent::StatusChanged { status, .. } if self.level >= 2 => Some(entry(
                "status_changed",
                None,
                Some(serde_json::json!({ "status": status })),
            )),
            FlowEvent::ScheduleFired { schedule, .. } if self.level >= 2 => Some(entry(
                "schedule_fired",
                None,
                Some(serde_json::json!({ "schedule": schedule })),
            )),

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zenflow_core::graph::FlowStatus;
    use zenflow_core::types::RunId;

    fn node_completed() -> FlowEvent {
        FlowEvent::NodeCompleted {
            run_id: RunId::from_string("r1"),
            flow_id: "flow_1".into(),
            node_id: "t".into(),
            node_type: "trigger".into(),
            port: Some("next".into()),
        }
    }

    #[test]
    fn test_event_level_filtering() {
        let summary = RunLogger::new(PathBuf::from("/tmp"), 1);
        let started = FlowEvent::RunStarted {
            run_id: RunId::from_string("r1"),
            flow_id: "flow_1".into(),
        };
        assert!(summary.event_to_entry(&started).is_some());
        assert!(summary.event_to_entry(&node_completed()).is_none());

        let steps = RunLogger::new(PathBuf::from("/tmp"), 2);
        assert!(steps.event_to_entry(&node_completed()).is_some());
        assert!(steps
            .event_to_entry(&FlowEvent::StatusChanged {
                flow_id: "flow_1".into(),
                status: FlowStatus::Active,
            })
            .is_some());
    }

    #[test]
    fn test_entry_format() {
        let logger = RunLogger::new(PathBuf::from("/tmp"), 2);
        let entry = logger.event_to_entry(&node_completed()).unwrap();
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"event_type\":\"node_completed\""));
        assert!(json.contains("\"run_id\":\"r1\""));
        assert!(json.contains("\"port\":\"next\""));
    }

    #[tokio::test]
    async fn test_writes_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(EventBus::default());
        let cancel = CancellationToken::new();
        let logger = RunLogger::new(dir.path().join("logs"), 1);

        let run = logger.run(bus.clone(), cancel.clone());
        let drive = async {
            tokio::task::yield_now().await;
            bus.publish(FlowEvent::RunCompleted {
                run_id: RunId::from_string("r1"),
                flow_id: "flow_1".into(),
                steps: 3,
            });
            bus.publish(node_completed());
            cancel.cancel();
        };
        tokio::join!(run, drive);

        let mut files = std::fs::read_dir(dir.path().join("logs")).unwrap();
        let path = files.next().unwrap().unwrap().path();
        let contents = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        let entry: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(entry["event_type"], "run_completed");
        assert_eq!(entry["detail"]["steps"], 3);
    }
}
