use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use zenflow_core::config::ScheduleConfig;
use zenflow_core::event::EventBus;
use zenflow_core::types::FlowEvent;

use crate::context::ExecutionContext;
use crate::executor::FlowExecutor;
use crate::flows::FlowRegistry;

struct ScheduledFlow {
    name: String,
    schedule: Schedule,
    flow_id: String,
    payload: Value,
}

/// Fires flows on cron schedules.
///
/// Each firing runs on its own task, so a slow flow never delays the next
/// tick. Runs inherit a child of the scheduler's cancellation token.
pub struct FlowScheduler {
    jobs: Vec<ScheduledFlow>,
    flows: Arc<FlowRegistry>,
    executor: Arc<FlowExecutor>,
    event_bus: Arc<EventBus>,
    cancel: CancellationToken,
}

impl FlowScheduler {
    pub fn new(
        schedules: &[ScheduleConfig],
        flows: Arc<FlowRegistry>,
        executor: Arc<FlowExecutor>,
        event_bus: Arc<EventBus>,
        cancel: CancellationToken,
    ) -> Self {
        let mut jobs = Vec::new();

        for config in schedules {
            match Schedule::from_str(&config.cron) {
                Ok(schedule) => {
                    jobs.push(ScheduledFlow {
                        name: config.name.clone(),
                        schedule,
                        flow_id: config.flow_id.clone(),
                        payload: config.payload.clone().unwrap_or(Value::Null),
                    });
                    info!(name = %config.name, flow_id = %config.flow_id, cron = %config.cron, "Schedule registered");
                }
                Err(e) => {
                    warn!(
                        name = %config.name,
                        cron = %config.cron,
                        error = %e,
                        "Invalid cron expression, skipping schedule"
                    );
                }
            }
        }

        Self {
            jobs,
            flows,
            executor,
            event_bus,
            cancel,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Run the scheduler loop. Blocks until cancelled.
    pub async fn run(&self) {
        if self.jobs.is_empty() {
            info!("No schedules configured, scheduler idle");
            self.cancel.cancelled().await;
            return;
        }

        info!(count = self.jobs.len(), "Flow scheduler started");

        loop {
            let now = Utc::now();
            let Some((fire_at, due)) = self.next_fire() else {
                self.cancel.cancelled().await;
                break;
            };

            let delay = (fire_at - now).to_std().unwrap_or(Duration::from_secs(1));
            info!(
                schedules = due.len(),
                fire_at = %fire_at.format("%H:%M:%S"),
                delay_secs = delay.as_secs(),
                "Next scheduled run"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    for job in due {
                        self.fire(job);
                    }
                }
                _ = self.cancel.cancelled() => {
                    info!("Flow scheduler shutting down");
                    break;
                }
            }
        }
    }

    /// The earliest upcoming tick and every job due on it.
    fn next_fire(&self) -> Option<(DateTime<Utc>, Vec<&ScheduledFlow>)> {
        let upcoming: Vec<(DateTime<Utc>, &ScheduledFlow)> = self
            .jobs
            .iter()
            .filter_map(|job| job.schedule.upcoming(Utc).next().map(|at| (at, job)))
            .collect();
        let fire_at = upcoming.iter().map(|(at, _)| *at).min()?;
        let due = upcoming
            .into_iter()
            .filter(|(at, _)| *at <= fire_at)
            .map(|(_, job)| job)
            .collect();
        Some((fire_at, due))
    }

    fn fire(&self, job: &ScheduledFlow) -> JoinHandle<()> {
        info!(schedule = %job.name, flow_id = %job.flow_id, "Firing scheduled flow");
        self.event_bus.publish(FlowEvent::ScheduleFired {
            schedule: job.name.clone(),
            flow_id: job.flow_id.clone(),
        });

        let flows = self.flows.clone();
        let executor = self.executor.clone();
        let name = job.name.clone();
        let flow_id = job.flow_id.clone();
        let ctx = ExecutionContext::new(job.payload.clone()).with_cancel(self.cancel.child_token());

        tokio::spawn(async move {
            match flows.execute(&executor, &flow_id, ctx).await {
                Ok(result) if result.succeeded() => {
                    info!(schedule = %name, run_id = %result.record.run_id, "Scheduled run completed")
                }
                Ok(result) => warn!(
                    schedule = %name,
                    run_id = %result.record.run_id,
                    error = ?result.record.error.as_ref().map(|e| &e.message),
                    "Scheduled run failed"
                ),
                Err(e) => error!(schedule = %name, error = %e, "Scheduled run could not start"),
            }
        })
    }
}
