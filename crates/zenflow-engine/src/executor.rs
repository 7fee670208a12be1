use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use zenflow_core::error::ZenflowError;
use zenflow_core::event::EventBus;
use zenflow_core::graph::{Edge, Flow, FlowStatus, Node};
use zenflow_core::traits::ExecutionLog;
use zenflow_core::types::{ExecutionRecord, FlowEvent, RunError, StepResult};

use crate::context::ExecutionContext;
use crate::registry::HandlerRegistry;

const DEFAULT_MAX_STEPS: usize = 1_000;

/// Outcome of one run: the audit record plus the final context.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub record: ExecutionRecord,
    pub context: ExecutionContext,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.record.success
    }
}

/// Lookup tables over a graph snapshot.
struct GraphIndex<'a> {
    nodes: HashMap<&'a str, &'a Node>,
    outbound: HashMap<&'a str, Vec<&'a Edge>>,
}

impl<'a> GraphIndex<'a> {
    fn new(flow: &'a Flow) -> Self {
        let nodes = flow.nodes().iter().map(|n| (n.id.as_str(), n)).collect();
        let mut outbound: HashMap<&str, Vec<&Edge>> = HashMap::new();
        for edge in flow.edges() {
            outbound.entry(edge.source.as_str()).or_default().push(edge);
        }
        Self { nodes, outbound }
    }

    fn node(&self, id: &str) -> Option<&'a Node> {
        self.nodes.get(id).copied()
    }

    /// First edge leaving through `port`, else the first port-less edge.
    fn next_edge(&self, node_id: &str, port: &str) -> Option<&'a Edge> {
        let edges = self.outbound.get(node_id)?;
        edges
            .iter()
            .find(|e| e.is_port(port))
            .or_else(|| edges.iter().find(|e| e.source_handle.is_none()))
            .copied()
    }
}

struct StepFailure {
    node_id: Option<String>,
    error: ZenflowError,
}

/// Runs flows one node at a time.
///
/// Starting from the trigger node, each node is executed through the
/// [`HandlerRegistry`]; its output becomes the next node's input and the port
/// it selects decides which edge to follow. A run ends at a terminal node or
/// when no edge matches. A handler error aborts the run and marks the flow as
/// `error`. Every run, successful or not, is appended to the execution log.
pub struct FlowExecutor {
    handlers: Arc<HandlerRegistry>,
    log: Arc<dyn ExecutionLog>,
    event_bus: Option<Arc<EventBus>>,
    max_steps: usize,
}

impl FlowExecutor {
    pub fn new(handlers: Arc<HandlerRegistry>, log: Arc<dyn ExecutionLog>) -> Self {
        Self {
            handlers,
            log,
            event_bus: None,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Publish run events on the given bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Limit node executions per run.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    pub fn log(&self) -> &Arc<dyn ExecutionLog> {
        &self.log
    }

    /// Run a flow with a trigger payload and no variables.
    pub async fn run(&self, flow: &mut Flow, trigger: Value) -> ExecutionResult {
        self.run_with(flow, ExecutionContext::new(trigger)).await
    }

    /// Run a flow with a prepared context (variables, cancellation).
    ///
    /// Updates `flow.status` and `flow.last_run` as the run progresses, except
    /// when the flow has no trigger node, in which case the flow is untouched.
    pub async fn run_with(&self, flow: &mut Flow, mut ctx: ExecutionContext) -> ExecutionResult {
        let mut record = ExecutionRecord::start(&flow.id, ctx.input.clone());

        // The graph is frozen for the whole run.
        let snapshot = flow.clone();

        let Some(trigger) = snapshot.trigger() else {
            let err = ZenflowError::NoTrigger(flow.id.clone());
            warn!(flow_id = %flow.id, run_id = %record.run_id, "No trigger node found");
            record.completed_at = Some(Utc::now());
            record.error = Some(RunError {
                kind: err.kind().to_string(),
                message: err.to_string(),
                node_id: None,
            });
            self.publish(FlowEvent::RunFailed {
                run_id: record.run_id.clone(),
                flow_id: flow.id.clone(),
                error: err.to_string(),
            });
            self.append(&record).await;
            return ExecutionResult {
                record,
                context: ctx,
            };
        };

        flow.status = FlowStatus::Running;
        flow.last_run = Some(record.started_at);
        self.publish_status(flow);
        self.publish(FlowEvent::RunStarted {
            run_id: record.run_id.clone(),
            flow_id: flow.id.clone(),
        });
        info!(flow_id = %flow.id, run_id = %record.run_id, "Flow run started");

        let graph = GraphIndex::new(&snapshot);
        let outcome = self.walk(&graph, trigger, &mut ctx, &mut record).await;

        record.output = ctx.input.clone();
        record.completed_at = Some(Utc::now());

        match outcome {
            Ok(()) => {
                flow.status = FlowStatus::Active;
                record.success = true;
                info!(
                    flow_id = %flow.id,
                    run_id = %record.run_id,
                    steps = record.steps.len(),
                    "Flow run completed"
                );
                self.publish(FlowEvent::RunCompleted {
                    run_id: record.run_id.clone(),
                    flow_id: flow.id.clone(),
                    steps: record.steps.len(),
                });
            }
            Err(failure) => {
                flow.status = FlowStatus::Error;
                error!(
                    flow_id = %flow.id,
                    run_id = %record.run_id,
                    node_id = failure.node_id.as_deref().unwrap_or("-"),
                    error = %failure.error,
                    "Flow run failed"
                );
                self.publish(FlowEvent::RunFailed {
                    run_id: record.run_id.clone(),
                    flow_id: flow.id.clone(),
                    error: failure.error.to_string(),
                });
                record.error = Some(RunError {
                    kind: failure.error.kind().to_string(),
                    message: failure.error.to_string(),
                    node_id: failure.node_id,
                });
            }
        }
        self.publish_status(flow);

        self.append(&record).await;
        ExecutionResult {
            record,
            context: ctx,
        }
    }

    async fn walk<'a>(
        &self,
        graph: &GraphIndex<'a>,
        start: &'a Node,
        ctx: &mut ExecutionContext,
        record: &mut ExecutionRecord,
    ) -> std::result::Result<(), StepFailure> {
        let mut current = start;

        loop {
            let fail = |error: ZenflowError| StepFailure {
                node_id: Some(current.id.clone()),
                error,
            };

            if ctx.is_cancelled() {
                return Err(fail(ZenflowError::Cancelled));
            }
            if record.steps.len() >= self.max_steps {
                return Err(fail(ZenflowError::MaxStepsExceeded(self.max_steps)));
            }

            debug!(node_id = %current.id, node_type = %current.node_type, "Executing node");

            let handler = self.handlers.get(&current.node_type);
            let outcome = handler.execute(current, ctx).await.map_err(fail)?;

            if let Some(output) = &outcome.output {
                ctx.input = output.clone();
            }

            record.steps.push(StepResult {
                node_id: current.id.clone(),
                node_type: current.node_type.clone(),
                output: outcome.output,
                port: outcome.port.clone(),
            });
            self.publish(FlowEvent::NodeCompleted {
                run_id: record.run_id.clone(),
                flow_id: record.flow_id.clone(),
                node_id: current.id.clone(),
                node_type: current.node_type.clone(),
                port: outcome.port.clone(),
            });

            let Some(port) = outcome.port else {
                debug!(node_id = %current.id, "Terminal node reached");
                return Ok(());
            };

            let Some(edge) = graph.next_edge(&current.id, &port) else {
                debug!(node_id = %current.id, port = %port, "No outgoing edge, run complete");
                return Ok(());
            };

            current = graph.node(&edge.target).ok_or_else(|| {
                fail(ZenflowError::handler(
                    edge.id.clone(),
                    format!("edge target '{}' not found", edge.target),
                ))
            })?;
        }
    }

    async fn append(&self, record: &ExecutionRecord) {
        if let Err(e) = self.log.append(record.clone()).await {
            error!(run_id = %record.run_id, error = %e, "Failed to append execution record");
        }
    }

    fn publish(&self, event: FlowEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    fn publish_status(&self, flow: &Flow) {
        self.publish(FlowEvent::StatusChanged {
            flow_id: flow.id.clone(),
            status: flow.status,
        });
    }
}
