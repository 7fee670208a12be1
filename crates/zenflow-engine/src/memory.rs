//! In-process implementations of the flow store and execution log.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use zenflow_core::error::{Result, ZenflowError};
use zenflow_core::graph::{Flow, FlowStatus};
use zenflow_core::traits::{ExecutionLog, FlowStore};
use zenflow_core::types::ExecutionRecord;

fn poisoned<E: std::fmt::Display>(e: E) -> ZenflowError {
    ZenflowError::Database(e.to_string())
}

/// Flow store kept in memory, in insertion order.
#[derive(Default)]
pub struct MemoryFlowStore {
    flows: Mutex<Vec<Flow>>,
}

impl MemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowStore for MemoryFlowStore {
    fn insert(&self, flow: Flow) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut flows = self.flows.lock().map_err(poisoned)?;
            if flows.iter().any(|f| f.id == flow.id) {
                return Err(ZenflowError::Database(format!(
                    "flow '{}' already exists",
                    flow.id
                )));
            }
            flows.push(flow);
            Ok(())
        })
    }

    fn get(&self, id: &str) -> BoxFuture<'_, Result<Option<Flow>>> {
        let id = id.to_string();
        Box::pin(async move {
            let flows = self.flows.lock().map_err(poisoned)?;
            Ok(flows.iter().find(|f| f.id == id).cloned())
        })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<Flow>>> {
        Box::pin(async move { Ok(self.flows.lock().map_err(poisoned)?.clone()) })
    }

    fn update(&self, flow: &Flow) -> BoxFuture<'_, Result<bool>> {
        let flow = flow.clone();
        Box::pin(async move {
            let mut flows = self.flows.lock().map_err(poisoned)?;
            match flows.iter_mut().find(|f| f.id == flow.id) {
                Some(existing) => {
                    // Lifecycle fields belong to the executor.
                    let status = existing.status;
                    let last_run = existing.last_run;
                    *existing = flow;
                    existing.status = status;
                    existing.last_run = last_run;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn set_status(
        &self,
        id: &str,
        status: FlowStatus,
        last_run: Option<DateTime<Utc>>,
    ) -> BoxFuture<'_, Result<()>> {
        let id = id.to_string();
        Box::pin(async move {
            let mut flows = self.flows.lock().map_err(poisoned)?;
            if let Some(flow) = flows.iter_mut().find(|f| f.id == id) {
                flow.status = status;
                flow.last_run = last_run;
            }
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, Result<bool>> {
        let id = id.to_string();
        Box::pin(async move {
            let mut flows = self.flows.lock().map_err(poisoned)?;
            let before = flows.len();
            flows.retain(|f| f.id != id);
            Ok(flows.len() != before)
        })
    }
}

/// Execution log kept in memory. Each record is pushed whole under the lock.
#[derive(Default)]
pub struct MemoryExecutionLog {
    records: Mutex<Vec<ExecutionRecord>>,
}

impl MemoryExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ExecutionLog for MemoryExecutionLog {
    fn append(&self, record: ExecutionRecord) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.records.lock().map_err(poisoned)?.push(record);
            Ok(())
        })
    }

    fn list(&self, flow_id: Option<&str>) -> BoxFuture<'_, Result<Vec<ExecutionRecord>>> {
        let flow_id = flow_id.map(str::to_string);
        Box::pin(async move {
            let records = self.records.lock().map_err(poisoned)?;
            Ok(records
                .iter()
                .filter(|r| flow_id.as_deref().map_or(true, |id| r.flow_id == id))
                .cloned()
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zenflow_test_utils::fixtures;

    #[tokio::test]
    async fn test_flow_crud() {
        let store = MemoryFlowStore::new();
        let flow = fixtures::triage_flow("flow_1");

        store.insert(flow.clone()).await.unwrap();
        assert!(store.insert(flow.clone()).await.is_err());

        let loaded = store.get("flow_1").await.unwrap().unwrap();
        assert_eq!(loaded.nodes().len(), flow.nodes().len());
        assert_eq!(store.list().await.unwrap().len(), 1);

        assert!(store.delete("flow_1").await.unwrap());
        assert!(!store.delete("flow_1").await.unwrap());
        assert!(store.get("flow_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_keeps_lifecycle() {
        let store = MemoryFlowStore::new();
        let mut flow = fixtures::triage_flow("flow_1");
        store.insert(flow.clone()).await.unwrap();

        let now = Utc::now();
        store.set_status("flow_1", FlowStatus::Active, Some(now)).await.unwrap();

        flow.name = "Renamed".into();
        assert!(store.update(&flow).await.unwrap());

        let loaded = store.get("flow_1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "Renamed");
        assert_eq!(loaded.status, FlowStatus::Active);
        assert_eq!(loaded.last_run, Some(now));
    }

    #[tokio::test]
    async fn test_update_missing() {
        let store = MemoryFlowStore::new();
        assert!(!store.update(&fixtures::triage_flow("nope")).await.unwrap());
    }

    #[tokio::test]
    async fn test_log_filter() {
        let log = MemoryExecutionLog::new();
        log.append(ExecutionRecord::start("a", serde_json::Value::Null)).await.unwrap();
        log.append(ExecutionRecord::start("b", serde_json::Value::Null)).await.unwrap();
        log.append(ExecutionRecord::start("a", serde_json::Value::Null)).await.unwrap();

        assert_eq!(log.len(), 3);
        assert_eq!(log.list(None).await.unwrap().len(), 3);
        assert_eq!(log.list(Some("a")).await.unwrap().len(), 2);
        assert!(log.list(Some("c")).await.unwrap().is_empty());
    }
}
