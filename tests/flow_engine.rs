use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinSet;

use zenflow_core::directory::AgentDirectory;
use zenflow_core::graph::FlowStatus;
use zenflow_core::traits::ExecutionLog;
use zenflow_engine::{
    ExecutionContext, FlowDraft, FlowExecutor, FlowRegistry, HandlerRegistry, HandlerSettings,
};
use zenflow_store::SqliteStore;
use zenflow_test_utils::{fixtures, EchoAgent};

struct Harness {
    store: Arc<SqliteStore>,
    flows: Arc<FlowRegistry>,
    executor: Arc<FlowExecutor>,
}

fn harness(store: SqliteStore) -> Harness {
    let store = Arc::new(store);
    let agents = AgentDirectory::new().with(Arc::new(EchoAgent::new("manager")));
    let handlers = HandlerRegistry::with_builtins(agents, HandlerSettings::default());
    Harness {
        flows: Arc::new(FlowRegistry::new(store.clone())),
        executor: Arc::new(FlowExecutor::new(Arc::new(handlers), store.clone())),
        store,
    }
}

fn triage_draft() -> FlowDraft {
    let (nodes, edges) = fixtures::triage_specs();
    FlowDraft {
        name: "Triage".into(),
        description: "Tag urgent messages".into(),
        nodes,
        edges,
    }
}

#[tokio::test]
async fn triage_routes_by_content() {
    let h = harness(SqliteStore::in_memory().unwrap());
    let flow = h.flows.create(triage_draft()).await.unwrap();

    let urgent = h
        .flows
        .execute(&h.executor, &flow.id, ExecutionContext::new(json!("urgent: server down")))
        .await
        .unwrap();
    assert!(urgent.succeeded());
    assert_eq!(urgent.record.path(), vec!["trigger", "check", "tag", "end"]);
    assert_eq!(
        urgent.record.output,
        json!({"input": "urgent: server down", "tag": "priority"})
    );

    let routine = h
        .flows
        .execute(&h.executor, &flow.id, ExecutionContext::new(json!("weekly newsletter")))
        .await
        .unwrap();
    assert!(routine.succeeded());
    assert_eq!(routine.record.path(), vec!["trigger", "check", "done"]);

    let stored = h.flows.get(&flow.id).await.unwrap();
    assert_eq!(stored.status, FlowStatus::Active);
    assert!(stored.last_run.is_some());

    let records = ExecutionLog::list(h.store.as_ref(), Some(&flow.id)).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].run_id, urgent.record.run_id);
    assert_eq!(records[1].run_id, routine.record.run_id);
}

#[tokio::test]
async fn message_then_agent_chain() {
    let h = harness(SqliteStore::in_memory().unwrap());
    let draft = FlowDraft {
        name: "Welcome".into(),
        description: String::new(),
        nodes: vec![
            json!({"id": "t", "type": "trigger"}),
            json!({"id": "m", "type": "message", "data": {"message": "Welcome {name}"}}),
            json!({"id": "a", "type": "agent", "data": {"agent_id": "manager"}}),
        ],
        edges: vec![
            json!({"id": "e1", "source": "t", "target": "m"}),
            json!({"id": "e2", "source": "m", "target": "a"}),
        ],
    };
    let flow = h.flows.create(draft).await.unwrap();

    let mut vars = HashMap::new();
    vars.insert("name".to_string(), json!("Ana"));
    let result = h
        .flows
        .execute(
            &h.executor,
            &flow.id,
            ExecutionContext::new(json!({})).with_variables(vars),
        )
        .await
        .unwrap();

    assert!(result.succeeded());
    // The agent sees the message node's output as JSON text.
    assert_eq!(
        result.record.output,
        json!({"response": r#"manager: {"message":"Welcome Ana"}"#})
    );
}

#[tokio::test]
async fn concurrent_runs_get_distinct_records() {
    let h = harness(SqliteStore::in_memory().unwrap());
    let draft = FlowDraft {
        name: "Greeting".into(),
        description: String::new(),
        nodes: vec![
            json!({"id": "t", "type": "trigger"}),
            json!({"id": "d", "type": "delay", "data": {"seconds": 0}}),
            json!({"id": "m", "type": "message", "data": {"message": "Hello {name}"}}),
            json!({"id": "e", "type": "end"}),
        ],
        edges: vec![
            json!({"id": "e1", "source": "t", "target": "d"}),
            json!({"id": "e2", "source": "d", "target": "m"}),
            json!({"id": "e3", "source": "m", "target": "e"}),
        ],
    };
    let flow = h.flows.create(draft).await.unwrap();

    let mut runs = JoinSet::new();
    for i in 0..8 {
        let flows = h.flows.clone();
        let executor = h.executor.clone();
        let id = flow.id.clone();
        runs.spawn(async move {
            let mut vars = HashMap::new();
            vars.insert("name".to_string(), json!(format!("lead-{}", i)));
            let ctx = ExecutionContext::new(json!({ "lead": i })).with_variables(vars);
            let result = flows.execute(&executor, &id, ctx).await.unwrap();
            (i, result)
        });
    }

    let mut run_ids = Vec::new();
    while let Some(done) = runs.join_next().await {
        let (i, result) = done.unwrap();
        assert!(result.succeeded());
        assert_eq!(result.record.trigger, json!({ "lead": i }));
        assert_eq!(
            result.record.output,
            json!({ "message": format!("Hello lead-{}", i) })
        );
        assert_eq!(result.context.variables().len(), 1);
        run_ids.push(result.record.run_id.0);
    }
    run_ids.sort();
    run_ids.dedup();
    assert_eq!(run_ids.len(), 8);

    let records = ExecutionLog::list(h.store.as_ref(), None).await.unwrap();
    assert_eq!(records.len(), 8);
    let mut greetings: Vec<String> = records
        .iter()
        .map(|r| r.output["message"].as_str().unwrap().to_string())
        .collect();
    greetings.sort();
    let mut expected: Vec<String> = (0..8).map(|i| format!("Hello lead-{}", i)).collect();
    expected.sort();
    assert_eq!(greetings, expected);
}

#[tokio::test]
async fn flows_and_history_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("data").join("zenflow.db");

    let flow_id = {
        let h = harness(SqliteStore::open(&db).unwrap());
        let flow = h.flows.create(triage_draft()).await.unwrap();
        h.flows
            .execute(&h.executor, &flow.id, ExecutionContext::new(json!("urgent")))
            .await
            .unwrap();
        flow.id
    };

    let h = harness(SqliteStore::open(&db).unwrap());
    let flow = h.flows.get(&flow_id).await.unwrap();
    assert_eq!(flow.status, FlowStatus::Active);
    assert_eq!(flow.nodes().len(), 5);
    assert_eq!(flow.edges()[1].source_handle.as_deref(), Some("true"));

    let records = ExecutionLog::list(h.store.as_ref(), Some(&flow_id)).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
}
