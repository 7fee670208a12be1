use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use zenflow_core::error::ZenflowError;
use zenflow_core::graph::Flow;
use zenflow_core::types::ExecutionRecord;
use zenflow_engine::catalog::{self, NodeTypeInfo};
use zenflow_engine::{ExecutionContext, FlowDraft, FlowUpdate};

use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = Result<T, ApiError>;

// GET /api/health
pub async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// GET /api/node-types
pub async fn node_types() -> Json<&'static [NodeTypeInfo]> {
    Json(catalog::node_types())
}

// GET /api/agents
pub async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Value> {
    let agents: Vec<Value> = state
        .agents
        .ids()
        .into_iter()
        .filter_map(|id| state.agents.get(id))
        .map(|a| serde_json::json!({ "id": a.id(), "name": a.name() }))
        .collect();
    Json(serde_json::json!({ "agents": agents }))
}

// GET /api/flows
pub async fn list_flows(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Flow>>> {
    Ok(Json(state.flows.list().await?))
}

// POST /api/flows
pub async fn create_flow(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<FlowDraft>,
) -> ApiResult<(StatusCode, Json<Flow>)> {
    let flow = state.flows.create(draft).await?;
    Ok((StatusCode::CREATED, Json(flow)))
}

// GET /api/flows/{id}
pub async fn get_flow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Flow>> {
    Ok(Json(state.flows.get(&id).await?))
}

// PUT /api/flows/{id}
pub async fn update_flow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<FlowUpdate>,
) -> ApiResult<Json<Flow>> {
    Ok(Json(state.flows.update(&id, update).await?))
}

// DELETE /api/flows/{id}
pub async fn delete_flow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.flows.delete(&id).await?;
    Ok(Json(serde_json::json!({ "status": "deleted" })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteBody {
    /// Trigger payload.
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
}

// POST /api/flows/{id}/execute
pub async fn execute_flow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<ExecuteBody>>,
) -> ApiResult<Json<ExecutionRecord>> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    info!(flow_id = %id, "Execute requested");

    let ctx = ExecutionContext::new(body.input).with_variables(body.variables);

    // Detached: the run finishes and is logged even if the client goes away.
    let flows = state.flows.clone();
    let executor = state.executor.clone();
    let run_id = id.clone();
    let run = tokio::spawn(async move { flows.execute(&executor, &run_id, ctx).await });

    let result = run.await.map_err(|e| {
        ZenflowError::handler(id.clone(), format!("run task failed: {}", e))
    })??;
    Ok(Json(result.record))
}

#[derive(Deserialize)]
pub struct ExecutionsQuery {
    #[serde(default)]
    pub flow_id: Option<String>,
}

// GET /api/executions?flow_id=
pub async fn list_executions(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ExecutionsQuery>,
) -> ApiResult<Json<Vec<ExecutionRecord>>> {
    Ok(Json(state.executor.log().list(q.flow_id.as_deref()).await?))
}
