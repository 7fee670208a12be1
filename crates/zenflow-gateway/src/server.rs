use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use zenflow_core::config::GatewayConfig;
use zenflow_core::directory::AgentDirectory;
use zenflow_engine::{FlowExecutor, FlowRegistry};

use crate::routes;
use crate::state::AppState;

/// HTTP gateway for flow management and execution, built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    flows: Arc<FlowRegistry>,
    executor: Arc<FlowExecutor>,
    agents: AgentDirectory,
}

impl GatewayServer {
    pub fn new(
        config: GatewayConfig,
        flows: Arc<FlowRegistry>,
        executor: Arc<FlowExecutor>,
        agents: AgentDirectory,
    ) -> Self {
        Self {
            config,
            flows,
            executor,
            agents,
        }
    }

    /// Build the axum router over the server's state.
    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            flows: self.flows.clone(),
            executor: self.executor.clone(),
            agents: self.agents.clone(),
        });

        Router::new()
            .route("/api/health", get(routes::health))
            .route("/api/node-types", get(routes::node_types))
            .route("/api/agents", get(routes::list_agents))
            .route(
                "/api/flows",
                get(routes::list_flows).post(routes::create_flow),
            )
            .route(
                "/api/flows/{id}",
                get(routes::get_flow)
                    .put(routes::update_flow)
                    .delete(routes::delete_flow),
            )
            .route(
                "/api/flows/{id}/execute",
                axum::routing::post(routes::execute_flow),
            )
            .route("/api/executions", get(routes::list_executions))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let app = self.router();

        let listener = TcpListener::bind(&self.config.bind).await?;
        info!(bind = %self.config.bind, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}
