//! HTTP gateway for MedQuery.
//!
//! A thin transport over [`QueryRouter`]: every endpoint maps onto one
//! router operation. Built on Axum.

pub mod api;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{Method, header};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use medquery_agent::QueryRouter;
use medquery_config::AppConfig;

/// Largest accepted request body.
const BODY_LIMIT: usize = 64 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub router: Arc<QueryRouter>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl GatewayState {
    pub fn new(router: Arc<QueryRouter>) -> Self {
        Self {
            router,
            started_at: chrono::Utc::now(),
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    api::routes(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let router = medquery_agent::build_router(&config).await?;
    let app = build_router(Arc::new(GatewayState::new(router)));

    info!(addr = %addr, model = %config.model.model, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
