//! Read-only web dashboard.
//!
//! Serves an embedded HTML page plus JSON endpoints over the service's
//! reporting reads. Nothing here can move chips.

pub mod routes;

use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::service::Casino;

#[derive(Clone)]
pub struct DashboardState {
    pub casino: Arc<Casino>,
}

pub fn router(casino: Arc<Casino>) -> Router {
    let state = DashboardState { casino };
    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/api/house", get(routes::api_house))
        .route("/api/stats", get(routes::api_stats))
        .route("/api/history", get(routes::api_history))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(casino: Arc<Casino>, port: u16) -> anyhow::Result<()> {
    let app = router(casino);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "Dashboard listening");
    axum::serve(listener, app).await?;
    Ok(())
}
