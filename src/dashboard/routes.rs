//! Dashboard route handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::DashboardState;
use crate::types::CasinoError;

pub async fn index() -> Html<&'static str> {
    Html(include_str!("templates/index.html"))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

fn internal(err: CasinoError) -> (StatusCode, Json<serde_json::Value>) {
    error!(%err, "Dashboard read failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": err.to_string() })),
    )
}

pub async fn api_house(State(state): State<DashboardState>) -> impl IntoResponse {
    match state.casino.house_overview().await {
        Ok(report) => Json(json!(report)).into_response(),
        Err(err) => internal(err).into_response(),
    }
}

pub async fn api_stats(State(state): State<DashboardState>) -> impl IntoResponse {
    match state.casino.stats_report().await {
        Ok(report) => Json(json!(report)).into_response(),
        Err(err) => internal(err).into_response(),
    }
}

#[derive(Deserialize)]
pub struct HistoryParams {
    limit: Option<i64>,
}

pub async fn api_history(
    State(state): State<DashboardState>,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    match state.casino.recent_history(limit).await {
        Ok(entries) => Json(json!(entries)).into_response(),
        Err(err) => internal(err).into_response(),
    }
}
