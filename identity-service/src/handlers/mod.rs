pub mod admin;
pub mod auth;

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::AppState;

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": state.config.service_name,
    }))
}
