use axum::{http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub checked_at: String,
}

pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

pub async fn health() -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ready",
        service: "deskbot-server",
        checked_at: Utc::now().to_rfc3339(),
    };
    (StatusCode::OK, Json(payload))
}
