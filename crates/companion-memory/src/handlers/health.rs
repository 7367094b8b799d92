use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    status: String,
    history_store: bool,
    database: bool,
}

pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let history_store = match state.memory.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Readiness: history store unavailable: {}", e);
            false
        }
    };

    let database = match state.companions.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Readiness: database unavailable: {}", e);
            false
        }
    };

    let ready = history_store && database;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            status: if ready { "ready" } else { "unavailable" }.to_string(),
            history_store,
            database,
        }),
    )
}
