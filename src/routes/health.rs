use crate::db::ping;
use crate::models::{AppState, HealthResponse};
use axum::{extract::State, routing::get, Json, Router};
use tracing::warn;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match &state.conversations {
        None => "disabled",
        Some(store) => match ping(store.pool()).await {
            Ok(()) => "connected",
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                "unavailable"
            }
        },
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        database: database.to_string(),
    })
}
