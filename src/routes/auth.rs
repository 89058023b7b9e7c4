// Shared access code gate shown before the identity-provider login

use crate::models::{AccessCodeRequest, AppState};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use tracing::{debug, warn};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth", post(verify_access_code))
        .with_state(state)
}

async fn verify_access_code(
    State(state): State<AppState>,
    body: Result<Json<AccessCodeRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e.body_text(), "Unreadable access code request");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "Erreur lors de la vérification" })),
            )
                .into_response();
        }
    };

    let expected = &state.config.auth.app_access_key;
    match body.code {
        // An unset key never matches
        Some(code) if !expected.is_empty() && code == *expected => {
            debug!("Access code accepted");
            Json(json!({ "success": true })).into_response()
        }
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Code d'accès invalide" })),
        )
            .into_response(),
    }
}
