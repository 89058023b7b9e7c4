// Collective agreement lookup, proxied to the agreements site

use crate::middleware::permissive_cors_headers;
use crate::models::AppState;
use crate::types::{AppError, AppResult};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

pub const UNAVAILABLE_MESSAGE: &str = "Ce service est momentanément indisponible.";

#[derive(Debug, Deserialize)]
pub struct AgreementQuery {
    pub q: Option<String>,
    pub size: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/idcc", get(search_agreements).options(preflight))
        .with_state(state)
}

async fn search_agreements(
    State(state): State<AppState>,
    Query(params): Query<AgreementQuery>,
) -> Response {
    let Some(query) = params.q.filter(|q| !q.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Query parameter is required" })),
        )
            .into_response();
    };

    let site_url = &state.config.agreements.site_url;
    match fetch_agreements(&state.http, site_url, &query, params.size.as_deref()).await {
        Ok(data) => (permissive_cors_headers(), Json(data)).into_response(),
        Err(e) => {
            error!(error = %e, query = %query, "Error proxying agreement lookup");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": UNAVAILABLE_MESSAGE })),
            )
                .into_response()
        }
    }
}

async fn preflight() -> impl IntoResponse {
    (StatusCode::OK, permissive_cors_headers())
}

pub async fn fetch_agreements(
    client: &reqwest::Client,
    site_url: &str,
    query: &str,
    size: Option<&str>,
) -> AppResult<Value> {
    let mut params = vec![("q", query)];
    if let Some(size) = size.filter(|s| !s.is_empty()) {
        params.push(("size", size));
    }

    let response = client
        .get(format!("{}/api/idcc", site_url.trim_end_matches('/')))
        .query(&params)
        .send()
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Upstream(format!("External API returned {}", status.as_u16())));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| AppError::Upstream(format!("Invalid agreement lookup response: {}", e)))
}
