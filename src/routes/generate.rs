use super::{relay_response, RELAY_BUFFER};
use crate::models::{AnalyzeEnvelope, AppState, GenerateBody};
use crate::pipeline::RelaySink;
use crate::types::{AppError, AppResult};
use axum::{
    extract::{rejection::JsonRejection, State},
    response::Response,
    routing::post,
    Json, Router,
};
use tracing::info;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/generate/stream", post(generate_stream))
        .with_state(state)
}

pub async fn generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> AppResult<Json<AnalyzeEnvelope>> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let input = body.into_input(AppError::BadRequest)?;

    let data = state.pipeline.analyze_question(&input).await?;
    Ok(Json(AnalyzeEnvelope { success: true, data }))
}

pub async fn generate_stream(
    State(state): State<AppState>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let input = body.into_input(AppError::InvalidRequest)?;
    info!(scenario = %input.scenario, "Opening generation stream");

    let (sink, rx) = RelaySink::channel(RELAY_BUFFER);
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move { pipeline.analyze_question_stream(input, sink).await });

    Ok(relay_response(rx))
}
