use super::{relay_response, RELAY_BUFFER};
use crate::models::{AnalyzeEnvelope, AppState, FollowupBody};
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
        .route("/api/generate/followup", post(followup))
        .route("/api/generate/followup/stream", post(followup_stream))
        .with_state(state)
}

pub async fn followup(
    State(state): State<AppState>,
    body: Result<Json<FollowupBody>, JsonRejection>,
) -> AppResult<Json<AnalyzeEnvelope>> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let input = body.into_input(state.pipeline.models())?;

    let data = state.pipeline.analyze_followup(&input).await?;
    Ok(Json(AnalyzeEnvelope { success: true, data }))
}

pub async fn followup_stream(
    State(state): State<AppState>,
    body: Result<Json<FollowupBody>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let input = body.into_input(state.pipeline.models())?;
    info!(scenario = %input.scenario, "Opening followup stream");

    let (sink, rx) = RelaySink::channel(RELAY_BUFFER);
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move { pipeline.analyze_followup_stream(input, sink).await });

    Ok(relay_response(rx))
}

#[cfg(test)]
mod tests {
    use crate::inference::testing::MockInference;
    use crate::inference::StreamEvent;
    use crate::routes::create_router;
    use crate::routes::testing::{body_json, body_text, post_json, sse_frames, state};
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_followup_without_answer1_is_422() {
        let (state, mock) = state(MockInference::default());
        let response = create_router(state)
            .oneshot(post_json("/api/generate/followup", json!({"query1": "Q1", "query2": "Q2"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"], "query1, answer1, and query2 are required");
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_followup_unknown_model_is_422() {
        let (state, _mock) = state(MockInference::default());
        let response = create_router(state)
            .oneshot(post_json(
                "/api/generate/followup",
                json!({"query1": "Q1", "answer1": "R1", "query2": "Q2", "modelName": "gpt-1"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_followup_success_with_model() {
        let (state, mock) = state(MockInference::default());
        let response = create_router(state)
            .oneshot(post_json(
                "/api/generate/followup",
                json!({"query1": "Q1", "answer1": "R1", "query2": "Q2", "modelName": "gpt-4o"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["modelName"], "gpt-4o");
        assert_eq!(body["data"]["modelFamily"], "chatgpt");
        let anonymize_calls = mock.calls().iter().filter(|c| *c == "anonymize").count();
        assert_eq!(anonymize_calls, 2);
    }

    #[tokio::test]
    async fn test_followup_stream_relays() {
        let (state, _mock) = state(MockInference {
            stream_events: vec![
                Ok(StreamEvent::Chunk { content: "Pour un cadre".to_string() }),
                Ok(StreamEvent::End {
                    time: 1.0,
                    text: "Pour un cadre".to_string(),
                    nb_token_input: 5,
                    nb_token_output: 3,
                }),
            ],
            ..Default::default()
        });
        let response = create_router(state)
            .oneshot(post_json(
                "/api/generate/followup/stream",
                json!({"query1": "Q1", "answer1": "R1", "query2": "Q2"}),
            ))
            .await
            .unwrap();

        let frames = sse_frames(&body_text(response).await);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1]["type"], "complete");
        assert_eq!(frames[1]["success"], true);
    }
}
