//! API Routes
//!
//! - `/api/generate` - Question answering, blocking and streamed
//! - `/api/generate/followup` - Followup questions, blocking and streamed
//! - `/api/conversations` - Audit rows for answers and feedback
//! - `/api/idcc` - Collective agreement lookup proxy
//! - `/api/auth` - Access code check
//! - `/api/health` - Health checks

pub mod auth;
pub mod conversations;
pub mod followup;
pub mod generate;
pub mod health;
pub mod idcc;

use crate::middleware::cors_layer;
use crate::models::AppState;
use crate::pipeline::RelayFrame;
use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
    Router,
};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Frames buffered between a pipeline task and its client
pub const RELAY_BUFFER: usize = 64;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");
    let cors = cors_layer(&state.config.server.cors_allowed_origins);

    Router::new()
        .merge(generate::router(state.clone()))
        .merge(followup::router(state.clone()))
        .merge(conversations::router(state.clone()))
        .merge(idcc::router(state.clone()))
        .merge(auth::router(state.clone()))
        .merge(health::router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Client response draining the frames a pipeline task sends
pub(crate) fn relay_response(rx: mpsc::Receiver<RelayFrame>) -> Response {
    let frames = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|frame| (Ok::<_, Infallible>(frame.to_sse()), rx))
    });

    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::config::Config;
    use crate::inference::testing::MockInference;
    use crate::llm::ModelCatalog;
    use crate::middleware::SessionVerifier;
    use crate::models::AppState;
    use crate::pipeline::{AnswerTypePolicy, Pipeline, PipelineSettings};
    use axum::body::Body;
    use axum::http::{header, Request, Response};
    use std::sync::Arc;

    pub fn state_with(mock: MockInference, config: Config) -> (AppState, Arc<MockInference>) {
        let mock = Arc::new(mock);
        let pipeline = Pipeline::new(
            mock.clone(),
            ModelCatalog::from_config(&config.models),
            PipelineSettings {
                answer_type: AnswerTypePolicy::Short,
                agreements_site_url: config.agreements.site_url.clone(),
            },
        );
        let state = AppState {
            sessions: SessionVerifier::new(
                &config.auth.session_secret,
                config.auth.allowed_email_domains.clone(),
            ),
            config,
            pipeline,
            conversations: None,
            http: reqwest::Client::new(),
        };
        (state, mock)
    }

    pub fn state(mock: MockInference) -> (AppState, Arc<MockInference>) {
        state_with(mock, Config::for_tests())
    }

    pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub async fn body_json(response: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    pub async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// `data:` payloads of a relayed stream
    pub fn sse_frames(text: &str) -> Vec<serde_json::Value> {
        text.split("\n\n")
            .filter_map(|frame| frame.strip_prefix("data: "))
            .map(|json| serde_json::from_str(json).unwrap())
            .collect()
    }
}
