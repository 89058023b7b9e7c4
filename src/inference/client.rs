// HTTP adapter for the inference API
// All endpoints live under {API_BASE_URL}/api/v1 and require the bearer key

use super::stream::SseLineDecoder;
use super::types::*;
use super::{EventStream, InferenceApi};
use crate::config::InferenceConfig;
use crate::types::{AppError, AppResult};
use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::VecDeque;
use tracing::debug;

const API_PREFIX: &str = "/api/v1";
const FALLBACK_ERROR: &str = "Une erreur est survenue";

#[derive(Clone)]
pub struct HttpInferenceClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpInferenceClient {
    pub fn new(client: Client, config: &InferenceConfig) -> Self {
        Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, endpoint)
    }

    async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> AppResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(endpoint, "Calling inference API");
        let response = self
            .client
            .post(self.url(endpoint))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("{} request failed: {}", endpoint, e)))?;

        Self::decode(endpoint, response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> AppResult<T> {
        debug!(endpoint, "Calling inference API");
        let response = self
            .client
            .get(self.url(endpoint))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("{} request failed: {}", endpoint, e)))?;

        Self::decode(endpoint, response).await
    }

    async fn decode<T: DeserializeOwned>(endpoint: &str, response: Response) -> AppResult<T> {
        let response = Self::ensure_success(response).await?;
        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse {} response: {}", endpoint, e)))
    }

    /// Turn a non-2xx answer into an error carrying the API's `detail` when present
    async fn ensure_success(response: Response) -> AppResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ApiErrorBody>(&error_text)
            .ok()
            .and_then(|body| body.detail)
            .map(|detail| match detail {
                serde_json::Value::String(message) => message,
                other => other.to_string(),
            })
            .unwrap_or_else(|| FALLBACK_ERROR.to_string());

        Err(AppError::Upstream(format!("{} ({})", detail, status)))
    }
}

#[async_trait]
impl InferenceApi for HttpInferenceClient {
    async fn anonymize(&self, user_question: &str) -> AppResult<AnonymizeResponse> {
        let request = AnonymizeRequest { user_question: user_question.to_string() };
        self.post_json("/anonymize", &request).await
    }

    async fn rephrase(&self, request: &RephraseRequest) -> AppResult<RephraseResponse> {
        self.post_json("/rephrase", request).await
    }

    async fn search(&self, request: &SearchRequest) -> AppResult<SearchResponse> {
        self.post_json("/search_es", request).await
    }

    async fn idcc_chunks(&self, idcc: &str) -> AppResult<SearchResponse> {
        if idcc.is_empty() || !idcc.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::InvalidRequest(format!("Invalid IDCC: {}", idcc)));
        }
        self.get_json(&format!("/idcc/{}", idcc)).await
    }

    async fn rerank(&self, request: &RerankRequest) -> AppResult<RerankResponse> {
        self.post_json("/rerank", request).await
    }

    async fn retrieve_docs(&self, ids: &[String]) -> AppResult<RetrieveResponse> {
        let request = RetrieveRequest { ids: ids.to_vec() };
        self.post_json("/docs/retrieve", &request).await
    }

    async fn generate(&self, request: &GenerateRequest) -> AppResult<GenerateResponse> {
        self.post_json("/generate", request).await
    }

    async fn generate_stream(&self, request: &GenerateRequest) -> AppResult<EventStream> {
        let response = self
            .client
            .post(self.url("/generate/stream"))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("/generate/stream request failed: {}", e)))?;
        let response = Self::ensure_success(response).await?;

        struct State {
            bytes: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
            decoder: SseLineDecoder,
            ready: VecDeque<AppResult<StreamEvent>>,
            exhausted: bool,
        }

        let state = State {
            bytes: response.bytes_stream().boxed(),
            decoder: SseLineDecoder::new(),
            ready: VecDeque::new(),
            exhausted: false,
        };

        let events = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(event) = state.ready.pop_front() {
                    return Some((event, state));
                }
                if state.exhausted {
                    return None;
                }
                match state.bytes.next().await {
                    Some(Ok(bytes)) => {
                        state.ready.extend(state.decoder.feed(&bytes).into_iter().map(Ok));
                    }
                    Some(Err(e)) => {
                        state.ready.push_back(Err(AppError::Upstream(format!(
                            "Generation stream interrupted: {}",
                            e
                        ))));
                        state.exhausted = true;
                    }
                    None => {
                        state.ready.extend(state.decoder.finish().into_iter().map(Ok));
                        state.exhausted = true;
                    }
                }
            }
        });

        Ok(events.boxed())
    }
}
