// Client side of the external inference/search API

pub mod client;
pub mod stream;
pub mod types;

pub use client::HttpInferenceClient;
pub use stream::SseLineDecoder;
pub use types::*;

use crate::types::AppResult;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Events of one generation stream, in upstream order
pub type EventStream = BoxStream<'static, AppResult<StreamEvent>>;

/// Operations the gateway needs from the inference service.
///
/// Every call is attempted exactly once; callers decide whether an error is
/// fatal or degrades to an empty result.
#[async_trait]
pub trait InferenceApi: Send + Sync {
    async fn anonymize(&self, user_question: &str) -> AppResult<AnonymizeResponse>;

    async fn rephrase(&self, request: &RephraseRequest) -> AppResult<RephraseResponse>;

    async fn search(&self, request: &SearchRequest) -> AppResult<SearchResponse>;

    /// All chunks of one collective agreement
    async fn idcc_chunks(&self, idcc: &str) -> AppResult<SearchResponse>;

    async fn rerank(&self, request: &RerankRequest) -> AppResult<RerankResponse>;

    /// Full documents for the given chunk metadata ids
    async fn retrieve_docs(&self, ids: &[String]) -> AppResult<RetrieveResponse>;

    async fn generate(&self, request: &GenerateRequest) -> AppResult<GenerateResponse>;

    async fn generate_stream(&self, request: &GenerateRequest) -> AppResult<EventStream>;
}
