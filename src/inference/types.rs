// Wire types of the external inference/search API

use serde::{Deserialize, Serialize};

/// Model credentials forwarded to the inference API, which calls the provider itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmModel {
    pub base_url: String,
    pub name: String,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub url: String,
    pub document_id: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idcc: Option<String>,
}

/// The search backend has emitted both numeric and string chunk ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkId {
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub score: f64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_chunk: Option<ChunkId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnonymizeRequest {
    pub user_question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymizeResponse {
    pub time: f64,
    pub anonymized_question: String,
    pub nb_token_input: u32,
    pub nb_token_output: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RephraseRequest {
    pub model: LlmModel,
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rephrasing_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queries_splitting_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RephraseResponse {
    pub time: f64,
    pub rephrased_question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queries: Option<Vec<String>>,
    pub nb_token_input: u32,
    pub nb_token_output: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOptions {
    pub hybrid: bool,
    #[serde(rename = "top_K")]
    pub top_k: u32,
    pub collections: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub prompts: Vec<String>,
    pub options: SearchOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub time: f64,
    pub top_chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RerankRequest {
    pub prompt: String,
    pub inputs: Vec<Chunk>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RerankedChunk {
    pub rerank_score: f64,
    pub chunk: Chunk,
}

impl RerankedChunk {
    /// Flatten back into a chunk carrying its rerank score
    pub fn into_chunk(self) -> Chunk {
        Chunk {
            rerank_score: Some(self.rerank_score),
            ..self.chunk
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RerankResponse {
    #[serde(default)]
    pub time: f64,
    pub results: Vec<RerankedChunk>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveRequest {
    pub ids: Vec<String>,
}

/// Full text of one stored document
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DocumentContent {
    pub metadata: ChunkMetadata,
    pub content: String,
}

impl DocumentContent {
    /// Documents carry no search score
    pub fn into_chunk(self) -> Chunk {
        Chunk {
            score: 0.0,
            content: self.content,
            id_chunk: Some(ChunkId::Number(0)),
            rerank_score: None,
            metadata: self.metadata,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrieveResponse {
    #[serde(default)]
    pub time: f64,
    pub contents: Vec<DocumentContent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: LlmModel,
    pub chat_history: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub time: f64,
    pub text: String,
    pub nb_token_input: u32,
    pub nb_token_output: u32,
}

/// One `data:` frame of `/api/v1/generate/stream`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Start {
        #[serde(default)]
        time: f64,
        #[serde(default)]
        nb_token_input: u32,
    },
    Chunk {
        #[serde(default)]
        content: String,
    },
    End {
        time: f64,
        text: String,
        nb_token_input: u32,
        nb_token_output: u32,
    },
    Error {
        error: String,
    },
}

/// Error body shape of the inference API
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub detail: Option<serde_json::Value>,
}
