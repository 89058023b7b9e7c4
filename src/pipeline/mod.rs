//! Question Pipeline
//!
//! Turns a user question into a generated answer grounded in retrieved legal
//! sources:
//!
//! ```text
//! Question (+ optional IDCC)
//!      │
//!      ▼
//! ┌─────────────┐
//! │ Anonymize   │  → fatal on failure
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │ IDCC chunks │  → fetch, rerank against the question, top 5
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Content    │  → search, merge by document, rerank, top 10
//! │  + Code     │  → search code du travail, rerank, top 5
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Generate   │  → blocking or relayed as a stream
//! └─────────────┘
//! ```
//!
//! Retrieval stages degrade to empty results; only anonymization and
//! generation failures abort a request.

pub mod chunks;
pub mod prepare;
pub mod prompts;
pub mod relay;

pub use prepare::{PreparedFollowup, PreparedQuestion};
pub use prompts::{AnswerType, AnswerTypePolicy, Scenario};
pub use relay::{relay_generation, RelayFrame, RelaySink};

use crate::inference::{
    AnonymizeResponse, Chunk, GenerateRequest, GenerateResponse, InferenceApi, LlmModel,
    RephraseResponse,
};
use crate::llm::{LlmFamily, ModelCatalog};
use crate::types::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Result of one question or followup, as returned to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub config: Scenario,
    pub anonymized: Option<AnonymizeResponse>,
    pub rephrased: Option<RephraseResponse>,
    pub local_search_chunks: Vec<Chunk>,
    pub generated: GenerateResponse,
    pub model_name: String,
    pub model_family: Option<LlmFamily>,
    pub answer_type: AnswerType,
}

#[derive(Debug, Clone)]
pub struct QuestionInput {
    pub question: String,
    pub scenario: Scenario,
    pub idcc: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FollowupInput {
    pub query1: String,
    pub answer1: String,
    pub query2: String,
    pub scenario: Scenario,
    pub idcc: Option<String>,
    /// Model of the first answer; the default model when absent
    pub model: Option<LlmModel>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub answer_type: AnswerTypePolicy,
    pub agreements_site_url: String,
}

#[derive(Clone)]
pub struct Pipeline {
    api: Arc<dyn InferenceApi>,
    models: ModelCatalog,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(api: Arc<dyn InferenceApi>, models: ModelCatalog, settings: PipelineSettings) -> Self {
        Self { api, models, settings }
    }

    pub fn api(&self) -> &dyn InferenceApi {
        self.api.as_ref()
    }

    pub fn models(&self) -> &ModelCatalog {
        &self.models
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn analyze_question(&self, input: &QuestionInput) -> AppResult<AnalyzeResponse> {
        info!(scenario = %input.scenario, idcc = ?input.idcc, "Analyzing question");
        let prepared = self.prepare_question(input).await?;
        let request = prepared.generate_request(&self.settings.agreements_site_url);
        let generated = self.generate(&request).await?;
        Ok(prepared.into_response(generated))
    }

    pub async fn analyze_followup(&self, input: &FollowupInput) -> AppResult<AnalyzeResponse> {
        info!(scenario = %input.scenario, idcc = ?input.idcc, "Analyzing followup");
        let prepared = self.prepare_followup(input).await?;
        let request = prepared.generate_request(&self.settings.agreements_site_url);
        let generated = self.generate(&request).await?;
        Ok(prepared.into_response(generated))
    }

    /// Prepare, then relay generation into `sink`. Always ends the stream with one terminal frame.
    pub async fn analyze_question_stream(&self, input: QuestionInput, sink: RelaySink) {
        info!(scenario = %input.scenario, idcc = ?input.idcc, "Analyzing question (stream)");
        let prepared = match self.prepare_question(&input).await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(error = %e, "Question preparation failed");
                sink.fail(e.to_string()).await;
                return;
            }
        };

        let request = prepared.generate_request(&self.settings.agreements_site_url);
        self.stream_generation(request, sink, move |generated| prepared.into_response(generated))
            .await;
    }

    pub async fn analyze_followup_stream(&self, input: FollowupInput, sink: RelaySink) {
        info!(scenario = %input.scenario, idcc = ?input.idcc, "Analyzing followup (stream)");
        let prepared = match self.prepare_followup(&input).await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(error = %e, "Followup preparation failed");
                sink.fail(e.to_string()).await;
                return;
            }
        };

        let request = prepared.generate_request(&self.settings.agreements_site_url);
        self.stream_generation(request, sink, move |generated| prepared.into_response(generated))
            .await;
    }

    /// Open the upstream generation stream and relay it, unless the client already left
    async fn stream_generation<F>(&self, request: GenerateRequest, sink: RelaySink, finish: F)
    where
        F: FnOnce(GenerateResponse) -> AnalyzeResponse,
    {
        if sink.is_closed() {
            info!(model = %request.model.name, "Client disconnected before generation, skipping");
            return;
        }

        match self.api.generate_stream(&request).await {
            Ok(events) => relay_generation(events, sink, finish).await,
            Err(e) => {
                let e = generation_error(e, &request.model);
                error!(error = %e, "Generation stream could not start");
                sink.fail(e.to_string()).await;
            }
        }
    }

    async fn generate(&self, request: &GenerateRequest) -> AppResult<GenerateResponse> {
        let generated = self
            .api
            .generate(request)
            .await
            .map_err(|e| generation_error(e, &request.model))?;
        info!(
            model = %request.model.name,
            nb_token_input = generated.nb_token_input,
            nb_token_output = generated.nb_token_output,
            "Answer generated"
        );
        Ok(generated)
    }
}

fn generation_error(err: AppError, model: &LlmModel) -> AppError {
    let detail = match err {
        AppError::Upstream(message) => message,
        other => other.to_string(),
    };
    AppError::Generation(format!(
        "{}. Pour information, le modèle utilisé lors de la génération est {}",
        detail, model.name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::inference::testing::{chunk, MockInference};
    use crate::inference::StreamEvent;

    fn pipeline(mock: MockInference) -> (Pipeline, Arc<MockInference>) {
        let mock = Arc::new(mock);
        let pipeline = Pipeline::new(
            mock.clone(),
            ModelCatalog::from_config(&Config::for_tests().models),
            PipelineSettings {
                answer_type: AnswerTypePolicy::Long,
                agreements_site_url: "https://code.travail.gouv.fr".to_string(),
            },
        );
        (pipeline, mock)
    }

    fn question() -> QuestionInput {
        QuestionInput {
            question: "Quel est mon préavis de démission ?".to_string(),
            scenario: Scenario::V2_0,
            idcc: Some("1486".to_string()),
        }
    }

    #[tokio::test]
    async fn test_analyze_question_full_result() {
        let (pipeline, mock) = pipeline(MockInference {
            search_results: vec![
                ("contributions".to_string(), vec![chunk("doc-1", 0.9, "un mois")]),
                ("code_du_travail".to_string(), vec![chunk("art-1", 0.8, "L1237-1")]),
            ],
            idcc_results: vec![chunk("idcc-1", 0.7, "deux mois")],
            ..Default::default()
        });

        let result = pipeline.analyze_question(&question()).await.unwrap();
        assert_eq!(result.generated.text, "Réponse générée");
        assert_eq!(result.model_name, "mistral-large");
        assert_eq!(result.model_family, Some(LlmFamily::Mistral));
        assert_eq!(result.answer_type, AnswerType::Long);
        assert_eq!(result.local_search_chunks.len(), 3);
        assert_eq!(mock.calls().last().map(String::as_str), Some("generate"));

        let requests = mock.generate_requests.lock().unwrap().clone();
        let system_prompt = requests[0].system_prompt.clone().unwrap();
        assert!(system_prompt.contains("https://code.travail.gouv.fr/convention-collective/1486"));
        assert!(requests[0].chat_history[1].content.contains("### Documents spécifiques"));
    }

    #[tokio::test]
    async fn test_response_uses_camel_case_keys() {
        let (pipeline, _mock) = pipeline(MockInference::default());
        let result = pipeline.analyze_question(&question()).await.unwrap();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["config"], "v2.0");
        assert_eq!(value["modelName"], "mistral-large");
        assert_eq!(value["modelFamily"], "mistral");
        assert_eq!(value["answerType"], "long");
        assert!(value["localSearchChunks"].is_array());
    }

    #[tokio::test]
    async fn test_anonymization_failure_never_generates() {
        let (pipeline, mock) = pipeline(MockInference {
            anonymize_error: Some("timeout".to_string()),
            ..Default::default()
        });

        let err = pipeline.analyze_question(&question()).await.unwrap_err();
        assert_eq!(err.to_string(), "Erreur lors de l'anonymisation: timeout");
        assert!(!mock.calls().iter().any(|c| c.starts_with("generate")));
    }

    #[tokio::test]
    async fn test_degraded_retrieval_still_generates() {
        let (pipeline, mock) = pipeline(MockInference {
            search_error: Some("down".to_string()),
            idcc_error: Some("down".to_string()),
            ..Default::default()
        });

        let result = pipeline.analyze_question(&question()).await.unwrap();
        assert!(result.local_search_chunks.is_empty());
        assert!(mock.calls().contains(&"generate".to_string()));
    }

    #[tokio::test]
    async fn test_generation_error_names_model() {
        let (pipeline, _mock) = pipeline(MockInference {
            generate_error: Some("rate limited".to_string()),
            ..Default::default()
        });

        let err = pipeline.analyze_question(&question()).await.unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));
        let message = err.to_string();
        assert!(message.starts_with("Erreur lors de la génération de la réponse: rate limited"));
        assert!(message.ends_with("mistral-large"));
    }

    #[tokio::test]
    async fn test_stream_relays_chunks_and_completion() {
        let (pipeline, _mock) = pipeline(MockInference {
            stream_events: vec![
                Ok(StreamEvent::Chunk { content: "Un ".to_string() }),
                Ok(StreamEvent::Chunk { content: "mois".to_string() }),
                Ok(StreamEvent::End {
                    time: 1.0,
                    text: "Un mois".to_string(),
                    nb_token_input: 10,
                    nb_token_output: 2,
                }),
            ],
            ..Default::default()
        });

        let (sink, mut rx) = RelaySink::channel(8);
        pipeline.analyze_question_stream(question(), sink).await;

        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        assert_eq!(frames.len(), 3);
        match &frames[2] {
            RelayFrame::Complete { success, data } => {
                assert!(*success);
                assert_eq!(data.generated.text, "Un mois");
                assert_eq!(data.model_name, "mistral-large");
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_preparation_failure_sends_single_error() {
        let (pipeline, mock) = pipeline(MockInference {
            anonymize_error: Some("timeout".to_string()),
            ..Default::default()
        });

        let (sink, mut rx) = RelaySink::channel(8);
        pipeline.analyze_question_stream(question(), sink).await;

        let frame = rx.recv().await.unwrap();
        assert!(matches!(frame, RelayFrame::Error { ref error, .. } if error.contains("anonymisation")));
        assert!(rx.recv().await.is_none());
        assert!(!mock.calls().contains(&"generate_stream".to_string()));
    }

    #[tokio::test]
    async fn test_followup_stream_error_frame_on_start_failure() {
        let (pipeline, _mock) = pipeline(MockInference {
            generate_error: Some("unavailable".to_string()),
            ..Default::default()
        });
        let input = FollowupInput {
            query1: "Q1".to_string(),
            answer1: "R1".to_string(),
            query2: "Q2".to_string(),
            scenario: Scenario::V2_0,
            idcc: None,
            model: None,
        };

        let (sink, mut rx) = RelaySink::channel(8);
        pipeline.analyze_followup_stream(input, sink).await;
        match rx.recv().await.unwrap() {
            RelayFrame::Error { success, error } => {
                assert!(!success);
                assert!(error.contains("unavailable"));
            }
            other => panic!("expected error, got {:?}", other),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_skips_generation_when_client_left() {
        let (pipeline, mock) = pipeline(MockInference::default());

        let (sink, rx) = RelaySink::channel(8);
        drop(rx);
        pipeline.analyze_question_stream(question(), sink).await;

        assert!(mock.calls().contains(&"anonymize".to_string()));
        assert!(!mock.calls().contains(&"generate_stream".to_string()));
    }

    #[tokio::test]
    async fn test_followup_blocking_result() {
        let (pipeline, mock) = pipeline(MockInference::default());
        let input = FollowupInput {
            query1: "Q1".to_string(),
            answer1: "R1".to_string(),
            query2: "Q2".to_string(),
            scenario: Scenario::V2_0,
            idcc: None,
            model: pipeline.models().by_name("gpt-4o").cloned(),
        };

        let result = pipeline.analyze_followup(&input).await.unwrap();
        assert_eq!(result.model_family, Some(LlmFamily::ChatGpt));
        let requests = mock.generate_requests.lock().unwrap().clone();
        assert_eq!(requests[0].chat_history.len(), 4);
    }
}
