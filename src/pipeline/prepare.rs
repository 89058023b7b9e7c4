//! Question preparation: anonymization, retrieval and reranking.
//!
//! Only anonymization (and reformulation in the legacy scenario) can fail the
//! request. Retrieval stages log their failure and continue with no chunks.

use super::chunks::{merge_by_document, top_reranked, truncate};
use super::prompts::{self, AnswerType, Scenario};
use super::{AnalyzeResponse, FollowupInput, Pipeline, QuestionInput};
use crate::inference::{
    AnonymizeResponse, Chunk, DocumentContent, GenerateRequest, GenerateResponse, LlmModel,
    RephraseRequest, RephraseResponse, RerankRequest, SearchOptions, SearchRequest,
};
use crate::llm::ModelCatalog;
use crate::types::{AppError, AppResult};
use tracing::{debug, error, info, warn};

/// Largest list sent to one rerank call
pub const MAX_RERANK: usize = 64;
pub const K_RERANK: usize = 10;
pub const K_RERANK_CODE: usize = 5;
pub const K_RERANK_IDCC: usize = 5;
pub const K_RERANK_FOLLOWUP_QUERY1: usize = 5;
pub const K_RERANK_FOLLOWUP_QUERY2: usize = 10;
pub const K_RERANK_IDCC_FOLLOWUP: usize = 5;
/// Full documents kept per kind in the legacy scenario
pub const LEGACY_MAX_DOCUMENTS: usize = 7;
pub const LEGACY_MAX_IDCC_DOCUMENTS: usize = 3;

const CONTENT_COLLECTIONS: [&str; 4] = [
    "contributions",
    "page_fiche_ministere_travail",
    "fiches_service_public",
    "information",
];

fn collections(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

pub fn content_search_options() -> SearchOptions {
    SearchOptions { hybrid: true, top_k: 200, collections: collections(&CONTENT_COLLECTIONS) }
}

pub fn code_search_options() -> SearchOptions {
    SearchOptions { hybrid: true, top_k: 64, collections: collections(&["code_du_travail"]) }
}

pub fn legacy_local_search_options() -> SearchOptions {
    SearchOptions { hybrid: true, top_k: 64, collections: collections(&CONTENT_COLLECTIONS) }
}

pub fn internet_search_options() -> SearchOptions {
    SearchOptions { hybrid: true, top_k: 20, collections: collections(&["internet"]) }
}

/// Everything the generation call needs for a first question
#[derive(Debug, Clone)]
pub struct PreparedQuestion {
    /// Anonymized (and, in the legacy scenario, reformulated) question
    pub query: String,
    pub model: LlmModel,
    pub scenario: Scenario,
    pub idcc: Option<String>,
    pub general_chunks: Vec<Chunk>,
    pub code_chunks: Vec<Chunk>,
    pub idcc_chunks: Vec<Chunk>,
    pub answer_type: AnswerType,
    pub anonymized: AnonymizeResponse,
    pub rephrased: Option<RephraseResponse>,
}

impl PreparedQuestion {
    fn sources(&self) -> Vec<Chunk> {
        self.general_chunks.iter().chain(&self.code_chunks).cloned().collect()
    }

    pub fn generate_request(&self, agreements_site_url: &str) -> GenerateRequest {
        let idcc_chunks = self.idcc.as_ref().map(|_| self.idcc_chunks.as_slice());
        GenerateRequest {
            model: self.model.clone(),
            chat_history: prompts::chat_history(&self.query, &self.sources(), idcc_chunks),
            system_prompt: Some(prompts::system_prompt(
                self.scenario,
                self.idcc.as_deref(),
                agreements_site_url,
                self.answer_type,
            )),
        }
    }

    pub fn into_response(self, generated: GenerateResponse) -> AnalyzeResponse {
        let mut chunks = self.sources();
        chunks.extend(self.idcc_chunks);
        AnalyzeResponse {
            config: self.scenario,
            anonymized: Some(self.anonymized),
            rephrased: self.rephrased,
            local_search_chunks: chunks,
            generated,
            model_family: ModelCatalog::family(&self.model),
            model_name: self.model.name,
            answer_type: self.answer_type,
        }
    }
}

/// Everything the generation call needs for a followup question
#[derive(Debug, Clone)]
pub struct PreparedFollowup {
    pub query1: String,
    pub answer1: String,
    pub query2: String,
    pub model: LlmModel,
    pub scenario: Scenario,
    pub idcc: Option<String>,
    /// Query 1 selection followed by query 2 selection
    pub general_chunks: Vec<Chunk>,
    pub idcc_chunks: Vec<Chunk>,
    pub answer_type: AnswerType,
    pub anonymized: AnonymizeResponse,
}

impl PreparedFollowup {
    pub fn generate_request(&self, agreements_site_url: &str) -> GenerateRequest {
        let idcc_chunks = self.idcc.as_ref().map(|_| self.idcc_chunks.as_slice());
        GenerateRequest {
            model: self.model.clone(),
            chat_history: prompts::followup_chat_history(
                &self.query1,
                &self.answer1,
                &self.query2,
                &self.general_chunks,
                idcc_chunks,
            ),
            system_prompt: Some(prompts::system_prompt(
                self.scenario,
                self.idcc.as_deref(),
                agreements_site_url,
                self.answer_type,
            )),
        }
    }

    pub fn into_response(self, generated: GenerateResponse) -> AnalyzeResponse {
        let mut chunks = self.general_chunks;
        chunks.extend(self.idcc_chunks);
        AnalyzeResponse {
            config: self.scenario,
            anonymized: Some(self.anonymized),
            rephrased: None,
            local_search_chunks: chunks,
            generated,
            model_family: ModelCatalog::family(&self.model),
            model_name: self.model.name,
            answer_type: self.answer_type,
        }
    }
}

/// Inner message of an upstream error, without the generic prefix
fn upstream_message(err: AppError) -> String {
    match err {
        AppError::Upstream(message) => message,
        other => other.to_string(),
    }
}

impl Pipeline {
    pub async fn prepare_question(&self, input: &QuestionInput) -> AppResult<PreparedQuestion> {
        let model = self.models().default_model().clone();
        let anonymized = self.anonymize(&input.question).await?;
        let mut query = anonymized.anonymized_question.clone();

        let rephrased = match input.scenario {
            Scenario::V1_0 => {
                let rephrased = self.rephrase(&query, input.scenario).await?;
                query = rephrased.rephrased_question.clone();
                Some(rephrased)
            }
            Scenario::V2_0 => None,
        };

        // IDCC chunks are reranked against the question as typed
        let idcc_chunks = match &input.idcc {
            Some(idcc) => {
                let chunks = self.fetch_idcc(idcc).await;
                self.rerank_chunks(&input.question, chunks, K_RERANK_IDCC, "idcc").await
            }
            None => Vec::new(),
        };

        let (general_chunks, code_chunks, idcc_chunks) = match input.scenario {
            Scenario::V2_0 => {
                let general = self.content_stage(&query, K_RERANK).await;
                let code = self.code_stage(&query).await;
                (general, code, idcc_chunks)
            }
            Scenario::V1_0 => {
                let found = self.legacy_search(&query).await;
                let merged = merge_by_document(found);
                let selected = self.rerank_chunks(&query, merged, K_RERANK, "legacy").await;
                let (general, idcc) = self.full_documents(selected, idcc_chunks).await;
                (general, Vec::new(), idcc)
            }
        };

        if general_chunks.is_empty() && code_chunks.is_empty() && idcc_chunks.is_empty() {
            warn!(query = %query, "No chunks selected for generation");
        }

        let answer_type = self.settings().answer_type.pick();
        info!(
            scenario = %input.scenario,
            model = %model.name,
            general = general_chunks.len(),
            code = code_chunks.len(),
            idcc = idcc_chunks.len(),
            answer_type = ?answer_type,
            "Question prepared"
        );

        Ok(PreparedQuestion {
            query,
            model,
            scenario: input.scenario,
            idcc: input.idcc.clone(),
            general_chunks,
            code_chunks,
            idcc_chunks,
            answer_type,
            anonymized,
            rephrased,
        })
    }

    pub async fn prepare_followup(&self, input: &FollowupInput) -> AppResult<PreparedFollowup> {
        let model = input
            .model
            .clone()
            .unwrap_or_else(|| self.models().default_model().clone());

        let query1 = self.anonymize(&input.query1).await?.anonymized_question;
        let anonymized = self.anonymize(&input.query2).await?;
        let query2 = anonymized.anonymized_question.clone();

        let mut general_chunks = self.content_stage(&query1, K_RERANK_FOLLOWUP_QUERY1).await;
        general_chunks.extend(self.content_stage(&query2, K_RERANK_FOLLOWUP_QUERY2).await);

        let idcc_chunks = match &input.idcc {
            Some(idcc) => {
                let chunks = self.fetch_idcc(idcc).await;
                let mut selected = self
                    .rerank_chunks(&input.query1, chunks.clone(), K_RERANK_IDCC_FOLLOWUP, "idcc")
                    .await;
                selected.extend(
                    self.rerank_chunks(&input.query2, chunks, K_RERANK_IDCC_FOLLOWUP, "idcc")
                        .await,
                );
                selected
            }
            None => Vec::new(),
        };

        let answer_type = self.settings().answer_type.pick();
        info!(
            scenario = %input.scenario,
            model = %model.name,
            general = general_chunks.len(),
            idcc = idcc_chunks.len(),
            "Followup prepared"
        );

        Ok(PreparedFollowup {
            query1,
            answer1: input.answer1.clone(),
            query2,
            model,
            scenario: input.scenario,
            idcc: input.idcc.clone(),
            general_chunks,
            idcc_chunks,
            answer_type,
            anonymized,
        })
    }

    async fn anonymize(&self, question: &str) -> AppResult<AnonymizeResponse> {
        let response = self
            .api()
            .anonymize(question)
            .await
            .map_err(|e| AppError::Anonymization(upstream_message(e)))?;

        if response.anonymized_question.trim().is_empty() {
            return Err(AppError::Anonymization("réponse vide".to_string()));
        }
        debug!(elapsed = response.time, "Question anonymized");
        Ok(response)
    }

    async fn rephrase(&self, question: &str, scenario: Scenario) -> AppResult<RephraseResponse> {
        let instructions = scenario.instructions();
        let request = RephraseRequest {
            model: self.models().reformulation_model().clone(),
            question: question.to_string(),
            rephrasing_prompt: instructions.reformulation.map(str::to_string),
            queries_splitting_prompt: instructions.split_multiple_queries.map(str::to_string),
        };

        let response = self
            .api()
            .rephrase(&request)
            .await
            .map_err(|e| AppError::Reformulation(upstream_message(e)))?;

        if response.rephrased_question.trim().is_empty() {
            return Err(AppError::Reformulation("réponse vide".to_string()));
        }
        Ok(response)
    }

    async fn search(&self, query: &str, options: SearchOptions, stage: &'static str) -> Vec<Chunk> {
        let request = SearchRequest { prompts: vec![query.to_string()], options };
        match self.api().search(&request).await {
            Ok(response) => {
                if response.top_chunks.is_empty() {
                    warn!(stage, query = %query, "No search results found");
                }
                response.top_chunks
            }
            Err(e) => {
                error!(stage, error = %e, "Search failed, continuing without results");
                Vec::new()
            }
        }
    }

    /// Local and internet collections searched concurrently; one failure empties both
    async fn legacy_search(&self, query: &str) -> Vec<Chunk> {
        let local = SearchRequest {
            prompts: vec![query.to_string()],
            options: legacy_local_search_options(),
        };
        let internet = SearchRequest {
            prompts: vec![query.to_string()],
            options: internet_search_options(),
        };

        match tokio::try_join!(self.api().search(&local), self.api().search(&internet)) {
            Ok((local, internet)) => {
                let chunks: Vec<Chunk> =
                    local.top_chunks.into_iter().chain(internet.top_chunks).collect();
                if chunks.is_empty() {
                    warn!(query = %query, "No search results found");
                }
                chunks
            }
            Err(e) => {
                error!(error = %e, "Local/internet search failed, continuing without results");
                Vec::new()
            }
        }
    }

    async fn fetch_idcc(&self, idcc: &str) -> Vec<Chunk> {
        match self.api().idcc_chunks(idcc).await {
            Ok(response) => {
                if response.top_chunks.is_empty() {
                    warn!(idcc, "No chunks found for collective agreement");
                }
                response.top_chunks
            }
            Err(e) => {
                error!(idcc, error = %e, "IDCC retrieval failed, continuing without agreement chunks");
                Vec::new()
            }
        }
    }

    /// Rerank at most `MAX_RERANK` inputs and keep the best `limit`
    async fn rerank_chunks(
        &self,
        prompt: &str,
        inputs: Vec<Chunk>,
        limit: usize,
        stage: &'static str,
    ) -> Vec<Chunk> {
        if inputs.is_empty() {
            return Vec::new();
        }

        let request = RerankRequest {
            prompt: prompt.to_string(),
            inputs: truncate(inputs, MAX_RERANK),
        };
        match self.api().rerank(&request).await {
            Ok(response) => {
                if response.results.is_empty() {
                    warn!(stage, inputs = request.inputs.len(), "No rerank results found");
                }
                top_reranked(response.results, limit)
            }
            Err(e) => {
                warn!(stage, error = %e, "Rerank failed, continuing without results");
                Vec::new()
            }
        }
    }

    /// Replace selected chunks with their full documents, split back into
    /// general and agreement documents. The selection stands when retrieval
    /// fails or finds nothing.
    async fn full_documents(&self, general: Vec<Chunk>, idcc: Vec<Chunk>) -> (Vec<Chunk>, Vec<Chunk>) {
        let ids: Vec<String> = general.iter().chain(&idcc).map(|c| c.metadata.id.clone()).collect();
        if ids.is_empty() {
            return (general, idcc);
        }

        match self.api().retrieve_docs(&ids).await {
            Ok(response) if !response.contents.is_empty() => {
                let (idcc_docs, general_docs): (Vec<Chunk>, Vec<Chunk>) = response
                    .contents
                    .into_iter()
                    .map(DocumentContent::into_chunk)
                    .partition(|c| c.metadata.idcc.is_some());
                debug!(general = general_docs.len(), idcc = idcc_docs.len(), "Documents retrieved");
                (
                    truncate(general_docs, LEGACY_MAX_DOCUMENTS),
                    truncate(idcc_docs, LEGACY_MAX_IDCC_DOCUMENTS),
                )
            }
            Ok(_) => {
                warn!(ids = ids.len(), "No documents found, keeping selected chunks");
                (general, idcc)
            }
            Err(e) => {
                error!(error = %e, "Document retrieval failed, keeping selected chunks");
                (general, idcc)
            }
        }
    }

    /// Content collections: search, merge by document, rerank
    async fn content_stage(&self, query: &str, limit: usize) -> Vec<Chunk> {
        let found = self.search(query, content_search_options(), "content").await;
        let merged = merge_by_document(found);
        self.rerank_chunks(query, merged, limit, "content").await
    }

    /// Code du travail articles
    async fn code_stage(&self, query: &str) -> Vec<Chunk> {
        let found = self.search(query, code_search_options(), "code").await;
        self.rerank_chunks(query, found, K_RERANK_CODE, "code").await
    }
}
