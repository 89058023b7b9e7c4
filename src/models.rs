use crate::config::Config;
use crate::db::ConversationStore;
use crate::llm::ModelCatalog;
use crate::middleware::SessionVerifier;
use crate::pipeline::{AnalyzeResponse, FollowupInput, Pipeline, QuestionInput, Scenario};
use crate::types::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pipeline: Pipeline,
    /// `None` when no database is configured
    pub conversations: Option<ConversationStore>,
    pub sessions: SessionVerifier,
    /// Outbound client for the agreements lookup proxy
    pub http: reqwest::Client,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_scenario(config: Option<&str>) -> AppResult<Scenario> {
    match config {
        Some(config) if !config.is_empty() => config.parse().map_err(AppError::InvalidRequest),
        _ => Ok(Scenario::default()),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    pub question: Option<String>,
    pub config: Option<String>,
    pub agreement_id: Option<String>,
}

impl GenerateBody {
    /// `missing_question` decides the rejection for an absent question; the
    /// blocking and streaming routes answer it differently.
    pub fn into_input(self, missing_question: fn(String) -> AppError) -> AppResult<QuestionInput> {
        let question = non_empty(self.question)
            .ok_or_else(|| missing_question("Question is required".to_string()))?;
        Ok(QuestionInput {
            question,
            scenario: parse_scenario(self.config.as_deref())?,
            idcc: non_empty(self.agreement_id),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowupBody {
    pub query1: Option<String>,
    pub answer1: Option<String>,
    pub query2: Option<String>,
    pub config: Option<String>,
    pub agreement_id: Option<String>,
    pub model_name: Option<String>,
}

impl FollowupBody {
    pub fn into_input(self, models: &ModelCatalog) -> AppResult<FollowupInput> {
        let (query1, answer1, query2) =
            match (non_empty(self.query1), non_empty(self.answer1), non_empty(self.query2)) {
                (Some(q1), Some(a1), Some(q2)) => (q1, a1, q2),
                _ => {
                    return Err(AppError::InvalidRequest(
                        "query1, answer1, and query2 are required".to_string(),
                    ))
                }
            };

        let scenario = parse_scenario(self.config.as_deref())?;

        let model = match non_empty(self.model_name) {
            Some(name) => Some(
                models
                    .by_name(&name)
                    .cloned()
                    .ok_or_else(|| AppError::InvalidRequest(format!("Invalid model name: {}", name)))?,
            ),
            None => None,
        };

        Ok(FollowupInput {
            query1,
            answer1,
            query2,
            scenario,
            idcc: non_empty(self.agreement_id),
            model,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeEnvelope {
    pub success: bool,
    pub data: AnalyzeResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    Positive,
    Negative,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::Positive => "positive",
            FeedbackType::Negative => "negative",
        }
    }
}

/// Raw body of `/api/conversations/save`; validated into [`SaveAction`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub action: Option<String>,
    pub question: Option<String>,
    pub response: Option<String>,
    pub idcc: Option<String>,
    pub model_name: Option<String>,
    pub conversation_id: Option<String>,
    pub followup_question: Option<String>,
    pub followup_response: Option<String>,
    pub feedback_type: Option<String>,
    pub feedback_reasons: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveAction {
    Initial {
        question: String,
        response: String,
        idcc: Option<String>,
        model_name: Option<String>,
    },
    Followup {
        conversation_id: Uuid,
        followup_question: String,
        followup_response: String,
    },
    Feedback {
        conversation_id: Uuid,
        feedback_type: FeedbackType,
        feedback_reasons: Option<String>,
    },
}

fn conversation_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::InvalidRequest("conversationId must be a valid UUID".to_string()))
}

impl SaveRequest {
    pub fn validate(self) -> AppResult<SaveAction> {
        let action = non_empty(self.action)
            .ok_or_else(|| AppError::InvalidRequest("Action is required".to_string()))?;

        match action.as_str() {
            "save_initial" => match (non_empty(self.question), non_empty(self.response)) {
                (Some(question), Some(response)) => Ok(SaveAction::Initial {
                    question,
                    response,
                    idcc: non_empty(self.idcc),
                    model_name: non_empty(self.model_name),
                }),
                _ => Err(AppError::InvalidRequest(
                    "Question and response are required".to_string(),
                )),
            },
            "save_followup" => match (
                non_empty(self.conversation_id),
                non_empty(self.followup_question),
                non_empty(self.followup_response),
            ) {
                (Some(id), Some(followup_question), Some(followup_response)) => {
                    Ok(SaveAction::Followup {
                        conversation_id: conversation_id(&id)?,
                        followup_question,
                        followup_response,
                    })
                }
                _ => Err(AppError::InvalidRequest(
                    "conversationId, followupQuestion, and followupResponse are required"
                        .to_string(),
                )),
            },
            "save_feedback" => {
                let (id, feedback_type) =
                    match (non_empty(self.conversation_id), non_empty(self.feedback_type)) {
                        (Some(id), Some(feedback_type)) => (id, feedback_type),
                        _ => {
                            return Err(AppError::InvalidRequest(
                                "conversationId and feedbackType are required".to_string(),
                            ))
                        }
                    };
                let feedback_type = match feedback_type.as_str() {
                    "positive" => FeedbackType::Positive,
                    "negative" => FeedbackType::Negative,
                    _ => {
                        return Err(AppError::InvalidRequest(
                            "feedbackType must be 'positive' or 'negative'".to_string(),
                        ))
                    }
                };
                Ok(SaveAction::Feedback {
                    conversation_id: conversation_id(&id)?,
                    feedback_type,
                    feedback_reasons: non_empty(self.feedback_reasons),
                })
            }
            _ => Err(AppError::InvalidRequest("Invalid action".to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessCodeRequest {
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: String,
}
