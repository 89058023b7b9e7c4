//! Client-side conversation history.
//!
//! The store keeps the most recent conversations first and is serialized as
//! JSON for local persistence. Heavy fields are dropped before serializing.
//! A conversation accepts a single followup, opened by its first answer.

use crate::inference::Role;
use crate::models::FollowupBody;
use crate::pipeline::{AnalyzeResponse, Scenario};
use crate::types::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_CONVERSATIONS: usize = 30;
const TITLE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub is_followup: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub messages: Vec<HistoryMessage>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_api_result: Option<AnalyzeResponse>,
    #[serde(default)]
    pub is_awaiting_followup: bool,
    #[serde(default)]
    pub first_user_question: Option<String>,
    #[serde(default)]
    pub first_assistant_answer: Option<String>,
    #[serde(default)]
    pub selected_model: Option<String>,
}

fn title_for(question: &str) -> String {
    let question = question.trim();
    if question.chars().count() <= TITLE_MAX_CHARS {
        return question.to_string();
    }
    let mut title: String = question.chars().take(TITLE_MAX_CHARS).collect();
    title.push('…');
    title
}

impl Conversation {
    pub fn new(question: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title_for(question),
            messages: vec![HistoryMessage {
                role: Role::User,
                content: question.to_string(),
                is_followup: false,
            }],
            created_at: Utc::now(),
            last_api_result: None,
            is_awaiting_followup: false,
            first_user_question: Some(question.to_string()),
            first_assistant_answer: None,
            selected_model: None,
        }
    }

    /// Append a generated answer. The first answer opens the followup slot.
    pub fn record_answer(&mut self, result: AnalyzeResponse) {
        let answer = result.generated.text.clone();
        let is_first = self.first_assistant_answer.is_none();

        self.messages.push(HistoryMessage {
            role: Role::Assistant,
            content: answer.clone(),
            is_followup: !is_first,
        });
        if is_first {
            self.first_assistant_answer = Some(answer);
            self.selected_model = Some(result.model_name.clone());
            self.is_awaiting_followup = true;
        }
        self.last_api_result = Some(result);
    }

    /// Consume the followup slot and build the request for `query2`
    pub fn begin_followup(
        &mut self,
        query2: &str,
        scenario: Option<Scenario>,
        agreement_id: Option<&str>,
    ) -> AppResult<FollowupBody> {
        if !self.is_awaiting_followup {
            return Err(AppError::InvalidRequest(
                "This conversation has no open followup".to_string(),
            ));
        }
        let (Some(query1), Some(answer1)) = (&self.first_user_question, &self.first_assistant_answer)
        else {
            return Err(AppError::InvalidRequest(
                "query1, answer1, and query2 are required".to_string(),
            ));
        };

        let body = FollowupBody {
            query1: Some(query1.clone()),
            answer1: Some(answer1.clone()),
            query2: Some(query2.to_string()),
            config: scenario.map(|s| s.to_string()),
            agreement_id: agreement_id.map(str::to_string),
            model_name: self.selected_model.clone(),
        };

        self.is_awaiting_followup = false;
        self.messages.push(HistoryMessage {
            role: Role::User,
            content: query2.to_string(),
            is_followup: true,
        });
        Ok(body)
    }

    /// Copy without the fields that are too heavy to persist
    pub fn pruned(&self) -> Self {
        Self { last_api_result: None, ..self.clone() }
    }
}

/// Most recent first, at most [`MAX_CONVERSATIONS`] entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationHistory {
    conversations: Vec<Conversation>,
}

impl ConversationHistory {
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, id: Uuid) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    /// Insert or move `conversation` to the front, dropping the oldest beyond the cap
    pub fn upsert(&mut self, conversation: Conversation) {
        self.conversations.retain(|c| c.id != conversation.id);
        self.conversations.insert(0, conversation);
        self.conversations.truncate(MAX_CONVERSATIONS);
    }

    pub fn remove(&mut self, id: Uuid) -> Option<Conversation> {
        let position = self.conversations.iter().position(|c| c.id == id)?;
        Some(self.conversations.remove(position))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let pruned: Vec<Conversation> = self.conversations.iter().map(Conversation::pruned).collect();
        serde_json::to_string(&pruned)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let mut conversations: Vec<Conversation> = serde_json::from_str(json)?;
        conversations.truncate(MAX_CONVERSATIONS);
        Ok(Self { conversations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::GenerateResponse;
    use crate::pipeline::AnswerType;

    fn result(text: &str, model: &str) -> AnalyzeResponse {
        AnalyzeResponse {
            config: Scenario::V2_0,
            anonymized: None,
            rephrased: None,
            local_search_chunks: vec![],
            generated: GenerateResponse {
                time: 1.0,
                text: text.to_string(),
                nb_token_input: 10,
                nb_token_output: 5,
            },
            model_name: model.to_string(),
            model_family: None,
            answer_type: AnswerType::Short,
        }
    }

    #[test]
    fn test_title_is_truncated() {
        let conversation = Conversation::new(&"a".repeat(80));
        assert_eq!(conversation.title.chars().count(), TITLE_MAX_CHARS + 1);
        assert_eq!(Conversation::new("Préavis ?").title, "Préavis ?");
    }

    #[test]
    fn test_single_followup_per_conversation() {
        let mut conversation = Conversation::new("Préavis ?");
        assert!(conversation.begin_followup("Et un cadre ?", None, None).is_err());

        conversation.record_answer(result("Un mois.", "mistral-large"));
        assert!(conversation.is_awaiting_followup);

        let body = conversation
            .begin_followup("Et un cadre ?", Some(Scenario::V2_0), Some("1486"))
            .unwrap();
        assert_eq!(body.query1.as_deref(), Some("Préavis ?"));
        assert_eq!(body.answer1.as_deref(), Some("Un mois."));
        assert_eq!(body.model_name.as_deref(), Some("mistral-large"));
        assert_eq!(body.config.as_deref(), Some("v2.0"));
        assert!(!conversation.is_awaiting_followup);

        conversation.record_answer(result("Trois mois.", "mistral-large"));
        assert!(!conversation.is_awaiting_followup);
        assert!(conversation.begin_followup("Encore ?", None, None).is_err());
        assert_eq!(conversation.first_assistant_answer.as_deref(), Some("Un mois."));
        assert_eq!(conversation.messages.len(), 4);
        assert!(conversation.messages[3].is_followup);
    }

    #[test]
    fn test_history_is_capped_most_recent_first() {
        let mut history = ConversationHistory::default();
        let mut ids = Vec::new();
        for i in 0..(MAX_CONVERSATIONS + 5) {
            let conversation = Conversation::new(&format!("Question {}", i));
            ids.push(conversation.id);
            history.upsert(conversation);
        }

        assert_eq!(history.conversations().len(), MAX_CONVERSATIONS);
        assert_eq!(history.conversations()[0].id, ids[ids.len() - 1]);
        assert!(history.get(ids[0]).is_none());
    }

    #[test]
    fn test_upsert_moves_existing_to_front() {
        let mut history = ConversationHistory::default();
        let first = Conversation::new("Q1");
        let second = Conversation::new("Q2");
        history.upsert(first.clone());
        history.upsert(second);

        history.upsert(first.clone());
        assert_eq!(history.conversations().len(), 2);
        assert_eq!(history.conversations()[0].id, first.id);
        assert_eq!(history.remove(first.id).map(|c| c.id), Some(first.id));
        assert_eq!(history.conversations().len(), 1);
    }

    #[test]
    fn test_persistence_prunes_api_results() {
        let mut history = ConversationHistory::default();
        let mut conversation = Conversation::new("Préavis ?");
        conversation.record_answer(result("Un mois.", "mistral-large"));
        let id = conversation.id;
        history.upsert(conversation);
        assert!(history.get(id).unwrap().last_api_result.is_some());

        let json = history.to_json().unwrap();
        assert!(!json.contains("lastApiResult"));
        assert!(json.contains("isAwaitingFollowup"));

        let restored = ConversationHistory::from_json(&json).unwrap();
        let restored = restored.get(id).unwrap();
        assert!(restored.last_api_result.is_none());
        assert!(restored.is_awaiting_followup);
        assert_eq!(restored.first_assistant_answer.as_deref(), Some("Un mois."));
    }

    #[test]
    fn test_get_mut_allows_followup_in_place() {
        let mut history = ConversationHistory::default();
        let mut conversation = Conversation::new("Q1");
        conversation.record_answer(result("R1", "albert-large"));
        let id = conversation.id;
        history.upsert(conversation);

        let body = history.get_mut(id).unwrap().begin_followup("Q2", None, None).unwrap();
        assert_eq!(body.model_name.as_deref(), Some("albert-large"));
        assert!(!history.get(id).unwrap().is_awaiting_followup);
    }
}
