use crate::models::FeedbackType;
use crate::types::AppResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

/// One audited question/answer exchange
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ConversationRecord {
    pub id: Uuid,
    /// Hashed email, never the address itself
    pub user_id: String,
    pub department: Option<String>,
    pub question: String,
    pub response: String,
    pub followup_question: Option<String>,
    pub followup_response: Option<String>,
    pub feedback_type: Option<String>,
    pub feedback_reasons: Option<String>,
    pub idcc: Option<String>,
    pub model_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewConversation {
    pub user_id: String,
    pub department: Option<String>,
    pub question: String,
    pub response: String,
    pub idcc: Option<String>,
    pub model_name: Option<String>,
}

#[derive(Clone)]
pub struct ConversationStore {
    pool: PgPool,
}

impl ConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn save_conversation(&self, conversation: &NewConversation) -> AppResult<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO conversations (
                id, user_id, department, question, response,
                followup_question, followup_response, feedback_type, feedback_reasons,
                idcc, model_name
            )
            VALUES ($1, $2, $3, $4, $5, NULL, NULL, NULL, NULL, $6, $7)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&conversation.user_id)
        .bind(&conversation.department)
        .bind(&conversation.question)
        .bind(&conversation.response)
        .bind(&conversation.idcc)
        .bind(&conversation.model_name)
        .fetch_one(&self.pool)
        .await?;

        debug!(conversation_id = %id, "Conversation saved");
        Ok(id)
    }

    /// Returns whether `user_id` owns a conversation with this id
    pub async fn update_followup(
        &self,
        id: Uuid,
        user_id: &str,
        followup_question: &str,
        followup_response: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET followup_question = $1, followup_response = $2, updated_at = NOW()
            WHERE id = $3 AND user_id = $4
            "#,
        )
        .bind(followup_question)
        .bind(followup_response)
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Returns whether `user_id` owns a conversation with this id
    pub async fn update_feedback(
        &self,
        id: Uuid,
        user_id: &str,
        feedback_type: FeedbackType,
        feedback_reasons: Option<&str>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET feedback_type = $1, feedback_reasons = $2, updated_at = NOW()
            WHERE id = $3 AND user_id = $4
            "#,
        )
        .bind(feedback_type.as_str())
        .bind(feedback_reasons)
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_conversation(&self, id: Uuid) -> AppResult<Option<ConversationRecord>> {
        let record = sqlx::query_as::<_, ConversationRecord>("SELECT * FROM conversations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::test_store;
    use super::*;

    fn conversation(user_id: &str) -> NewConversation {
        NewConversation {
            user_id: user_id.to_string(),
            department: Some("59".to_string()),
            question: "Préavis ?".to_string(),
            response: "Un mois.".to_string(),
            idcc: None,
            model_name: Some("mistral-large".to_string()),
        }
    }

    #[tokio::test]
    async fn test_updates_are_scoped_to_owner() {
        let Some(store) = test_store().await else { return };
        let id = store.save_conversation(&conversation("owner-hash")).await.unwrap();

        assert!(!store.update_followup(id, "intruder-hash", "Q2", "R2").await.unwrap());
        assert!(!store
            .update_feedback(id, "intruder-hash", FeedbackType::Negative, None)
            .await
            .unwrap());
        let record = store.get_conversation(id).await.unwrap().unwrap();
        assert!(record.followup_question.is_none());
        assert!(record.feedback_type.is_none());

        assert!(store.update_followup(id, "owner-hash", "Q2", "R2").await.unwrap());
        assert!(store
            .update_feedback(id, "owner-hash", FeedbackType::Positive, Some("clair"))
            .await
            .unwrap());
        let record = store.get_conversation(id).await.unwrap().unwrap();
        assert_eq!(record.followup_response.as_deref(), Some("R2"));
        assert_eq!(record.feedback_type.as_deref(), Some("positive"));
    }

    #[tokio::test]
    async fn test_update_unknown_id_reports_missing() {
        let Some(store) = test_store().await else { return };
        assert!(!store.update_followup(Uuid::new_v4(), "owner-hash", "Q2", "R2").await.unwrap());
    }
}
