use crate::db::{ConversationRecord, NewConversation};
use crate::middleware::AuthorizedUser;
use crate::models::{AppState, SaveAction, SaveRequest, SaveResponse};
use crate::types::{AppError, AppResult};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, warn};
use uuid::Uuid;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/conversations/save", post(save_conversation))
        .route("/api/conversations/{id}", get(get_conversation))
        .with_state(state)
}

/// Record an answer, its followup or its feedback.
///
/// Without a database this is a successful no-op reporting `success: false`,
/// so clients never block on auditing.
pub async fn save_conversation(
    State(state): State<AppState>,
    user: Result<AuthorizedUser, AppError>,
    body: Result<Json<SaveRequest>, JsonRejection>,
) -> AppResult<Json<SaveResponse>> {
    let Some(store) = state.conversations.as_ref() else {
        warn!("Database not available, skipping conversation save");
        return Ok(Json(SaveResponse {
            success: false,
            conversation_id: None,
            error: Some("Database not available".to_string()),
        }));
    };

    let user = user?;
    let Json(body) = body.map_err(|e| AppError::InvalidRequest(e.body_text()))?;

    let not_found = || AppError::NotFound("Conversation not found".to_string());
    let conversation_id = match body.validate()? {
        SaveAction::Initial { question, response, idcc, model_name } => {
            let id = store
                .save_conversation(&NewConversation {
                    user_id: user.user_id.clone(),
                    department: user.department.clone(),
                    question,
                    response,
                    idcc,
                    model_name,
                })
                .await?;
            info!(conversation_id = %id, department = ?user.department, "Conversation saved");
            Some(id)
        }
        SaveAction::Followup { conversation_id, followup_question, followup_response } => {
            if !store
                .update_followup(
                    conversation_id,
                    &user.user_id,
                    &followup_question,
                    &followup_response,
                )
                .await?
            {
                return Err(not_found());
            }
            info!(conversation_id = %conversation_id, "Followup saved");
            None
        }
        SaveAction::Feedback { conversation_id, feedback_type, feedback_reasons } => {
            if !store
                .update_feedback(
                    conversation_id,
                    &user.user_id,
                    feedback_type,
                    feedback_reasons.as_deref(),
                )
                .await?
            {
                return Err(not_found());
            }
            info!(conversation_id = %conversation_id, feedback = feedback_type.as_str(), "Feedback saved");
            None
        }
    };

    Ok(Json(SaveResponse { success: true, conversation_id, error: None }))
}

/// A conversation, visible only to the user who saved it
pub async fn get_conversation(
    State(state): State<AppState>,
    user: AuthorizedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ConversationRecord>> {
    let store = state
        .conversations
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("Database not available".to_string()))?;

    match store.get_conversation(id).await? {
        Some(record) if record.user_id == user.user_id => Ok(Json(record)),
        _ => Err(AppError::NotFound("Conversation not found".to_string())),
    }
}
