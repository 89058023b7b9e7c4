// Error types shared by the pipeline, the stores and the HTTP layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The external inference API answered with an error or could not be reached
    #[error("Inference API error: {0}")]
    Upstream(String),

    #[error("Erreur lors de l'anonymisation: {0}")]
    Anonymization(String),

    #[error("Erreur lors de la reformulation: {0}")]
    Reformulation(String),

    #[error("Erreur lors de la génération de la réponse: {0}")]
    Generation(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed body, rejected with 400
    #[error("{0}")]
    BadRequest(String),

    /// Well-formed body failing validation, rejected with 422
    #[error("{0}")]
    InvalidRequest(String),

    /// An optional backing service is not configured
    #[error("{0}")]
    Unavailable(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_)
            | AppError::Upstream(_)
            | AppError::Anonymization(_)
            | AppError::Reformulation(_)
            | AppError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message exposed to the client. Database details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) => "Internal server error".to_string(),
            AppError::Auth(_) => "Unauthorized".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        let body = json!({
            "success": false,
            "error": self.public_message(),
        });
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
