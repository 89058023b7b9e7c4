//! Session verification.
//!
//! The identity-provider handshake happens elsewhere; requests carry the
//! resulting HS256 token either in the `session` cookie or as a bearer token.

use crate::models::AppState;
use crate::types::{AppError, AppResult};
use crate::utils::{department_for_email, hash_email_for_user_id};
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub email: String,
    pub exp: usize,
}

#[derive(Clone)]
pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
    allowed_domains: Arc<Vec<String>>,
}

impl SessionVerifier {
    pub fn new(secret: &str, allowed_domains: Vec<String>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            allowed_domains: Arc::new(allowed_domains),
        }
    }

    /// Decode the token and check the email belongs to an allowed domain
    pub fn verify(&self, token: &str) -> AppResult<AuthorizedUser> {
        let claims = decode::<SessionClaims>(token, &self.key, &self.validation)
            .map_err(|e| AppError::Auth(format!("Invalid session token: {}", e)))?
            .claims;

        let department = department_for_email(&claims.email, &self.allowed_domains)
            .ok_or_else(|| AppError::Auth(format!("Email domain not allowed: {}", claims.email)))?;

        Ok(AuthorizedUser {
            user_id: hash_email_for_user_id(&claims.email),
            email: claims.email,
            department: Some(department),
        })
    }
}

/// Session token from the `session` cookie, else from `Authorization: Bearer`
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value);

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
    })
}

/// Authenticated user whose email domain is allowed
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizedUser {
    pub email: String,
    /// Hashed email
    pub user_id: String,
    pub department: Option<String>,
}

impl FromRequestParts<AppState> for AuthorizedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers)
            .ok_or_else(|| AppError::Auth("Missing session".to_string()))?;

        let user = state.sessions.verify(token)?;
        debug!(user_id = %user.user_id, "Session verified");
        Ok(user)
    }
}
