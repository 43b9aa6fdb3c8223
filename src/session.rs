use crate::models::ApiError;
use async_trait::async_trait;
use axum::{
    Json,
    body::Body,
    http::{self, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::{
    convert::Infallible,
    sync::{Arc, PoisonError, RwLock},
};
use thiserror::Error;
use tracing::info;

/// Credentials of the user authoring a draft.
///
/// Populated at login or registration and cleared on logout or when a
/// collaborator answers 401. Clones share the same slot.
#[derive(Clone, Default)]
pub struct AuthSession {
    token: Arc<RwLock<Option<String>>>,
}

impl AuthSession {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::default();
        session.sign_in(token);
        session
    }

    pub fn current_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_token().is_some()
    }

    pub fn sign_in(&self, token: impl Into<String>) {
        let token = token.into();
        let token = token.trim();
        let mut slot = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *slot = (!token.is_empty()).then(|| token.to_string());
    }

    pub fn sign_out(&self) {
        let mut slot = self.token.write().unwrap_or_else(PoisonError::into_inner);
        if slot.take().is_some() {
            info!(target = "domix.session", "session signed out");
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub telefon_number: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("not signed in")]
    Unauthorized,
    #[error("{0}")]
    Rejected(String),
    #[error("account request failed: {0}")]
    Request(String),
}

/// Account endpoints of the marketplace backend.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<String, AccountError>;

    async fn register(&self, registration: &Registration) -> Result<String, AccountError>;

    async fn profile(&self, token: &str) -> Result<UserProfile, AccountError>;
}

/// Loads the profile for the signed-in user. A 401 signs the session out.
pub async fn load_profile(
    users: &dyn UserDirectory,
    session: &AuthSession,
) -> Result<UserProfile, AccountError> {
    let token = session.current_token().ok_or(AccountError::Unauthorized)?;
    match users.profile(&token).await {
        Err(AccountError::Unauthorized) => {
            session.sign_out();
            Err(AccountError::Unauthorized)
        }
        other => other,
    }
}

/// Bearer token presented on a request, inserted by [`require_bearer`].
#[derive(Clone, Debug)]
pub struct BearerToken(pub String);

pub async fn require_bearer(
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Infallible> {
    let Some(token) = extract_bearer(request.headers()) else {
        let payload = ApiError {
            error: "unauthenticated".to_string(),
            detail: Some("Provide an Authorization: Bearer token".to_string()),
        };
        return Ok((StatusCode::UNAUTHORIZED, Json(payload)).into_response());
    };
    request.extensions_mut().insert(BearerToken(token));
    Ok(next.run(request).await)
}

fn extract_bearer(headers: &http::HeaderMap) -> Option<String> {
    let raw = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = raw.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim().to_string()).filter(|token| !token.is_empty())
}
