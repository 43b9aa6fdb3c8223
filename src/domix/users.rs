use crate::domix::{config::API_ROOT, error_message};
use crate::http::build_client;
use crate::session::{AccountError, Credentials, Registration, UserDirectory, UserProfile};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct HttpUserDirectory {
    base_url: String,
    http: Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(alias = "accessToken", alias = "access_token")]
    token: String,
}

impl HttpUserDirectory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: build_client(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(API_ROOT.as_str())
    }

    async fn issue_token<T: serde::Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<String, AccountError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|err| AccountError::Request(err.to_string()))?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AccountError::InvalidCredentials);
        }
        let response = reject_unless_success(response).await?;
        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|err| AccountError::Request(err.to_string()))?;
        if payload.token.trim().is_empty() {
            return Err(AccountError::Request("empty token".into()));
        }
        Ok(payload.token)
    }
}

async fn reject_unless_success(response: Response) -> Result<Response, AccountError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(target = "domix.client", status = status.as_u16(), "account request rejected");
    Err(match error_message(&body) {
        Some(message) if status.is_client_error() => AccountError::Rejected(message),
        Some(message) => AccountError::Request(message),
        None => AccountError::Request(format!("HTTP {status}")),
    })
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn login(&self, credentials: &Credentials) -> Result<String, AccountError> {
        self.issue_token("/users/login", credentials).await
    }

    async fn register(&self, registration: &Registration) -> Result<String, AccountError> {
        self.issue_token("/users/register", registration).await
    }

    async fn profile(&self, token: &str) -> Result<UserProfile, AccountError> {
        let response = self
            .http
            .get(format!("{}/users/profile", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| AccountError::Request(err.to_string()))?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(AccountError::Unauthorized);
        }
        let response = reject_unless_success(response).await?;
        response
            .json()
            .await
            .map_err(|err| AccountError::Request(err.to_string()))
    }
}
