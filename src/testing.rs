//! Shared fakes for unit tests.

use crate::ad_service::{AdService, ReadError, SubmissionError};
use crate::models::{AdId, AdRecord, CreateAdRequest};
use crate::session::{AccountError, Credentials, Registration, UserDirectory, UserProfile};
use crate::staging::LocalFile;
use crate::upload::{BlobError, BlobStore, RemoteUrl};
use async_trait::async_trait;
use serde_json::json;
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

pub fn jpeg(stem: &str) -> LocalFile {
    LocalFile::new(
        format!("{stem}.jpg"),
        "image/jpeg",
        format!("jpeg-bytes-{stem}").into_bytes(),
    )
}

pub fn jpegs(stems: &[&str]) -> Vec<LocalFile> {
    stems.iter().map(|stem| jpeg(stem)).collect()
}

/// Stores files under `https://cdn.test/<name>` and records every upload.
#[derive(Default)]
pub struct FakeBlobStore {
    uploads: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeBlobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn uploaded(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn reset_log(&self) {
        self.uploads.lock().unwrap().clear();
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn upload(&self, file: &LocalFile) -> Result<RemoteUrl, BlobError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(file.name()) {
            return Err(BlobError::Status { status: 503 });
        }
        self.uploads.lock().unwrap().push(file.name().to_string());
        Ok(format!("https://cdn.test/{}", file.name()))
    }
}

/// Accepts every ad unless a rejection is queued, and keeps what it accepted.
#[derive(Default)]
pub struct FakeAdService {
    created: Mutex<Vec<(String, CreateAdRequest)>>,
    reject: Mutex<Option<SubmissionError>>,
}

impl FakeAdService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject_next(&self, err: SubmissionError) {
        *self.reject.lock().unwrap() = Some(err);
    }

    pub fn created(&self) -> Vec<(String, CreateAdRequest)> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdService for FakeAdService {
    async fn create_ad(
        &self,
        token: &str,
        request: &CreateAdRequest,
    ) -> Result<AdId, SubmissionError> {
        if let Some(err) = self.reject.lock().unwrap().take() {
            return Err(err);
        }
        let mut created = self.created.lock().unwrap();
        created.push((token.to_string(), request.clone()));
        Ok(AdId::new(created.len().to_string()))
    }

    async fn get_ad(&self, id: &AdId) -> Result<AdRecord, ReadError> {
        let created = self.created.lock().unwrap();
        let index = id
            .as_str()
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .ok_or(ReadError::NotFound)?;
        let (_, request) = created.get(index).ok_or(ReadError::NotFound)?;
        record_from(id.clone(), request)
    }

    async fn list_ads(&self) -> Result<Vec<AdRecord>, ReadError> {
        let created = self.created.lock().unwrap();
        created
            .iter()
            .enumerate()
            .map(|(i, (_, request))| record_from(AdId::new((i + 1).to_string()), request))
            .collect()
    }
}

fn record_from(id: AdId, request: &CreateAdRequest) -> Result<AdRecord, ReadError> {
    let mut value = serde_json::to_value(request)
        .map_err(|err| ReadError::InvalidResponse(err.to_string()))?;
    value["id"] = json!(id.as_str());
    value["createdAt"] = json!("2025-05-01T10:00:00Z");
    serde_json::from_value(value).map_err(|err| ReadError::InvalidResponse(err.to_string()))
}

/// Accepts any credentials; the profile endpoint rejects the token `expired`.
#[derive(Default)]
pub struct FakeUsers;

impl FakeUsers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl UserDirectory for FakeUsers {
    async fn login(&self, credentials: &Credentials) -> Result<String, AccountError> {
        if credentials.password.is_empty() {
            return Err(AccountError::InvalidCredentials);
        }
        Ok(format!("token-{}", credentials.email))
    }

    async fn register(&self, registration: &Registration) -> Result<String, AccountError> {
        Ok(format!("token-{}", registration.email))
    }

    async fn profile(&self, token: &str) -> Result<UserProfile, AccountError> {
        if token == "expired" {
            return Err(AccountError::Unauthorized);
        }
        Ok(UserProfile {
            username: Some("aigul".into()),
            email: Some("aigul@example.kg".into()),
            telefon_number: Some("+996555123456".into()),
            avatar_url: None,
        })
    }
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_stub(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}
