use crate::models::{AdId, AdRecord, CreateAdRequest};
use async_trait::async_trait;
use thiserror::Error;

/// The marketplace backend: publishes drafts and serves published ads.
#[async_trait]
pub trait AdService: Send + Sync {
    async fn create_ad(&self, token: &str, request: &CreateAdRequest)
    -> Result<AdId, SubmissionError>;

    async fn get_ad(&self, id: &AdId) -> Result<AdRecord, ReadError>;

    async fn list_ads(&self) -> Result<Vec<AdRecord>, ReadError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("session expired, sign in again")]
    Unauthorized,
    /// The service explained the rejection; the message is shown as is.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("could not publish the ad, try again later")]
    Unavailable { detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("ad not found")]
    NotFound,
    #[error("ad request failed: {0}")]
    Request(String),
    #[error("ad response could not be decoded: {0}")]
    InvalidResponse(String),
}
