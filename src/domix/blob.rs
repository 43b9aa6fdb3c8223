use crate::domix::config::API_ROOT;
use crate::http::build_upload_client;
use crate::staging::LocalFile;
use crate::upload::{BlobError, BlobStore, RemoteUrl};
use async_trait::async_trait;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use serde::Deserialize;
use tracing::debug;

/// Image storage behind `POST /api/upload`. Each call sends one file as the
/// multipart field `image`.
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    base_url: String,
    http: Client,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(alias = "image_url", alias = "imageUrl")]
    url: String,
}

impl HttpBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: build_upload_client(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(API_ROOT.as_str())
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(&self, file: &LocalFile) -> Result<RemoteUrl, BlobError> {
        let part = Part::bytes(file.bytes().to_vec())
            .file_name(file.name().to_string())
            .mime_str(file.content_type())
            .map_err(|err| BlobError::Request(err.to_string()))?;
        let form = Form::new().part("image", part);

        let response = self
            .http
            .post(format!("{}/api/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|err| BlobError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(BlobError::Status {
                status: response.status().as_u16(),
            });
        }

        let payload: UploadResponse = response
            .json()
            .await
            .map_err(|err| BlobError::InvalidResponse(err.to_string()))?;
        let url = payload.url.trim();
        if url.is_empty() {
            return Err(BlobError::InvalidResponse("empty url".into()));
        }
        debug!(target = "domix.client", name = file.name(), bytes = file.len(), "blob stored");
        Ok(url.to_string())
    }
}
