use crate::staging::{ImageAsset, LocalFile};
use async_trait::async_trait;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};
use thiserror::Error;
use tracing::{debug, info, warn};

pub type RemoteUrl = String;

/// Durable storage for staged images. One call stores one file.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, file: &LocalFile) -> Result<RemoteUrl, BlobError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlobError {
    #[error("upload rejected with HTTP {status}")]
    Status { status: u16 },
    #[error("upload request failed: {0}")]
    Request(String),
    #[error("upload returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("upload cancelled")]
    Cancelled,
}

/// Raised once the owner of a submission no longer wants its result. Clones
/// share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// First failed upload of a batch, with the URLs obtained before it.
/// `resolved` is aligned with the start of the input sequence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("image {} of {} failed to upload: {}", .failed_index + 1, .total, .source)]
pub struct UploadError {
    pub failed_index: usize,
    pub total: usize,
    pub resolved: Vec<RemoteUrl>,
    pub source: BlobError,
}

#[derive(Clone)]
pub struct UploadPipeline {
    blob: Arc<dyn BlobStore>,
}

impl UploadPipeline {
    pub fn new(blob: Arc<dyn BlobStore>) -> Self {
        Self { blob }
    }

    /// Resolves a remote URL for every asset, in order. Assets that already
    /// carry a URL are passed through; the rest are uploaded one at a time.
    /// Stops at the first failure, or before the next upload once `cancel`
    /// is raised.
    pub async fn materialize(
        &self,
        assets: &[ImageAsset],
        cancel: &CancelSignal,
    ) -> Result<Vec<RemoteUrl>, UploadError> {
        let started = Instant::now();
        let mut resolved = Vec::with_capacity(assets.len());
        let mut uploaded = 0usize;

        for (index, asset) in assets.iter().enumerate() {
            if let Some(url) = &asset.remote_url {
                debug!(target = "domix.upload", index, url = %url, "reusing uploaded image");
                resolved.push(url.clone());
                continue;
            }
            if cancel.is_cancelled() {
                info!(target = "domix.upload", index, "upload cancelled");
                return Err(UploadError {
                    failed_index: index,
                    total: assets.len(),
                    resolved,
                    source: BlobError::Cancelled,
                });
            }
            match self.blob.upload(&asset.file).await {
                Ok(url) => {
                    debug!(
                        target = "domix.upload",
                        index,
                        name = asset.file.name(),
                        url = %url,
                        "image uploaded"
                    );
                    uploaded += 1;
                    resolved.push(url);
                }
                Err(err) => {
                    warn!(
                        target = "domix.upload",
                        index,
                        name = asset.file.name(),
                        error = %err,
                        "image_upload_failed"
                    );
                    return Err(UploadError {
                        failed_index: index,
                        total: assets.len(),
                        resolved,
                        source: err,
                    });
                }
            }
        }

        let elapsed_ms = started.elapsed().as_millis();
        info!(
            target = "domix.upload",
            total = assets.len(),
            uploaded,
            reused = assets.len() - uploaded,
            elapsed_ms = elapsed_ms as u64,
            "images materialized"
        );
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::{ImageStagingManager, PreviewRegistry};
    use crate::testing::{FakeBlobStore, jpegs};

    fn staged(names: &[&str]) -> ImageStagingManager {
        let mut staging = ImageStagingManager::new(PreviewRegistry::new());
        staging.add(jpegs(names)).unwrap();
        staging
    }

    #[tokio::test]
    async fn urls_follow_input_order() {
        let blob = FakeBlobStore::new();
        let pipeline = UploadPipeline::new(blob.clone());
        let staging = staged(&["cover", "kitchen", "yard"]);
        let urls = pipeline
            .materialize(&staging.snapshot(), &CancelSignal::new())
            .await
            .unwrap();
        assert_eq!(
            urls,
            vec![
                "https://cdn.test/cover.jpg",
                "https://cdn.test/kitchen.jpg",
                "https://cdn.test/yard.jpg",
            ]
        );
        assert_eq!(blob.uploaded(), vec!["cover.jpg", "kitchen.jpg", "yard.jpg"]);
    }

    #[tokio::test]
    async fn cached_urls_are_not_uploaded_again() {
        let blob = FakeBlobStore::new();
        let pipeline = UploadPipeline::new(blob.clone());
        let mut staging = staged(&["a", "b"]);
        staging.record_remote_urls(&["https://old.cdn/a.jpg".to_string()]);
        let urls = pipeline
            .materialize(&staging.snapshot(), &CancelSignal::new())
            .await
            .unwrap();
        assert_eq!(urls, vec!["https://old.cdn/a.jpg", "https://cdn.test/b.jpg"]);
        assert_eq!(blob.uploaded(), vec!["b.jpg"]);
    }

    #[tokio::test]
    async fn first_failure_aborts_with_partial_results() {
        let blob = FakeBlobStore::new();
        blob.fail_on("b.jpg");
        let pipeline = UploadPipeline::new(blob.clone());
        let staging = staged(&["a", "b", "c"]);
        let err = pipeline
            .materialize(&staging.snapshot(), &CancelSignal::new())
            .await
            .unwrap_err();
        assert_eq!(err.failed_index, 1);
        assert_eq!(err.total, 3);
        assert_eq!(err.resolved, vec!["https://cdn.test/a.jpg"]);
        assert_eq!(blob.uploaded(), vec!["a.jpg"]);
        assert_eq!(
            err.to_string(),
            "image 2 of 3 failed to upload: upload rejected with HTTP 503"
        );
    }

    #[tokio::test]
    async fn raised_signal_stops_before_the_next_upload() {
        let blob = FakeBlobStore::new();
        let pipeline = UploadPipeline::new(blob.clone());
        let mut staging = staged(&["a", "b"]);
        staging.record_remote_urls(&["https://old.cdn/a.jpg".to_string()]);
        let cancel = CancelSignal::new();
        cancel.cancel();
        let err = pipeline
            .materialize(&staging.snapshot(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.source, BlobError::Cancelled);
        assert_eq!(err.failed_index, 1);
        assert_eq!(err.resolved, vec!["https://old.cdn/a.jpg"]);
        assert!(blob.uploaded().is_empty());
    }

    #[tokio::test]
    async fn empty_input_resolves_to_nothing() {
        let blob = FakeBlobStore::new();
        let pipeline = UploadPipeline::new(blob.clone());
        let urls = pipeline.materialize(&[], &CancelSignal::new()).await.unwrap();
        assert!(urls.is_empty());
        assert!(blob.uploaded().is_empty());
    }
}
