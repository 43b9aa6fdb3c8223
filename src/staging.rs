//! Locally selected images and the preview resources that let a client show
//! them before anything is uploaded.
//!
//! Every staged image owns a [`PreviewLease`]. Dropping the lease revokes the
//! preview, and the only owner of leases is [`ImageStagingManager`], so a
//! preview is released exactly once whether the image is removed, the draft is
//! reset, or the manager itself goes away.

use serde::Serialize;
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub const MAX_IMAGES: usize = 5;

const PREVIEW_SCHEME: &str = "preview:";

/// A file picked by the user and held in memory until it is uploaded.
#[derive(Clone)]
pub struct LocalFile {
    name: String,
    content_type: String,
    bytes: Arc<[u8]>,
}

impl LocalFile {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes: Arc::from(bytes.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for LocalFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFile")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

pub fn content_type_for(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PreviewUri(String);

impl PreviewUri {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part after the `preview:` scheme, used in preview URLs.
    pub fn id(&self) -> &str {
        self.0.strip_prefix(PREVIEW_SCHEME).unwrap_or(&self.0)
    }
}

impl fmt::Display for PreviewUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creates and revokes the transient handles used to display staged files.
pub trait PreviewProvider: Send + Sync {
    fn create(&self, file: &LocalFile) -> PreviewUri;
    fn revoke(&self, uri: &PreviewUri);
}

struct PreviewLease {
    uri: PreviewUri,
    provider: Arc<dyn PreviewProvider>,
}

impl Drop for PreviewLease {
    fn drop(&mut self) {
        self.provider.revoke(&self.uri);
    }
}

#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub file: LocalFile,
    pub preview_uri: PreviewUri,
    pub remote_url: Option<String>,
}

struct StagedImage {
    asset: ImageAsset,
    lease: PreviewLease,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("at most {limit} images can be attached ({current} already added, {requested} more selected)")]
pub struct CapacityExceeded {
    pub limit: usize,
    pub current: usize,
    pub requested: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("image index {index} is out of range ({len} images staged)")]
pub struct IndexOutOfRange {
    pub index: usize,
    pub len: usize,
}

/// Ordered set of staged images, capped at [`MAX_IMAGES`].
pub struct ImageStagingManager {
    provider: Arc<dyn PreviewProvider>,
    staged: Vec<StagedImage>,
}

impl ImageStagingManager {
    pub fn new(provider: Arc<dyn PreviewProvider>) -> Self {
        Self {
            provider,
            staged: Vec::with_capacity(MAX_IMAGES),
        }
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn remaining_capacity(&self) -> usize {
        MAX_IMAGES - self.staged.len()
    }

    /// Appends `files` in order, one preview each. Either every file is
    /// staged or none is.
    pub fn add(&mut self, files: Vec<LocalFile>) -> Result<(), CapacityExceeded> {
        if self.staged.len() + files.len() > MAX_IMAGES {
            return Err(CapacityExceeded {
                limit: MAX_IMAGES,
                current: self.staged.len(),
                requested: files.len(),
            });
        }
        for file in files {
            let preview_uri = self.provider.create(&file);
            debug!(
                target = "domix.staging",
                name = file.name(),
                preview = %preview_uri,
                "image staged"
            );
            let lease = PreviewLease {
                uri: preview_uri.clone(),
                provider: self.provider.clone(),
            };
            self.staged.push(StagedImage {
                asset: ImageAsset {
                    file,
                    preview_uri,
                    remote_url: None,
                },
                lease,
            });
        }
        Ok(())
    }

    /// Removes the image at `index`, releasing its preview. Later images move
    /// down by one.
    pub fn remove_at(&mut self, index: usize) -> Result<ImageAsset, IndexOutOfRange> {
        if index >= self.staged.len() {
            return Err(IndexOutOfRange {
                index,
                len: self.staged.len(),
            });
        }
        let StagedImage { asset, lease } = self.staged.remove(index);
        drop(lease);
        debug!(
            target = "domix.staging",
            index,
            preview = %asset.preview_uri,
            "image removed"
        );
        Ok(asset)
    }

    pub fn release_all(&mut self) {
        let released = self.staged.len();
        self.staged.clear();
        if released > 0 {
            debug!(target = "domix.staging", released, "staged images released");
        }
    }

    pub fn snapshot(&self) -> Vec<ImageAsset> {
        self.assets().cloned().collect()
    }

    pub fn assets(&self) -> impl Iterator<Item = &ImageAsset> {
        self.staged.iter().map(|staged| &staged.asset)
    }

    pub fn get(&self, index: usize) -> Option<&ImageAsset> {
        self.staged.get(index).map(|staged| &staged.asset)
    }

    /// Caches positional remote URLs. `urls` may be shorter than the staged
    /// sequence when only a prefix was uploaded.
    pub fn record_remote_urls(&mut self, urls: &[String]) {
        for (staged, url) in self.staged.iter_mut().zip(urls) {
            staged.asset.remote_url = Some(url.clone());
        }
    }

    pub fn all_uploaded(&self) -> bool {
        self.assets().all(|asset| asset.remote_url.is_some())
    }

    pub fn preview_uris(&self) -> Vec<PreviewUri> {
        self.staged.iter().map(|staged| staged.lease.uri.clone()).collect()
    }
}

/// In-memory preview provider. Keeps the bytes of every live preview so they
/// can be served back to the client, and counts acquisitions and releases.
#[derive(Default)]
pub struct PreviewRegistry {
    live: Mutex<HashMap<String, LocalFile>>,
    created: AtomicUsize,
    revoked: AtomicUsize,
}

impl PreviewRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn revoked_count(&self) -> usize {
        self.revoked.load(Ordering::SeqCst)
    }

    pub fn get(&self, id: &str) -> Option<LocalFile> {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}

impl PreviewProvider for PreviewRegistry {
    fn create(&self, file: &LocalFile) -> PreviewUri {
        let id = Uuid::new_v4().simple().to_string();
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), file.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        PreviewUri(format!("{PREVIEW_SCHEME}{id}"))
    }

    fn revoke(&self, uri: &PreviewUri) {
        let removed = self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uri.id());
        if removed.is_some() {
            self.revoked.fetch_add(1, Ordering::SeqCst);
        } else {
            warn!(
                target = "domix.staging",
                preview = %uri,
                "preview revoked twice or never created"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{jpeg, jpegs};
    use rand::{Rng, SeedableRng, rngs::SmallRng};

    fn manager() -> (Arc<PreviewRegistry>, ImageStagingManager) {
        let registry = PreviewRegistry::new();
        let staging = ImageStagingManager::new(registry.clone());
        (registry, staging)
    }

    fn names(staging: &ImageStagingManager) -> Vec<String> {
        staging.assets().map(|a| a.file.name().to_string()).collect()
    }

    #[test]
    fn add_creates_one_preview_per_file_in_order() {
        let (registry, mut staging) = manager();
        staging.add(jpegs(&["a", "b", "c"])).unwrap();
        assert_eq!(names(&staging), vec!["a.jpg", "b.jpg", "c.jpg"]);
        assert_eq!(registry.live_count(), 3);
        assert_eq!(registry.created_count(), 3);
        for uri in staging.preview_uris() {
            assert!(registry.get(uri.id()).is_some());
        }
    }

    #[test]
    fn add_is_all_or_nothing() {
        let (registry, mut staging) = manager();
        staging.add(jpegs(&["a", "b", "c"])).unwrap();
        let err = staging.add(jpegs(&["d", "e", "f"])).unwrap_err();
        assert_eq!(
            err,
            CapacityExceeded {
                limit: 5,
                current: 3,
                requested: 3
            }
        );
        assert_eq!(staging.len(), 3);
        assert_eq!(registry.live_count(), 3);
        assert_eq!(registry.created_count(), 3);
    }

    #[test]
    fn six_at_once_is_rejected() {
        let (registry, mut staging) = manager();
        let err = staging
            .add(jpegs(&["1", "2", "3", "4", "5", "6"]))
            .unwrap_err();
        assert_eq!(err.requested, 6);
        assert!(staging.is_empty());
        assert_eq!(registry.created_count(), 0);
    }

    #[test]
    fn remove_releases_and_shifts() {
        let (registry, mut staging) = manager();
        staging.add(jpegs(&["a", "b", "c"])).unwrap();
        staging.record_remote_urls(&["https://cdn/a".into(), "https://cdn/b".into()]);
        let removed = staging.remove_at(1).unwrap();
        assert_eq!(removed.file.name(), "b.jpg");
        assert!(registry.get(removed.preview_uri.id()).is_none());
        assert_eq!(names(&staging), vec!["a.jpg", "c.jpg"]);
        assert_eq!(staging.get(0).unwrap().remote_url.as_deref(), Some("https://cdn/a"));
        assert_eq!(staging.get(1).unwrap().remote_url, None);
        assert_eq!(registry.live_count(), 2);
    }

    #[test]
    fn remove_out_of_range_changes_nothing() {
        let (registry, mut staging) = manager();
        staging.add(vec![jpeg("a")]).unwrap();
        assert_eq!(
            staging.remove_at(1).unwrap_err(),
            IndexOutOfRange { index: 1, len: 1 }
        );
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn release_all_and_drop_release_everything_once() {
        let (registry, mut staging) = manager();
        staging.add(jpegs(&["a", "b"])).unwrap();
        staging.release_all();
        assert!(staging.is_empty());
        assert_eq!(registry.live_count(), 0);
        staging.add(jpegs(&["c", "d"])).unwrap();
        drop(staging);
        assert_eq!(registry.live_count(), 0);
        assert_eq!(registry.created_count(), 4);
        assert_eq!(registry.revoked_count(), 4);
    }

    #[test]
    fn partial_remote_urls_fill_a_prefix() {
        let (_registry, mut staging) = manager();
        staging.add(jpegs(&["a", "b", "c"])).unwrap();
        staging.record_remote_urls(&["https://cdn/a".into()]);
        assert!(!staging.all_uploaded());
        let uploaded: Vec<_> = staging.assets().map(|a| a.remote_url.is_some()).collect();
        assert_eq!(uploaded, vec![true, false, false]);
    }

    #[test]
    fn random_add_remove_sequences_never_leak() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        for round in 0..200 {
            let (registry, mut staging) = manager();
            for step in 0..40 {
                if rng.random_bool(0.55) {
                    let count = rng.random_range(1..=3);
                    let files: Vec<_> = (0..count)
                        .map(|i| jpeg(&format!("r{round}-s{step}-{i}")))
                        .collect();
                    let before = staging.len();
                    match staging.add(files) {
                        Ok(()) => assert_eq!(staging.len(), before + count),
                        Err(_) => {
                            assert!(before + count > MAX_IMAGES);
                            assert_eq!(staging.len(), before);
                        }
                    }
                } else if !staging.is_empty() {
                    let index = rng.random_range(0..staging.len());
                    staging.remove_at(index).unwrap();
                }
                assert!(staging.len() <= MAX_IMAGES);
                assert_eq!(registry.live_count(), staging.len());
                assert_eq!(
                    registry.created_count() - registry.revoked_count(),
                    staging.len()
                );
            }
            drop(staging);
            assert_eq!(registry.live_count(), 0);
            assert_eq!(registry.created_count(), registry.revoked_count());
        }
    }

    #[test]
    fn content_type_from_extension() {
        assert_eq!(content_type_for("house.JPG"), "image/jpeg");
        assert_eq!(content_type_for("plan.png"), "image/png");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
