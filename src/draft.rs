//! Ad draft aggregate and the controller that drives it from editing to a
//! published ad.
//!
//! ```text
//! Idle ──submit──> Validating ──ok──> Uploading ──ok──> Submitting ──ok──> Succeeded ──> Idle
//!                      │                  │                  │
//!                      └──────────────────┴──────────────────┴──err──> Failed(reason)
//! Failed ──submit──> Validating  (cached remote URLs are kept)
//! ```
//!
//! A missing session token is reported before the draft leaves its current
//! state. Raising the controller's [`CancelSignal`] stops a submission before
//! its next network call and releases the draft.

use crate::ad_service::{AdService, SubmissionError};
use crate::attributes::{AttributeError, CategoryAttributes};
use crate::models::{AdCategory, AdId, CreateAdRequest, StageReport};
use crate::session::{AuthSession, UserProfile};
use crate::staging::{
    CapacityExceeded, ImageStagingManager, IndexOutOfRange, LocalFile, PreviewProvider,
};
use crate::upload::{BlobError, BlobStore, CancelSignal, UploadError, UploadPipeline};
use serde::Serialize;
use serde_json::json;
use std::{env, fmt, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Placeholder shown by the city picker before a choice is made.
pub const CITY_PLACEHOLDER: &str = "Город";

pub const CITIES: &[&str] = &[
    "Бишкек",
    "Чуй",
    "Талас",
    "Ош",
    "Баткен",
    "Джалал-Абад",
    "Иссык-Кол",
    "Нарын",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftPolicy {
    /// Reject drafts without at least one image.
    pub require_image: bool,
}

impl Default for DraftPolicy {
    fn default() -> Self {
        Self {
            require_image: true,
        }
    }
}

impl DraftPolicy {
    pub fn from_env() -> Self {
        Self {
            require_image: !parse_env_bool("DRAFT_ALLOW_NO_IMAGES"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn has_issue(&self, field: &str) -> bool {
        self.issues.iter().any(|issue| issue.field == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.issues.iter().map(|i| i.message.as_str()).collect();
        write!(f, "please fix the draft: {}", messages.join("; "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("sign in to publish an ad")]
    Unauthenticated,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("the draft was discarded")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubmissionState {
    #[default]
    Idle,
    Validating,
    Uploading,
    Submitting,
    Succeeded,
    Failed(SubmitError),
}

impl SubmissionState {
    pub fn name(&self) -> &'static str {
        match self {
            SubmissionState::Idle => "idle",
            SubmissionState::Validating => "validating",
            SubmissionState::Uploading => "uploading",
            SubmissionState::Submitting => "submitting",
            SubmissionState::Succeeded => "succeeded",
            SubmissionState::Failed(_) => "failed",
        }
    }

    pub fn failure(&self) -> Option<&SubmitError> {
        match self {
            SubmissionState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReport {
    pub ad_id: AdId,
    pub image_urls: Vec<String>,
    pub stages: Vec<StageReport>,
}

/// The ad being authored. Field values are kept as typed by the user and
/// only interpreted by [`AdDraft::validate`].
pub struct AdDraft {
    description: String,
    title: String,
    price: String,
    category: AdCategory,
    attributes: CategoryAttributes,
    city: String,
    phone: String,
    images: ImageStagingManager,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedDraft {
    pub price: f64,
}

impl AdDraft {
    pub fn new(previews: Arc<dyn PreviewProvider>) -> Self {
        let category = AdCategory::default();
        Self {
            description: String::new(),
            title: String::new(),
            price: String::new(),
            category,
            attributes: CategoryAttributes::empty(category),
            city: String::new(),
            phone: String::new(),
            images: ImageStagingManager::new(previews),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn price(&self) -> &str {
        &self.price
    }

    pub fn category(&self) -> AdCategory {
        self.category
    }

    pub fn attributes(&self) -> &CategoryAttributes {
        &self.attributes
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn images(&self) -> &ImageStagingManager {
        &self.images
    }

    pub fn set_description(&mut self, value: impl Into<String>) {
        self.description = value.into();
    }

    pub fn set_title(&mut self, value: impl Into<String>) {
        self.title = value.into();
    }

    pub fn set_price(&mut self, raw: impl Into<String>) {
        self.price = raw.into();
    }

    pub fn set_city(&mut self, value: impl Into<String>) {
        self.city = value.into();
    }

    pub fn set_phone(&mut self, value: impl Into<String>) {
        self.phone = value.into();
    }

    /// Switches the active attribute variant. Choosing a different category
    /// discards the old attribute values; re-selecting the current one keeps
    /// them. Returns whether values were discarded.
    pub fn select_category(&mut self, category: AdCategory) -> bool {
        if category == self.category {
            return false;
        }
        debug!(
            target = "domix.draft",
            from = %self.category,
            to = %category,
            "category switched"
        );
        self.category = category;
        self.attributes = CategoryAttributes::empty(category);
        true
    }

    pub fn set_attribute(&mut self, name: &str, raw: &str) -> Result<(), AttributeError> {
        self.attributes.set(name, raw)
    }

    pub fn validate(&self, policy: &DraftPolicy) -> Result<ValidatedDraft, ValidationError> {
        let mut issues = Vec::new();

        if self.description.trim().is_empty() {
            issues.push(FieldIssue::new("description", "description is required"));
        }

        let price = match self.price.trim() {
            "" => {
                issues.push(FieldIssue::new("price", "price is required"));
                None
            }
            raw => match raw.parse::<f64>() {
                Ok(value) if value.is_finite() && value > 0.0 => Some(value),
                _ => {
                    issues.push(FieldIssue::new(
                        "price",
                        "price must be a number greater than 0",
                    ));
                    None
                }
            },
        };

        let city = self.city.trim();
        if city.is_empty() || city == CITY_PLACEHOLDER {
            issues.push(FieldIssue::new("city", "city is required"));
        } else if !CITIES.contains(&city) {
            issues.push(FieldIssue::new("city", format!("unknown city `{city}`")));
        }

        for spec in self.attributes.missing_required() {
            issues.push(FieldIssue::new(
                spec.name,
                format!("{} is required", spec.label),
            ));
        }

        if policy.require_image && self.images.is_empty() {
            issues.push(FieldIssue::new("images", "add at least one image"));
        }

        match price {
            Some(price) if issues.is_empty() => Ok(ValidatedDraft { price }),
            _ => Err(ValidationError { issues }),
        }
    }

    fn payload(&self, validated: ValidatedDraft, image_urls: Vec<String>) -> CreateAdRequest {
        let title = self.title.trim();
        let phone = self.phone.trim();
        CreateAdRequest {
            title: (!title.is_empty()).then(|| title.to_string()),
            description: self.description.trim().to_string(),
            price: validated.price,
            category: self.category,
            city_tag: self.city.trim().to_string(),
            phone: (!phone.is_empty()).then(|| phone.to_string()),
            image_urls,
            category_attributes: self.attributes.clone(),
        }
    }

    /// Releases every staged image and restores the empty draft.
    pub fn reset(&mut self) {
        self.images.release_all();
        self.description.clear();
        self.title.clear();
        self.price.clear();
        self.category = AdCategory::default();
        self.attributes = CategoryAttributes::empty(self.category);
        self.city.clear();
        self.phone.clear();
    }
}

/// Owns one draft for the lifetime of an authoring session.
pub struct AdDraftController {
    session: AuthSession,
    pipeline: UploadPipeline,
    ads: Arc<dyn AdService>,
    policy: DraftPolicy,
    draft: AdDraft,
    state: SubmissionState,
    cancel: CancelSignal,
}

impl AdDraftController {
    pub fn new(
        session: AuthSession,
        previews: Arc<dyn PreviewProvider>,
        blob: Arc<dyn BlobStore>,
        ads: Arc<dyn AdService>,
        policy: DraftPolicy,
    ) -> Self {
        Self {
            session,
            pipeline: UploadPipeline::new(blob),
            ads,
            policy,
            draft: AdDraft::new(previews),
            state: SubmissionState::Idle,
            cancel: CancelSignal::new(),
        }
    }

    pub fn draft(&self) -> &AdDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut AdDraft {
        &mut self.draft
    }

    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Handle that abandons this draft from outside a running submit.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub fn add_images(&mut self, files: Vec<LocalFile>) -> Result<(), CapacityExceeded> {
        let requested = files.len();
        self.draft.images.add(files).inspect_err(|err| {
            warn!(target = "domix.draft", requested, error = %err, "images_rejected");
        })
    }

    pub fn remove_image(&mut self, index: usize) -> Result<(), IndexOutOfRange> {
        self.draft.images.remove_at(index).map(|_| ())
    }

    /// Uses the profile phone number unless the user already typed one.
    pub fn prefill_phone(&mut self, profile: &UserProfile) {
        if !self.draft.phone.trim().is_empty() {
            return;
        }
        if let Some(phone) = profile
            .telefon_number
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            self.draft.phone = phone.to_string();
        }
    }

    /// Validates, uploads missing images, and publishes the draft.
    ///
    /// On success the staged images are released and the draft is reset. On
    /// failure the draft stays editable and every remote URL obtained so far
    /// stays cached for the next attempt.
    pub async fn submit(&mut self) -> Result<SubmissionReport, SubmitError> {
        let Some(token) = self.session.current_token() else {
            warn!(target = "domix.draft", "submit_without_session");
            return Err(SubmitError::Unauthenticated);
        };
        if self.cancel.is_cancelled() {
            return Err(self.abandon());
        }
        let mut stages = Vec::new();

        self.transition(SubmissionState::Validating);
        let started = Instant::now();
        let validated = match self.draft.validate(&self.policy) {
            Ok(validated) => validated,
            Err(err) => return Err(self.fail(err.into())),
        };
        record_stage(
            &mut stages,
            "validate",
            started,
            json!({
                "category": self.draft.category,
                "price": validated.price,
                "images": self.draft.images.len(),
            }),
        );

        self.transition(SubmissionState::Uploading);
        let started = Instant::now();
        let assets = self.draft.images.snapshot();
        let cached = assets.iter().filter(|a| a.remote_url.is_some()).count();
        let image_urls = match self.pipeline.materialize(&assets, &self.cancel).await {
            Ok(urls) => urls,
            Err(err) if err.source == BlobError::Cancelled => return Err(self.abandon()),
            Err(err) => {
                self.draft.images.record_remote_urls(&err.resolved);
                return Err(self.fail(err.into()));
            }
        };
        self.draft.images.record_remote_urls(&image_urls);
        record_stage(
            &mut stages,
            "upload_images",
            started,
            json!({
                "count": image_urls.len(),
                "reused": cached,
                "cover": image_urls.first(),
            }),
        );

        if self.cancel.is_cancelled() {
            return Err(self.abandon());
        }
        self.transition(SubmissionState::Submitting);
        let started = Instant::now();
        let request = self.draft.payload(validated, image_urls.clone());
        let ad_id = match self.ads.create_ad(&token, &request).await {
            Ok(id) => id,
            Err(err) => {
                if err == SubmissionError::Unauthorized {
                    self.session.sign_out();
                }
                return Err(self.fail(err.into()));
            }
        };
        record_stage(
            &mut stages,
            "create_ad",
            started,
            json!({ "ad_id": ad_id }),
        );

        self.transition(SubmissionState::Succeeded);
        info!(
            target = "domix.draft",
            ad_id = %ad_id,
            category = %request.category,
            images = image_urls.len(),
            "ad published"
        );
        self.draft.reset();
        self.transition(SubmissionState::Idle);

        Ok(SubmissionReport {
            ad_id,
            image_urls,
            stages,
        })
    }

    /// Discards the draft: staged images are released and fields cleared.
    /// Also recovers a draft whose in-flight submit was abandoned.
    pub fn reset(&mut self) {
        self.draft.reset();
        self.transition(SubmissionState::Idle);
    }

    fn transition(&mut self, next: SubmissionState) {
        debug!(
            target = "domix.draft",
            from = self.state.name(),
            to = next.name(),
            "state transition"
        );
        crate::metrics::draft_transition(self.state.name(), next.name());
        self.state = next;
    }

    fn abandon(&mut self) -> SubmitError {
        info!(target = "domix.draft", state = self.state.name(), "submission abandoned");
        self.reset();
        SubmitError::Cancelled
    }

    fn fail(&mut self, err: SubmitError) -> SubmitError {
        warn!(target = "domix.draft", error = %err, "submission_failed");
        self.transition(SubmissionState::Failed(err.clone()));
        err
    }
}

fn record_stage(
    stages: &mut Vec<StageReport>,
    name: &'static str,
    started: Instant,
    output: serde_json::Value,
) {
    let elapsed_ms = started.elapsed().as_millis();
    crate::metrics::stage_elapsed(name, elapsed_ms);
    stages.push(StageReport::new(name, elapsed_ms, output));
}

fn parse_env_bool(key: &str) -> bool {
    env::var(key)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}
