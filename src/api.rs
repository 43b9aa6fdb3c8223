//! HTTP surface hosting authoring sessions.
//!
//! Public routes serve health, metrics, account login, the category
//! schemas, published ads, and preview bytes. Everything under `/drafts`
//! requires `Authorization: Bearer <token>`; the presented token becomes the
//! draft's session.

use crate::ad_service::{AdService, ReadError, SubmissionError};
use crate::attributes::{AttributeError, CategoryAttributes};
use crate::detail::{AdDetail, AdSummary, render_detail, summarize};
use crate::draft::{AdDraftController, DraftPolicy, SubmissionReport, SubmitError};
use crate::models::{AdCategory, AdId, ApiError};
use crate::schema::{FieldSpec, schema_for};
use crate::session::{
    AccountError, AuthSession, BearerToken, Credentials, Registration, UserDirectory,
    load_profile, require_bearer,
};
use crate::staging::{LocalFile, PreviewRegistry, content_type_for};
use crate::store::{DraftStore, SharedDraft};
use crate::upload::BlobStore;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Extension, Path, State},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{collections::BTreeMap, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub store: DraftStore,
    pub previews: Arc<PreviewRegistry>,
    pub blob: Arc<dyn BlobStore>,
    pub ads: Arc<dyn AdService>,
    pub users: Arc<dyn UserDirectory>,
    pub policy: DraftPolicy,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    fn new_controller(&self, session: AuthSession) -> AdDraftController {
        AdDraftController::new(
            session,
            self.previews.clone(),
            self.blob.clone(),
            self.ads.clone(),
            self.policy,
        )
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let protected = Router::new()
        .route("/drafts", post(create_draft))
        .route(
            "/drafts/{id}",
            get(get_draft).patch(update_draft).delete(discard_draft),
        )
        .route("/drafts/{id}/images", post(add_images))
        .route("/drafts/{id}/images/{index}", delete(remove_image))
        .route("/drafts/{id}/submit", post(submit_draft))
        .route_layer(middleware::from_fn(require_bearer));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/categories", get(list_categories))
        .route("/categories/{category}/schema", get(category_schema))
        .route("/ads", get(list_ads))
        .route("/ads/{id}", get(get_ad))
        .route("/previews/{id}", get(get_preview))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit_from_env()))
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(32 * 1024 * 1024)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "domix-drafts",
    }))
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    let body = state
        .prometheus
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    token: String,
}

async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<TokenResponse>, AppError> {
    crate::metrics::inc_requests("/auth/login");
    let token = state.users.login(&credentials).await?;
    Ok(Json(TokenResponse { token }))
}

async fn register(
    State(state): State<AppState>,
    Json(registration): Json<Registration>,
) -> Result<(StatusCode, Json<TokenResponse>), AppError> {
    crate::metrics::inc_requests("/auth/register");
    let token = state.users.register(&registration).await?;
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

#[derive(Debug, Serialize)]
struct CategoryView {
    category: AdCategory,
    slug: &'static str,
    fields: &'static [FieldSpec],
}

impl CategoryView {
    fn of(category: AdCategory) -> Self {
        Self {
            category,
            slug: category.slug(),
            fields: schema_for(category),
        }
    }
}

async fn list_categories() -> Json<Vec<CategoryView>> {
    Json(AdCategory::ALL.into_iter().map(CategoryView::of).collect())
}

async fn category_schema(Path(raw): Path<String>) -> Result<Json<CategoryView>, AppError> {
    let category = AdCategory::from_label(&raw).ok_or(AppError::NotFound("category"))?;
    Ok(Json(CategoryView::of(category)))
}

async fn list_ads(State(state): State<AppState>) -> Result<Json<Vec<AdSummary>>, AppError> {
    crate::metrics::inc_requests("/ads");
    let records = state.ads.list_ads().await?;
    Ok(Json(records.iter().map(summarize).collect()))
}

async fn get_ad(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AdDetail>, AppError> {
    crate::metrics::inc_requests("/ads/{id}");
    let record = state.ads.get_ad(&AdId::new(id)).await?;
    Ok(Json(render_detail(&record)?))
}

async fn get_preview(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let file = state.previews.get(&id).ok_or(AppError::NotFound("preview"))?;
    Ok((
        [(header::CONTENT_TYPE, file.content_type().to_string())],
        file.bytes().to_vec(),
    )
        .into_response())
}

#[derive(Debug, Serialize)]
struct ImageView {
    index: usize,
    name: String,
    preview_url: String,
    remote_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct DraftView {
    id: Uuid,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<String>,
    title: String,
    description: String,
    price: String,
    category: AdCategory,
    attributes: CategoryAttributes,
    city: String,
    phone: String,
    images: Vec<ImageView>,
    remaining_capacity: usize,
}

impl DraftView {
    fn of(id: Uuid, controller: &AdDraftController) -> Self {
        let draft = controller.draft();
        let images = draft
            .images()
            .assets()
            .enumerate()
            .map(|(index, asset)| ImageView {
                index,
                name: asset.file.name().to_string(),
                preview_url: format!("/previews/{}", asset.preview_uri.id()),
                remote_url: asset.remote_url.clone(),
            })
            .collect();
        Self {
            id,
            state: controller.state().name(),
            failure: controller.state().failure().map(ToString::to_string),
            title: draft.title().to_string(),
            description: draft.description().to_string(),
            price: draft.price().to_string(),
            category: draft.category(),
            attributes: draft.attributes().clone(),
            city: draft.city().to_string(),
            phone: draft.phone().to_string(),
            images,
            remaining_capacity: draft.images().remaining_capacity(),
        }
    }
}

/// Opens a draft and pre-fills the phone number from the user's profile.
async fn create_draft(
    State(state): State<AppState>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> Result<(StatusCode, Json<DraftView>), AppError> {
    crate::metrics::inc_requests("/drafts");
    let session = AuthSession::with_token(token.clone());
    let profile = match load_profile(state.users.as_ref(), &session).await {
        Ok(profile) => Some(profile),
        Err(AccountError::Unauthorized) => return Err(AppError::Unauthorized),
        Err(err) => {
            warn!(target = "domix.api", error = %err, "profile_unavailable");
            None
        }
    };

    let mut controller = state.new_controller(session);
    if let Some(profile) = &profile {
        controller.prefill_phone(profile);
    }
    let (id, shared) = state.store.insert(&token, controller).await;
    info!(target = "domix.api", draft_id = %id, "draft opened");
    let view = DraftView::of(id, &*shared.lock().await);
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_draft(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> Result<Json<DraftView>, AppError> {
    let shared = find_draft(&state, id, &token).await?;
    let controller = shared.lock().await;
    Ok(Json(DraftView::of(id, &controller)))
}

#[derive(Debug, Default, Deserialize)]
struct DraftPatch {
    title: Option<String>,
    description: Option<String>,
    /// Raw price text; interpreted at validation.
    price: Option<Value>,
    category: Option<AdCategory>,
    city: Option<String>,
    phone: Option<String>,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
}

async fn update_draft(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(BearerToken(token)): Extension<BearerToken>,
    Json(patch): Json<DraftPatch>,
) -> Result<Json<DraftView>, AppError> {
    let shared = find_draft(&state, id, &token).await?;
    let mut controller = shared.lock().await;
    let draft = controller.draft_mut();

    if let Some(category) = patch.category {
        draft.select_category(category);
    }
    if let Some(title) = patch.title {
        draft.set_title(title);
    }
    if let Some(description) = patch.description {
        draft.set_description(description);
    }
    if let Some(price) = patch.price {
        draft.set_price(raw_text(&price));
    }
    if let Some(city) = patch.city {
        draft.set_city(city);
    }
    if let Some(phone) = patch.phone {
        draft.set_phone(phone);
    }
    for (name, value) in &patch.attributes {
        draft.set_attribute(name, &raw_text(value))?;
    }
    Ok(Json(DraftView::of(id, &controller)))
}

fn raw_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

async fn discard_draft(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> Result<StatusCode, AppError> {
    if state.store.discard(id, &token).await {
        info!(target = "domix.api", draft_id = %id, "draft discarded");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("draft"))
    }
}

#[derive(Debug, Deserialize)]
struct ImageUpload {
    name: String,
    #[serde(default)]
    content_type: Option<String>,
    data_base64: String,
}

#[derive(Debug, Deserialize)]
struct AddImagesRequest {
    files: Vec<ImageUpload>,
}

async fn add_images(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(BearerToken(token)): Extension<BearerToken>,
    Json(request): Json<AddImagesRequest>,
) -> Result<Json<DraftView>, AppError> {
    crate::metrics::inc_requests("/drafts/{id}/images");
    let files = request
        .files
        .into_iter()
        .map(decode_upload)
        .collect::<Result<Vec<_>, _>>()?;
    let shared = find_draft(&state, id, &token).await?;
    let mut controller = shared.lock().await;
    controller
        .add_images(files)
        .map_err(|err| AppError::Unprocessable {
            error: "capacity_exceeded",
            detail: err.to_string(),
        })?;
    Ok(Json(DraftView::of(id, &controller)))
}

fn decode_upload(upload: ImageUpload) -> Result<LocalFile, AppError> {
    let bytes = BASE64
        .decode(upload.data_base64.trim())
        .map_err(|err| AppError::BadRequest(format!("{}: {err}", upload.name)))?;
    if bytes.is_empty() {
        return Err(AppError::BadRequest(format!("{}: empty file", upload.name)));
    }
    let content_type = upload
        .content_type
        .filter(|ct| !ct.trim().is_empty())
        .unwrap_or_else(|| content_type_for(&upload.name).to_string());
    Ok(LocalFile::new(upload.name, content_type, bytes))
}

async fn remove_image(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> Result<Json<DraftView>, AppError> {
    let shared = find_draft(&state, id, &token).await?;
    let mut controller = shared.lock().await;
    controller
        .remove_image(index)
        .map_err(|_| AppError::NotFound("image"))?;
    Ok(Json(DraftView::of(id, &controller)))
}

/// Runs the whole submission. A draft discarded while this runs stops before
/// its next upload or publish call and answers `410 Gone`.
async fn submit_draft(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> Result<(StatusCode, Json<SubmissionReport>), AppError> {
    crate::metrics::inc_requests("/drafts/{id}/submit");
    let shared = find_draft(&state, id, &token).await?;
    let mut controller = shared.lock().await;
    controller.session().sign_in(token);
    let outcome = controller.submit().await;
    drop(controller);

    if !state.store.contains(id).await {
        warn!(target = "domix.api", draft_id = %id, "submit finished after discard");
        return Err(AppError::Gone);
    }
    let report = outcome?;
    info!(target = "domix.api", draft_id = %id, ad_id = %report.ad_id, "draft submitted");
    Ok((StatusCode::CREATED, Json(report)))
}

/// Drafts opened under another token are reported as missing.
async fn find_draft(state: &AppState, id: Uuid, token: &str) -> Result<SharedDraft, AppError> {
    state
        .store
        .get(id, token)
        .await
        .ok_or(AppError::NotFound("draft"))
}

#[derive(Debug)]
pub enum AppError {
    Unauthorized,
    NotFound(&'static str),
    Gone,
    BadRequest(String),
    Unprocessable { error: &'static str, detail: String },
    Upstream { error: &'static str, detail: String },
}

impl From<SubmitError> for AppError {
    fn from(err: SubmitError) -> Self {
        match &err {
            SubmitError::Unauthenticated
            | SubmitError::Submission(SubmissionError::Unauthorized) => AppError::Unauthorized,
            SubmitError::Validation(_) => AppError::Unprocessable {
                error: "validation_failed",
                detail: err.to_string(),
            },
            SubmitError::Submission(SubmissionError::Rejected { status, .. })
                if *status >= 500 =>
            {
                AppError::Upstream {
                    error: "ad_service_error",
                    detail: err.to_string(),
                }
            }
            SubmitError::Submission(SubmissionError::Rejected { .. }) => {
                AppError::Unprocessable {
                    error: "ad_rejected",
                    detail: err.to_string(),
                }
            }
            SubmitError::Upload(_) => AppError::Upstream {
                error: "upload_failed",
                detail: err.to_string(),
            },
            SubmitError::Submission(SubmissionError::Unavailable { .. }) => AppError::Upstream {
                error: "ad_service_unavailable",
                detail: err.to_string(),
            },
            SubmitError::Cancelled => AppError::Gone,
        }
    }
}

impl From<ReadError> for AppError {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::NotFound => AppError::NotFound("ad"),
            other => AppError::Upstream {
                error: "ad_service_unavailable",
                detail: other.to_string(),
            },
        }
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InvalidCredentials | AccountError::Unauthorized => {
                AppError::Unauthorized
            }
            AccountError::Rejected(message) => AppError::Unprocessable {
                error: "account_rejected",
                detail: message,
            },
            AccountError::Request(detail) => AppError::Upstream {
                error: "account_service_unavailable",
                detail,
            },
        }
    }
}

impl From<AttributeError> for AppError {
    fn from(err: AttributeError) -> Self {
        AppError::Unprocessable {
            error: "invalid_attribute",
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, detail) = match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthenticated".to_string(),
                Some("sign in again".to_string()),
            ),
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what}_not_found"), None),
            AppError::Gone => (
                StatusCode::GONE,
                "draft_discarded".to_string(),
                Some("the draft was discarded while it was being submitted".to_string()),
            ),
            AppError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "bad_request".to_string(), Some(detail))
            }
            AppError::Unprocessable { error, detail } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                error.to_string(),
                Some(detail),
            ),
            AppError::Upstream { error, detail } => {
                (StatusCode::BAD_GATEWAY, error.to_string(), Some(detail))
            }
        };
        (status, Json(ApiError { error, detail })).into_response()
    }
}
