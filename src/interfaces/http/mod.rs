//! axum REST surface over the lifecycle engine.
//!
//! Mutating routes require a bearer token; read routes treat a missing
//! header as an anonymous viewer. All errors share the
//! `{ "error": <kind>, "message": ... }` body except the outcome route,
//! which answers in its `{ "ok": ... }` contract.

pub mod auth;

use axum::Router;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::application::engine::LifecycleEngine;
use crate::domain::amendment::{Amendment, AmendmentKind};
use crate::domain::identity::OwnerId;
use crate::domain::lock::{DeadlineState, DraftPatch, Lock, NewDraft, OutcomeResult, Stake};
use crate::error::{RegistryError, Result};
use crate::infrastructure::{self, StorageConfig};
use auth::TokenVerifier;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub storage: StorageConfig,
    pub auth_secret: String,
    pub token_ttl_seconds: u64,
}

#[derive(Clone)]
pub struct ServiceState {
    pub engine: Arc<LifecycleEngine>,
    pub verifier: TokenVerifier,
    pub storage_label: &'static str,
}

impl ServiceState {
    pub async fn bootstrap(config: ServiceConfig) -> Result<Self> {
        let ServiceConfig {
            storage,
            auth_secret,
            token_ttl_seconds,
        } = config;
        let verifier = TokenVerifier::new(auth_secret, token_ttl_seconds)?;
        let storage_label = storage.label();
        let store = infrastructure::bootstrap(&storage).await?;
        Ok(Self {
            engine: Arc::new(LifecycleEngine::new(store)),
            verifier,
            storage_label,
        })
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/locks", post(create_lock).get(list_locks))
        .route("/locks/:id", get(view_lock).patch(edit_lock))
        .route("/locks/:id/seal", post(seal_lock))
        .route("/locks/:id/drop", post(drop_lock))
        .route("/locks/:id/outcome", post(record_outcome))
        .route(
            "/locks/:id/amendments",
            post(add_amendment).get(list_amendments),
        )
        .with_state(state)
}

fn status_for(err: &RegistryError) -> StatusCode {
    match err {
        RegistryError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        RegistryError::Forbidden(_) => StatusCode::FORBIDDEN,
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        RegistryError::Conflict(_) => StatusCode::CONFLICT,
        RegistryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Common error envelope.
#[derive(Debug)]
pub struct ApiError(RegistryError);

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = serde_json::json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// Error envelope of the outcome route.
#[derive(Debug)]
struct OutcomeApiError(RegistryError);

impl From<RegistryError> for OutcomeApiError {
    fn from(err: RegistryError) -> Self {
        Self(err)
    }
}

impl IntoResponse for OutcomeApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = serde_json::json!({
            "ok": false,
            "error": self.0.kind(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for RegistryError {
    fn from(rejection: JsonRejection) -> Self {
        RegistryError::InvalidInput(rejection.body_text())
    }
}

impl From<PathRejection> for RegistryError {
    fn from(rejection: PathRejection) -> Self {
        RegistryError::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for RegistryError {
    fn from(rejection: QueryRejection) -> Self {
        RegistryError::InvalidInput(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(rejection.into())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(rejection.into())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(rejection.into())
    }
}

impl From<JsonRejection> for OutcomeApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(rejection.into())
    }
}

impl From<PathRejection> for OutcomeApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(rejection.into())
    }
}

/// `axum::Json` whose rejections render as the common error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
struct Json<T>(T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// `axum::extract::Path` whose rejections render as the common error body.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
struct Path<T>(T);

/// `axum::extract::Query` whose rejections render as the common error body.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
struct Query<T>(T);

/// Body extractor of the outcome route; rejections carry the `ok` flag.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(OutcomeApiError))]
struct OutcomeJson<T>(T);

/// Path extractor of the outcome route; rejections carry the `ok` flag.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(OutcomeApiError))]
struct OutcomePath<T>(T);

fn authenticate(state: &ServiceState, headers: &HeaderMap) -> Result<OwnerId> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let token = auth::bearer_token(header)
        .ok_or_else(|| RegistryError::Unauthenticated("missing bearer token".to_string()))?;
    state.verifier.verify(token)
}

/// Absent header means anonymous; a present but bad token is still an error.
fn maybe_authenticate(state: &ServiceState, headers: &HeaderMap) -> Result<Option<OwnerId>> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    match auth::bearer_token(header) {
        Some(token) => Ok(Some(state.verifier.verify(token)?)),
        None => Ok(None),
    }
}

/// Record as served over HTTP: the stored fields plus the advisory
/// deadline indicator computed at read time.
#[derive(Debug, Clone, Serialize)]
pub struct LockView {
    #[serde(flatten)]
    lock: Lock,
    deadline_state: Option<DeadlineState>,
}

impl LockView {
    fn of(lock: Lock) -> Self {
        let deadline_state = lock.deadline_state(Utc::now());
        Self {
            lock,
            deadline_state,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct LockDetail {
    #[serde(flatten)]
    view: LockView,
    amendments: Vec<Amendment>,
}

#[derive(Debug, Clone, Serialize)]
struct LockListResponse {
    items: Vec<LockView>,
}

#[derive(Debug, Clone, Serialize)]
struct AmendmentListResponse {
    items: Vec<Amendment>,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    storage: &'static str,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "lockpoint",
        storage: state.storage_label,
    })
}

async fn create_lock(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(draft): Json<NewDraft>,
) -> Result<(StatusCode, Json<LockView>), ApiError> {
    let owner = authenticate(&state, &headers)?;
    let lock = state.engine.create_draft(owner, draft).await?;
    Ok((StatusCode::CREATED, Json(LockView::of(lock))))
}

#[derive(Debug, Clone, Deserialize)]
struct ListQuery {
    #[serde(default)]
    mine: Option<bool>,
}

async fn list_locks(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<LockListResponse>, ApiError> {
    let locks = if query.mine.unwrap_or(false) {
        let owner = authenticate(&state, &headers)?;
        state.engine.list_owned(&owner).await?
    } else {
        state.engine.list_public().await?
    };
    Ok(Json(LockListResponse {
        items: locks.into_iter().map(LockView::of).collect(),
    }))
}

async fn view_lock(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<LockDetail>, ApiError> {
    let viewer = maybe_authenticate(&state, &headers)?;
    let (lock, amendments) = state.engine.view(viewer.as_ref(), id).await?;
    Ok(Json(LockDetail {
        view: LockView::of(lock),
        amendments,
    }))
}

async fn edit_lock(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(patch): Json<DraftPatch>,
) -> Result<Json<LockView>, ApiError> {
    let owner = authenticate(&state, &headers)?;
    let lock = state.engine.edit_draft(&owner, id, patch).await?;
    Ok(Json(LockView::of(lock)))
}

#[derive(Debug, Clone, Deserialize)]
struct StakeRequest {
    amount: Decimal,
    currency: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SealRequest {
    confirm: String,
    #[serde(default)]
    stake: Option<StakeRequest>,
}

async fn seal_lock(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<SealRequest>,
) -> Result<Json<LockView>, ApiError> {
    let owner = authenticate(&state, &headers)?;
    let stake = request
        .stake
        .map(|s| Stake::new(s.amount, &s.currency))
        .transpose()?;
    let lock = state.engine.seal(&owner, id, &request.confirm, stake).await?;
    Ok(Json(LockView::of(lock)))
}

async fn drop_lock(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<LockView>, ApiError> {
    let owner = authenticate(&state, &headers)?;
    let lock = state.engine.drop_draft(&owner, id).await?;
    Ok(Json(LockView::of(lock)))
}

#[derive(Debug, Clone, Deserialize)]
struct OutcomeRequest {
    result: OutcomeResult,
    #[serde(default)]
    proof_text: Option<String>,
    #[serde(default)]
    proof_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct OutcomeAccepted {
    ok: bool,
    status: &'static str,
}

async fn record_outcome(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    OutcomePath(id): OutcomePath<Uuid>,
    OutcomeJson(request): OutcomeJson<OutcomeRequest>,
) -> Result<Json<OutcomeAccepted>, OutcomeApiError> {
    let owner = authenticate(&state, &headers)?;
    let lock = state
        .engine
        .record_outcome(
            &owner,
            id,
            request.result,
            request.proof_text.as_deref(),
            request.proof_url.as_deref(),
        )
        .await?;
    Ok(Json(OutcomeAccepted {
        ok: true,
        status: lock.status.as_str(),
    }))
}

#[derive(Debug, Clone, Deserialize)]
struct AmendmentRequest {
    kind: AmendmentKind,
    body: String,
}

async fn add_amendment(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<AmendmentRequest>,
) -> Result<(StatusCode, Json<Amendment>), ApiError> {
    let owner = authenticate(&state, &headers)?;
    let amendment = state
        .engine
        .add_amendment(&owner, id, request.kind, &request.body)
        .await?;
    Ok((StatusCode::CREATED, Json(amendment)))
}

async fn list_amendments(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<AmendmentListResponse>, ApiError> {
    let viewer = maybe_authenticate(&state, &headers)?;
    let (_, amendments) = state.engine.view(viewer.as_ref(), id).await?;
    Ok(Json(AmendmentListResponse { items: amendments }))
}
