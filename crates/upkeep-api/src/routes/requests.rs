//! # Maintenance Requests API
//!
//! HTTP surface for the request lifecycle:
//!
//! - **POST `/v1/requests`**: create a request in `draft` or `submitted`
//! - **GET `/v1/requests/{id}`**: fetch a request
//! - **POST `/v1/requests/{id}/transitions`**: move a request to another stage
//! - **GET `/v1/requests/{id}/transitions`**: stages the caller may move it to next
//! - **GET `/v1/requests/{id}/matches`**: rank providers for the job site
//! - **GET `/v1/requests/{id}/sla`**: SLA snapshot
//! - **GET `/v1/requests/{id}/history`**: event history, oldest first
//!
//! Every route is tenant-scoped by the actor headers (see
//! [`ActorContext`]).

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use upkeep_core::{BranchId, Category, GeoPoint, Priority, RequestId};
use upkeep_dispatch::{MatchOutcome, TransitionCommand, Transitioned};
use upkeep_state::{MaintenanceRequest, NewRequest, RequestEvent, SlaStatus, Stage};

use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, ActorContext, Validate};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

/// Request to open a maintenance request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRequestBody {
    #[schema(example = "Burst pipe in kitchen")]
    pub title: String,
    pub description: Option<String>,
    /// Category label, e.g. "plumbing".
    #[schema(example = "plumbing")]
    pub category: String,
    pub subcategory: Option<String>,
    /// One of low, medium, high, urgent.
    #[schema(example = "urgent")]
    pub priority: String,
    /// Required for company-wide actors on branch-level requests; a
    /// branch-scoped actor may omit it.
    pub branch_id: Option<Uuid>,
    /// Entry stage: "draft" (default) or "submitted".
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "submitted")]
    pub stage: Option<Stage>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_text: Option<String>,
}

impl Validate for CreateRequestBody {
    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".into());
        }
        if self.latitude.is_some() != self.longitude.is_some() {
            return Err("latitude and longitude must be given together".into());
        }
        if let Some(stage) = self.stage {
            if !stage.is_entry() {
                return Err(format!("requests cannot be created in stage {stage}"));
            }
        }
        Ok(())
    }
}

/// Request to move a request to another stage.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TransitionBody {
    /// Target stage.
    #[schema(value_type = String, example = "under_review")]
    pub to: Stage,
    pub note: Option<String>,
    /// Free-form context; `provider_id` assigns a provider on `assigned`
    /// or `accepted`.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Map<String, Value>,
}

/// Query for provider matching.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MatchQuery {
    /// Defaults to the request category.
    pub specialization: Option<String>,
    pub max_distance_km: Option<f64>,
}

impl Validate for MatchQuery {
    fn validate(&self) -> Result<(), String> {
        match self.max_distance_km {
            Some(km) if !km.is_finite() || km <= 0.0 => {
                Err("max_distance_km must be a positive number".into())
            }
            _ => Ok(()),
        }
    }
}

/// Result of a create or transition.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransitionResponse {
    /// Canonical request state after the call.
    #[schema(value_type = Object)]
    pub request: MaintenanceRequest,
    /// The recorded event; absent when the call was a no-op.
    #[schema(value_type = Option<Object>)]
    pub event: Option<RequestEvent>,
    pub noop: bool,
}

impl From<Transitioned> for TransitionResponse {
    fn from(t: Transitioned) -> Self {
        let noop = t.is_noop();
        Self {
            request: t.request,
            event: t.event,
            noop,
        }
    }
}

/// Stages the caller may move a request to next.
#[derive(Debug, Serialize, ToSchema)]
pub struct AvailableTransitions {
    #[schema(value_type = String)]
    pub stage: Stage,
    pub role: String,
    #[schema(value_type = Vec<String>)]
    pub targets: Vec<Stage>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/requests", post(create_request))
        .route("/v1/requests/{id}", get(get_request))
        .route(
            "/v1/requests/{id}/transitions",
            post(transition_request).get(available_transitions),
        )
        .route("/v1/requests/{id}/matches", get(match_providers))
        .route("/v1/requests/{id}/sla", get(sla_status))
        .route("/v1/requests/{id}/history", get(history))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /v1/requests: open a request in `draft` or `submitted`.
#[utoipa::path(
    post,
    path = "/v1/requests",
    request_body = CreateRequestBody,
    responses(
        (status = 201, description = "Request created", body = TransitionResponse),
        (status = 400, description = "Malformed body or actor headers", body = crate::error::ErrorBody),
        (status = 403, description = "Actor outside the branch", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "requests"
)]
pub(crate) async fn create_request(
    State(state): State<AppState>,
    ctx: ActorContext,
    body: Result<Json<CreateRequestBody>, JsonRejection>,
) -> Result<(StatusCode, Json<TransitionResponse>), AppError> {
    let req = extract_validated_json(body)?;

    let priority: Priority = req.priority.parse()?;
    let category = Category::new(&req.category)?;
    let location = GeoPoint::from_parts(req.latitude, req.longitude)?;
    let branch_id = resolve_branch(&ctx, req.branch_id.map(BranchId::from_uuid))?;

    let new = NewRequest {
        company_id: ctx.scope().company_id,
        branch_id,
        title: req.title,
        description: req.description,
        category,
        subcategory: req.subcategory,
        priority,
        initial_stage: req.stage.unwrap_or(Stage::Draft),
        location,
        location_text: req.location_text,
    };

    let created = state.engine.create_request(new, Some(ctx.actor())).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// GET /v1/requests/{id}: fetch a request.
#[utoipa::path(
    get,
    path = "/v1/requests/{id}",
    params(("id" = Uuid, Path, description = "Maintenance request ID")),
    responses(
        (status = 200, description = "Canonical request state"),
        (status = 403, description = "Request belongs to another tenant", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown request", body = crate::error::ErrorBody),
    ),
    tag = "requests"
)]
pub(crate) async fn get_request(
    State(state): State<AppState>,
    ctx: ActorContext,
    Path(id): Path<Uuid>,
) -> Result<Json<MaintenanceRequest>, AppError> {
    let request = state
        .engine
        .get_request(RequestId::from_uuid(id), ctx.scope())
        .await?;
    Ok(Json(request))
}

/// POST /v1/requests/{id}/transitions: move a request to another stage.
#[utoipa::path(
    post,
    path = "/v1/requests/{id}/transitions",
    params(("id" = Uuid, Path, description = "Maintenance request ID")),
    request_body = TransitionBody,
    responses(
        (status = 200, description = "Transition applied, or a same-stage no-op", body = TransitionResponse),
        (status = 403, description = "Role or tenant not permitted", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown request", body = crate::error::ErrorBody),
        (status = 409, description = "Illegal edge, terminal request, missing provider or version conflict", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid metadata or unknown provider", body = crate::error::ErrorBody),
    ),
    tag = "requests"
)]
pub(crate) async fn transition_request(
    State(state): State<AppState>,
    ctx: ActorContext,
    Path(id): Path<Uuid>,
    body: Result<Json<TransitionBody>, JsonRejection>,
) -> Result<Json<TransitionResponse>, AppError> {
    let req = extract_json(body)?;
    let cmd = TransitionCommand {
        request_id: RequestId::from_uuid(id),
        target: req.to,
        actor: ctx.into_actor(),
        note: req.note,
        metadata: req.metadata,
    };
    let result = state.engine.transition_retrying(cmd).await?;
    Ok(Json(result.into()))
}

/// GET /v1/requests/{id}/transitions: stages the caller may move it to next.
#[utoipa::path(
    get,
    path = "/v1/requests/{id}/transitions",
    params(("id" = Uuid, Path, description = "Maintenance request ID")),
    responses(
        (status = 200, description = "Reachable stages for the caller's role", body = AvailableTransitions),
        (status = 404, description = "Unknown request", body = crate::error::ErrorBody),
    ),
    tag = "requests"
)]
pub(crate) async fn available_transitions(
    State(state): State<AppState>,
    ctx: ActorContext,
    Path(id): Path<Uuid>,
) -> Result<Json<AvailableTransitions>, AppError> {
    let request = state
        .engine
        .get_request(RequestId::from_uuid(id), ctx.scope())
        .await?;
    let role = &ctx.actor().role;
    Ok(Json(AvailableTransitions {
        stage: request.stage,
        role: role.to_string(),
        targets: state.engine.table().targets_from(request.stage, role),
    }))
}

/// GET /v1/requests/{id}/matches: rank providers for the job site.
#[utoipa::path(
    get,
    path = "/v1/requests/{id}/matches",
    params(("id" = Uuid, Path, description = "Maintenance request ID"), MatchQuery),
    responses(
        (status = 200, description = "Ranked candidates, or no_provider_match with a reason"),
        (status = 404, description = "Unknown request", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid filter", body = crate::error::ErrorBody),
    ),
    tag = "requests"
)]
pub(crate) async fn match_providers(
    State(state): State<AppState>,
    ctx: ActorContext,
    Path(id): Path<Uuid>,
    query: Result<Query<MatchQuery>, QueryRejection>,
) -> Result<Json<MatchOutcome>, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    query.validate().map_err(AppError::Validation)?;
    let specialization = query
        .specialization
        .as_deref()
        .map(Category::new)
        .transpose()?;

    let outcome = state
        .engine
        .match_provider(
            RequestId::from_uuid(id),
            ctx.scope(),
            specialization,
            query.max_distance_km,
        )
        .await?;
    Ok(Json(outcome))
}

/// GET /v1/requests/{id}/sla: per-window SLA snapshot.
#[utoipa::path(
    get,
    path = "/v1/requests/{id}/sla",
    params(("id" = Uuid, Path, description = "Maintenance request ID")),
    responses(
        (status = 200, description = "Due times, outcomes and breach flags"),
        (status = 404, description = "Unknown request", body = crate::error::ErrorBody),
    ),
    tag = "requests"
)]
pub(crate) async fn sla_status(
    State(state): State<AppState>,
    ctx: ActorContext,
    Path(id): Path<Uuid>,
) -> Result<Json<SlaStatus>, AppError> {
    let status = state
        .engine
        .sla_status(RequestId::from_uuid(id), ctx.scope())
        .await?;
    Ok(Json(status))
}

/// GET /v1/requests/{id}/history: ledger events, oldest first.
#[utoipa::path(
    get,
    path = "/v1/requests/{id}/history",
    params(("id" = Uuid, Path, description = "Maintenance request ID")),
    responses(
        (status = 200, description = "Ordered event history"),
        (status = 404, description = "Unknown request", body = crate::error::ErrorBody),
    ),
    tag = "requests"
)]
pub(crate) async fn history(
    State(state): State<AppState>,
    ctx: ActorContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RequestEvent>>, AppError> {
    let events = state
        .engine
        .history(RequestId::from_uuid(id), ctx.scope())
        .await?;
    Ok(Json(events))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A branch-scoped actor creates requests in its own branch only.
fn resolve_branch(ctx: &ActorContext, requested: Option<BranchId>) -> Result<Option<BranchId>, AppError> {
    match (ctx.scope().branch_id, requested) {
        (Some(own), Some(other)) if own != other => Err(AppError::Forbidden(format!(
            "actor is scoped to {own} and cannot create requests in {other}"
        ))),
        (Some(own), _) => Ok(Some(own)),
        (None, requested) => Ok(requested),
    }
}
