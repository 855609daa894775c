//! # OpenAPI Specification Assembly
//!
//! Assembles the utoipa-documented routes into a single OpenAPI spec served
//! at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "upkeep: maintenance request lifecycle",
        version = "0.1.0",
        description = "Create maintenance requests, move them through the lifecycle, match providers and track SLA windows. Every call except the health probes carries X-Actor-Id, X-Actor-Role and X-Company-Id headers."
    ),
    paths(
        // Requests
        crate::routes::requests::create_request,
        crate::routes::requests::get_request,
        crate::routes::requests::transition_request,
        crate::routes::requests::available_transitions,
        crate::routes::requests::match_providers,
        crate::routes::requests::sla_status,
        crate::routes::requests::history,
        // Transition table
        crate::routes::transitions::list_transitions,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::requests::CreateRequestBody,
        crate::routes::requests::TransitionBody,
        crate::routes::requests::TransitionResponse,
        crate::routes::requests::AvailableTransitions,
        crate::routes::transitions::TableResponse,
    )),
    tags(
        (name = "requests", description = "Maintenance request lifecycle"),
        (name = "transitions", description = "Transition table in force"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json: the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
