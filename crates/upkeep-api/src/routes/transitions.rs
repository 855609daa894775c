//! # Transition Table API
//!
//! - **GET `/v1/transitions`**: the transition table in force, as the same
//!   document shape it is configured with
//! - **GET `/v1/transitions?from=<stage>&role=<role>`**: only the targets
//!   reachable from `from` by `role`

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use upkeep_core::Role;
use upkeep_state::{EdgeSpec, Stage};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TableQuery {
    /// Only edges leaving this stage.
    #[param(value_type = Option<String>, example = "in_progress")]
    pub from: Option<Stage>,
    /// Only edges this role may take.
    pub role: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TableResponse {
    /// Each edge as `{ from, to, roles }`.
    #[schema(value_type = Vec<Object>)]
    pub edges: Vec<EdgeSpec>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/transitions", get(list_transitions))
}

/// GET /v1/transitions: the transition table in force.
#[utoipa::path(
    get,
    path = "/v1/transitions",
    params(TableQuery),
    responses(
        (status = 200, description = "Edges with the roles permitted on each", body = TableResponse),
        (status = 400, description = "Unknown stage in the query", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid role label", body = crate::error::ErrorBody),
    ),
    tag = "transitions"
)]
pub(crate) async fn list_transitions(
    State(state): State<AppState>,
    query: Result<Query<TableQuery>, QueryRejection>,
) -> Result<Json<TableResponse>, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let table = state.engine.table();
    let role = query.role.as_deref().map(Role::new).transpose()?;

    let edges = table
        .to_document()
        .edges
        .into_iter()
        .filter(|edge| query.from.map_or(true, |from| edge.from == from))
        .filter(|edge| {
            role.as_ref()
                .map_or(true, |role| table.permits(edge.from, edge.to, role))
        })
        .collect();

    Ok(Json(TableResponse { edges }))
}
