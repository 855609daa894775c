//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs, helpers to extract and
//! validate JSON bodies in handlers, and the [`ActorContext`] extractor that
//! reads the calling actor from request headers.
//!
//! Authentication happens upstream (gateway); this service trusts the actor
//! headers it is handed:
//!
//! | Header          | Required | Meaning                              |
//! |-----------------|----------|--------------------------------------|
//! | `x-actor-id`    | yes      | UUID of the acting user              |
//! | `x-actor-role`  | yes      | role label, e.g. `facility_manager`  |
//! | `x-company-id`  | yes      | tenant the actor belongs to          |
//! | `x-branch-id`   | no       | narrows the actor to one branch      |

use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::Json;

use upkeep_core::{ActorId, BranchId, CompanyId, Role, TenantScope};
use upkeep_state::Actor;

use crate::error::AppError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const COMPANY_ID_HEADER: &str = "x-company-id";
pub const BRANCH_ID_HEADER: &str = "x-branch-id";

/// Trait for request types that can validate their business rules
/// beyond what serde deserialization checks.
pub trait Validate {
    /// Validate business rules. Returns an error message on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

// ── ActorContext ────────────────────────────────────────────────────────────

/// The calling actor, built from the actor headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext(pub Actor);

impl ActorContext {
    pub fn actor(&self) -> &Actor {
        &self.0
    }

    pub fn scope(&self) -> &TenantScope {
        &self.0.scope
    }

    pub fn into_actor(self) -> Actor {
        self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ActorContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id: ActorId = parse_header(parts, ACTOR_ID_HEADER)?
            .ok_or_else(|| missing(ACTOR_ID_HEADER))?;
        let company_id: CompanyId = parse_header(parts, COMPANY_ID_HEADER)?
            .ok_or_else(|| missing(COMPANY_ID_HEADER))?;
        let branch_id: Option<BranchId> = parse_header(parts, BRANCH_ID_HEADER)?;
        let role = header_str(parts, ACTOR_ROLE_HEADER)?
            .ok_or_else(|| missing(ACTOR_ROLE_HEADER))?;
        let role = Role::new(role)
            .map_err(|e| AppError::BadRequest(format!("{ACTOR_ROLE_HEADER}: {e}")))?;

        Ok(Self(Actor {
            id,
            role,
            scope: TenantScope {
                company_id,
                branch_id,
            },
        }))
    }
}

fn missing(name: &str) -> AppError {
    AppError::BadRequest(format!("missing {name} header"))
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, AppError> {
    match parts.headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|s| Some(s.trim()))
            .map_err(|_| AppError::BadRequest(format!("{name} header is not valid ASCII"))),
    }
}

fn parse_header<T>(parts: &Parts, name: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match header_str(parts, name)? {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| AppError::BadRequest(format!("{name}: {e}"))),
    }
}
