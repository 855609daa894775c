//! # Maintenance Request Record and State Machine
//!
//! [`MaintenanceRequest`] owns the canonical `stage`. Every change goes
//! through [`MaintenanceRequest::apply`], which validates against a
//! [`TransitionTable`], applies the stage-entry effects, bumps `version`,
//! and returns exactly one [`RequestEvent`].
//!
//! ## Validation Order
//!
//! 1. tenant scope (`TenantMismatch`)
//! 2. target equals current stage → no-op success
//! 3. terminal stage, target not archival (`AlreadyTerminal`)
//! 4. edge exists (`InvalidTransition`)
//! 5. role allowed on the edge (`Forbidden`)
//! 6. stage-entry preconditions (`ProviderRequired`)
//!
//! Nothing is mutated until all six pass.
//!
//! ## Stage-Entry Effects
//!
//! The state machine does no I/O. Inputs that need the outside world (the
//! SLA resolution, a matcher proposal) are computed by the caller and handed
//! in as [`EntryEffects`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use upkeep_core::{
    ActorId, BranchId, Category, CompanyId, EventId, GeoPoint, Priority, ProviderId, RequestId,
    Role, TenantScope, Timestamp, ValidationError,
};

use crate::event::RequestEvent;
use crate::sla::{SlaClock, SlaResolution, SlaStatus, SlaWindowKind};
use crate::stage::{RequestStatus, Stage};
use crate::table::TransitionTable;

const MAX_TITLE_LEN: usize = 200;
const MAX_NOTE_LEN: usize = 2000;

/// Errors from creating or transitioning a request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransitionError {
    /// The edge is not in the transition table.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: Stage, to: Stage },

    /// The actor's role may not take this edge.
    #[error("role {role} may not transition {from} -> {to}")]
    Forbidden { role: Role, from: Stage, to: Stage },

    /// The actor is outside the request's company or branch.
    #[error("actor is not scoped to request {request_id}")]
    TenantMismatch { request_id: RequestId },

    /// The request is terminal and the target is not archival.
    #[error("request is in terminal stage {stage}")]
    AlreadyTerminal { stage: Stage },

    /// Entering `accepted` with no provider known.
    #[error("a provider must be assigned before the request is accepted")]
    ProviderRequired,

    /// A request may only be created in `draft` or `submitted`.
    #[error("requests cannot be created in stage {stage}")]
    InvalidEntryStage { stage: Stage },

    /// Input failed field validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// The principal performing an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
    pub scope: TenantScope,
}

/// Input for creating a request.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub company_id: CompanyId,
    pub branch_id: Option<BranchId>,
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    pub subcategory: Option<String>,
    pub priority: Priority,
    /// `draft` or `submitted`, depending on the entry channel.
    pub initial_stage: Stage,
    pub location: Option<GeoPoint>,
    pub location_text: Option<String>,
}

/// Provider input for the stage being entered.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Assignment {
    /// No provider input.
    #[default]
    None,
    /// A provider named explicitly by the caller.
    Explicit(ProviderId),
    /// The matcher's top candidate.
    Proposed {
        provider_id: ProviderId,
        distance_km: f64,
    },
    /// The matcher ran and found nobody.
    NoMatch,
}

/// Externally computed inputs consumed on stage entry.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntryEffects {
    /// Policy lookup anchored at the transition time; used entering `submitted`.
    pub sla: Option<SlaResolution>,
    pub assignment: Assignment,
}

/// A requested stage change.
#[derive(Debug, Clone)]
pub struct TransitionInput {
    pub target: Stage,
    pub actor: Actor,
    pub note: Option<String>,
    pub metadata: Map<String, Value>,
    pub at: Timestamp,
    pub effects: EntryEffects,
}

/// Result of validation alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// Target equals the current stage.
    Unchanged,
    /// The edge may be taken.
    Allowed,
}

/// A maintenance request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceRequest {
    pub id: RequestId,
    pub company_id: CompanyId,
    pub branch_id: Option<BranchId>,
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    pub subcategory: Option<String>,
    pub priority: Priority,
    pub stage: Stage,
    pub status: RequestStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub sla: SlaClock,
    pub archived_at: Option<Timestamp>,
    pub location: Option<GeoPoint>,
    pub location_text: Option<String>,
    pub assigned_provider_id: Option<ProviderId>,
    pub proposed_provider_id: Option<ProviderId>,
    pub version: i64,
}

impl MaintenanceRequest {
    /// Create a request and its creation event (sequence 1).
    ///
    /// `sla` is consulted only when the request is created directly in
    /// `submitted`.
    pub fn create(
        new: NewRequest,
        actor: Option<&Actor>,
        sla: Option<SlaResolution>,
        at: Timestamp,
    ) -> Result<(Self, RequestEvent), TransitionError> {
        if !new.initial_stage.is_entry() {
            return Err(TransitionError::InvalidEntryStage {
                stage: new.initial_stage,
            });
        }
        let title = new.title.trim().to_string();
        if title.is_empty() {
            return Err(ValidationError::Empty { field: "title" }.into());
        }
        if title.len() > MAX_TITLE_LEN {
            return Err(ValidationError::TooLong {
                field: "title",
                max: MAX_TITLE_LEN,
                actual: title.len(),
            }
            .into());
        }

        let id = RequestId::new();
        if let Some(actor) = actor {
            if !actor.scope.permits(&new.company_id, new.branch_id.as_ref()) {
                return Err(TransitionError::TenantMismatch { request_id: id });
            }
        }

        let mut request = Self {
            id,
            company_id: new.company_id,
            branch_id: new.branch_id,
            title,
            description: new.description,
            category: new.category,
            subcategory: new.subcategory,
            priority: new.priority,
            stage: new.initial_stage,
            status: new.initial_stage.status(),
            created_at: at,
            updated_at: at,
            sla: SlaClock::default(),
            archived_at: None,
            location: new.location,
            location_text: new.location_text,
            assigned_provider_id: None,
            proposed_provider_id: None,
            version: 1,
        };

        let mut metadata = Map::new();
        metadata.insert("status".into(), json!(request.status));
        if request.stage == Stage::Submitted {
            request.start_sla(sla, &mut metadata);
        }

        let event = RequestEvent {
            id: EventId::new(),
            request_id: request.id,
            sequence: request.version,
            from_stage: None,
            to_stage: request.stage,
            actor_id: actor.map(|a| a.id),
            actor_role: actor.map(|a| a.role.clone()),
            timestamp: at,
            metadata,
            note: None,
        };
        Ok((request, event))
    }

    /// Whether `scope` may see or act on this request.
    pub fn ensure_scope(&self, scope: &TenantScope) -> Result<(), TransitionError> {
        if scope.permits(&self.company_id, self.branch_id.as_ref()) {
            Ok(())
        } else {
            Err(TransitionError::TenantMismatch {
                request_id: self.id,
            })
        }
    }

    /// Validate a transition without applying it.
    pub fn check(
        &self,
        table: &TransitionTable,
        target: Stage,
        actor: &Actor,
    ) -> Result<Check, TransitionError> {
        self.ensure_scope(&actor.scope)?;
        if target == self.stage {
            return Ok(Check::Unchanged);
        }
        if self.stage.is_terminal() && (self.stage == Stage::Archived || target != Stage::Archived) {
            return Err(TransitionError::AlreadyTerminal { stage: self.stage });
        }
        let roles = table
            .roles_for(self.stage, target)
            .ok_or(TransitionError::InvalidTransition {
                from: self.stage,
                to: target,
            })?;
        if !roles.contains(&actor.role) {
            return Err(TransitionError::Forbidden {
                role: actor.role.clone(),
                from: self.stage,
                to: target,
            });
        }
        Ok(Check::Allowed)
    }

    /// Whether entering `target` consults the SLA resolver.
    pub fn wants_sla(&self, target: Stage) -> bool {
        target == Stage::Submitted && !self.sla.is_started()
    }

    /// Whether entering `target` without an explicit provider runs the matcher.
    pub fn wants_match(&self, target: Stage) -> bool {
        target == Stage::Assigned && target != self.stage
    }

    /// Validate and apply a transition.
    ///
    /// Returns `Ok(None)` for the same-stage no-op (no event, no version
    /// bump), otherwise the single event describing the change.
    pub fn apply(
        &mut self,
        table: &TransitionTable,
        input: TransitionInput,
    ) -> Result<Option<RequestEvent>, TransitionError> {
        let TransitionInput {
            target,
            actor,
            note,
            mut metadata,
            at,
            effects,
        } = input;

        if self.check(table, target, &actor)? == Check::Unchanged {
            return Ok(None);
        }
        if let Some(note) = &note {
            if note.len() > MAX_NOTE_LEN {
                return Err(ValidationError::TooLong {
                    field: "note",
                    max: MAX_NOTE_LEN,
                    actual: note.len(),
                }
                .into());
            }
        }
        let accepted_provider = if target == Stage::Accepted {
            let provider = match effects.assignment {
                Assignment::Explicit(id) => Some(id),
                _ => self.assigned_provider_id.or(self.proposed_provider_id),
            };
            Some(provider.ok_or(TransitionError::ProviderRequired)?)
        } else {
            None
        };

        let from = self.stage;
        self.stage = target;
        self.status = target.status();
        self.updated_at = at;
        self.version += 1;
        metadata.insert("status".into(), json!(self.status));

        match target {
            Stage::Submitted => self.start_sla(effects.sla, &mut metadata),
            Stage::Approved if from == Stage::Assigned => {
                if let Some(declined) = self.assigned_provider_id.or(self.proposed_provider_id) {
                    metadata.insert("declined_provider_id".into(), json!(declined));
                }
                self.assigned_provider_id = None;
                self.proposed_provider_id = None;
            }
            Stage::Assigned => self.enter_assigned(effects.assignment, &mut metadata),
            Stage::Accepted => {
                if let Some(provider) = accepted_provider {
                    self.assigned_provider_id = Some(provider);
                    self.proposed_provider_id = None;
                    metadata.insert("assigned_provider_id".into(), json!(provider));
                }
                self.close_sla(&[SlaWindowKind::Accept], at, &mut metadata);
            }
            Stage::InProgress => {
                self.close_sla(&[SlaWindowKind::Accept, SlaWindowKind::Arrive], at, &mut metadata)
            }
            Stage::Completed | Stage::Cancelled | Stage::Rejected => {
                self.close_sla(&SlaWindowKind::ALL, at, &mut metadata)
            }
            Stage::Archived => self.archived_at = Some(at),
            _ => {}
        }

        Ok(Some(RequestEvent {
            id: EventId::new(),
            request_id: self.id,
            sequence: self.version,
            from_stage: Some(from),
            to_stage: target,
            actor_id: Some(actor.id),
            actor_role: Some(actor.role),
            timestamp: at,
            metadata,
            note,
        }))
    }

    /// SLA snapshot at `now`.
    pub fn sla_status(&self, now: Timestamp) -> SlaStatus {
        self.sla.status_at(now)
    }

    fn start_sla(&mut self, sla: Option<SlaResolution>, metadata: &mut Map<String, Value>) {
        match sla {
            Some(SlaResolution::Resolved(deadlines)) => {
                let written = self.sla.start(&deadlines);
                metadata.insert("sla_policy".into(), json!("resolved"));
                metadata.insert("sla_windows_started".into(), json!(written));
            }
            Some(SlaResolution::NoPolicy) => {
                metadata.insert("sla_policy".into(), json!("no_policy"));
            }
            None => {}
        }
    }

    fn enter_assigned(&mut self, assignment: Assignment, metadata: &mut Map<String, Value>) {
        match assignment {
            Assignment::Explicit(provider) => {
                self.assigned_provider_id = Some(provider);
                self.proposed_provider_id = None;
                metadata.insert("assigned_provider_id".into(), json!(provider));
            }
            Assignment::Proposed {
                provider_id,
                distance_km,
            } => {
                self.proposed_provider_id = Some(provider_id);
                metadata.insert("proposed_provider_id".into(), json!(provider_id));
                metadata.insert("distance_km".into(), json!(distance_km));
            }
            Assignment::NoMatch => {
                self.proposed_provider_id = None;
                metadata.insert("match".into(), json!("none"));
            }
            Assignment::None => {}
        }
    }

    fn close_sla(&mut self, windows: &[SlaWindowKind], at: Timestamp, metadata: &mut Map<String, Value>) {
        let closed = self.sla.close(windows, at);
        if closed.is_empty() {
            return;
        }
        let summary: Map<String, Value> = closed
            .into_iter()
            .map(|(kind, outcome)| (kind.as_str().to_string(), json!(outcome.verdict)))
            .collect();
        metadata.insert("sla_closed".into(), Value::Object(summary));
    }
}
