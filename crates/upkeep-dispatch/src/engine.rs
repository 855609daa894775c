//! # Dispatch Engine
//!
//! The public operation surface: create, transition, match, SLA status,
//! history. Each transition follows the same path:
//!
//! ```text
//! load ─▶ validate ─▶ gather entry inputs ─▶ apply ─▶ CAS save + ledger append ─▶ publish
//!                     (SLA book, matcher)                 (atomic)                (best effort)
//! ```
//!
//! Validation runs before any I/O for entry inputs, so rejected transitions
//! never touch the roster or policy book. Publishing happens only after the
//! save commits and never rolls it back.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;

use upkeep_core::{Category, CompanyId, ProviderId, RequestId, TenantScope, Timestamp};
use upkeep_state::{
    Actor, Assignment, Check, EntryEffects, MaintenanceRequest, NewRequest, PolicyBook,
    RequestEvent, SlaResolution, SlaStatus, Stage, TransitionError, TransitionInput,
    TransitionTable,
};

use crate::bus::{EventBus, TransitionNotice};
use crate::cache::TtlCache;
use crate::clock::{Clock, SystemClock};
use crate::ledger::LedgerError;
use crate::matcher::{find_nearest, MatchOutcome, NoMatchReason, Provider, ProviderFilter};
use crate::store::{ConflictError, RequestStore, StoreError};

/// Default attempts for [`DispatchEngine::transition_with_retry`].
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Errors surfaced by engine operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Lost an optimistic-concurrency race; reload and retry.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("request {0} not found")]
    NotFound(RequestId),

    /// `provider_id` does not name a provider of the request's company.
    #[error("unknown provider {0}")]
    UnknownProvider(ProviderId),

    /// Caller metadata is malformed.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(conflict) => Self::Conflict(conflict),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl EngineError {
    /// Whether reloading and retrying may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// TTL for the policy book and provider roster caches.
    pub cache_ttl: Duration,
    /// Attempts for the retry helper.
    pub max_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(30),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Result of a create or transition: the canonical state after the call,
/// and the event if one was recorded (`None` for a same-stage no-op).
#[derive(Debug, Clone, PartialEq)]
pub struct Transitioned {
    pub request: MaintenanceRequest,
    pub event: Option<RequestEvent>,
}

impl Transitioned {
    pub fn is_noop(&self) -> bool {
        self.event.is_none()
    }
}

/// A transition command.
#[derive(Debug, Clone)]
pub struct TransitionCommand {
    pub request_id: RequestId,
    pub target: Stage,
    pub actor: Actor,
    pub note: Option<String>,
    pub metadata: Map<String, Value>,
}

/// The dispatch engine. Cheap to clone.
#[derive(Clone)]
pub struct DispatchEngine {
    store: Arc<dyn RequestStore>,
    table: Arc<TransitionTable>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    policies: Arc<TtlCache<(), Arc<PolicyBook>>>,
    rosters: Arc<TtlCache<CompanyId, Arc<Vec<Provider>>>>,
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("edges", &self.table.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DispatchEngine {
    /// Engine with the system clock and default tunables.
    pub fn new(store: Arc<dyn RequestStore>, table: TransitionTable, bus: EventBus) -> Self {
        Self::with_parts(store, table, bus, Arc::new(SystemClock), EngineConfig::default())
    }

    pub fn with_parts(
        store: Arc<dyn RequestStore>,
        table: TransitionTable,
        bus: EventBus,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let ttl = config.cache_ttl;
        Self {
            store,
            table: Arc::new(table),
            bus,
            clock,
            config,
            policies: Arc::new(TtlCache::new(ttl)),
            rosters: Arc::new(TtlCache::new(ttl)),
        }
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Operations ──────────────────────────────────────────────────

    /// Create a request in `draft` or `submitted`.
    pub async fn create_request(
        &self,
        new: NewRequest,
        actor: Option<&Actor>,
    ) -> Result<Transitioned, EngineError> {
        let now = self.clock.now();
        let sla = if new.initial_stage == Stage::Submitted {
            let book = self.policy_book().await?;
            Some(self.resolve_sla(&book, &new, now))
        } else {
            None
        };

        let (request, event) = MaintenanceRequest::create(new, actor, sla, now)?;
        self.store.insert_request(&request, &event).await.map_err(|e| {
            tracing::error!(request_id = %request.id, error = %e, "failed to insert request");
            EngineError::from(e)
        })?;

        tracing::info!(
            request_id = %request.id,
            company_id = %request.company_id,
            stage = %request.stage,
            priority = %request.priority,
            "request created"
        );
        self.publish(&request, &event);
        Ok(Transitioned {
            request,
            event: Some(event),
        })
    }

    /// Fetch a request visible to `scope`.
    pub async fn get_request(
        &self,
        request_id: RequestId,
        scope: &TenantScope,
    ) -> Result<MaintenanceRequest, EngineError> {
        let request = self.load(request_id).await?;
        request.ensure_scope(scope)?;
        Ok(request)
    }

    /// Single attempt at a transition. A lost race returns
    /// [`EngineError::Conflict`].
    pub async fn transition(&self, cmd: TransitionCommand) -> Result<Transitioned, EngineError> {
        let TransitionCommand {
            request_id,
            target,
            actor,
            note,
            metadata,
        } = cmd;

        let mut request = self.load(request_id).await?;
        if request.check(&self.table, target, &actor)? == Check::Unchanged {
            tracing::debug!(request_id = %request_id, stage = %target, "transition is a no-op");
            return Ok(Transitioned {
                request,
                event: None,
            });
        }

        let now = self.clock.now();
        let effects = self.entry_effects(&request, target, &metadata, now).await?;

        let expected_version = request.version;
        let from = request.stage;
        let event = request
            .apply(
                &self.table,
                TransitionInput {
                    target,
                    actor: actor.clone(),
                    note,
                    metadata,
                    at: now,
                    effects,
                },
            )?
            .ok_or_else(|| EngineError::Storage("validated transition produced no event".into()))?;

        if let Err(err) = self.store.save_request(&request, expected_version, &event).await {
            match &err {
                StoreError::Conflict(conflict) => tracing::warn!(
                    request_id = %request_id,
                    expected = conflict.expected,
                    actual = ?conflict.actual,
                    "transition lost version race"
                ),
                other => tracing::error!(request_id = %request_id, error = %other, "failed to save transition"),
            }
            return Err(err.into());
        }

        tracing::info!(
            request_id = %request_id,
            from = %from,
            to = %target,
            actor_id = %actor.id,
            role = %actor.role,
            version = request.version,
            "request transitioned"
        );
        self.publish(&request, &event);
        Ok(Transitioned {
            request,
            event: Some(event),
        })
    }

    /// [`transition`](Self::transition), reloading and re-validating after
    /// each conflict, up to `max_attempts` attempts in total.
    pub async fn transition_with_retry(
        &self,
        cmd: TransitionCommand,
        max_attempts: u32,
    ) -> Result<Transitioned, EngineError> {
        let attempts = max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.transition(cmd.clone()).await {
                Err(err) if err.is_retryable() && attempt < attempts => {
                    tracing::warn!(
                        request_id = %cmd.request_id,
                        attempt,
                        max_attempts = attempts,
                        "retrying transition after conflict"
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Retry helper using [`EngineConfig::max_attempts`].
    pub async fn transition_retrying(&self, cmd: TransitionCommand) -> Result<Transitioned, EngineError> {
        self.transition_with_retry(cmd, self.config.max_attempts).await
    }

    /// Rank providers for a request. `specialization` defaults to the
    /// request category.
    pub async fn match_provider(
        &self,
        request_id: RequestId,
        scope: &TenantScope,
        specialization: Option<Category>,
        max_distance_km: Option<f64>,
    ) -> Result<MatchOutcome, EngineError> {
        let request = self.get_request(request_id, scope).await?;
        let specialization = specialization.unwrap_or_else(|| request.category.clone());
        self.rank(&request, &specialization, max_distance_km).await
    }

    /// SLA snapshot at the engine clock's now.
    pub async fn sla_status(
        &self,
        request_id: RequestId,
        scope: &TenantScope,
    ) -> Result<SlaStatus, EngineError> {
        let request = self.get_request(request_id, scope).await?;
        Ok(request.sla_status(self.clock.now()))
    }

    /// Event history, oldest first.
    pub async fn history(
        &self,
        request_id: RequestId,
        scope: &TenantScope,
    ) -> Result<Vec<RequestEvent>, EngineError> {
        self.get_request(request_id, scope).await?;
        Ok(self.store.history(request_id).await?)
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn load(&self, request_id: RequestId) -> Result<MaintenanceRequest, EngineError> {
        self.store
            .load_request(request_id)
            .await?
            .ok_or(EngineError::NotFound(request_id))
    }

    async fn entry_effects(
        &self,
        request: &MaintenanceRequest,
        target: Stage,
        metadata: &Map<String, Value>,
        now: Timestamp,
    ) -> Result<EntryEffects, EngineError> {
        let mut effects = EntryEffects::default();

        if request.wants_sla(target) {
            let book = self.policy_book().await?;
            let resolution = book.resolve(request.priority, Some(&request.category), &now);
            if resolution == SlaResolution::NoPolicy {
                tracing::warn!(
                    request_id = %request.id,
                    priority = %request.priority,
                    category = %request.category,
                    "no SLA policy; deadlines left unset"
                );
            }
            effects.sla = Some(resolution);
        }

        if matches!(target, Stage::Assigned | Stage::Accepted) {
            if let Some(provider_id) = explicit_provider(metadata)? {
                self.ensure_provider(request, provider_id).await?;
                effects.assignment = Assignment::Explicit(provider_id);
                return Ok(effects);
            }
        }

        if request.wants_match(target) {
            let outcome = self.rank(request, &request.category, None).await?;
            effects.assignment = match outcome.best() {
                Some(best) => Assignment::Proposed {
                    provider_id: best.provider.id,
                    distance_km: best.distance_km,
                },
                None => {
                    tracing::info!(request_id = %request.id, ?outcome, "no provider match; awaiting manual assignment");
                    Assignment::NoMatch
                }
            };
        }

        Ok(effects)
    }

    async fn ensure_provider(
        &self,
        request: &MaintenanceRequest,
        provider_id: ProviderId,
    ) -> Result<(), EngineError> {
        match self.store.get_provider(provider_id).await? {
            Some(provider) if provider.company_id == request.company_id => Ok(()),
            _ => Err(EngineError::UnknownProvider(provider_id)),
        }
    }

    async fn rank(
        &self,
        request: &MaintenanceRequest,
        specialization: &Category,
        max_distance_km: Option<f64>,
    ) -> Result<MatchOutcome, EngineError> {
        let Some(origin) = request.location else {
            return Ok(MatchOutcome::NoProviderMatch {
                reason: NoMatchReason::NoLocation,
            });
        };
        let roster = self.roster(request.company_id).await?;
        Ok(MatchOutcome::from_candidates(find_nearest(
            &roster,
            &origin,
            Some(specialization),
            max_distance_km,
        )))
    }

    async fn roster(&self, company_id: CompanyId) -> Result<Arc<Vec<Provider>>, EngineError> {
        if let Some(cached) = self.rosters.get(&company_id) {
            return Ok(cached);
        }
        let providers = Arc::new(
            self.store
                .list_active_providers(&ProviderFilter {
                    company_id,
                    specialization: None,
                })
                .await?,
        );
        self.rosters.insert(company_id, Arc::clone(&providers));
        Ok(providers)
    }

    async fn policy_book(&self) -> Result<Arc<PolicyBook>, EngineError> {
        if let Some(cached) = self.policies.get(&()) {
            return Ok(cached);
        }
        let book = Arc::new(self.store.policy_book().await?);
        self.policies.insert((), Arc::clone(&book));
        Ok(book)
    }

    fn resolve_sla(
        &self,
        book: &PolicyBook,
        new: &NewRequest,
        now: Timestamp,
    ) -> SlaResolution {
        let resolution = book.resolve(new.priority, Some(&new.category), &now);
        if resolution == SlaResolution::NoPolicy {
            tracing::warn!(
                priority = %new.priority,
                category = %new.category,
                "no SLA policy; deadlines left unset"
            );
        }
        resolution
    }

    fn publish(&self, request: &MaintenanceRequest, event: &RequestEvent) {
        let receivers = self.bus.publish(TransitionNotice::from_event(request, event));
        tracing::debug!(request_id = %request.id, sequence = event.sequence, receivers, "event published");
    }
}

/// Parse `provider_id` from caller metadata, if present.
fn explicit_provider(metadata: &Map<String, Value>) -> Result<Option<ProviderId>, EngineError> {
    match metadata.get("provider_id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => raw
            .parse::<ProviderId>()
            .map(Some)
            .map_err(|e| EngineError::InvalidMetadata(format!("provider_id: {e}"))),
        Some(other) => Err(EngineError::InvalidMetadata(format!(
            "provider_id must be a UUID string, got {other}"
        ))),
    }
}
