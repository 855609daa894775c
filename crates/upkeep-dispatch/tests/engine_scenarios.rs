//! End-to-end engine scenarios against the in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::Barrier;

use upkeep_core::{
    ActorId, Category, CompanyId, GeoPoint, Priority, ProviderId, RequestId, Role, TenantScope,
    Timestamp,
};
use upkeep_dispatch::{
    DispatchEngine, EngineConfig, EngineError, EventBus, EventLedger, LedgerError, ManualClock,
    MatchOutcome, MemoryStore, NoMatchReason, NotificationDispatcher, Notifier, NotifyError,
    Provider, ProviderFilter, ProviderKind, ProviderStatus, RequestStore, StoreError,
    TransitionCommand,
};
use upkeep_state::{
    Actor, MaintenanceRequest, NewRequest, PolicyBook, RequestEvent, SlaVerdict, Stage, TransitionError,
    TransitionTable, WindowState,
};

fn t0() -> Timestamp {
    Timestamp::parse("2026-03-01T08:00:00Z").unwrap()
}

const SITE: GeoPoint = GeoPoint {
    lat: 24.7136,
    lng: 46.6753,
};

struct Harness {
    engine: DispatchEngine,
    store: MemoryStore,
    clock: Arc<ManualClock>,
    company: CompanyId,
}

impl Harness {
    fn new() -> Self {
        Self::with_store(MemoryStore::new(), |store| Arc::new(store) as Arc<dyn RequestStore>)
    }

    fn with_store(store: MemoryStore, wrap: impl FnOnce(MemoryStore) -> Arc<dyn RequestStore>) -> Self {
        Self::build(wrap(store.clone()), store, EngineConfig::default())
    }

    /// Roster edits are visible to the next match immediately.
    fn uncached() -> Self {
        let store = MemoryStore::new();
        let config = EngineConfig {
            cache_ttl: Duration::ZERO,
            ..EngineConfig::default()
        };
        Self::build(Arc::new(store.clone()), store, config)
    }

    fn build(backend: Arc<dyn RequestStore>, store: MemoryStore, config: EngineConfig) -> Self {
        let clock = Arc::new(ManualClock::new(t0()));
        let engine = DispatchEngine::with_parts(
            backend,
            TransitionTable::standard(),
            EventBus::new(64),
            clock.clone(),
            config,
        );
        Self {
            engine,
            store,
            clock,
            company: CompanyId::new(),
        }
    }

    fn actor(&self, role: &str) -> Actor {
        Actor {
            id: ActorId::new(),
            role: Role::new(role).unwrap(),
            scope: TenantScope::company(self.company),
        }
    }

    fn scope(&self) -> TenantScope {
        TenantScope::company(self.company)
    }

    fn new_request(&self, priority: Priority, location: Option<GeoPoint>) -> NewRequest {
        NewRequest {
            company_id: self.company,
            branch_id: None,
            title: "Burst pipe in kitchen".into(),
            description: Some("Water on the floor".into()),
            category: Category::new("plumbing").unwrap(),
            subcategory: None,
            priority,
            initial_stage: Stage::Submitted,
            location,
            location_text: None,
        }
    }

    fn provider(&self, name: &str, location: Option<GeoPoint>) -> Provider {
        let provider = Provider {
            id: ProviderId::new(),
            company_id: self.company,
            display_name: name.into(),
            kind: ProviderKind::Technician,
            specializations: vec![Category::new("plumbing").unwrap()],
            status: ProviderStatus::Available,
            active: true,
            location,
            location_updated_at: Some(t0()),
            service_radius_km: None,
            rating: Some(4.5),
        };
        self.store.upsert_provider(provider.clone());
        provider
    }

    fn cmd(&self, request_id: RequestId, target: Stage, role: &str) -> TransitionCommand {
        TransitionCommand {
            request_id,
            target,
            actor: self.actor(role),
            note: None,
            metadata: Map::new(),
        }
    }

    async fn create(&self, priority: Priority, location: Option<GeoPoint>) -> MaintenanceRequest {
        self.engine
            .create_request(self.new_request(priority, location), Some(&self.actor("requester")))
            .await
            .unwrap()
            .request
    }

    async fn step(&self, id: RequestId, target: Stage, role: &str) -> MaintenanceRequest {
        self.engine
            .transition(self.cmd(id, target, role))
            .await
            .unwrap()
            .request
    }

    async fn drive_to_approved(&self, id: RequestId) {
        self.step(id, Stage::UnderReview, "manager").await;
        self.step(id, Stage::Approved, "manager").await;
    }
}

fn north(km: f64) -> GeoPoint {
    GeoPoint {
        lat: SITE.lat + (km / upkeep_core::EARTH_RADIUS_KM).to_degrees(),
        lng: SITE.lng,
    }
}

// ─── Scenario A: urgent request breaches its accept window ──────────

#[tokio::test]
async fn urgent_request_accept_window_breaches_at_fifteen_minutes() {
    let h = Harness::new();
    let req = h.create(Priority::Urgent, Some(SITE)).await;
    assert_eq!(req.sla.accept.due, Some(t0().plus_minutes(10)));

    h.clock.advance_minutes(9);
    let status = h.engine.sla_status(req.id, &h.scope()).await.unwrap();
    assert!(!status.accept.breached);
    assert_eq!(status.accept.seconds_remaining, Some(60));

    h.clock.set(t0().plus_minutes(15));
    let status = h.engine.sla_status(req.id, &h.scope()).await.unwrap();
    assert!(status.accept.breached);
    assert_eq!(status.accept.state, WindowState::Open);
    assert!(!status.arrive.breached);

    let provider = h.provider("near", Some(north(1.0)));
    h.drive_to_approved(req.id).await;
    let mut assign = h.cmd(req.id, Stage::Assigned, "manager");
    assign.metadata.insert("provider_id".into(), json!(provider.id));
    h.engine.transition(assign).await.unwrap();
    let accepted = h.step(req.id, Stage::Accepted, "technician").await;

    let outcome = accepted.sla.accept.outcome.unwrap();
    assert_eq!(outcome.verdict, SlaVerdict::Breached);
    assert_eq!(outcome.closed_at, t0().plus_minutes(15));
    assert_eq!(accepted.sla.accept.due, Some(t0().plus_minutes(10)));
}

// ─── Scenario B: concurrent identical transitions ───────────────────

/// Holds the first `n` loads at a barrier so two callers read the same
/// version before either saves.
struct RacingStore {
    inner: MemoryStore,
    barrier: Barrier,
    pending: AtomicUsize,
}

impl RacingStore {
    fn new(inner: MemoryStore, racers: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(racers),
            pending: AtomicUsize::new(0),
        }
    }

    fn arm(&self, racers: usize) {
        self.pending.store(racers, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventLedger for RacingStore {
    async fn append(&self, event: &RequestEvent) -> Result<(), LedgerError> {
        self.inner.append(event).await
    }

    async fn history(&self, request_id: RequestId) -> Result<Vec<RequestEvent>, LedgerError> {
        self.inner.history(request_id).await
    }
}

#[async_trait]
impl RequestStore for RacingStore {
    async fn load_request(&self, id: RequestId) -> Result<Option<MaintenanceRequest>, StoreError> {
        let loaded = self.inner.load_request(id).await?;
        let held = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if held {
            self.barrier.wait().await;
        }
        Ok(loaded)
    }

    async fn insert_request(&self, request: &MaintenanceRequest, event: &RequestEvent) -> Result<(), StoreError> {
        self.inner.insert_request(request, event).await
    }

    async fn save_request(
        &self,
        request: &MaintenanceRequest,
        expected_version: i64,
        event: &RequestEvent,
    ) -> Result<(), StoreError> {
        self.inner.save_request(request, expected_version, event).await
    }

    async fn list_active_providers(&self, filter: &ProviderFilter) -> Result<Vec<Provider>, StoreError> {
        self.inner.list_active_providers(filter).await
    }

    async fn get_provider(&self, id: ProviderId) -> Result<Option<Provider>, StoreError> {
        self.inner.get_provider(id).await
    }

    async fn policy_book(&self) -> Result<PolicyBook, StoreError> {
        self.inner.policy_book().await
    }
}

async fn scheduled_request(h: &Harness) -> RequestId {
    let provider = h.provider("tech", Some(north(2.0)));
    let req = h.create(Priority::High, Some(SITE)).await;
    h.drive_to_approved(req.id).await;
    let mut assign = h.cmd(req.id, Stage::Assigned, "manager");
    assign.metadata.insert("provider_id".into(), json!(provider.id));
    h.engine.transition(assign).await.unwrap();
    h.step(req.id, Stage::Accepted, "technician").await;
    h.step(req.id, Stage::Scheduled, "technician").await;
    req.id
}

#[tokio::test]
async fn concurrent_start_one_wins_one_conflicts() {
    let racing = Arc::new(RacingStore::new(MemoryStore::new(), 2));
    let store_for_engine = Arc::clone(&racing);
    let h = Harness::with_store(racing.inner.clone(), move |_| store_for_engine as Arc<dyn RequestStore>);
    let id = scheduled_request(&h).await;

    racing.arm(2);
    let (a, b) = tokio::join!(
        h.engine.transition(h.cmd(id, Stage::InProgress, "technician")),
        h.engine.transition(h.cmd(id, Stage::InProgress, "technician")),
    );

    let results = [a, b];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::Conflict(_))))
        .count();
    assert_eq!((wins, conflicts), (1, 1));

    let history = h.engine.history(id, &h.scope()).await.unwrap();
    let starts = history.iter().filter(|e| e.to_stage == Stage::InProgress).count();
    assert_eq!(starts, 1);
}

#[tokio::test]
async fn concurrent_start_with_retry_loser_becomes_noop() {
    let racing = Arc::new(RacingStore::new(MemoryStore::new(), 2));
    let store_for_engine = Arc::clone(&racing);
    let h = Harness::with_store(racing.inner.clone(), move |_| store_for_engine as Arc<dyn RequestStore>);
    let id = scheduled_request(&h).await;

    racing.arm(2);
    let (a, b) = tokio::join!(
        h.engine.transition_with_retry(h.cmd(id, Stage::InProgress, "technician"), 3),
        h.engine.transition_with_retry(h.cmd(id, Stage::InProgress, "vendor"), 3),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.is_noop() as u8 + b.is_noop() as u8, 1);
    assert_eq!(a.request.stage, Stage::InProgress);
    assert_eq!(b.request.stage, Stage::InProgress);
    assert_eq!(a.request.version, b.request.version);

    let history = h.engine.history(id, &h.scope()).await.unwrap();
    assert_eq!(history.last().unwrap().sequence, a.request.version);
}

// ─── Scenario C: no coordinates ─────────────────────────────────────

#[tokio::test]
async fn no_coordinates_yields_no_match_but_manual_assignment_works() {
    let h = Harness::new();
    let provider = h.provider("unlocated", None);
    h.provider("located", Some(north(1.0)));
    let req = h.create(Priority::Medium, None).await;

    let outcome = h.engine.match_provider(req.id, &h.scope(), None, None).await.unwrap();
    assert_eq!(
        outcome,
        MatchOutcome::NoProviderMatch {
            reason: NoMatchReason::NoLocation
        }
    );

    h.drive_to_approved(req.id).await;
    let mut assign = h.cmd(req.id, Stage::Assigned, "manager");
    assign.metadata.insert("provider_id".into(), json!(provider.id));
    let done = h.engine.transition(assign).await.unwrap();
    assert_eq!(done.request.assigned_provider_id, Some(provider.id));
    assert_eq!(done.request.stage, Stage::Assigned);
}

#[tokio::test]
async fn assignment_without_provider_proposes_nearest() {
    let h = Harness::new();
    h.provider("far", Some(north(10.0)));
    let near = h.provider("near", Some(north(0.5)));
    h.provider("mid", Some(north(2.0)));
    let req = h.create(Priority::High, Some(SITE)).await;

    let MatchOutcome::Matched { candidates } =
        h.engine.match_provider(req.id, &h.scope(), None, None).await.unwrap()
    else {
        panic!("expected candidates");
    };
    let names: Vec<_> = candidates.iter().map(|c| c.provider.display_name.as_str()).collect();
    assert_eq!(names, vec!["near", "mid", "far"]);

    h.drive_to_approved(req.id).await;
    let done = h.engine.transition(h.cmd(req.id, Stage::Assigned, "manager")).await.unwrap();
    assert_eq!(done.request.proposed_provider_id, Some(near.id));
    assert_eq!(done.request.assigned_provider_id, None);
    let event = done.event.unwrap();
    assert_eq!(event.metadata["proposed_provider_id"], json!(near.id));

    let accepted = h.step(req.id, Stage::Accepted, "technician").await;
    assert_eq!(accepted.assigned_provider_id, Some(near.id));
}

#[tokio::test]
async fn accept_without_any_provider_is_rejected() {
    let h = Harness::new();
    let req = h.create(Priority::Low, None).await;
    h.drive_to_approved(req.id).await;
    h.step(req.id, Stage::Assigned, "manager").await;
    let err = h
        .engine
        .transition(h.cmd(req.id, Stage::Accepted, "technician"))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Transition(TransitionError::ProviderRequired));
}

#[tokio::test]
async fn provider_from_another_company_is_unknown() {
    let h = Harness::new();
    let other = Harness::new();
    let foreign = other.provider("foreign", Some(north(1.0)));
    h.store.upsert_provider(foreign.clone());
    let req = h.create(Priority::Low, Some(SITE)).await;
    h.drive_to_approved(req.id).await;
    let mut assign = h.cmd(req.id, Stage::Assigned, "manager");
    assign.metadata.insert("provider_id".into(), json!(foreign.id));
    assert_eq!(
        h.engine.transition(assign).await.unwrap_err(),
        EngineError::UnknownProvider(foreign.id)
    );
}

// ─── Validation and reads ───────────────────────────────────────────

#[tokio::test]
async fn rejected_transitions_leave_no_trace() {
    let h = Harness::new();
    let req = h.create(Priority::Low, None).await;

    let forbidden = h
        .engine
        .transition(h.cmd(req.id, Stage::UnderReview, "requester"))
        .await
        .unwrap_err();
    assert!(matches!(forbidden, EngineError::Transition(TransitionError::Forbidden { .. })));

    let invalid = h
        .engine
        .transition(h.cmd(req.id, Stage::Paid, "admin"))
        .await
        .unwrap_err();
    assert!(matches!(invalid, EngineError::Transition(TransitionError::InvalidTransition { .. })));

    let outsider = Actor {
        id: ActorId::new(),
        role: Role::new("admin").unwrap(),
        scope: TenantScope::company(CompanyId::new()),
    };
    let mismatch = h
        .engine
        .transition(TransitionCommand {
            request_id: req.id,
            target: Stage::UnderReview,
            actor: outsider,
            note: None,
            metadata: Map::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(mismatch, EngineError::Transition(TransitionError::TenantMismatch { .. })));

    assert_eq!(h.engine.history(req.id, &h.scope()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn same_stage_is_idempotent() {
    let h = Harness::new();
    let req = h.create(Priority::Low, None).await;
    let again = h
        .engine
        .transition(h.cmd(req.id, Stage::Submitted, "manager"))
        .await
        .unwrap();
    assert!(again.is_noop());
    assert_eq!(again.request.version, req.version);
    assert_eq!(h.engine.history(req.id, &h.scope()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn history_is_ordered_and_gap_free() {
    let h = Harness::new();
    let req = h.create(Priority::Medium, None).await;
    h.drive_to_approved(req.id).await;
    h.step(req.id, Stage::Cancelled, "manager").await;
    let archived = h.step(req.id, Stage::Archived, "admin").await;
    assert!(archived.archived_at.is_some());

    let history = h.engine.history(req.id, &h.scope()).await.unwrap();
    let seqs: Vec<_> = history.iter().map(|e| e.sequence).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    assert_eq!(history[0].from_stage, None);
    assert_eq!(history[4].to_stage, Stage::Archived);

    let err = h
        .engine
        .transition(h.cmd(req.id, Stage::Draft, "admin"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::Transition(TransitionError::AlreadyTerminal { stage: Stage::Archived })
    );
}

#[tokio::test]
async fn reads_are_tenant_scoped() {
    let h = Harness::new();
    let req = h.create(Priority::Low, None).await;
    let foreign = TenantScope::company(CompanyId::new());
    assert!(matches!(
        h.engine.get_request(req.id, &foreign).await,
        Err(EngineError::Transition(TransitionError::TenantMismatch { .. }))
    ));
    let missing = RequestId::new();
    assert_eq!(
        h.engine.get_request(missing, &h.scope()).await.unwrap_err(),
        EngineError::NotFound(missing)
    );
}

#[tokio::test]
async fn missing_policy_leaves_deadlines_unset() {
    let store = MemoryStore::with_policies(PolicyBook::new(vec![]).unwrap());
    let h = Harness::with_store(store, |s| Arc::new(s) as Arc<dyn RequestStore>);
    let req = h.create(Priority::Urgent, None).await;
    assert!(!req.sla.is_started());
    let history = h.engine.history(req.id, &h.scope()).await.unwrap();
    assert_eq!(history[0].metadata["sla_policy"], "no_policy");
}

// ─── Notifications ──────────────────────────────────────────────────

struct FailingNotifier {
    attempts: AtomicUsize,
    payloads: parking_lot::Mutex<Vec<Value>>,
}

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _request_id: RequestId, _event_type: &str, payload: &Value) -> Result<(), NotifyError> {
        self.payloads.lock().push(payload.clone());
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(NotifyError::Unavailable("push gateway down".into()))
    }
}

#[tokio::test]
async fn failing_notifier_never_fails_transitions() {
    let h = Harness::new();
    let notifier = Arc::new(FailingNotifier {
        attempts: AtomicUsize::new(0),
        payloads: parking_lot::Mutex::new(Vec::new()),
    });
    let handle = NotificationDispatcher::spawn(h.engine.bus().subscribe(), notifier.clone());

    let req = h.create(Priority::High, None).await;
    let manager = h.actor("manager");
    let mut review = h.cmd(req.id, Stage::UnderReview, "manager");
    review.actor = manager.clone();
    let reviewed = h.engine.transition(review).await.unwrap().request;
    assert_eq!(reviewed.stage, Stage::UnderReview);

    let attempts = Arc::clone(&notifier);
    tokio::time::timeout(Duration::from_secs(5), async move {
        while attempts.attempts.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    handle.abort();

    let payloads = notifier.payloads.lock();
    let review_notice = payloads
        .iter()
        .find(|p| p["to_stage"] == "under_review")
        .expect("notice for the review transition");
    assert_eq!(review_notice["from_stage"], "submitted");
    assert_eq!(review_notice["actor_id"], json!(manager.id));
    assert_eq!(review_notice["actor_role"], "manager");
}

// ─── Rejection stops the SLA clock ──────────────────────────────────

#[tokio::test]
async fn rejected_request_never_reports_a_breach() {
    let h = Harness::new();
    let req = h.create(Priority::Urgent, None).await;
    h.clock.advance_minutes(5);
    h.step(req.id, Stage::Rejected, "manager").await;

    h.clock.advance_minutes(300);
    let status = h.engine.sla_status(req.id, &h.scope()).await.unwrap();
    assert_eq!(status.accept.state, WindowState::Met);
    assert!(!status.any_breached());

    h.step(req.id, Stage::Archived, "admin").await;
    h.clock.advance_minutes(10_000);
    let status = h.engine.sla_status(req.id, &h.scope()).await.unwrap();
    assert!(!status.any_breached());
}

// ─── Decline and re-dispatch ────────────────────────────────────────

#[tokio::test]
async fn declined_assignment_is_redispatched_to_next_provider() {
    let h = Harness::uncached();
    let near = h.provider("near", Some(north(0.5)));
    let mid = h.provider("mid", Some(north(2.0)));
    let req = h.create(Priority::High, Some(SITE)).await;
    h.drive_to_approved(req.id).await;

    let first = h.step(req.id, Stage::Assigned, "manager").await;
    assert_eq!(first.proposed_provider_id, Some(near.id));

    let declined = h.step(req.id, Stage::Approved, "technician").await;
    assert_eq!(declined.proposed_provider_id, None);
    assert_eq!(declined.assigned_provider_id, None);

    h.store.upsert_provider(Provider {
        status: ProviderStatus::Busy,
        ..near
    });

    let second = h.step(req.id, Stage::Assigned, "manager").await;
    assert_eq!(second.proposed_provider_id, Some(mid.id));
    assert_eq!(second.version, first.version + 2);
}
