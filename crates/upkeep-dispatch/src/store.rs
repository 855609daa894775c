//! # Persistence
//!
//! [`RequestStore`] is the storage seam the engine is written against. The
//! contract that matters is `save_request`: write the request only if the
//! stored version still equals `expected_version`, and append the event in
//! the same atomic step. A version mismatch is a [`ConflictError`]; the
//! caller reloads and retries.
//!
//! [`MemoryStore`] keeps everything behind one `parking_lot` lock, so the
//! compare, the write and the append cannot interleave with another save.
//! The lock is never held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use upkeep_core::{EventId, ProviderId, RequestId};
use upkeep_state::{order_history, MaintenanceRequest, PolicyBook, RequestEvent};

use crate::ledger::{EventLedger, LedgerError};
use crate::matcher::{Provider, ProviderFilter};

/// Optimistic concurrency failure: someone else saved first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("version conflict on {request_id}: expected {expected}, found {actual:?}")]
pub struct ConflictError {
    pub request_id: RequestId,
    pub expected: i64,
    /// `None` if the request vanished.
    pub actual: Option<i64>,
}

/// Errors from the request store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Insert of an id that already exists.
    #[error("request {0} already exists")]
    AlreadyExists(RequestId),

    /// The backing store failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Storage consumed by the dispatch engine.
#[async_trait]
pub trait RequestStore: EventLedger {
    async fn load_request(&self, id: RequestId) -> Result<Option<MaintenanceRequest>, StoreError>;

    /// Insert a new request together with its creation event.
    async fn insert_request(
        &self,
        request: &MaintenanceRequest,
        event: &RequestEvent,
    ) -> Result<(), StoreError>;

    /// Compare-and-swap on `version`, appending `event` atomically.
    async fn save_request(
        &self,
        request: &MaintenanceRequest,
        expected_version: i64,
        event: &RequestEvent,
    ) -> Result<(), StoreError>;

    /// Active providers of a company.
    async fn list_active_providers(
        &self,
        filter: &ProviderFilter,
    ) -> Result<Vec<Provider>, StoreError>;

    async fn get_provider(&self, id: ProviderId) -> Result<Option<Provider>, StoreError>;

    /// The SLA policy book in force.
    async fn policy_book(&self) -> Result<PolicyBook, StoreError>;
}

// ─── In-Memory Store ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Inner {
    requests: HashMap<RequestId, MaintenanceRequest>,
    events: HashMap<RequestId, Vec<RequestEvent>>,
    event_ids: HashSet<EventId>,
    providers: HashMap<ProviderId, Provider>,
    policies: PolicyBook,
}

impl Inner {
    fn check_event(&self, event: &RequestEvent) -> Result<(), LedgerError> {
        if self.event_ids.contains(&event.id) {
            return Err(LedgerError::DuplicateEvent(event.id));
        }
        let taken = self
            .events
            .get(&event.request_id)
            .is_some_and(|events| events.iter().any(|e| e.sequence == event.sequence));
        if taken {
            return Err(LedgerError::DuplicateSequence {
                request_id: event.request_id,
                sequence: event.sequence,
            });
        }
        Ok(())
    }

    fn push_event(&mut self, event: &RequestEvent) {
        self.event_ids.insert(event.id);
        self.events
            .entry(event.request_id)
            .or_default()
            .push(event.clone());
    }
}

/// Thread-safe, cloneable in-memory store for tests and development.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Empty store using the standard policy book.
    pub fn new() -> Self {
        Self::with_policies(PolicyBook::standard())
    }

    /// Empty store using `policies`.
    pub fn with_policies(policies: PolicyBook) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                policies,
                ..Inner::default()
            })),
        }
    }

    /// Insert or replace a provider.
    pub fn upsert_provider(&self, provider: Provider) {
        self.inner.write().providers.insert(provider.id, provider);
    }

    /// Number of stored requests.
    pub fn request_count(&self) -> usize {
        self.inner.read().requests.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventLedger for MemoryStore {
    async fn append(&self, event: &RequestEvent) -> Result<(), LedgerError> {
        let mut inner = self.inner.write();
        inner.check_event(event)?;
        inner.push_event(event);
        Ok(())
    }

    async fn history(&self, request_id: RequestId) -> Result<Vec<RequestEvent>, LedgerError> {
        let mut events = self
            .inner
            .read()
            .events
            .get(&request_id)
            .cloned()
            .unwrap_or_default();
        order_history(&mut events);
        Ok(events)
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn load_request(&self, id: RequestId) -> Result<Option<MaintenanceRequest>, StoreError> {
        Ok(self.inner.read().requests.get(&id).cloned())
    }

    async fn insert_request(
        &self,
        request: &MaintenanceRequest,
        event: &RequestEvent,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.requests.contains_key(&request.id) {
            return Err(StoreError::AlreadyExists(request.id));
        }
        inner.check_event(event)?;
        inner.requests.insert(request.id, request.clone());
        inner.push_event(event);
        Ok(())
    }

    async fn save_request(
        &self,
        request: &MaintenanceRequest,
        expected_version: i64,
        event: &RequestEvent,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let actual = inner.requests.get(&request.id).map(|r| r.version);
        if actual != Some(expected_version) {
            return Err(ConflictError {
                request_id: request.id,
                expected: expected_version,
                actual,
            }
            .into());
        }
        inner.check_event(event)?;
        inner.requests.insert(request.id, request.clone());
        inner.push_event(event);
        Ok(())
    }

    async fn list_active_providers(
        &self,
        filter: &ProviderFilter,
    ) -> Result<Vec<Provider>, StoreError> {
        let inner = self.inner.read();
        let mut providers: Vec<Provider> = inner
            .providers
            .values()
            .filter(|p| p.active && p.company_id == filter.company_id)
            .filter(|p| {
                filter
                    .specialization
                    .as_ref()
                    .map_or(true, |s| p.has_specialization(s))
            })
            .cloned()
            .collect();
        providers.sort_by_key(|p| p.id);
        Ok(providers)
    }

    async fn get_provider(&self, id: ProviderId) -> Result<Option<Provider>, StoreError> {
        Ok(self.inner.read().providers.get(&id).cloned())
    }

    async fn policy_book(&self) -> Result<PolicyBook, StoreError> {
        Ok(self.inner.read().policies.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use upkeep_core::{Category, CompanyId, Priority, Timestamp};
    use upkeep_state::{NewRequest, Stage};

    use crate::matcher::{ProviderKind, ProviderStatus};

    fn created() -> (MaintenanceRequest, RequestEvent) {
        MaintenanceRequest::create(
            NewRequest {
                company_id: CompanyId::new(),
                branch_id: None,
                title: "Broken window".into(),
                description: None,
                category: Category::new("glazing").unwrap(),
                subcategory: None,
                priority: Priority::Low,
                initial_stage: Stage::Draft,
                location: None,
                location_text: None,
            },
            None,
            None,
            Timestamp::now(),
        )
        .unwrap()
    }

    fn follow_up(request: &MaintenanceRequest, sequence: i64) -> RequestEvent {
        RequestEvent {
            id: EventId::new(),
            request_id: request.id,
            sequence,
            from_stage: Some(Stage::Draft),
            to_stage: Stage::Submitted,
            actor_id: None,
            actor_role: None,
            timestamp: Timestamp::now(),
            metadata: Map::new(),
            note: None,
        }
    }

    #[tokio::test]
    async fn insert_then_load() {
        let store = MemoryStore::new();
        let (req, event) = created();
        store.insert_request(&req, &event).await.unwrap();
        assert_eq!(store.load_request(req.id).await.unwrap(), Some(req.clone()));
        assert_eq!(store.history(req.id).await.unwrap(), vec![event.clone()]);
        assert_eq!(
            store.insert_request(&req, &event).await,
            Err(StoreError::AlreadyExists(req.id))
        );
    }

    #[tokio::test]
    async fn save_is_compare_and_swap() {
        let store = MemoryStore::new();
        let (mut req, event) = created();
        store.insert_request(&req, &event).await.unwrap();

        req.version = 2;
        store.save_request(&req, 1, &follow_up(&req, 2)).await.unwrap();

        let stale = store.save_request(&req, 1, &follow_up(&req, 3)).await;
        assert_eq!(
            stale,
            Err(StoreError::Conflict(ConflictError {
                request_id: req.id,
                expected: 1,
                actual: Some(2),
            }))
        );
        assert_eq!(store.history(req.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn ledger_rejects_duplicates() {
        let store = MemoryStore::new();
        let (req, event) = created();
        store.insert_request(&req, &event).await.unwrap();
        assert_eq!(
            store.append(&event).await,
            Err(LedgerError::DuplicateEvent(event.id))
        );
        let same_sequence = follow_up(&req, 1);
        assert!(matches!(
            store.append(&same_sequence).await,
            Err(LedgerError::DuplicateSequence { .. })
        ));
    }

    #[tokio::test]
    async fn history_after_resumes() {
        let store = MemoryStore::new();
        let (req, event) = created();
        store.insert_request(&req, &event).await.unwrap();
        store.append(&follow_up(&req, 2)).await.unwrap();
        let rest = store.history_after(req.id, 1).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].sequence, 2);
        assert!(store.history(RequestId::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn roster_is_scoped_to_company() {
        let store = MemoryStore::new();
        let company = CompanyId::new();
        let make = |company_id, active| Provider {
            id: ProviderId::new(),
            company_id,
            display_name: "p".into(),
            kind: ProviderKind::Vendor,
            specializations: vec![Category::new("hvac").unwrap()],
            status: ProviderStatus::Online,
            active,
            location: None,
            location_updated_at: None,
            service_radius_km: None,
            rating: None,
        };
        store.upsert_provider(make(company, true));
        store.upsert_provider(make(company, false));
        store.upsert_provider(make(CompanyId::new(), true));
        let filter = ProviderFilter {
            company_id: company,
            specialization: None,
        };
        assert_eq!(store.list_active_providers(&filter).await.unwrap().len(), 1);
    }
}
