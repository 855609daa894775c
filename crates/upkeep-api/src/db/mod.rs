//! # Database Persistence Layer
//!
//! Postgres implementation of the dispatch engine's storage seam via SQLx.
//!
//! The database layer is optional. When `DATABASE_URL` is set the API
//! persists requests, events, providers and SLA policies to PostgreSQL.
//! When absent it runs on the in-memory store (development and tests).
//!
//! The version compare-and-swap and the event insert share one
//! transaction, so a request row never moves without its ledger entry.

pub mod events;
pub mod policies;
pub mod providers;
pub mod requests;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use upkeep_core::{ProviderId, RequestId};
use upkeep_dispatch::{
    ConflictError, EventLedger, LedgerError, Provider, ProviderFilter, RequestStore, StoreError,
};
use upkeep_state::{MaintenanceRequest, PolicyBook, RequestEvent};

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `url` is `None` (in-memory mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool(url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = url else {
        tracing::warn!(
            "DATABASE_URL not set; running in-memory only mode. \
             State will not survive restarts."
        );
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// [`RequestStore`] backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a driver error to the store's backend variant.
pub(crate) fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn unique_violation(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .filter(|db| db.is_unique_violation())
        .map(|db| db.constraint().unwrap_or_default().to_string())
}

/// Classify a failed event insert.
fn ledger_error(err: sqlx::Error, event: &RequestEvent) -> LedgerError {
    match unique_violation(&err).as_deref() {
        Some(events::SEQUENCE_CONSTRAINT) => LedgerError::DuplicateSequence {
            request_id: event.request_id,
            sequence: event.sequence,
        },
        Some(_) => LedgerError::DuplicateEvent(event.id),
        None => LedgerError::Backend(err.to_string()),
    }
}

#[async_trait]
impl EventLedger for PgStore {
    async fn append(&self, event: &RequestEvent) -> Result<(), LedgerError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| LedgerError::Backend(e.to_string()))?;
        events::insert(&mut *conn, event)
            .await
            .map_err(|e| ledger_error(e, event))
    }

    async fn history(&self, request_id: RequestId) -> Result<Vec<RequestEvent>, LedgerError> {
        events::list_for_request(&self.pool, request_id).await
    }
}

#[async_trait]
impl RequestStore for PgStore {
    async fn load_request(&self, id: RequestId) -> Result<Option<MaintenanceRequest>, StoreError> {
        requests::get_by_id(&self.pool, id).await
    }

    async fn insert_request(
        &self,
        request: &MaintenanceRequest,
        event: &RequestEvent,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        if let Err(err) = requests::insert(&mut *tx, request).await {
            return Err(match unique_violation(&err) {
                Some(_) => StoreError::AlreadyExists(request.id),
                None => backend(err),
            });
        }
        events::insert(&mut *tx, event)
            .await
            .map_err(|e| StoreError::Ledger(ledger_error(e, event)))?;
        tx.commit().await.map_err(backend)
    }

    async fn save_request(
        &self,
        request: &MaintenanceRequest,
        expected_version: i64,
        event: &RequestEvent,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let swapped = requests::compare_and_swap(&mut *tx, request, expected_version)
            .await
            .map_err(backend)?;
        if !swapped {
            let actual = requests::current_version(&mut *tx, request.id)
                .await
                .map_err(backend)?;
            return Err(ConflictError {
                request_id: request.id,
                expected: expected_version,
                actual,
            }
            .into());
        }
        events::insert(&mut *tx, event)
            .await
            .map_err(|e| StoreError::Ledger(ledger_error(e, event)))?;
        tx.commit().await.map_err(backend)
    }

    async fn list_active_providers(
        &self,
        filter: &ProviderFilter,
    ) -> Result<Vec<Provider>, StoreError> {
        providers::list_active(&self.pool, filter).await
    }

    async fn get_provider(&self, id: ProviderId) -> Result<Option<Provider>, StoreError> {
        providers::get_by_id(&self.pool, id).await
    }

    async fn policy_book(&self) -> Result<PolicyBook, StoreError> {
        policies::load(&self.pool).await
    }
}
