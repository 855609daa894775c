//! # Application State
//!
//! Shared state for the Axum application: the dispatch engine (which owns
//! the store, transition table and event bus) plus process configuration.

use std::sync::Arc;

use sqlx::PgPool;

use upkeep_dispatch::{DispatchEngine, EventBus, MemoryStore, RequestStore, SystemClock};

use crate::config::{ApiConfig, ConfigError};
use crate::db::PgStore;

/// Shared application state passed to all route handlers. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: DispatchEngine,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    pub fn new(engine: DispatchEngine, config: ApiConfig) -> Self {
        Self {
            engine,
            config: Arc::new(config),
        }
    }

    /// Wire the engine from configuration. With a pool the Postgres store is
    /// used and the policy book comes from the `sla_policies` table;
    /// otherwise requests live in memory under the configured policy book.
    pub fn build(config: ApiConfig, pool: Option<PgPool>) -> Result<Self, ConfigError> {
        let table = config.load_transition_table()?;
        let store: Arc<dyn RequestStore> = match pool {
            Some(pool) => Arc::new(PgStore::new(pool)),
            None => Arc::new(MemoryStore::with_policies(config.load_policy_book()?)),
        };
        tracing::info!(
            edges = table.len(),
            cache_ttl_secs = config.cache_ttl_secs,
            max_retries = config.max_retries,
            "dispatch engine configured"
        );
        let engine = DispatchEngine::with_parts(
            store,
            table,
            EventBus::default(),
            Arc::new(SystemClock),
            config.engine_config(),
        );
        Ok(Self::new(engine, config))
    }

    /// In-memory state over `store`, for tests and local development.
    pub fn in_memory(store: MemoryStore, config: ApiConfig) -> Result<Self, ConfigError> {
        let table = config.load_transition_table()?;
        let engine = DispatchEngine::with_parts(
            Arc::new(store),
            table,
            EventBus::default(),
            Arc::new(SystemClock),
            config.engine_config(),
        );
        Ok(Self::new(engine, config))
    }
}
