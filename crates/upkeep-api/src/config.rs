//! Service configuration.
//!
//! Read from environment variables at startup. Unset variables fall back
//! to documented defaults; set-but-invalid variables are errors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use upkeep_dispatch::{EngineConfig, DEFAULT_MAX_ATTEMPTS};
use upkeep_state::{PolicyBook, PolicyError, TableError, TransitionTable};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_CACHE_TTL_SECS: u64 = 30;

/// Configuration for the API process.
///
/// Custom `Debug` implementation redacts `database_url`, which may carry
/// credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Postgres URL. `None` runs the in-memory store.
    pub database_url: Option<String>,
    /// YAML or JSON transition table. `None` uses the standard table.
    pub transitions_path: Option<PathBuf>,
    /// YAML or JSON SLA policy book for the in-memory store.
    pub sla_policies_path: Option<PathBuf>,
    /// TTL for cached rosters and policy book; zero disables caching.
    pub cache_ttl_secs: u64,
    /// Attempts per transition when versions race.
    pub max_retries: u32,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("port", &self.port)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("transitions_path", &self.transitions_path)
            .field("sla_policies_path", &self.sla_policies_path)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            transitions_path: None,
            sla_policies_path: None,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_retries: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `PORT` (default: 8080)
    /// - `DATABASE_URL` (default: unset, in-memory store)
    /// - `UPKEEP_TRANSITIONS` (default: standard transition table)
    /// - `UPKEEP_SLA_POLICIES` (default: standard policy book)
    /// - `UPKEEP_CACHE_TTL_SECS` (default: 30)
    /// - `UPKEEP_MAX_RETRIES` (default: 3)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let max_retries = parse_var(&var, "UPKEEP_MAX_RETRIES", DEFAULT_MAX_ATTEMPTS)?;
        if max_retries == 0 {
            return Err(ConfigError::Invalid {
                var: "UPKEEP_MAX_RETRIES",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            port: parse_var(&var, "PORT", DEFAULT_PORT)?,
            database_url: var("DATABASE_URL"),
            transitions_path: var("UPKEEP_TRANSITIONS").map(PathBuf::from),
            sla_policies_path: var("UPKEEP_SLA_POLICIES").map(PathBuf::from),
            cache_ttl_secs: parse_var(&var, "UPKEEP_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?,
            max_retries,
        })
    }

    /// Engine tunables derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            max_attempts: self.max_retries,
        }
    }

    /// The configured transition table, or the standard one.
    pub fn load_transition_table(&self) -> Result<TransitionTable, ConfigError> {
        let Some(path) = &self.transitions_path else {
            return Ok(TransitionTable::standard());
        };
        let raw = read(path)?;
        let table = if is_json(path) {
            TransitionTable::from_json(&raw)
        } else {
            TransitionTable::from_yaml(&raw)
        };
        table.map_err(|source| ConfigError::Table {
            path: path.clone(),
            source,
        })
    }

    /// The configured policy book, or the standard one.
    pub fn load_policy_book(&self) -> Result<PolicyBook, ConfigError> {
        let Some(path) = &self.sla_policies_path else {
            return Ok(PolicyBook::standard());
        };
        let raw = read(path)?;
        let book = if is_json(path) {
            PolicyBook::from_json(&raw)
        } else {
            PolicyBook::from_yaml(&raw)
        };
        book.map_err(|source| ConfigError::Policies {
            path: path.clone(),
            source,
        })
    }
}

fn parse_var<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var: name,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transition table {}: {source}", path.display())]
    Table {
        path: PathBuf,
        #[source]
        source: TableError,
    },

    #[error("SLA policies {}: {source}", path.display())]
    Policies {
        path: PathBuf,
        #[source]
        source: PolicyError,
    },
}
