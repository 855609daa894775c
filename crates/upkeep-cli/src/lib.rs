//! # upkeep-cli: Operator Command-Line Interface
//!
//! Offline tooling around the lifecycle engine. Nothing here talks to the
//! API or the database.
//!
//! ## Subcommands
//!
//! - `table`: validate a transition table file, list edges and next stages
//! - `sla`: validate a policy file, compute deadlines for a request
//! - `geo`: great-circle distance between two points
//!
//! ## Crate Policy
//!
//! - Argument parsing is separated from the handlers.
//! - Handlers delegate to `upkeep-core` / `upkeep-state`; no lifecycle
//!   rules are re-implemented here.
//! - Handlers write to a caller-supplied sink and return a process exit code.

pub mod geo;
pub mod sla;
pub mod table;

use std::path::Path;

use anyhow::{Context, Result};

use upkeep_state::{PolicyBook, TransitionTable};

/// Whether `path` should be parsed as JSON rather than YAML.
fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Read and validate a transition table file (YAML, or JSON by extension).
pub fn load_table(path: &Path) -> Result<TransitionTable> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let table = if is_json(path) {
        TransitionTable::from_json(&raw)
    } else {
        TransitionTable::from_yaml(&raw)
    };
    table.with_context(|| format!("invalid transition table {}", path.display()))
}

/// Read and validate an SLA policy file (YAML, or JSON by extension).
pub fn load_policies(path: &Path) -> Result<PolicyBook> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let book = if is_json(path) {
        PolicyBook::from_json(&raw)
    } else {
        PolicyBook::from_yaml(&raw)
    };
    book.with_context(|| format!("invalid SLA policies {}", path.display()))
}
