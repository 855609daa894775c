//! # upkeep-state: Maintenance Request Lifecycle
//!
//! The state machine half of the dispatch engine. Everything here is pure:
//! no clock reads, no storage, no messaging. Callers pass the current time
//! and any externally computed inputs in.
//!
//! ## Modules
//!
//! - **Stage** (`stage.rs`): the 19-stage canonical lifecycle enum and its
//!   derived `RequestStatus` projection.
//!
//! - **Table** (`table.rs`): role-gated legal edges, loadable from YAML or
//!   JSON, with a built-in standard table.
//!
//! - **Request** (`request.rs`): the `MaintenanceRequest` record and its
//!   validate-then-apply transition logic, including stage-entry effects
//!   (SLA clock start, assignment, window closing, archival).
//!
//! - **Event** (`event.rs`): the append-only ledger row emitted by each
//!   stage change.
//!
//! - **SLA** (`sla.rs`): policy book resolution and per-window outcome
//!   tracking.

pub mod event;
pub mod request;
pub mod sla;
pub mod stage;
pub mod table;

// ─── Lifecycle re-exports ───────────────────────────────────────────

pub use request::{
    Actor, Assignment, Check, EntryEffects, MaintenanceRequest, NewRequest, TransitionError,
    TransitionInput,
};
pub use stage::{RequestStatus, Stage};
pub use table::{EdgeSpec, TableDocument, TableError, TransitionTable};

// ─── Ledger re-exports ──────────────────────────────────────────────

pub use event::{order_history, RequestEvent};

// ─── SLA re-exports ─────────────────────────────────────────────────

pub use sla::{
    is_breached, PolicyBook, PolicyDocument, PolicyError, SlaClock, SlaDeadlines, SlaOutcome,
    SlaPolicy, SlaResolution, SlaStatus, SlaVerdict, SlaWindow, SlaWindowKind, WindowState,
    WindowStatus,
};
