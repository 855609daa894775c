//! # upkeep-dispatch: Dispatch Engine
//!
//! Wires the pure lifecycle in `upkeep-state` to storage, provider
//! matching, and notifications.
//!
//! ## Architecture
//!
//! - **Matcher** (`matcher.rs`): distance-ranked provider candidates with
//!   availability, specialization and radius filters.
//!
//! - **Ledger** (`ledger.rs`): append-only event history trait.
//!
//! - **Store** (`store.rs`): the persistence seam (`RequestStore`) with
//!   version CAS, plus a `parking_lot`-backed in-memory implementation.
//!
//! - **Bus / Notify** (`bus.rs`, `notify.rs`): broadcast event bus and the
//!   background dispatcher that forwards notices to a `Notifier`.
//!
//! - **Engine** (`engine.rs`): `create_request`, `transition`,
//!   `transition_with_retry`, `match_provider`, `sla_status`, `history`.
//!
//! ## Crate Policy
//!
//! - Storage and notification are async traits; validation and ranking are
//!   synchronous.
//! - No lock is held across an `.await`.

pub mod bus;
pub mod cache;
pub mod clock;
pub mod engine;
pub mod ledger;
pub mod matcher;
pub mod notify;
pub mod store;

pub use bus::{EventBus, TransitionNotice};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    DispatchEngine, EngineConfig, EngineError, TransitionCommand, Transitioned,
    DEFAULT_MAX_ATTEMPTS,
};
pub use ledger::{EventLedger, LedgerError};
pub use matcher::{
    find_nearest, MatchOutcome, NoMatchReason, Provider, ProviderFilter, ProviderKind,
    ProviderMatch, ProviderStatus,
};
pub use notify::{LogNotifier, NoOpNotifier, NotificationDispatcher, Notifier, NotifyError};
pub use store::{ConflictError, MemoryStore, RequestStore, StoreError};
