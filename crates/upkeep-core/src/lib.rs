//! # upkeep-core: Foundational Types for the Dispatch Engine
//!
//! Leaf crate of the upkeep workspace. Defines the primitives every other
//! crate builds on; it depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype identifiers.** `RequestId`, `ProviderId`, `CompanyId`,
//!    `BranchId`, `ActorId`, `EventId`; you cannot pass a provider id where
//!    a request id is expected.
//!
//! 2. **UTC-only timestamps.** `Timestamp` is UTC with seconds precision, so
//!    SLA deadlines compare exactly and serialize deterministically.
//!
//! 3. **Tenant scope is a type.** `TenantScope` is the only way to ask
//!    "may this principal act on that record".
//!
//! 4. **Pure geo math.** `geo::distance_km` is a haversine with no I/O, the
//!    basis of provider ranking.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `upkeep-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod domain;
pub mod error;
pub mod geo;
pub mod identity;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use domain::{Category, Priority, Role};
pub use error::{UpkeepError, ValidationError};
pub use geo::{distance_km, GeoPoint, EARTH_RADIUS_KM};
pub use identity::{ActorId, BranchId, CompanyId, EventId, ProviderId, RequestId, TenantScope};
pub use temporal::Timestamp;
