//! # Domain Identity Newtypes
//!
//! Newtype wrappers for every identifier in the dispatch engine. These
//! prevent accidental identifier confusion: you cannot pass a `ProviderId`
//! where a `RequestId` is expected.
//!
//! ## Tenant Invariant
//!
//! Every maintenance request and provider belongs to exactly one company
//! (tenant) and optionally one branch (sub-tenant). `TenantScope` is the
//! single place that decides whether a principal may act on a record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $ty:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $ty(pub Uuid);

        impl $ty {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $ty {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }

        impl std::str::FromStr for $ty {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<Uuid>().map(Self)
            }
        }
    };
}

uuid_identifier!(
    /// Unique identifier for a maintenance request.
    RequestId,
    "request"
);

uuid_identifier!(
    /// Unique identifier for a provider (technician or vendor).
    ProviderId,
    "provider"
);

uuid_identifier!(
    /// Tenant identifier: the company that owns requests and providers.
    CompanyId,
    "company"
);

uuid_identifier!(
    /// Sub-tenant identifier: a branch (site, property group) of a company.
    BranchId,
    "branch"
);

uuid_identifier!(
    /// The principal performing a transition (user or service account).
    ActorId,
    "actor"
);

uuid_identifier!(
    /// Unique identifier for a ledger event.
    EventId,
    "event"
);

// ─── Tenant Scope ────────────────────────────────────────────────────

/// The tenant boundary a principal operates within.
///
/// A company-wide principal has `branch_id == None` and may act on any
/// record of its company. A branch-scoped principal may only act on records
/// of that branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantScope {
    /// The company the principal belongs to.
    pub company_id: CompanyId,
    /// The branch the principal is restricted to, if any.
    pub branch_id: Option<BranchId>,
}

impl TenantScope {
    /// A company-wide scope.
    pub fn company(company_id: CompanyId) -> Self {
        Self {
            company_id,
            branch_id: None,
        }
    }

    /// A branch-restricted scope.
    pub fn branch(company_id: CompanyId, branch_id: BranchId) -> Self {
        Self {
            company_id,
            branch_id: Some(branch_id),
        }
    }

    /// Whether this scope may act on a record owned by `company_id` /
    /// `branch_id`.
    pub fn permits(&self, company_id: &CompanyId, branch_id: Option<&BranchId>) -> bool {
        if self.company_id != *company_id {
            return false;
        }
        match &self.branch_id {
            None => true,
            Some(own) => branch_id == Some(own),
        }
    }
}
