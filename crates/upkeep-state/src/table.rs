//! # Transition Table: Role-Gated Legal Edges
//!
//! The set of legal stage changes is data, not code: each edge
//! `(from, to)` carries the set of roles allowed to take it. Deployments
//! load their own table from YAML or JSON; [`TransitionTable::standard`] is
//! the built-in default.
//!
//! ## File Format
//!
//! ```yaml
//! edges:
//!   - from: draft
//!     to: submitted
//!     roles: [requester, manager, admin]
//! ```
//!
//! Tables are validated on construction: no self-edges, nothing leaves
//! `archived`, terminal stages only lead to `archived`, and every edge names
//! at least one role.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use upkeep_core::Role;

use crate::stage::Stage;

/// Errors raised while building or loading a transition table.
#[derive(Error, Debug)]
pub enum TableError {
    /// An edge points back at its own stage.
    #[error("self-edge on {stage} is not allowed")]
    SelfEdge { stage: Stage },

    /// An edge leaves a terminal stage for somewhere other than `archived`.
    #[error("terminal stage {from} may only transition to archived, not {to}")]
    TerminalEdge { from: Stage, to: Stage },

    /// An edge was declared with an empty role set.
    #[error("edge {from} -> {to} names no roles")]
    NoRoles { from: Stage, to: Stage },

    /// The same edge was declared twice.
    #[error("edge {from} -> {to} declared more than once")]
    DuplicateEdge { from: Stage, to: Stage },

    /// A role label failed validation.
    #[error("invalid role on edge {from} -> {to}: {source}")]
    InvalidRole {
        from: Stage,
        to: Stage,
        #[source]
        source: upkeep_core::ValidationError,
    },

    /// The document could not be parsed.
    #[error("failed to parse transition table: {0}")]
    Parse(String),
}

/// One edge as it appears in a table file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: Stage,
    pub to: Stage,
    pub roles: Vec<String>,
}

/// On-disk representation of a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableDocument {
    pub edges: Vec<EdgeSpec>,
}

/// Validated, role-gated transition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    edges: BTreeMap<(Stage, Stage), BTreeSet<Role>>,
}

impl TransitionTable {
    /// Build a table from edge specs, validating every edge.
    pub fn from_edges(edges: Vec<EdgeSpec>) -> Result<Self, TableError> {
        let mut map: BTreeMap<(Stage, Stage), BTreeSet<Role>> = BTreeMap::new();
        for edge in edges {
            let EdgeSpec { from, to, roles } = edge;
            if from == to {
                return Err(TableError::SelfEdge { stage: from });
            }
            if from.is_terminal() && (from == Stage::Archived || to != Stage::Archived) {
                return Err(TableError::TerminalEdge { from, to });
            }
            if roles.is_empty() {
                return Err(TableError::NoRoles { from, to });
            }
            let roles = roles
                .iter()
                .map(Role::new)
                .collect::<Result<BTreeSet<_>, _>>()
                .map_err(|source| TableError::InvalidRole { from, to, source })?;
            if map.insert((from, to), roles).is_some() {
                return Err(TableError::DuplicateEdge { from, to });
            }
        }
        Ok(Self { edges: map })
    }

    /// Parse and validate a YAML table document.
    pub fn from_yaml(input: &str) -> Result<Self, TableError> {
        let doc: TableDocument =
            serde_yaml::from_str(input).map_err(|e| TableError::Parse(e.to_string()))?;
        Self::from_edges(doc.edges)
    }

    /// Parse and validate a JSON table document.
    pub fn from_json(input: &str) -> Result<Self, TableError> {
        let doc: TableDocument =
            serde_json::from_str(input).map_err(|e| TableError::Parse(e.to_string()))?;
        Self::from_edges(doc.edges)
    }

    /// Export back to the document form.
    pub fn to_document(&self) -> TableDocument {
        TableDocument {
            edges: self
                .edges
                .iter()
                .map(|((from, to), roles)| EdgeSpec {
                    from: *from,
                    to: *to,
                    roles: roles.iter().map(|r| r.as_str().to_string()).collect(),
                })
                .collect(),
        }
    }

    /// Roles allowed on `from -> to`, or `None` if the edge does not exist.
    pub fn roles_for(&self, from: Stage, to: Stage) -> Option<&BTreeSet<Role>> {
        self.edges.get(&(from, to))
    }

    /// Whether `role` may take `from -> to`.
    pub fn permits(&self, from: Stage, to: Stage, role: &Role) -> bool {
        self.roles_for(from, to)
            .is_some_and(|roles| roles.contains(role))
    }

    /// Stages reachable from `from` in one step by `role`.
    pub fn targets_from(&self, from: Stage, role: &Role) -> Vec<Stage> {
        self.edges
            .range((from, Stage::Draft)..=(from, Stage::Archived))
            .filter(|(_, roles)| roles.contains(role))
            .map(|((_, to), _)| *to)
            .collect()
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the table has no edges.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Iterate over `(from, to, roles)`.
    pub fn edges(&self) -> impl Iterator<Item = (Stage, Stage, &BTreeSet<Role>)> {
        self.edges.iter().map(|((f, t), r)| (*f, *t, r))
    }

    /// The built-in default table.
    pub fn standard() -> Self {
        use Stage::*;

        const REQ: &[&str] = &["requester", "manager", "admin"];
        const MGR: &[&str] = &["manager", "admin"];
        const FIELD: &[&str] = &["technician", "vendor", "manager", "admin"];
        const INSPECT: &[&str] = &["inspector", "manager", "admin"];
        const BILLING: &[&str] = &["accountant", "manager", "admin"];

        let edges: &[(Stage, Stage, &[&str])] = &[
            (Draft, Submitted, REQ),
            (Draft, Cancelled, REQ),
            (Submitted, UnderReview, MGR),
            (Submitted, Cancelled, REQ),
            (Submitted, Rejected, MGR),
            (UnderReview, Approved, MGR),
            (UnderReview, Rejected, MGR),
            (UnderReview, Cancelled, REQ),
            (Approved, Assigned, MGR),
            (Approved, Cancelled, MGR),
            (Assigned, Accepted, FIELD),
            (Assigned, Approved, FIELD),
            (Assigned, Cancelled, MGR),
            (Accepted, Scheduled, FIELD),
            (Accepted, Cancelled, MGR),
            (Scheduled, InProgress, FIELD),
            (Scheduled, OnHold, FIELD),
            (Scheduled, Cancelled, MGR),
            (InProgress, PendingInspection, FIELD),
            (InProgress, AdditionalMaterialsNeeded, FIELD),
            (InProgress, OnHold, FIELD),
            (InProgress, Cancelled, MGR),
            (AdditionalMaterialsNeeded, InProgress, FIELD),
            (AdditionalMaterialsNeeded, OnHold, MGR),
            (AdditionalMaterialsNeeded, Cancelled, MGR),
            (OnHold, InProgress, FIELD),
            (OnHold, Scheduled, FIELD),
            (OnHold, Cancelled, MGR),
            (PendingInspection, InspectionPassed, INSPECT),
            (PendingInspection, InProgress, INSPECT),
            (PendingInspection, Cancelled, MGR),
            (InspectionPassed, Completed, FIELD),
            (Completed, Billed, BILLING),
            (Completed, InProgress, REQ),
            (Billed, Paid, &["accountant", "admin"]),
            (Paid, Closed, BILLING),
            (Closed, Archived, MGR),
            (Cancelled, Archived, MGR),
            (Rejected, Archived, MGR),
        ];

        let edges = edges
            .iter()
            .map(|(from, to, roles)| {
                let roles = roles
                    .iter()
                    .filter_map(|r| Role::new(r).ok())
                    .collect::<BTreeSet<_>>();
                ((*from, *to), roles)
            })
            .collect();
        Self { edges }
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}
