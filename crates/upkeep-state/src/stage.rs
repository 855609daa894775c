//! # Request Stage and Status Projection
//!
//! `Stage` is the canonical lifecycle position of a maintenance request and
//! the single source of truth. `RequestStatus` is a coarser projection for
//! external consumers (dashboards, tenants' apps); it is always derived from
//! the stage and never stored independently.
//!
//! ```text
//! draft ─▶ submitted ─▶ under_review ─▶ approved ─▶ assigned ─▶ accepted ─▶ scheduled
//!                                           ▲           │                      │
//!                                           └─ decline ─┘                      ▼
//!                                                          ┌──────────── in_progress ◀──────────┐
//!                                                          ▼                 │                  │
//!                                          additional_materials_needed   on_hold   pending_inspection
//!                                                                                      │
//!                                                                                      ▼
//!                          archived ◀─ closed ◀─ paid ◀─ billed ◀─ completed ◀─ inspection_passed
//! ```
//!
//! `cancelled` and `rejected` are side exits; `closed`, `cancelled` and
//! `rejected` may only move on to `archived`.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use upkeep_core::ValidationError;

/// Canonical lifecycle stage of a maintenance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Being composed by the requester; not yet visible to managers.
    Draft,
    /// Filed; the SLA clock starts here.
    Submitted,
    /// A manager is triaging the request.
    UnderReview,
    /// Approved for dispatch.
    Approved,
    /// A provider is assigned or proposed.
    Assigned,
    /// The provider accepted the job.
    Accepted,
    /// A visit is scheduled.
    Scheduled,
    /// Work on site has started.
    InProgress,
    /// Work done, awaiting inspection.
    PendingInspection,
    /// Work blocked on parts or materials.
    AdditionalMaterialsNeeded,
    /// Work paused.
    OnHold,
    /// Inspection passed.
    InspectionPassed,
    /// Work complete.
    Completed,
    /// Invoice issued.
    Billed,
    /// Invoice settled.
    Paid,
    /// Closed out (terminal, archivable).
    Closed,
    /// Withdrawn before completion (terminal, archivable).
    Cancelled,
    /// Refused at triage (terminal, archivable).
    Rejected,
    /// Archived (terminal, immutable).
    Archived,
}

impl Stage {
    /// All stages in lifecycle order.
    pub fn all() -> &'static [Stage] {
        &[
            Self::Draft,
            Self::Submitted,
            Self::UnderReview,
            Self::Approved,
            Self::Assigned,
            Self::Accepted,
            Self::Scheduled,
            Self::InProgress,
            Self::PendingInspection,
            Self::AdditionalMaterialsNeeded,
            Self::OnHold,
            Self::InspectionPassed,
            Self::Completed,
            Self::Billed,
            Self::Paid,
            Self::Closed,
            Self::Cancelled,
            Self::Rejected,
            Self::Archived,
        ]
    }

    /// The canonical snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Assigned => "assigned",
            Self::Accepted => "accepted",
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::PendingInspection => "pending_inspection",
            Self::AdditionalMaterialsNeeded => "additional_materials_needed",
            Self::OnHold => "on_hold",
            Self::InspectionPassed => "inspection_passed",
            Self::Completed => "completed",
            Self::Billed => "billed",
            Self::Paid => "paid",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
            Self::Archived => "archived",
        }
    }

    /// Terminal stages accept no transition except archival.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Closed | Self::Cancelled | Self::Rejected | Self::Archived
        )
    }

    /// Whether a request may be created directly in this stage.
    pub fn is_entry(&self) -> bool {
        matches!(self, Self::Draft | Self::Submitted)
    }

    /// The external status this stage projects to.
    pub fn status(&self) -> RequestStatus {
        match self {
            Self::Draft | Self::Submitted | Self::UnderReview | Self::Approved => {
                RequestStatus::Pending
            }
            Self::Assigned | Self::Accepted | Self::Scheduled => RequestStatus::Assigned,
            Self::InProgress | Self::PendingInspection | Self::InspectionPassed => {
                RequestStatus::InProgress
            }
            Self::AdditionalMaterialsNeeded | Self::OnHold => RequestStatus::OnHold,
            Self::Completed | Self::Billed | Self::Paid => RequestStatus::Completed,
            Self::Closed | Self::Archived => RequestStatus::Closed,
            Self::Cancelled => RequestStatus::Cancelled,
            Self::Rejected => RequestStatus::Rejected,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|stage| stage.as_str() == wanted)
            .ok_or_else(|| ValidationError::UnknownValue {
                field: "stage",
                value: s.to_string(),
            })
    }
}

// ─── Status Projection ───────────────────────────────────────────────

/// Coarse, externally visible request status derived from [`Stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Assigned,
    InProgress,
    OnHold,
    Completed,
    Closed,
    Cancelled,
    Rejected,
}

impl RequestStatus {
    /// The canonical snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::OnHold => "on_hold",
            Self::Completed => "completed",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nineteen_stages_with_unique_names() {
        let names: std::collections::HashSet<_> =
            Stage::all().iter().map(|s| s.as_str()).collect();
        assert_eq!(Stage::all().len(), 19);
        assert_eq!(names.len(), 19);
    }

    #[test]
    fn parse_roundtrips_every_stage() {
        for stage in Stage::all() {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), *stage);
        }
        assert!("operational".parse::<Stage>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&Stage::AdditionalMaterialsNeeded).unwrap();
        assert_eq!(json, "\"additional_materials_needed\"");
        let back: Stage = serde_json::from_str("\"pending_inspection\"").unwrap();
        assert_eq!(back, Stage::PendingInspection);
    }

    #[test]
    fn terminal_stages() {
        let terminal: Vec<_> = Stage::all().iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(
            terminal,
            vec![&Stage::Closed, &Stage::Cancelled, &Stage::Rejected, &Stage::Archived]
        );
    }

    #[test]
    fn entry_stages() {
        assert!(Stage::Draft.is_entry());
        assert!(Stage::Submitted.is_entry());
        assert!(!Stage::Approved.is_entry());
    }

    #[test]
    fn status_projection() {
        assert_eq!(Stage::UnderReview.status(), RequestStatus::Pending);
        assert_eq!(Stage::Scheduled.status(), RequestStatus::Assigned);
        assert_eq!(Stage::PendingInspection.status(), RequestStatus::InProgress);
        assert_eq!(Stage::AdditionalMaterialsNeeded.status(), RequestStatus::OnHold);
        assert_eq!(Stage::Paid.status(), RequestStatus::Completed);
        assert_eq!(Stage::Archived.status(), RequestStatus::Closed);
        assert_eq!(Stage::Cancelled.status(), RequestStatus::Cancelled);
        assert_eq!(Stage::Rejected.status(), RequestStatus::Rejected);
    }
}
