//! # Request Events
//!
//! One immutable row per stage change, including creation. `sequence`
//! equals the request `version` after the change, so a request's history is
//! gap-free and totally ordered.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use upkeep_core::{ActorId, EventId, RequestId, Role, Timestamp};

use crate::stage::Stage;

/// A single ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEvent {
    pub id: EventId,
    pub request_id: RequestId,
    pub sequence: i64,
    /// `None` for the creation event.
    pub from_stage: Option<Stage>,
    pub to_stage: Stage,
    /// `None` for system actions.
    pub actor_id: Option<ActorId>,
    pub actor_role: Option<Role>,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl RequestEvent {
    /// Dotted event type used on the bus and in notifications.
    pub fn event_type(&self) -> &'static str {
        match self.from_stage {
            None => "request.created",
            Some(_) => "request.transitioned",
        }
    }
}

/// Sort oldest first: by timestamp, ties broken by sequence.
pub fn order_history(events: &mut [RequestEvent]) {
    events.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.sequence.cmp(&b.sequence))
    });
}
