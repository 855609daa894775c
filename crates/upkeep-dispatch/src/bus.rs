//! # Event Bus
//!
//! In-process publish/subscribe over `tokio::sync::broadcast`. The engine
//! publishes one [`TransitionNotice`] per committed event and never waits
//! on subscribers. A subscriber that falls behind loses the oldest notices
//! (reported as `Lagged`) rather than slowing the publisher.

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use upkeep_core::{ActorId, CompanyId, RequestId, Role};
use upkeep_state::{MaintenanceRequest, RequestEvent, Stage};

/// Default buffered notices per subscriber.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// What subscribers receive for each committed event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionNotice {
    pub request_id: RequestId,
    pub company_id: CompanyId,
    pub event_type: &'static str,
    pub from: Option<Stage>,
    pub to: Stage,
    pub actor_id: Option<ActorId>,
    pub actor_role: Option<Role>,
    pub sequence: i64,
    pub payload: Value,
}

impl TransitionNotice {
    /// Build the notice for `event` as applied to `request`.
    pub fn from_event(request: &MaintenanceRequest, event: &RequestEvent) -> Self {
        let payload = json!({
            "request_id": request.id,
            "company_id": request.company_id,
            "branch_id": request.branch_id,
            "title": request.title,
            "priority": request.priority,
            "stage": request.stage,
            "status": request.status,
            "from_stage": event.from_stage,
            "to_stage": event.to_stage,
            "sequence": event.sequence,
            "timestamp": event.timestamp,
            "actor_id": event.actor_id,
            "actor_role": event.actor_role,
            "assigned_provider_id": request.assigned_provider_id,
            "proposed_provider_id": request.proposed_provider_id,
            "metadata": event.metadata,
            "note": event.note,
        });
        Self {
            request_id: request.id,
            company_id: request.company_id,
            event_type: event.event_type(),
            from: event.from_stage,
            to: event.to_stage,
            actor_id: event.actor_id,
            actor_role: event.actor_role.clone(),
            sequence: event.sequence,
            payload,
        }
    }
}

/// Cloneable handle to the broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TransitionNotice>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransitionNotice> {
        self.sender.subscribe()
    }

    /// Publish without waiting. Returns how many subscribers will see it;
    /// zero subscribers is not an error.
    pub fn publish(&self, notice: TransitionNotice) -> usize {
        match self.sender.send(notice) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::debug!("no bus subscribers, notice dropped");
                0
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
