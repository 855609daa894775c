//! # Event Ledger
//!
//! Append-only record of request events. There is no update or delete
//! surface: once appended, an event is permanent. Duplicate event ids are
//! rejected so a retried write cannot record the same change twice.

use async_trait::async_trait;
use thiserror::Error;

use upkeep_core::{EventId, RequestId};
use upkeep_state::RequestEvent;

/// Errors from the event ledger.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// An event with this id was already appended.
    #[error("event {0} already recorded")]
    DuplicateEvent(EventId),

    /// The sequence number is already taken for this request.
    #[error("sequence {sequence} already recorded for {request_id}")]
    DuplicateSequence { request_id: RequestId, sequence: i64 },

    /// The backing store failed.
    #[error("ledger backend error: {0}")]
    Backend(String),
}

/// Append-only per-request event history.
#[async_trait]
pub trait EventLedger: Send + Sync {
    /// Append one event.
    async fn append(&self, event: &RequestEvent) -> Result<(), LedgerError>;

    /// Full history of a request, oldest first.
    async fn history(&self, request_id: RequestId) -> Result<Vec<RequestEvent>, LedgerError>;

    /// History after `sequence`, oldest first. Lets a reader resume from
    /// the last event it saw.
    async fn history_after(
        &self,
        request_id: RequestId,
        sequence: i64,
    ) -> Result<Vec<RequestEvent>, LedgerError> {
        let mut events = self.history(request_id).await?;
        events.retain(|e| e.sequence > sequence);
        Ok(events)
    }
}
