//! Request event ledger persistence.
//!
//! Append-only: rows in `request_events` are inserted, never updated or
//! deleted. `(request_id, sequence)` is unique, so two writers can never
//! record the same step of a request's history.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use upkeep_core::{ActorId, EventId, RequestId, Role, Timestamp};
use upkeep_dispatch::LedgerError;
use upkeep_state::{order_history, RequestEvent, Stage};

/// Name of the `(request_id, sequence)` unique constraint.
pub const SEQUENCE_CONSTRAINT: &str = "request_events_request_sequence_key";

/// Insert one event.
pub async fn insert(conn: &mut PgConnection, event: &RequestEvent) -> Result<(), sqlx::Error> {
    let metadata = serde_json::Value::Object(event.metadata.clone());

    sqlx::query(
        "INSERT INTO request_events (id, request_id, sequence, from_stage, to_stage, actor_id,
             actor_role, occurred_at, metadata, note)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(event.id.0)
    .bind(event.request_id.0)
    .bind(event.sequence)
    .bind(event.from_stage.map(|s| s.as_str()))
    .bind(event.to_stage.as_str())
    .bind(event.actor_id.map(|a| a.0))
    .bind(event.actor_role.as_ref().map(|r| r.as_str()))
    .bind(event.timestamp.into_datetime())
    .bind(metadata)
    .bind(&event.note)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Full history of a request, oldest first.
pub async fn list_for_request(
    pool: &PgPool,
    request_id: RequestId,
) -> Result<Vec<RequestEvent>, LedgerError> {
    let rows = sqlx::query_as::<_, EventRow>(
        "SELECT id, request_id, sequence, from_stage, to_stage, actor_id, actor_role,
                occurred_at, metadata, note
         FROM request_events WHERE request_id = $1
         ORDER BY occurred_at, sequence",
    )
    .bind(request_id.0)
    .fetch_all(pool)
    .await
    .map_err(|e| LedgerError::Backend(e.to_string()))?;

    let mut events = rows
        .into_iter()
        .map(EventRow::into_event)
        .collect::<Result<Vec<_>, _>>()?;
    order_history(&mut events);
    Ok(events)
}

/// Internal row type for SQLx mapping.
#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    request_id: Uuid,
    sequence: i64,
    from_stage: Option<String>,
    to_stage: String,
    actor_id: Option<Uuid>,
    actor_role: Option<String>,
    occurred_at: DateTime<Utc>,
    metadata: serde_json::Value,
    note: Option<String>,
}

impl EventRow {
    fn into_event(self) -> Result<RequestEvent, LedgerError> {
        let id = self.id;
        let corrupt = |field: &str, detail: String| {
            tracing::error!(event_id = %id, field, %detail, "corrupt event row");
            LedgerError::Backend(format!("event {id} has invalid {field}: {detail}"))
        };

        let from_stage = self
            .from_stage
            .as_deref()
            .map(str::parse::<Stage>)
            .transpose()
            .map_err(|e| corrupt("from_stage", e.to_string()))?;
        let to_stage: Stage = self
            .to_stage
            .parse()
            .map_err(|e: upkeep_core::ValidationError| corrupt("to_stage", e.to_string()))?;
        let actor_role = self
            .actor_role
            .as_deref()
            .map(Role::new)
            .transpose()
            .map_err(|e| corrupt("actor_role", e.to_string()))?;
        let metadata = match self.metadata {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => return Err(corrupt("metadata", format!("expected object, got {other}"))),
        };

        Ok(RequestEvent {
            id: EventId::from_uuid(id),
            request_id: RequestId::from_uuid(self.request_id),
            sequence: self.sequence,
            from_stage,
            to_stage,
            actor_id: self.actor_id.map(ActorId::from_uuid),
            actor_role,
            timestamp: Timestamp::from_utc(self.occurred_at),
            metadata,
            note: self.note,
        })
    }
}
