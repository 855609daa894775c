//! Maintenance request persistence.
//!
//! All functions operate on the `maintenance_requests` table. Lifecycle
//! rules are enforced by the state machine, not in SQL; the only database
//! guard is the `version` compare-and-swap.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use upkeep_core::{
    BranchId, Category, CompanyId, GeoPoint, Priority, ProviderId, RequestId, Timestamp,
};
use upkeep_dispatch::StoreError;
use upkeep_state::{MaintenanceRequest, SlaClock, Stage};

/// Insert a new request.
pub async fn insert(conn: &mut PgConnection, request: &MaintenanceRequest) -> Result<(), sqlx::Error> {
    let sla = encode_sla(&request.sla)?;
    let (latitude, longitude) = split_location(request.location);

    sqlx::query(
        "INSERT INTO maintenance_requests (id, company_id, branch_id, title, description, category,
             subcategory, priority, stage, status, sla, latitude, longitude, location_text,
             assigned_provider_id, proposed_provider_id, version, created_at, updated_at, archived_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
    )
    .bind(request.id.0)
    .bind(request.company_id.0)
    .bind(request.branch_id.map(|b| b.0))
    .bind(&request.title)
    .bind(&request.description)
    .bind(request.category.as_str())
    .bind(&request.subcategory)
    .bind(request.priority.as_str())
    .bind(request.stage.as_str())
    .bind(request.status.as_str())
    .bind(sla)
    .bind(latitude)
    .bind(longitude)
    .bind(&request.location_text)
    .bind(request.assigned_provider_id.map(|p| p.0))
    .bind(request.proposed_provider_id.map(|p| p.0))
    .bind(request.version)
    .bind(request.created_at.into_datetime())
    .bind(request.updated_at.into_datetime())
    .bind(request.archived_at.map(Timestamp::into_datetime))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Write the mutable columns of `request` if the stored version is still
/// `expected_version`. Returns whether the row was updated.
pub async fn compare_and_swap(
    conn: &mut PgConnection,
    request: &MaintenanceRequest,
    expected_version: i64,
) -> Result<bool, sqlx::Error> {
    let sla = encode_sla(&request.sla)?;

    let result = sqlx::query(
        "UPDATE maintenance_requests
         SET stage = $3, status = $4, sla = $5, assigned_provider_id = $6,
             proposed_provider_id = $7, version = $8, updated_at = $9, archived_at = $10
         WHERE id = $1 AND version = $2",
    )
    .bind(request.id.0)
    .bind(expected_version)
    .bind(request.stage.as_str())
    .bind(request.status.as_str())
    .bind(sla)
    .bind(request.assigned_provider_id.map(|p| p.0))
    .bind(request.proposed_provider_id.map(|p| p.0))
    .bind(request.version)
    .bind(request.updated_at.into_datetime())
    .bind(request.archived_at.map(Timestamp::into_datetime))
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Stored version of a request, `None` if it does not exist.
pub async fn current_version(conn: &mut PgConnection, id: RequestId) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT version FROM maintenance_requests WHERE id = $1")
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await
}

/// Fetch a request by ID.
pub async fn get_by_id(pool: &PgPool, id: RequestId) -> Result<Option<MaintenanceRequest>, StoreError> {
    let row = sqlx::query_as::<_, RequestRow>(
        "SELECT id, company_id, branch_id, title, description, category, subcategory, priority,
                stage, status, sla, latitude, longitude, location_text, assigned_provider_id,
                proposed_provider_id, version, created_at, updated_at, archived_at
         FROM maintenance_requests WHERE id = $1",
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await
    .map_err(super::backend)?;

    row.map(RequestRow::into_request).transpose()
}

fn encode_sla(sla: &SlaClock) -> Result<serde_json::Value, sqlx::Error> {
    serde_json::to_value(sla).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

fn split_location(location: Option<GeoPoint>) -> (Option<f64>, Option<f64>) {
    match location {
        Some(point) => (Some(point.lat), Some(point.lng)),
        None => (None, None),
    }
}

/// Internal row type for SQLx mapping.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RequestRow {
    id: Uuid,
    company_id: Uuid,
    branch_id: Option<Uuid>,
    title: String,
    description: Option<String>,
    category: String,
    subcategory: Option<String>,
    priority: String,
    stage: String,
    #[allow(dead_code)]
    status: String,
    sla: serde_json::Value,
    latitude: Option<f64>,
    longitude: Option<f64>,
    location_text: Option<String>,
    assigned_provider_id: Option<Uuid>,
    proposed_provider_id: Option<Uuid>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    archived_at: Option<DateTime<Utc>>,
}

impl RequestRow {
    /// Decode into the domain record. The status column is a denormalised
    /// projection for reporting; the record re-derives it from the stage.
    pub(crate) fn into_request(self) -> Result<MaintenanceRequest, StoreError> {
        let id = self.id;
        let corrupt = |field: &str, detail: String| {
            tracing::error!(request_id = %id, field, %detail, "corrupt request row");
            StoreError::Backend(format!("request {id} has invalid {field}: {detail}"))
        };

        let stage: Stage = self
            .stage
            .parse()
            .map_err(|e: upkeep_core::ValidationError| corrupt("stage", e.to_string()))?;
        let priority: Priority = self
            .priority
            .parse()
            .map_err(|e: upkeep_core::ValidationError| corrupt("priority", e.to_string()))?;
        let category =
            Category::new(&self.category).map_err(|e| corrupt("category", e.to_string()))?;
        let sla: SlaClock = serde_json::from_value(self.sla.clone())
            .map_err(|e| corrupt("sla", e.to_string()))?;
        let location = GeoPoint::from_parts(self.latitude, self.longitude)
            .map_err(|e| corrupt("location", e.to_string()))?;

        Ok(MaintenanceRequest {
            id: RequestId::from_uuid(id),
            company_id: CompanyId::from_uuid(self.company_id),
            branch_id: self.branch_id.map(BranchId::from_uuid),
            title: self.title,
            description: self.description,
            category,
            subcategory: self.subcategory,
            priority,
            stage,
            status: stage.status(),
            created_at: Timestamp::from_utc(self.created_at),
            updated_at: Timestamp::from_utc(self.updated_at),
            sla,
            archived_at: self.archived_at.map(Timestamp::from_utc),
            location,
            location_text: self.location_text,
            assigned_provider_id: self.assigned_provider_id.map(ProviderId::from_uuid),
            proposed_provider_id: self.proposed_provider_id.map(ProviderId::from_uuid),
            version: self.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upkeep_state::RequestStatus;

    fn row() -> RequestRow {
        let now = Utc::now();
        RequestRow {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            branch_id: None,
            title: "Lift stuck on floor 3".into(),
            description: None,
            category: "elevator".into(),
            subcategory: None,
            priority: "urgent".into(),
            stage: "in_progress".into(),
            status: "in_progress".into(),
            sla: serde_json::to_value(SlaClock::default()).unwrap(),
            latitude: Some(24.7136),
            longitude: Some(46.6753),
            location_text: Some("Tower B".into()),
            assigned_provider_id: Some(Uuid::new_v4()),
            proposed_provider_id: None,
            version: 7,
            created_at: now,
            updated_at: now,
            archived_at: None,
        }
    }

    #[test]
    fn row_decodes_into_request() {
        let raw = row();
        let id = raw.id;
        let req = raw.into_request().unwrap();
        assert_eq!(req.id.0, id);
        assert_eq!(req.stage, Stage::InProgress);
        assert_eq!(req.status, RequestStatus::InProgress);
        assert_eq!(req.priority, Priority::Urgent);
        assert_eq!(req.location.map(|p| p.lat), Some(24.7136));
        assert_eq!(req.version, 7);
    }

    #[test]
    fn unknown_stage_is_a_backend_error() {
        let mut raw = row();
        raw.stage = "teleported".into();
        assert!(matches!(raw.into_request(), Err(StoreError::Backend(_))));
    }

    #[test]
    fn half_a_location_is_no_location() {
        let mut raw = row();
        raw.longitude = None;
        assert_eq!(raw.into_request().unwrap().location, None);
    }
}
