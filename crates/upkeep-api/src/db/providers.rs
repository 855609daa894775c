//! Provider roster reads.
//!
//! The roster is maintained by the provider-management side of the
//! platform; this service only reads it for matching and for validating
//! manual assignments.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use upkeep_core::{Category, CompanyId, GeoPoint, ProviderId, Timestamp};
use upkeep_dispatch::{Provider, ProviderFilter, ProviderKind, ProviderStatus, StoreError};

/// Active providers of a company, optionally pre-filtered by specialization.
pub async fn list_active(
    pool: &PgPool,
    filter: &ProviderFilter,
) -> Result<Vec<Provider>, StoreError> {
    let rows = sqlx::query_as::<_, ProviderRow>(
        "SELECT id, company_id, display_name, kind, specializations, status, active, latitude,
                longitude, location_updated_at, service_radius_km, rating
         FROM providers
         WHERE company_id = $1 AND active
           AND ($2::TEXT IS NULL OR $2 = ANY(specializations))
         ORDER BY id",
    )
    .bind(filter.company_id.0)
    .bind(filter.specialization.as_ref().map(|s| s.as_str().to_string()))
    .fetch_all(pool)
    .await
    .map_err(super::backend)?;

    // A malformed row drops that provider, not the whole roster.
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id;
            row.into_provider()
                .map_err(|detail| {
                    tracing::warn!(provider_id = %id, %detail, "skipping malformed provider row");
                })
                .ok()
        })
        .collect())
}

/// Fetch a provider by ID.
pub async fn get_by_id(pool: &PgPool, id: ProviderId) -> Result<Option<Provider>, StoreError> {
    let row = sqlx::query_as::<_, ProviderRow>(
        "SELECT id, company_id, display_name, kind, specializations, status, active, latitude,
                longitude, location_updated_at, service_radius_km, rating
         FROM providers WHERE id = $1",
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await
    .map_err(super::backend)?;

    row.map(|r| {
        r.into_provider()
            .map_err(|detail| StoreError::Backend(format!("provider {id}: {detail}")))
    })
    .transpose()
}

/// Internal row type for SQLx mapping.
#[derive(Debug, sqlx::FromRow)]
struct ProviderRow {
    id: Uuid,
    company_id: Uuid,
    display_name: String,
    kind: String,
    specializations: Vec<String>,
    status: String,
    active: bool,
    latitude: Option<f64>,
    longitude: Option<f64>,
    location_updated_at: Option<DateTime<Utc>>,
    service_radius_km: Option<f64>,
    rating: Option<f64>,
}

impl ProviderRow {
    fn into_provider(self) -> Result<Provider, String> {
        let kind = match self.kind.as_str() {
            "technician" => ProviderKind::Technician,
            "vendor" => ProviderKind::Vendor,
            other => return Err(format!("unknown provider kind {other:?}")),
        };
        let status: ProviderStatus = self.status.parse().map_err(|e| format!("{e}"))?;
        let specializations = self
            .specializations
            .iter()
            .map(Category::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?;
        let location =
            GeoPoint::from_parts(self.latitude, self.longitude).map_err(|e| e.to_string())?;

        Ok(Provider {
            id: ProviderId::from_uuid(self.id),
            company_id: CompanyId::from_uuid(self.company_id),
            display_name: self.display_name,
            kind,
            specializations,
            status,
            active: self.active,
            location,
            location_updated_at: self.location_updated_at.map(Timestamp::from_utc),
            service_radius_km: self.service_radius_km,
            rating: self.rating,
        })
    }
}
