//! SLA policy persistence.
//!
//! The `sla_policies` table is seeded with the standard priority defaults
//! by the initial migration. Rows are validated as a whole book on load.

use sqlx::PgPool;

use upkeep_core::{Category, Priority};
use upkeep_dispatch::StoreError;
use upkeep_state::{PolicyBook, SlaPolicy};

/// Load and validate the policy book.
pub async fn load(pool: &PgPool) -> Result<PolicyBook, StoreError> {
    let rows = sqlx::query_as::<_, PolicyRow>(
        "SELECT priority, category, accept_within_minutes, arrive_within_minutes,
                complete_within_minutes
         FROM sla_policies ORDER BY priority, category NULLS FIRST",
    )
    .fetch_all(pool)
    .await
    .map_err(super::backend)?;

    let policies = rows
        .into_iter()
        .map(PolicyRow::into_policy)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|detail| StoreError::Backend(format!("invalid SLA policy row: {detail}")))?;

    PolicyBook::new(policies).map_err(|e| {
        tracing::error!(error = %e, "SLA policy table is inconsistent");
        StoreError::Backend(e.to_string())
    })
}

/// Internal row type for SQLx mapping.
#[derive(Debug, sqlx::FromRow)]
struct PolicyRow {
    priority: String,
    category: Option<String>,
    accept_within_minutes: i32,
    arrive_within_minutes: i32,
    complete_within_minutes: i32,
}

impl PolicyRow {
    fn into_policy(self) -> Result<SlaPolicy, String> {
        let minutes = |value: i32, column: &str| {
            u32::try_from(value).map_err(|_| format!("{column} is negative ({value})"))
        };
        Ok(SlaPolicy {
            priority: self.priority.parse::<Priority>().map_err(|e| e.to_string())?,
            category: self
                .category
                .as_deref()
                .map(Category::new)
                .transpose()
                .map_err(|e| e.to_string())?,
            accept_within_minutes: minutes(self.accept_within_minutes, "accept_within_minutes")?,
            arrive_within_minutes: minutes(self.arrive_within_minutes, "arrive_within_minutes")?,
            complete_within_minutes: minutes(
                self.complete_within_minutes,
                "complete_within_minutes",
            )?,
        })
    }
}
