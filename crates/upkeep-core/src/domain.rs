//! # Request Vocabulary: Priority, Category, Role
//!
//! The classification values that drive SLA policy lookup, provider
//! specialization matching, and role-gated transitions.
//!
//! `Priority` is a closed enum: the SLA table is keyed on it and every
//! `match` must stay exhaustive. `Category` and `Role` are open vocabularies
//! (they vary per tenant), so they are validated, normalised newtypes rather
//! than enums.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ValidationError;

/// Maximum length of a category or role label.
const MAX_LABEL_LEN: usize = 64;

macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Normalise a free-text label: trim, lowercase, spaces and hyphens to `_`.
fn normalise_label(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if trimmed.len() > MAX_LABEL_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_LABEL_LEN,
            actual: trimmed.len(),
        });
    }
    Ok(trimmed
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect())
}

// ─── Priority ────────────────────────────────────────────────────────

/// Urgency of a maintenance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Cosmetic or deferrable work.
    Low,
    /// Normal service.
    Medium,
    /// Degraded service for occupants.
    High,
    /// Safety risk or outage; shortest SLA clocks.
    Urgent,
}

impl Priority {
    /// All priorities, lowest first.
    pub fn all() -> &'static [Priority] {
        &[Self::Low, Self::Medium, Self::High, Self::Urgent]
    }

    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(ValidationError::UnknownValue {
                field: "priority",
                value: s.to_string(),
            }),
        }
    }
}

// ─── Category ────────────────────────────────────────────────────────

/// Work category of a request (e.g. `plumbing`, `electrical`, `hvac`).
///
/// Also the default specialization tag used when matching providers.
/// Stored normalised: lowercase, `_` separators.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    /// Create a validated, normalised category.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        normalise_label("category", raw.as_ref()).map(Self)
    }

    /// The normalised label.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl_validating_deserialize!(Category);

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ─── Role ────────────────────────────────────────────────────────────

/// The role a principal acts under (e.g. `manager`, `technician`).
///
/// Roles vary per tenant, so the transition table names them as data and
/// this type only validates and normalises the label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    /// Create a validated, normalised role.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        normalise_label("role", raw.as_ref()).map(Self)
    }

    /// The normalised label.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl_validating_deserialize!(Role);

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_parse_and_display() {
        for p in Priority::all() {
            assert_eq!(p.as_str().parse::<Priority>().unwrap(), *p);
            assert_eq!(p.to_string(), p.as_str());
        }
        assert_eq!(" URGENT ".parse::<Priority>().unwrap(), Priority::Urgent);
        assert!("critical".parse::<Priority>().is_err());
    }

    #[test]
    fn priority_orders_by_urgency() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::High < Priority::Urgent);
    }

    #[test]
    fn priority_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Priority::Urgent).unwrap(), "\"urgent\"");
    }

    #[test]
    fn category_is_normalised() {
        let c = Category::new("  Pest Control ").unwrap();
        assert_eq!(c.as_str(), "pest_control");
        assert_eq!(Category::new("HVAC").unwrap(), Category::new("hvac").unwrap());
    }

    #[test]
    fn category_rejects_empty_and_long() {
        assert_eq!(
            Category::new("   ").unwrap_err(),
            ValidationError::Empty { field: "category" }
        );
        assert!(Category::new("x".repeat(65)).is_err());
    }

    #[test]
    fn role_deserialize_validates() {
        let role: Role = serde_json::from_str("\"Facility-Manager\"").unwrap();
        assert_eq!(role.as_str(), "facility_manager");
        assert!(serde_json::from_str::<Role>("\"\"").is_err());
    }
}
