//! # Provider Matcher
//!
//! Ranks providers for a job site by great-circle distance.
//!
//! A provider is a candidate when it is active, dispatchable (`online` or
//! `available`), carries the requested specialization, has a known
//! location, and the site lies within both the caller's `max_distance_km`
//! and the provider's own service radius.
//!
//! Ordering: distance ascending, then rating descending (unrated last),
//! then most recent location fix first. An empty result is a normal
//! outcome, not an error.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use upkeep_core::{Category, CompanyId, GeoPoint, ProviderId, Timestamp};

/// Technician (individual) or vendor (company).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Technician,
    Vendor,
}

/// Live availability of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Online,
    Available,
    Busy,
    Offline,
    OnRoute,
}

impl ProviderStatus {
    /// Whether a provider in this status can take a new job.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Self::Online | Self::Available)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Available => "available",
            Self::Busy => "busy",
            Self::Offline => "offline",
            Self::OnRoute => "on_route",
        }
    }
}

impl std::str::FromStr for ProviderStatus {
    type Err = upkeep_core::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "available" => Ok(Self::Available),
            "busy" => Ok(Self::Busy),
            "offline" => Ok(Self::Offline),
            "on_route" => Ok(Self::OnRoute),
            other => Err(upkeep_core::ValidationError::UnknownValue {
                field: "provider status",
                value: other.to_string(),
            }),
        }
    }
}

/// A technician or vendor that can be dispatched to requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub company_id: CompanyId,
    pub display_name: String,
    pub kind: ProviderKind,
    pub specializations: Vec<Category>,
    pub status: ProviderStatus,
    pub active: bool,
    pub location: Option<GeoPoint>,
    pub location_updated_at: Option<Timestamp>,
    pub service_radius_km: Option<f64>,
    pub rating: Option<f64>,
}

impl Provider {
    /// Whether the provider carries `specialization`. Tags are normalised on
    /// construction, so this comparison is case-insensitive.
    pub fn has_specialization(&self, specialization: &Category) -> bool {
        self.specializations.iter().any(|s| s == specialization)
    }
}

/// Roster query passed to persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFilter {
    pub company_id: CompanyId,
    /// Stores may pre-filter on this; the matcher filters again regardless.
    pub specialization: Option<Category>,
}

/// One ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderMatch {
    pub provider: Provider,
    pub distance_km: f64,
}

/// Why a match produced no candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoMatchReason {
    /// The request has no coordinates.
    NoLocation,
    /// Nobody passed the filters.
    NoCandidates,
}

/// Typed outcome of a match.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched { candidates: Vec<ProviderMatch> },
    NoProviderMatch { reason: NoMatchReason },
}

impl MatchOutcome {
    /// Wrap a ranked list.
    pub fn from_candidates(candidates: Vec<ProviderMatch>) -> Self {
        if candidates.is_empty() {
            Self::NoProviderMatch {
                reason: NoMatchReason::NoCandidates,
            }
        } else {
            Self::Matched { candidates }
        }
    }

    /// The top candidate, if any.
    pub fn best(&self) -> Option<&ProviderMatch> {
        match self {
            Self::Matched { candidates } => candidates.first(),
            Self::NoProviderMatch { .. } => None,
        }
    }
}

/// Rank `providers` around `origin`.
pub fn find_nearest(
    providers: &[Provider],
    origin: &GeoPoint,
    specialization: Option<&Category>,
    max_distance_km: Option<f64>,
) -> Vec<ProviderMatch> {
    let mut candidates: Vec<ProviderMatch> = providers
        .iter()
        .filter(|p| p.active && p.status.is_dispatchable())
        .filter(|p| specialization.map_or(true, |s| p.has_specialization(s)))
        .filter_map(|p| {
            let location = p.location?;
            let distance_km = origin.distance_to(&location);
            if max_distance_km.is_some_and(|max| distance_km > max) {
                return None;
            }
            if p.service_radius_km.is_some_and(|radius| distance_km > radius) {
                return None;
            }
            Some(ProviderMatch {
                provider: p.clone(),
                distance_km,
            })
        })
        .collect();

    candidates.sort_by(rank);
    candidates
}

fn rank(a: &ProviderMatch, b: &ProviderMatch) -> Ordering {
    a.distance_km
        .total_cmp(&b.distance_km)
        .then_with(|| match (a.provider.rating, b.provider.rating) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| b.provider.location_updated_at.cmp(&a.provider.location_updated_at))
}
