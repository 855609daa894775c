//! # Temporal Types: UTC-Only Timestamps
//!
//! `Timestamp` is the only clock value the engine stores: UTC, truncated to
//! whole seconds, rendered as `YYYY-MM-DDTHH:MM:SSZ`.
//!
//! SLA deadlines are computed by adding whole minutes to an anchor and
//! breach detection compares two timestamps with `>`. Sub-second noise from
//! the wall clock would make "exactly at the deadline" untestable, so it is
//! discarded at construction.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UpkeepError;

/// A UTC-only timestamp, truncated to seconds precision.
///
/// # Construction
///
/// - [`Timestamp::now()`]: current UTC time, truncated.
/// - [`Timestamp::from_utc()`]: from a `DateTime<Utc>`, truncating sub-seconds.
/// - [`Timestamp::parse()`]: from an RFC 3339 string with `Z` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp from the current UTC time, truncated to seconds.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// Create a timestamp from a `chrono::DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse a timestamp from an RFC 3339 string.
    ///
    /// Only the `Z` suffix is accepted; explicit offsets (even `+00:00`) are
    /// rejected so stored values have exactly one spelling.
    pub fn parse(s: &str) -> Result<Self, UpkeepError> {
        if !s.ends_with('Z') {
            return Err(UpkeepError::Timestamp(format!(
                "timestamp must use Z suffix (UTC only), got: {s:?}"
            )));
        }
        Self::parse_lenient(s)
    }

    /// Parse an RFC 3339 string with any offset, converting to UTC.
    ///
    /// Used for ingesting client-supplied values; the result still satisfies
    /// the UTC/seconds invariant.
    pub fn parse_lenient(s: &str) -> Result<Self, UpkeepError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| UpkeepError::Timestamp(format!("invalid RFC 3339 timestamp {s:?}: {e}")))?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    /// Create a timestamp from a Unix epoch timestamp (seconds).
    pub fn from_epoch_secs(secs: i64) -> Result<Self, UpkeepError> {
        let dt = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| UpkeepError::Timestamp(format!("invalid Unix timestamp: {secs}")))?;
        Ok(Self(dt))
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Consume into the inner `DateTime<Utc>`.
    pub fn into_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Returns the Unix epoch timestamp in seconds.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// This instant plus `minutes` whole minutes.
    ///
    /// Saturates at the maximum representable instant instead of panicking.
    pub fn plus_minutes(&self, minutes: u32) -> Self {
        let delta = Duration::minutes(i64::from(minutes));
        Self(
            self.0
                .checked_add_signed(delta)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }

    /// Whole seconds from `self` until `later` (negative if `later` is earlier).
    pub fn seconds_until(&self, later: &Timestamp) -> i64 {
        later.epoch_secs() - self.epoch_secs()
    }

    /// Render as ISO8601 with Z suffix (e.g., `2026-01-15T12:00:00Z`).
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_utc(dt)
    }
}

/// Truncate a `DateTime<Utc>` to seconds precision (discard nanoseconds).
fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn now_has_no_subseconds() {
        let ts = Timestamp::now();
        assert_eq!(ts.as_datetime().nanosecond(), 0);
    }

    #[test]
    fn from_utc_truncates() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 15, 12, 30, 45).unwrap();
        let ts = Timestamp::from_utc(dt.with_nanosecond(123_456_789).unwrap());
        assert_eq!(ts.to_iso8601(), "2026-01-15T12:30:45Z");
    }

    #[test]
    fn parse_z_suffix_accepted() {
        let ts = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        assert_eq!(ts.to_iso8601(), "2026-01-15T12:00:00Z");
    }

    #[test]
    fn parse_offsets_rejected() {
        assert!(Timestamp::parse("2026-01-15T12:00:00+00:00").is_err());
        assert!(Timestamp::parse("2026-01-15T17:00:00+05:00").is_err());
    }

    #[test]
    fn parse_garbage_rejected() {
        assert!(Timestamp::parse("not-a-date").is_err());
        assert!(Timestamp::parse("").is_err());
    }

    #[test]
    fn parse_lenient_converts_offset() {
        let ts = Timestamp::parse_lenient("2026-01-15T17:00:00+05:00").unwrap();
        assert_eq!(ts.to_iso8601(), "2026-01-15T12:00:00Z");
    }

    #[test]
    fn plus_minutes_adds_whole_minutes() {
        let t0 = Timestamp::parse("2026-03-01T08:00:00Z").unwrap();
        assert_eq!(t0.plus_minutes(30).to_iso8601(), "2026-03-01T08:30:00Z");
        assert_eq!(t0.plus_minutes(0), t0);
        assert_eq!(t0.plus_minutes(24 * 60).to_iso8601(), "2026-03-02T08:00:00Z");
    }

    #[test]
    fn seconds_until_is_signed() {
        let t0 = Timestamp::parse("2026-03-01T08:00:00Z").unwrap();
        let t1 = t0.plus_minutes(2);
        assert_eq!(t0.seconds_until(&t1), 120);
        assert_eq!(t1.seconds_until(&t0), -120);
    }

    #[test]
    fn epoch_roundtrip() {
        let ts = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        assert_eq!(Timestamp::from_epoch_secs(ts.epoch_secs()).unwrap(), ts);
    }

    #[test]
    fn ordering_follows_time() {
        let earlier = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        let later = Timestamp::parse("2026-01-15T12:00:01Z").unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn serde_roundtrip() {
        let ts = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        let parsed: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, parsed);
    }
}
