//! # SLA Policy Resolution and Window Tracking
//!
//! A [`PolicyBook`] maps `(priority, category?)` to three response windows:
//! accept, arrive, complete. Resolution is pure: the caller supplies the
//! anchor instant, nothing here reads a clock.
//!
//! Lookup order:
//!
//! 1. exact `(priority, category)` row,
//! 2. the priority-only default row,
//! 3. otherwise [`SlaResolution::NoPolicy`].
//!
//! Breach is always derived (`now > due`) and never rewrites a deadline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use upkeep_core::{Category, Priority, Timestamp};

/// Errors raised while building or loading a policy book.
#[derive(Error, Debug)]
pub enum PolicyError {
    /// Two rows share the same key.
    #[error("duplicate SLA policy for priority {priority}, category {category}")]
    Duplicate { priority: Priority, category: String },

    /// A window of zero minutes.
    #[error("SLA policy for priority {priority} has a zero-minute {window} window")]
    ZeroWindow {
        priority: Priority,
        window: &'static str,
    },

    /// Windows must nest: accept <= arrive <= complete.
    #[error("SLA policy for priority {priority} has windows out of order (accept {accept}, arrive {arrive}, complete {complete})")]
    Unordered {
        priority: Priority,
        accept: u32,
        arrive: u32,
        complete: u32,
    },

    /// The document could not be parsed.
    #[error("failed to parse SLA policies: {0}")]
    Parse(String),
}

/// One SLA row, in minutes from the anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaPolicy {
    pub priority: Priority,
    /// `None` is the priority-only default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    pub accept_within_minutes: u32,
    pub arrive_within_minutes: u32,
    pub complete_within_minutes: u32,
}

impl SlaPolicy {
    fn validate(&self) -> Result<(), PolicyError> {
        for (window, minutes) in [
            ("accept", self.accept_within_minutes),
            ("arrive", self.arrive_within_minutes),
            ("complete", self.complete_within_minutes),
        ] {
            if minutes == 0 {
                return Err(PolicyError::ZeroWindow {
                    priority: self.priority,
                    window,
                });
            }
        }
        if self.accept_within_minutes > self.arrive_within_minutes
            || self.arrive_within_minutes > self.complete_within_minutes
        {
            return Err(PolicyError::Unordered {
                priority: self.priority,
                accept: self.accept_within_minutes,
                arrive: self.arrive_within_minutes,
                complete: self.complete_within_minutes,
            });
        }
        Ok(())
    }

    /// Deadlines for this row anchored at `anchor`.
    pub fn deadlines_from(&self, anchor: &Timestamp) -> SlaDeadlines {
        SlaDeadlines {
            accept_due: anchor.plus_minutes(self.accept_within_minutes),
            arrive_due: anchor.plus_minutes(self.arrive_within_minutes),
            complete_due: anchor.plus_minutes(self.complete_within_minutes),
        }
    }
}

/// The three absolute deadlines produced by a resolved policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaDeadlines {
    pub accept_due: Timestamp,
    pub arrive_due: Timestamp,
    pub complete_due: Timestamp,
}

/// Outcome of a policy lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaResolution {
    Resolved(SlaDeadlines),
    /// No row matched; deadlines stay unset.
    NoPolicy,
}

/// On-disk representation of a policy book.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub policies: Vec<SlaPolicy>,
}

/// A validated set of SLA policies.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PolicyBook {
    policies: Vec<SlaPolicy>,
}

impl PolicyBook {
    /// Build a book, rejecting invalid or duplicate rows.
    pub fn new(policies: Vec<SlaPolicy>) -> Result<Self, PolicyError> {
        for (i, policy) in policies.iter().enumerate() {
            policy.validate()?;
            let duplicate = policies[..i]
                .iter()
                .any(|p| p.priority == policy.priority && p.category == policy.category);
            if duplicate {
                return Err(PolicyError::Duplicate {
                    priority: policy.priority,
                    category: policy
                        .category
                        .as_ref()
                        .map_or_else(|| "<default>".to_string(), |c| c.to_string()),
                });
            }
        }
        Ok(Self { policies })
    }

    /// Parse and validate a YAML policy document.
    pub fn from_yaml(input: &str) -> Result<Self, PolicyError> {
        let doc: PolicyDocument =
            serde_yaml::from_str(input).map_err(|e| PolicyError::Parse(e.to_string()))?;
        Self::new(doc.policies)
    }

    /// Parse and validate a JSON policy document.
    pub fn from_json(input: &str) -> Result<Self, PolicyError> {
        let doc: PolicyDocument =
            serde_json::from_str(input).map_err(|e| PolicyError::Parse(e.to_string()))?;
        Self::new(doc.policies)
    }

    /// Priority-only defaults (minutes): urgent 10/60/240, high 30/240/1440,
    /// medium 120/1440/4320, low 480/2880/10080.
    pub fn standard() -> Self {
        let row = |priority, accept, arrive, complete| SlaPolicy {
            priority,
            category: None,
            accept_within_minutes: accept,
            arrive_within_minutes: arrive,
            complete_within_minutes: complete,
        };
        Self {
            policies: vec![
                row(Priority::Urgent, 10, 60, 240),
                row(Priority::High, 30, 240, 1440),
                row(Priority::Medium, 120, 1440, 4320),
                row(Priority::Low, 480, 2880, 10080),
            ],
        }
    }

    /// All rows.
    pub fn policies(&self) -> &[SlaPolicy] {
        &self.policies
    }

    /// The row that applies to `(priority, category)`, if any.
    pub fn lookup(&self, priority: Priority, category: Option<&Category>) -> Option<&SlaPolicy> {
        let exact = category.and_then(|c| {
            self.policies
                .iter()
                .find(|p| p.priority == priority && p.category.as_ref() == Some(c))
        });
        exact.or_else(|| {
            self.policies
                .iter()
                .find(|p| p.priority == priority && p.category.is_none())
        })
    }

    /// Resolve deadlines for `(priority, category)` anchored at `anchor`.
    pub fn resolve(
        &self,
        priority: Priority,
        category: Option<&Category>,
        anchor: &Timestamp,
    ) -> SlaResolution {
        match self.lookup(priority, category) {
            Some(policy) => SlaResolution::Resolved(policy.deadlines_from(anchor)),
            None => SlaResolution::NoPolicy,
        }
    }
}

/// `now` is past `due`. Equality is not a breach.
pub fn is_breached(due: &Timestamp, now: &Timestamp) -> bool {
    now > due
}

// ─── Window Tracking ─────────────────────────────────────────────────

/// Whether a closed window was honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaVerdict {
    Met,
    Breached,
}

/// Recorded result of a window when it closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaOutcome {
    pub verdict: SlaVerdict,
    pub closed_at: Timestamp,
}

/// One SLA window on a request: its deadline and, once closed, its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlaWindow {
    pub due: Option<Timestamp>,
    pub outcome: Option<SlaOutcome>,
}

impl SlaWindow {
    /// Set the deadline if none is set. Returns whether it was written.
    pub fn start(&mut self, due: Timestamp) -> bool {
        if self.due.is_some() {
            return false;
        }
        self.due = Some(due);
        true
    }

    /// A deadline exists and no outcome has been recorded.
    pub fn is_open(&self) -> bool {
        self.due.is_some() && self.outcome.is_none()
    }

    /// Record the outcome if the window is open. Existing outcomes are kept.
    pub fn close(&mut self, at: Timestamp) -> Option<SlaOutcome> {
        let due = self.due?;
        if self.outcome.is_some() {
            return None;
        }
        let verdict = if is_breached(&due, &at) {
            SlaVerdict::Breached
        } else {
            SlaVerdict::Met
        };
        let outcome = SlaOutcome {
            verdict,
            closed_at: at,
        };
        self.outcome = Some(outcome);
        Some(outcome)
    }

    /// Point-in-time view of the window.
    pub fn status_at(&self, now: &Timestamp) -> WindowStatus {
        let state = match (&self.due, &self.outcome) {
            (None, _) => WindowState::Unset,
            (Some(_), Some(outcome)) => match outcome.verdict {
                SlaVerdict::Met => WindowState::Met,
                SlaVerdict::Breached => WindowState::Breached,
            },
            (Some(_), None) => WindowState::Open,
        };
        let breached = match (&self.due, &self.outcome) {
            (_, Some(outcome)) => outcome.verdict == SlaVerdict::Breached,
            (Some(due), None) => is_breached(due, now),
            (None, None) => false,
        };
        let seconds_remaining = match (&self.due, &self.outcome) {
            (Some(due), None) => Some(now.seconds_until(due)),
            _ => None,
        };
        WindowStatus {
            due: self.due,
            state,
            breached,
            closed_at: self.outcome.map(|o| o.closed_at),
            seconds_remaining,
        }
    }
}

/// The three SLA windows of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlaClock {
    pub accept: SlaWindow,
    pub arrive: SlaWindow,
    pub complete: SlaWindow,
}

impl SlaClock {
    /// Write resolved deadlines into unset windows only. Returns the number
    /// of windows written.
    pub fn start(&mut self, deadlines: &SlaDeadlines) -> usize {
        [
            self.accept.start(deadlines.accept_due),
            self.arrive.start(deadlines.arrive_due),
            self.complete.start(deadlines.complete_due),
        ]
        .into_iter()
        .filter(|written| *written)
        .count()
    }

    /// Whether any deadline has been set.
    pub fn is_started(&self) -> bool {
        self.accept.due.is_some() || self.arrive.due.is_some() || self.complete.due.is_some()
    }

    /// Close the selected windows that are still open; returns what closed.
    pub fn close(&mut self, windows: &[SlaWindowKind], at: Timestamp) -> Vec<(SlaWindowKind, SlaOutcome)> {
        windows
            .iter()
            .filter_map(|kind| self.window_mut(*kind).close(at).map(|o| (*kind, o)))
            .collect()
    }

    fn window_mut(&mut self, kind: SlaWindowKind) -> &mut SlaWindow {
        match kind {
            SlaWindowKind::Accept => &mut self.accept,
            SlaWindowKind::Arrive => &mut self.arrive,
            SlaWindowKind::Complete => &mut self.complete,
        }
    }

    /// Snapshot of all three windows at `now`.
    pub fn status_at(&self, now: Timestamp) -> SlaStatus {
        SlaStatus {
            evaluated_at: now,
            accept: self.accept.status_at(&now),
            arrive: self.arrive.status_at(&now),
            complete: self.complete.status_at(&now),
        }
    }
}

/// Which of the three windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaWindowKind {
    Accept,
    Arrive,
    Complete,
}

impl SlaWindowKind {
    pub const ALL: [SlaWindowKind; 3] = [Self::Accept, Self::Arrive, Self::Complete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Arrive => "arrive",
            Self::Complete => "complete",
        }
    }
}

/// Display state of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    /// No deadline (clock not started, or no policy).
    Unset,
    Open,
    Met,
    Breached,
}

/// Point-in-time view of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStatus {
    pub due: Option<Timestamp>,
    pub state: WindowState,
    /// Recorded breach, or an open window already past due.
    pub breached: bool,
    pub closed_at: Option<Timestamp>,
    /// Seconds until due for open windows; negative once overdue.
    pub seconds_remaining: Option<i64>,
}

/// Point-in-time view of a request's SLA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaStatus {
    pub evaluated_at: Timestamp,
    pub accept: WindowStatus,
    pub arrive: WindowStatus,
    pub complete: WindowStatus,
}

impl SlaStatus {
    /// Any window breached.
    pub fn any_breached(&self) -> bool {
        self.accept.breached || self.arrive.breached || self.complete.breached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn t0() -> Timestamp {
        Timestamp::parse("2026-03-01T08:00:00Z").unwrap()
    }

    #[test]
    fn standard_urgent_deadlines() {
        let book = PolicyBook::standard();
        match book.resolve(Priority::Urgent, None, &t0()) {
            SlaResolution::Resolved(d) => {
                assert_eq!(d.accept_due, t0().plus_minutes(10));
                assert_eq!(d.arrive_due, t0().plus_minutes(60));
                assert_eq!(d.complete_due, t0().plus_minutes(240));
            }
            SlaResolution::NoPolicy => panic!("expected a policy"),
        }
    }

    #[test]
    fn category_row_wins_over_default() {
        let plumbing = Category::new("plumbing").unwrap();
        let mut rows = PolicyBook::standard().policies().to_vec();
        rows.push(SlaPolicy {
            priority: Priority::High,
            category: Some(plumbing.clone()),
            accept_within_minutes: 30,
            arrive_within_minutes: 90,
            complete_within_minutes: 300,
        });
        let book = PolicyBook::new(rows).unwrap();

        let SlaResolution::Resolved(d) = book.resolve(Priority::High, Some(&plumbing), &t0()) else {
            panic!("expected a policy");
        };
        assert_eq!(d.accept_due.to_iso8601(), "2026-03-01T08:30:00Z");
        assert_eq!(d.arrive_due, t0().plus_minutes(90));

        let hvac = Category::new("hvac").unwrap();
        let SlaResolution::Resolved(d) = book.resolve(Priority::High, Some(&hvac), &t0()) else {
            panic!("expected default");
        };
        assert_eq!(d.arrive_due, t0().plus_minutes(240));
    }

    #[test]
    fn missing_priority_is_no_policy() {
        let book = PolicyBook::new(vec![SlaPolicy {
            priority: Priority::Urgent,
            category: None,
            accept_within_minutes: 5,
            arrive_within_minutes: 30,
            complete_within_minutes: 60,
        }])
        .unwrap();
        assert_eq!(book.resolve(Priority::Low, None, &t0()), SlaResolution::NoPolicy);
    }

    #[test]
    fn breach_is_strictly_after_due() {
        let due = t0().plus_minutes(30);
        assert!(!is_breached(&due, &due));
        assert!(!is_breached(&due, &t0()));
        assert!(is_breached(&due, &Timestamp::from_epoch_secs(due.epoch_secs() + 1).unwrap()));
    }

    #[test]
    fn book_validation() {
        let bad = SlaPolicy {
            priority: Priority::Low,
            category: None,
            accept_within_minutes: 0,
            arrive_within_minutes: 10,
            complete_within_minutes: 20,
        };
        assert!(matches!(PolicyBook::new(vec![bad]), Err(PolicyError::ZeroWindow { .. })));

        let unordered = SlaPolicy {
            priority: Priority::Low,
            category: None,
            accept_within_minutes: 50,
            arrive_within_minutes: 10,
            complete_within_minutes: 20,
        };
        assert!(matches!(
            PolicyBook::new(vec![unordered]),
            Err(PolicyError::Unordered { .. })
        ));

        let mut rows = PolicyBook::standard().policies().to_vec();
        rows.push(rows[0].clone());
        assert!(matches!(PolicyBook::new(rows), Err(PolicyError::Duplicate { .. })));
    }

    #[test]
    fn yaml_book_loads() {
        let yaml = r#"
policies:
  - priority: urgent
    accept_within_minutes: 15
    arrive_within_minutes: 45
    complete_within_minutes: 180
  - priority: urgent
    category: Electrical
    accept_within_minutes: 5
    arrive_within_minutes: 30
    complete_within_minutes: 120
"#;
        let book = PolicyBook::from_yaml(yaml).unwrap();
        let electrical = Category::new("electrical").unwrap();
        assert_eq!(
            book.lookup(Priority::Urgent, Some(&electrical)).unwrap().accept_within_minutes,
            5
        );
    }

    #[test]
    fn window_start_never_overwrites() {
        let mut w = SlaWindow::default();
        assert!(w.start(t0()));
        assert!(!w.start(t0().plus_minutes(5)));
        assert_eq!(w.due, Some(t0()));
    }

    #[test]
    fn window_close_records_once() {
        let mut w = SlaWindow::default();
        w.start(t0().plus_minutes(10));
        let outcome = w.close(t0().plus_minutes(15)).unwrap();
        assert_eq!(outcome.verdict, SlaVerdict::Breached);
        assert!(w.close(t0().plus_minutes(1)).is_none());
        assert_eq!(w.outcome.unwrap().verdict, SlaVerdict::Breached);
    }

    #[test]
    fn closing_unset_window_is_noop() {
        let mut w = SlaWindow::default();
        assert!(w.close(t0()).is_none());
        assert_eq!(w.status_at(&t0()).state, WindowState::Unset);
    }

    #[test]
    fn open_window_status_derives_breach() {
        let mut clock = SlaClock::default();
        let SlaResolution::Resolved(d) = PolicyBook::standard().resolve(Priority::Urgent, None, &t0())
        else {
            panic!("expected a policy");
        };
        assert_eq!(clock.start(&d), 3);
        let status = clock.status_at(t0().plus_minutes(15));
        assert!(status.accept.breached);
        assert_eq!(status.accept.state, WindowState::Open);
        assert_eq!(status.accept.seconds_remaining, Some(-300));
        assert!(!status.arrive.breached);
        assert!(status.any_breached());
        // Derivation never touches the stored deadline.
        assert_eq!(clock.accept.due, Some(d.accept_due));
    }

    proptest! {
        #[test]
        fn breach_is_monotonic_in_now(minutes in 1u32..10_000, later in 0i64..1_000_000) {
            let due = t0().plus_minutes(minutes);
            let now = Timestamp::from_epoch_secs(t0().epoch_secs() + later).unwrap();
            let after = Timestamp::from_epoch_secs(now.epoch_secs() + 1).unwrap();
            if is_breached(&due, &now) {
                prop_assert!(is_breached(&due, &after));
            }
        }
    }
}
