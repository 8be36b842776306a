//! Member health state machine.
//!
//! # States
//! - Unknown: registered, not yet confirmed either way
//! - Healthy: member receives traffic / holds its vote
//! - Suspect: one or more failures below `unhealthy_threshold`
//! - Unhealthy: member excluded from its pool / loses its vote
//! - Recovering: succeeding again, below `healthy_threshold`
//!
//! # State Transitions
//! ```text
//! Healthy    → Suspect:    first failure
//! Suspect    → Unhealthy:  consecutive failures >= unhealthy_threshold
//! Suspect    → Healthy:    any success
//! Unhealthy  → Recovering: first success
//! Recovering → Healthy:    consecutive successes >= healthy_threshold
//! Recovering → Unhealthy:  any failure (no partial credit)
//! Unknown    → Healthy / Unhealthy: the respective threshold is reached
//! ```
//!
//! Suspect and Recovering are internal phases. Only a crossed threshold is
//! reported, so a member's published state is always Unknown, Healthy or
//! Unhealthy. The two reported moves are `Healthy → Unhealthy` and
//! `Recovering → Healthy` (or from `Unknown` before the first verdict).
//!
//! # Design Decisions
//! - Hysteresis prevents flapping
//! - The failure that enters Suspect counts toward `unhealthy_threshold`
//! - Counters reset on the opposite outcome, not on transition

use crate::registry::HealthState;

/// A crossed threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: HealthState,
    pub to: HealthState,
    pub reason: String,
}

/// Tracks consecutive probe results for a single member.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    phase: HealthState,
    published: HealthState,
    consecutive_failures: u32,
    consecutive_successes: u32,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// The published state a phase belongs to.
fn settled(phase: HealthState) -> HealthState {
    match phase {
        HealthState::Suspect => HealthState::Healthy,
        HealthState::Recovering => HealthState::Unhealthy,
        other => other,
    }
}

impl HealthTracker {
    /// A tracker for a member nobody has probed yet.
    pub fn new() -> Self {
        Self::with_state(HealthState::Unknown)
    }

    /// A tracker starting from a known state.
    pub fn with_state(state: HealthState) -> Self {
        Self {
            phase: state,
            published: settled(state),
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }

    /// Current phase, including Suspect and Recovering.
    pub fn state(&self) -> HealthState {
        self.phase
    }

    /// Last state reported through a [`Transition`].
    pub fn published(&self) -> HealthState {
        self.published
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    /// Record a probe outcome.
    ///
    /// Returns a transition only when the outcome crosses a threshold.
    /// Thresholds are passed per call so a reloaded policy applies from the
    /// next probe on.
    pub fn record(
        &mut self,
        success: bool,
        unhealthy_threshold: u32,
        healthy_threshold: u32,
    ) -> Option<Transition> {
        let unhealthy_threshold = unhealthy_threshold.max(1);
        let healthy_threshold = healthy_threshold.max(1);

        let (next, reason) = if success {
            self.consecutive_failures = 0;
            self.consecutive_successes = self.consecutive_successes.saturating_add(1);
            let successes = self.consecutive_successes;

            match self.phase {
                HealthState::Healthy | HealthState::Suspect => (HealthState::Healthy, None),
                HealthState::Unhealthy | HealthState::Recovering | HealthState::Unknown
                    if successes >= healthy_threshold =>
                {
                    (HealthState::Healthy, Some(format!("{} consecutive successes", successes)))
                }
                HealthState::Unhealthy | HealthState::Recovering => (HealthState::Recovering, None),
                HealthState::Unknown => (HealthState::Unknown, None),
            }
        } else {
            self.consecutive_successes = 0;
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            let failures = self.consecutive_failures;

            match self.phase {
                HealthState::Unhealthy | HealthState::Recovering => (HealthState::Unhealthy, None),
                HealthState::Healthy | HealthState::Suspect | HealthState::Unknown
                    if failures >= unhealthy_threshold =>
                {
                    (HealthState::Unhealthy, Some(format!("{} consecutive failures", failures)))
                }
                HealthState::Healthy | HealthState::Suspect => (HealthState::Suspect, None),
                HealthState::Unknown => (HealthState::Unknown, None),
            }
        };

        let previous = self.phase;
        self.phase = next;

        let reason = reason?;
        if next == self.published {
            return None;
        }
        let from = if previous == HealthState::Recovering {
            HealthState::Recovering
        } else {
            self.published
        };
        self.published = next;
        Some(Transition { from, to: next, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use HealthState::*;

    fn drive(tracker: &mut HealthTracker, outcomes: &[bool]) -> Vec<(HealthState, HealthState)> {
        outcomes
            .iter()
            .filter_map(|ok| tracker.record(*ok, 2, 2))
            .map(|t| (t.from, t.to))
            .collect()
    }

    #[test]
    fn starts_unknown() {
        let tracker = HealthTracker::new();
        assert_eq!(tracker.state(), Unknown);
        assert_eq!(tracker.published(), Unknown);
        assert_eq!(tracker.consecutive_failures(), 0);
    }

    #[test]
    fn unknown_needs_threshold_either_way() {
        let mut tracker = HealthTracker::new();
        assert_eq!(drive(&mut tracker, &[true]), vec![]);
        assert_eq!(drive(&mut tracker, &[true]), vec![(Unknown, Healthy)]);

        let mut tracker = HealthTracker::new();
        assert_eq!(drive(&mut tracker, &[false, false]), vec![(Unknown, Unhealthy)]);
    }

    #[test]
    fn two_failures_report_one_transition() {
        let mut tracker = HealthTracker::with_state(Healthy);
        assert_eq!(drive(&mut tracker, &[false]), vec![]);
        assert_eq!(tracker.state(), Suspect);
        assert_eq!(tracker.published(), Healthy);

        assert_eq!(drive(&mut tracker, &[false, false]), vec![(Healthy, Unhealthy)]);
        assert_eq!(tracker.consecutive_failures(), 3);
    }

    #[test]
    fn failure_then_success_reports_nothing() {
        let mut tracker = HealthTracker::with_state(Healthy);
        assert_eq!(drive(&mut tracker, &[false, true, false, true, false, true]), vec![]);
        assert_eq!(tracker.state(), Healthy);

        let mut tracker = HealthTracker::with_state(Unhealthy);
        assert_eq!(drive(&mut tracker, &[false, true]), vec![]);
        assert_eq!(tracker.state(), Recovering);
        assert_eq!(tracker.published(), Unhealthy);
    }

    #[test]
    fn recovery_reports_recovering_to_healthy() {
        let mut tracker = HealthTracker::with_state(Unhealthy);
        assert_eq!(drive(&mut tracker, &[true]), vec![]);
        assert_eq!(drive(&mut tracker, &[true]), vec![(Recovering, Healthy)]);
    }

    #[test]
    fn failure_while_recovering_resets_silently() {
        let mut tracker = HealthTracker::with_state(Unhealthy);
        assert_eq!(drive(&mut tracker, &[true, false, true]), vec![]);
        assert_eq!(tracker.state(), Recovering);
        assert_eq!(tracker.consecutive_successes(), 1);
        assert_eq!(drive(&mut tracker, &[true]), vec![(Recovering, Healthy)]);
    }

    #[test]
    fn threshold_of_one_skips_intermediate_states() {
        let mut tracker = HealthTracker::with_state(Healthy);
        let t = tracker.record(false, 1, 1).unwrap();
        assert_eq!((t.from, t.to), (Healthy, Unhealthy));
        let t = tracker.record(true, 1, 1).unwrap();
        assert_eq!((t.from, t.to), (Unhealthy, Healthy));
    }

    #[test]
    fn custom_thresholds() {
        let mut tracker = HealthTracker::with_state(Healthy);
        for _ in 0..4 {
            assert!(tracker.record(false, 5, 3).is_none());
        }
        assert_eq!(tracker.state(), Suspect);
        let t = tracker.record(false, 5, 3).unwrap();
        assert_eq!((t.from, t.to), (Healthy, Unhealthy));

        assert!(tracker.record(true, 5, 3).is_none());
        assert!(tracker.record(true, 5, 3).is_none());
        assert_eq!(tracker.state(), Recovering);
        let t = tracker.record(true, 5, 3).unwrap();
        assert_eq!((t.from, t.to), (Recovering, Healthy));
        assert_eq!(t.reason, "3 consecutive successes");
    }
}
