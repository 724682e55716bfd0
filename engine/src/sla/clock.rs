//! SLA clock
//!
//! Pure classification of elapsed SLA time against a policy's thresholds.
//! The clock starts at triage time (creation time for requests that were
//! never triaged) and stops at the first terminal timestamp; until then it
//! runs against the caller-supplied `now`, which keeps every computation
//! reproducible in tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason string recorded in the KPIs while state is `breached`
pub const BREACH_REASON: &str = "breach_threshold_exceeded";

/// SLA classification, from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaState {
    OnTrack,
    AtRisk,
    Breached,
}

impl std::fmt::Display for SlaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OnTrack => write!(f, "on_track"),
            Self::AtRisk => write!(f, "at_risk"),
            Self::Breached => write!(f, "breached"),
        }
    }
}

/// Snapshot of SLA time derived from one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaSnapshot {
    pub elapsed_hours: f64,
    pub sla_state: SlaState,
    /// Minutes left before the target threshold; `None` when no target is
    /// defined, zero once crossed
    pub remaining_to_target_minutes: Option<i64>,
    /// Minutes left before the breach threshold, same conventions
    pub remaining_to_breach_minutes: Option<i64>,
    /// Whole minutes from SLA start to the terminal timestamp; `None` until
    /// a terminal timestamp exists, stable afterwards
    pub resolution_minutes: Option<i64>,
    pub breach_reason: Option<String>,
}

/// Evaluate the clock
///
/// `end` is the terminal timestamp (resolved/closed) when the request has
/// reached a terminal-for-SLA state, else `None` and the clock runs against
/// `now`. Thresholds at or below zero count as undefined.
pub fn evaluate(
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    target_hours: f64,
    breach_threshold_hours: f64,
) -> SlaSnapshot {
    let effective_end = end.unwrap_or(now);
    let elapsed_seconds = (effective_end - start).num_seconds().max(0);
    let elapsed_hours = elapsed_seconds as f64 / 3600.0;
    let elapsed_minutes = elapsed_seconds / 60;

    // Breach outranks at-risk: with breach == target, crossing the shared
    // threshold classifies as breached, never at_risk.
    let sla_state = if breach_threshold_hours > 0.0 && elapsed_hours >= breach_threshold_hours {
        SlaState::Breached
    } else if target_hours > 0.0 && elapsed_hours >= target_hours {
        SlaState::AtRisk
    } else {
        SlaState::OnTrack
    };

    let remaining = |threshold_hours: f64| -> Option<i64> {
        if threshold_hours > 0.0 {
            Some(((threshold_hours * 60.0) as i64 - elapsed_minutes).max(0))
        } else {
            None
        }
    };

    SlaSnapshot {
        elapsed_hours,
        sla_state,
        remaining_to_target_minutes: remaining(target_hours),
        remaining_to_breach_minutes: remaining(breach_threshold_hours),
        resolution_minutes: end.map(|e| (e - start).num_minutes().max(0)),
        breach_reason: match sla_state {
            SlaState::Breached => Some(BREACH_REASON.to_string()),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        "2026-01-05T08:00:00Z".parse().unwrap()
    }

    fn after_hours(h: i64) -> DateTime<Utc> {
        t0() + Duration::hours(h)
    }

    #[test]
    fn test_classification_48_72() {
        let cases = [
            (47, SlaState::OnTrack),
            (50, SlaState::AtRisk),
            (80, SlaState::Breached),
        ];
        for (hours, expected) in cases {
            let snap = evaluate(t0(), None, after_hours(hours), 48.0, 72.0);
            assert_eq!(snap.sla_state, expected, "at {}h", hours);
        }
    }

    #[test]
    fn test_at_risk_boundary_is_inclusive() {
        let snap = evaluate(t0(), None, after_hours(48), 48.0, 72.0);
        assert_eq!(snap.sla_state, SlaState::AtRisk);
        assert_eq!(snap.remaining_to_target_minutes, Some(0));
        assert_eq!(snap.remaining_to_breach_minutes, Some(24 * 60));
    }

    #[test]
    fn test_breach_equal_target_classifies_breached_at_boundary() {
        let snap = evaluate(t0(), None, after_hours(48), 48.0, 48.0);
        assert_eq!(snap.sla_state, SlaState::Breached);
        assert_eq!(snap.breach_reason.as_deref(), Some(BREACH_REASON));
    }

    #[test]
    fn test_undefined_thresholds_stay_on_track() {
        let snap = evaluate(t0(), None, after_hours(1000), 0.0, 0.0);
        assert_eq!(snap.sla_state, SlaState::OnTrack);
        assert_eq!(snap.remaining_to_target_minutes, None);
        assert_eq!(snap.remaining_to_breach_minutes, None);
    }

    #[test]
    fn test_end_before_start_clamps_to_zero() {
        let snap = evaluate(after_hours(2), None, t0(), 48.0, 72.0);
        assert_eq!(snap.elapsed_hours, 0.0);
        assert_eq!(snap.sla_state, SlaState::OnTrack);
    }

    #[test]
    fn test_resolution_minutes_only_with_terminal_end() {
        let open = evaluate(t0(), None, after_hours(3), 48.0, 72.0);
        assert_eq!(open.resolution_minutes, None);

        let done = evaluate(t0(), Some(after_hours(3)), after_hours(500), 48.0, 72.0);
        assert_eq!(done.resolution_minutes, Some(3 * 60));
    }

    #[test]
    fn test_terminal_end_freezes_the_clock() {
        // Recomputing long after closure returns the identical snapshot.
        let end = Some(t0() + Duration::minutes(95));
        let first = evaluate(t0(), end, after_hours(2), 48.0, 72.0);
        let later = evaluate(t0(), end, after_hours(9000), 48.0, 72.0);
        assert_eq!(first, later);
        assert_eq!(first.resolution_minutes, Some(95));
    }

    #[test]
    fn test_resolution_minutes_floors_partial_minutes() {
        let end = Some(t0() + Duration::seconds(119));
        let snap = evaluate(t0(), end, after_hours(1), 48.0, 72.0);
        assert_eq!(snap.resolution_minutes, Some(1));
    }
}
