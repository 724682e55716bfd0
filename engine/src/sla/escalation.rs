//! Escalation evaluator
//!
//! Walks a policy's ordered escalation steps against elapsed SLA time and
//! fires each crossed step exactly once. The evaluation is idempotent and
//! monotonic: re-running it at the same or an earlier elapsed time never
//! re-fires a step and never lowers the counter.
//!
//! Manual (operator) escalations share the same counter: they bump it by one
//! and can therefore suppress a later automatic step whose 1-based index is
//! no longer above the counter.

use serde::{Deserialize, Serialize};

use crate::sla::policy::EscalationStep;

/// One step crossed during an evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiredStep {
    /// 1-based index of the step in the sorted list
    pub index: u32,
    pub action: String,
    pub after_hours: f64,
}

/// Result of evaluating the steps once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationOutcome {
    /// New counter value, never below the input counter
    pub escalation_count: u32,
    /// Steps newly crossed by this evaluation, in step order
    pub fired: Vec<FiredStep>,
}

/// Evaluate sorted steps against elapsed time and the recorded counter
///
/// `steps` must be ascending by `after_hours` (see
/// [`crate::sla::SlaPolicy::sorted_steps`]). A step at 1-based index `i`
/// fires when `elapsed_hours >= after_hours` and the counter is still below
/// `i`; the counter then advances to `i`.
pub fn evaluate_steps(
    steps: &[EscalationStep],
    elapsed_hours: f64,
    escalation_count: u32,
) -> EscalationOutcome {
    let mut count = escalation_count;
    let mut fired = Vec::new();

    for (i, step) in steps.iter().enumerate() {
        let index = (i + 1) as u32;
        if elapsed_hours >= step.after_hours && count < index {
            count = index;
            fired.push(FiredStep {
                index,
                action: step.action.clone(),
                after_hours: step.after_hours,
            });
        }
    }

    EscalationOutcome {
        escalation_count: count,
        fired,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_steps() -> Vec<EscalationStep> {
        vec![
            EscalationStep::new(48.0, "notify"),
            EscalationStep::new(72.0, "escalate"),
        ]
    }

    #[test]
    fn test_both_steps_fire_once_at_100h() {
        let outcome = evaluate_steps(&two_steps(), 100.0, 0);
        assert_eq!(outcome.escalation_count, 2);
        assert_eq!(outcome.fired.len(), 2);
        assert_eq!(outcome.fired[0].action, "notify");
        assert_eq!(outcome.fired[1].action, "escalate");
    }

    #[test]
    fn test_reevaluation_is_idempotent() {
        let first = evaluate_steps(&two_steps(), 100.0, 0);
        let again = evaluate_steps(&two_steps(), 100.0, first.escalation_count);
        assert_eq!(again.escalation_count, 2);
        assert!(again.fired.is_empty(), "re-run must not re-fire steps");
    }

    #[test]
    fn test_earlier_elapsed_never_lowers_the_counter() {
        let outcome = evaluate_steps(&two_steps(), 10.0, 2);
        assert_eq!(outcome.escalation_count, 2);
        assert!(outcome.fired.is_empty());
    }

    #[test]
    fn test_partial_crossing_fires_first_step_only() {
        let outcome = evaluate_steps(&two_steps(), 50.0, 0);
        assert_eq!(outcome.escalation_count, 1);
        assert_eq!(outcome.fired.len(), 1);
        assert_eq!(outcome.fired[0].index, 1);
    }

    #[test]
    fn test_empty_steps_never_fire() {
        let outcome = evaluate_steps(&[], 10_000.0, 0);
        assert_eq!(outcome.escalation_count, 0);
        assert!(outcome.fired.is_empty());
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let outcome = evaluate_steps(&two_steps(), 48.0, 0);
        assert_eq!(outcome.escalation_count, 1);
    }

    #[test]
    fn test_manual_bump_suppresses_next_automatic_step() {
        // Counter already at 1 from a manual escalation: the first automatic
        // step (index 1) is considered consumed; only the second fires.
        let outcome = evaluate_steps(&two_steps(), 100.0, 1);
        assert_eq!(outcome.escalation_count, 2);
        assert_eq!(outcome.fired.len(), 1);
        assert_eq!(outcome.fired[0].index, 2);
    }
}
