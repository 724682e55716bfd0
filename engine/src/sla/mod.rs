//! SLA policy, clock and escalation evaluation

pub mod clock;
pub mod escalation;
pub mod policy;

pub use clock::{evaluate as evaluate_clock, SlaSnapshot, SlaState, BREACH_REASON};
pub use escalation::{evaluate_steps, EscalationOutcome, FiredStep};
pub use policy::{
    validate_thresholds, EscalationStep, SlaAmendment, SlaAttachment, SlaPolicy,
    TEAM_MUTABLE_STATUSES,
};
