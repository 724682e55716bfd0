//! SLA policy owned by a service request
//!
//! A policy is created at triage and embedded in its request; it is never
//! shared. Target/breach thresholds and escalation steps are validated on
//! attach and on every amendment; once the request is resolved or closed the
//! policy is immutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::request::types::{Priority, RequestStatus, ServiceRequest, TeamId};

/// One automated escalation threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationStep {
    /// Hours of elapsed SLA time after which this step fires once
    pub after_hours: f64,
    /// Action label delivered with the escalation event, e.g. `notify_supervisor`
    pub action: String,
}

impl EscalationStep {
    pub fn new(after_hours: f64, action: impl Into<String>) -> Self {
        Self {
            after_hours,
            action: action.into(),
        }
    }
}

/// SLA policy attached to exactly one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaPolicy {
    /// Display name, derived from the request id
    pub name: String,

    /// Matching context captured at triage time
    pub zone: String,
    pub priority: Priority,
    pub category_code: String,
    pub subcategory_code: Option<String>,

    /// Hours until the request is considered at risk
    pub target_hours: f64,
    /// Hours until the request is considered breached; never below target
    pub breach_threshold_hours: f64,
    /// Ordered by strictly increasing `after_hours`
    pub escalation_steps: Vec<EscalationStep>,

    pub team_id: Option<TeamId>,
    /// Deactivated policies pause clock classification and escalation
    /// until reactivated
    pub active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for attaching a policy to a request at triage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaAttachment {
    pub target_hours: f64,
    /// Defaults to `target_hours` when absent
    pub breach_threshold_hours: Option<f64>,
    pub team_id: Option<TeamId>,
    #[serde(default)]
    pub escalation_steps: Vec<EscalationStep>,
}

/// Partial update to an attached policy
///
/// `team_id` uses a double option: outer `None` leaves the team untouched,
/// `Some(None)` clears it, `Some(Some(id))` reassigns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlaAmendment {
    pub name: Option<String>,
    pub target_hours: Option<f64>,
    pub breach_threshold_hours: Option<f64>,
    pub escalation_steps: Option<Vec<EscalationStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<Option<TeamId>>,
    pub active: Option<bool>,
}

/// Statuses in which team reassignment is still permitted
pub const TEAM_MUTABLE_STATUSES: [RequestStatus; 3] = [
    RequestStatus::New,
    RequestStatus::Triaged,
    RequestStatus::Assigned,
];

/// Validate threshold and step constraints shared by attach and amend
pub fn validate_thresholds(
    target_hours: f64,
    breach_threshold_hours: f64,
    escalation_steps: &[EscalationStep],
) -> EngineResult<()> {
    if target_hours <= 0.0 {
        return Err(EngineError::Validation(format!(
            "target_hours must be positive, got {}",
            target_hours
        )));
    }
    if breach_threshold_hours < target_hours {
        return Err(EngineError::Validation(format!(
            "breach_threshold_hours {} is below target_hours {}",
            breach_threshold_hours, target_hours
        )));
    }
    let mut prev: Option<f64> = None;
    for step in escalation_steps {
        if let Some(prev) = prev {
            if step.after_hours <= prev {
                return Err(EngineError::Validation(format!(
                    "escalation_steps must be strictly increasing by after_hours \
                     ({} follows {})",
                    step.after_hours, prev
                )));
            }
        }
        prev = Some(step.after_hours);
    }
    Ok(())
}

impl SlaPolicy {
    /// Build a validated policy for a request from an attachment payload
    pub fn build(
        request: &ServiceRequest,
        attachment: SlaAttachment,
        now: DateTime<Utc>,
    ) -> EngineResult<Self> {
        let breach = attachment
            .breach_threshold_hours
            .unwrap_or(attachment.target_hours);
        validate_thresholds(attachment.target_hours, breach, &attachment.escalation_steps)?;

        Ok(Self {
            name: format!("SLA for {}", request.request_id),
            zone: request.resolved_zone().unwrap_or("UNKNOWN").to_string(),
            priority: request.priority,
            category_code: request.category.clone(),
            subcategory_code: request.sub_category.clone(),
            target_hours: attachment.target_hours,
            breach_threshold_hours: breach,
            escalation_steps: attachment.escalation_steps,
            team_id: attachment.team_id,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Escalation steps sorted ascending by `after_hours`
    ///
    /// Attach validation guarantees the stored order; historical documents
    /// that predate it are re-sorted before evaluation.
    pub fn sorted_steps(&self) -> Vec<EscalationStep> {
        let mut steps = self.escalation_steps.clone();
        steps.sort_by(|a, b| a.after_hours.total_cmp(&b.after_hours));
        steps
    }

    #[cfg(test)]
    pub fn for_tests(zone: &str, target_hours: f64, breach_threshold_hours: f64) -> Self {
        let now = Utc::now();
        Self {
            name: "SLA for tests".to_string(),
            zone: zone.to_string(),
            priority: Priority::P3,
            category_code: "roads".to_string(),
            subcategory_code: None,
            target_hours,
            breach_threshold_hours,
            escalation_steps: vec![
                EscalationStep::new(target_hours, "notify_supervisor"),
                EscalationStep::new(breach_threshold_hours, "escalate_manager"),
            ],
            team_id: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(hours: &[f64]) -> Vec<EscalationStep> {
        hours
            .iter()
            .map(|h| EscalationStep::new(*h, "notify"))
            .collect()
    }

    #[test]
    fn test_target_must_be_positive() {
        assert!(validate_thresholds(0.0, 0.0, &[]).is_err());
        assert!(validate_thresholds(-1.0, 10.0, &[]).is_err());
        assert!(validate_thresholds(1.0, 1.0, &[]).is_ok());
    }

    #[test]
    fn test_breach_below_target_rejected() {
        let err = validate_thresholds(48.0, 24.0, &[]).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(validate_thresholds(48.0, 48.0, &[]).is_ok());
    }

    #[test]
    fn test_steps_must_strictly_increase() {
        assert!(validate_thresholds(48.0, 72.0, &steps(&[24.0, 48.0])).is_ok());
        assert!(validate_thresholds(48.0, 72.0, &steps(&[24.0, 24.0])).is_err());
        assert!(validate_thresholds(48.0, 72.0, &steps(&[48.0, 24.0])).is_err());
    }

    #[test]
    fn test_sorted_steps_reorders_historical_documents() {
        let mut policy = SlaPolicy::for_tests("Z", 48.0, 72.0);
        policy.escalation_steps = steps(&[72.0, 24.0, 48.0]);
        let sorted = policy.sorted_steps();
        let hours: Vec<f64> = sorted.iter().map(|s| s.after_hours).collect();
        assert_eq!(hours, vec![24.0, 48.0, 72.0]);
    }
}
