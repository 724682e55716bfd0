//! Performance log types
//!
//! One log per request, created lazily. The event stream is append-only and
//! immutable once appended; the computed KPIs are a derived projection that
//! is fully overwritten on each recomputation, except for citizen feedback
//! and the escalation counter which recomputation must preserve. The log is
//! never the source of truth for status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::Actor;
use crate::request::types::{RequestId, RequestStatus};
use crate::sla::SlaState;

/// Citizen feedback captured when a resolved request is closed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitizenFeedback {
    /// 1 to 5
    pub stars: u8,
    pub comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Derived timing KPIs, overwritten on each recomputation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputedKpis {
    pub resolution_minutes: Option<i64>,
    pub sla_target_hours: Option<f64>,
    pub sla_state: Option<SlaState>,
    pub escalation_count: u32,
    pub breach_reason: Option<String>,
    pub citizen_feedback: Option<CitizenFeedback>,
}

/// One entry in the append-only event stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEvent {
    /// Log materialized for the first time
    LogCreated { at: DateTime<Utc> },

    /// A validated lifecycle transition was applied
    StatusChanged {
        from: RequestStatus,
        to: RequestStatus,
        by: Actor,
        at: DateTime<Utc>,
    },

    /// An automatic escalation step fired
    SlaEscalation {
        action: String,
        after_hours: f64,
        at: DateTime<Utc>,
    },

    /// Operator-triggered escalation
    ManualEscalation {
        escalation_count: u32,
        by: Actor,
        at: DateTime<Utc>,
    },

    /// Citizen submitted feedback on a resolved request
    CitizenFeedback {
        stars: u8,
        comment: Option<String>,
        by: Actor,
        at: DateTime<Utc>,
    },

    /// Request reached its terminal state
    Closed { at: DateTime<Utc> },

    /// Free-form note attached by a citizen or staff member
    Comment {
        text: String,
        by: Actor,
        at: DateTime<Utc>,
    },
}

impl LogEvent {
    /// Event type label as stored on the wire
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::LogCreated { .. } => "log_created",
            Self::StatusChanged { .. } => "status_changed",
            Self::SlaEscalation { .. } => "sla_escalation",
            Self::ManualEscalation { .. } => "manual_escalation",
            Self::CitizenFeedback { .. } => "citizen_feedback",
            Self::Closed { .. } => "closed",
            Self::Comment { .. } => "comment",
        }
    }

    /// When the event happened
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::LogCreated { at }
            | Self::StatusChanged { at, .. }
            | Self::SlaEscalation { at, .. }
            | Self::ManualEscalation { at, .. }
            | Self::CitizenFeedback { at, .. }
            | Self::Closed { at }
            | Self::Comment { at, .. } => *at,
        }
    }
}

/// Derived per-request performance record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceLog {
    pub request_id: RequestId,
    /// Append-only, ordered by append time
    pub event_stream: Vec<LogEvent>,
    pub computed_kpis: ComputedKpis,
    /// Bumped by the store on every write; writers condition their upsert on
    /// the revision they read, so concurrent read-modify-write cycles cannot
    /// erase each other
    #[serde(default)]
    pub revision: u64,
}

impl PerformanceLog {
    /// Fresh log with only the creation marker
    pub fn created(request_id: RequestId, now: DateTime<Utc>) -> Self {
        Self {
            request_id,
            event_stream: vec![LogEvent::LogCreated { at: now }],
            computed_kpis: ComputedKpis::default(),
            revision: 0,
        }
    }

    /// Count of events of one type, used by idempotence checks in tests
    pub fn count_events(&self, event_type: &str) -> usize {
        self.event_stream
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = LogEvent::SlaEscalation {
            action: "notify".to_string(),
            after_hours: 48.0,
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "sla_escalation");
        assert_eq!(json["action"], "notify");

        let back: LogEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.event_type(), "sla_escalation");
    }

    #[test]
    fn test_created_log_has_only_the_marker() {
        let log = PerformanceLog::created("CST-2026-0001".to_string(), Utc::now());
        assert_eq!(log.event_stream.len(), 1);
        assert_eq!(log.count_events("log_created"), 1);
        assert_eq!(log.computed_kpis.escalation_count, 0);
        assert!(log.computed_kpis.resolution_minutes.is_none());
        assert_eq!(log.revision, 0);
    }

    #[test]
    fn test_log_without_revision_deserializes_at_zero() {
        // Historical documents predate the revision counter.
        let json = serde_json::json!({
            "request_id": "CST-2025-0100",
            "event_stream": [],
            "computed_kpis": ComputedKpis::default(),
        });
        let log: PerformanceLog = serde_json::from_value(json).unwrap();
        assert_eq!(log.revision, 0);
    }
}
