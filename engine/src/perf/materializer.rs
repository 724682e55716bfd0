//! Performance log materializer
//!
//! Recomputes the derived KPI projection for one request and appends any
//! newly produced events. Recomputation is idempotent at a fixed `now`: the
//! escalation counter and citizen feedback survive, everything else in
//! `computed_kpis` is overwritten from the request and its policy. Each
//! write-back is conditioned on the log revision observed at read and
//! retried from a fresh read when another writer got in between, so a
//! concurrent manual escalation or feedback submission is never erased.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::access::Actor;
use crate::error::{EngineError, EngineResult};
use crate::perf::log::{ComputedKpis, LogEvent, PerformanceLog};
use crate::request::types::{RequestStatus, ServiceRequest};
use crate::sla::{evaluate_clock, evaluate_steps};
use crate::store::RequestStore;

/// Attempts at a conditional log write before giving up
pub(crate) const MAX_LOG_ATTEMPTS: u32 = 5;

/// A lifecycle transition to record alongside the recomputation
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub actor: Actor,
}

/// Recomputes and persists performance logs through the store
pub struct Materializer {
    store: Arc<dyn RequestStore>,
}

impl Materializer {
    pub fn new(store: Arc<dyn RequestStore>) -> Self {
        Self { store }
    }

    /// Recompute the log for `request` at `now`
    ///
    /// When `transition` is given, a `status_changed` event is appended (and
    /// a `closed` marker if the transition lands on the terminal state). The
    /// SLA clock runs from the request's SLA start to its terminal timestamp
    /// or `now`, so a closed request's timings freeze. An inactive policy
    /// pauses classification and escalation entirely.
    pub async fn recompute(
        &self,
        request: &ServiceRequest,
        now: DateTime<Utc>,
        transition: Option<StatusChange>,
    ) -> EngineResult<PerformanceLog> {
        for _ in 0..MAX_LOG_ATTEMPTS {
            let existing = self.store.load_performance_log(&request.request_id).await?;
            let (revision, prior_count, prior_feedback) = match &existing {
                Some(log) => (
                    log.revision,
                    log.computed_kpis.escalation_count,
                    log.computed_kpis.citizen_feedback.clone(),
                ),
                None => (0, 0, None),
            };

            let policy = request.sla_policy.as_ref().filter(|p| p.active);
            let (target_hours, breach_hours) = policy
                .map(|p| (p.target_hours, p.breach_threshold_hours))
                .unwrap_or((0.0, 0.0));

            let snapshot = evaluate_clock(
                request.sla_start(),
                request.sla_end(),
                now,
                target_hours,
                breach_hours,
            );

            let mut events = Vec::new();
            let mut escalation_count = prior_count;
            if let Some(policy) = policy {
                let outcome = evaluate_steps(
                    &policy.sorted_steps(),
                    snapshot.elapsed_hours,
                    prior_count,
                );
                escalation_count = outcome.escalation_count;
                for step in outcome.fired {
                    events.push(LogEvent::SlaEscalation {
                        action: step.action,
                        after_hours: step.after_hours,
                        at: now,
                    });
                }
            }

            if let Some(change) = &transition {
                events.push(LogEvent::StatusChanged {
                    from: change.from,
                    to: change.to,
                    by: change.actor.clone(),
                    at: now,
                });
                if change.to == RequestStatus::Closed {
                    events.push(LogEvent::Closed { at: now });
                }
            }

            let kpis = ComputedKpis {
                resolution_minutes: snapshot.resolution_minutes,
                sla_target_hours: policy.map(|p| p.target_hours),
                sla_state: Some(snapshot.sla_state),
                escalation_count,
                breach_reason: snapshot.breach_reason,
                citizen_feedback: prior_feedback,
            };

            if let Some(log) = self
                .store
                .upsert_performance_log(&request.request_id, revision, kpis, events, now)
                .await?
            {
                return Ok(log);
            }
            tracing::debug!(
                request_id = %request.request_id,
                "log changed during recomputation, retrying from a fresh read"
            );
        }

        Err(EngineError::Store(format!(
            "performance log for {} kept changing across {} recompute attempts",
            request.request_id, MAX_LOG_ATTEMPTS
        )))
    }
}
