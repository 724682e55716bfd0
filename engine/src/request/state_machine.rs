//! Request state machine
//!
//! Transitions are strictly forward-only along
//! `new → triaged → assigned → in_progress → resolved → closed`, with two
//! sanctioned shortcuts: the owner-initiated `new → closed` cancellation and
//! the anonymous-request direct close (no feedback gate applies, so any
//! non-terminal anonymous request may close directly). `closed` is terminal.

use chrono::{DateTime, Utc};

use crate::error::{EngineError, EngineResult};
use crate::request::types::{RequestStatus, ServiceRequest};

/// Next status on the forward chain, if any
fn chain_next(status: RequestStatus) -> Option<RequestStatus> {
    match status {
        RequestStatus::New => Some(RequestStatus::Triaged),
        RequestStatus::Triaged => Some(RequestStatus::Assigned),
        RequestStatus::Assigned => Some(RequestStatus::InProgress),
        RequestStatus::InProgress => Some(RequestStatus::Resolved),
        RequestStatus::Resolved => Some(RequestStatus::Closed),
        RequestStatus::Closed => None,
    }
}

/// The allowed-next set for a request in its current status
///
/// The set depends on the request, not just the status: anonymous requests
/// may always close directly.
pub fn allowed_next(status: RequestStatus, anonymous: bool) -> Vec<RequestStatus> {
    let mut next = Vec::with_capacity(2);
    if let Some(n) = chain_next(status) {
        next.push(n);
    }
    let direct_close = status == RequestStatus::New || (anonymous && !status.is_terminal());
    if direct_close && !next.contains(&RequestStatus::Closed) {
        next.push(RequestStatus::Closed);
    }
    next
}

/// Validate that `target` is legal from the request's current status
pub fn validate_transition(request: &ServiceRequest, target: RequestStatus) -> EngineResult<()> {
    if allowed_next(request.status, request.is_anonymous()).contains(&target) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition {
            from: request.status,
            to: target,
        })
    }
}

/// Apply a validated transition in place
///
/// Sets the status and stamps the matching lifecycle timestamp with the
/// transition time. Lifecycle stamps are set at most once; re-entering a
/// stage is impossible on the forward-only graph, so a present stamp is
/// left untouched.
pub fn apply_transition(request: &mut ServiceRequest, target: RequestStatus, now: DateTime<Utc>) {
    request.status = target;
    let ts = &mut request.timestamps;
    let slot = match target {
        RequestStatus::New => None,
        RequestStatus::Triaged => Some(&mut ts.triaged_at),
        RequestStatus::Assigned => Some(&mut ts.assigned_at),
        RequestStatus::InProgress => Some(&mut ts.in_progress_at),
        RequestStatus::Resolved => Some(&mut ts.resolved_at),
        RequestStatus::Closed => Some(&mut ts.closed_at),
    };
    if let Some(slot) = slot {
        if slot.is_none() {
            *slot = Some(now);
        }
    }
    request.touch(now);
}
