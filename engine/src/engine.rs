//! Request lifecycle engine
//!
//! Orchestrates every mutation of a service request: creation with the
//! sequential per-year id, the `new`-only edit/delete window, SLA attach and
//! amendment, lifecycle transitions, citizen feedback and manual escalation.
//! Each mutation is one read, an in-memory change, and one conditional write
//! keyed on the status observed at read time; a lost race surfaces as a
//! conflict the caller may retry.
//!
//! Performance-log recomputation after a successful write is best-effort:
//! the sweep heals any staleness, so a materializer failure is logged and
//! swallowed rather than failing the already-committed mutation.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};

use crate::access::{AccessPolicy, Actor, RequestAction};
use crate::audit::{AuditBus, AuditEntity, AuditEvent};
use crate::directory::Directory;
use crate::error::{EngineError, EngineResult};
use crate::perf::log::{CitizenFeedback, ComputedKpis, LogEvent, PerformanceLog};
use crate::perf::materializer::{Materializer, StatusChange, MAX_LOG_ATTEMPTS};
use crate::request::sequence::format_request_id;
use crate::request::state_machine::{apply_transition, validate_transition};
use crate::request::types::{
    NewRequest, Priority, RequestPatch, RequestStatus, ServiceRequest,
};
use crate::sla::{
    validate_thresholds, SlaAmendment, SlaAttachment, SlaPolicy, TEAM_MUTABLE_STATUSES,
};
use crate::store::RequestStore;

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Prefix of generated request ids
    pub id_prefix: String,
    /// Attempts at claiming a unique id before giving up
    pub max_id_attempts: u32,
    /// Priority used when the directory has no default for the sub-category
    pub default_priority: Priority,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            id_prefix: "CST".to_string(),
            max_id_attempts: 12,
            default_priority: Priority::P3,
        }
    }
}

/// The lifecycle engine
pub struct RequestEngine {
    config: EngineConfig,
    store: Arc<dyn RequestStore>,
    directory: Arc<dyn Directory>,
    access: Arc<dyn AccessPolicy>,
    audit: Arc<AuditBus>,
    materializer: Materializer,
}

impl RequestEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn RequestStore>,
        directory: Arc<dyn Directory>,
        access: Arc<dyn AccessPolicy>,
        audit: Arc<AuditBus>,
    ) -> Self {
        let materializer = Materializer::new(store.clone());
        Self {
            config,
            store,
            directory,
            access,
            audit,
            materializer,
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn RequestStore> {
        &self.store
    }

    async fn load(&self, request_id: &str) -> EngineResult<ServiceRequest> {
        self.store
            .find_request(request_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("request {}", request_id)))
    }

    fn authorize(
        &self,
        actor: &Actor,
        request: &ServiceRequest,
        action: RequestAction,
    ) -> EngineResult<()> {
        if self.access.is_authorized(actor, request, action) {
            Ok(())
        } else {
            Err(EngineError::Forbidden(format!(
                "{} may not perform {:?} on {}",
                actor, action, request.request_id
            )))
        }
    }

    /// Best-effort KPI recomputation after a committed write
    async fn materialize(
        &self,
        request: &ServiceRequest,
        now: DateTime<Utc>,
        transition: Option<StatusChange>,
    ) {
        if let Err(error) = self.materializer.recompute(request, now, transition).await {
            tracing::warn!(
                request_id = %request.request_id,
                %error,
                "performance log recomputation failed, sweep will retry"
            );
        }
    }

    /// Submit a new citizen request
    ///
    /// The id is `{prefix}-{year}-{seq:04}` with a per-year counter. On a
    /// uniqueness collision the counter is resynced from the highest id
    /// already stored for the year, then the claim is retried, up to the
    /// configured attempt limit.
    pub async fn create_request(
        &self,
        actor: &Actor,
        input: NewRequest,
        now: DateTime<Utc>,
    ) -> EngineResult<ServiceRequest> {
        if input.description.trim().is_empty() {
            return Err(EngineError::Validation(
                "description must not be empty".to_string(),
            ));
        }
        if !input.citizen_ref.anonymous && input.citizen_ref.citizen_id.is_none() {
            return Err(EngineError::Validation(
                "citizen_id is required unless the request is anonymous".to_string(),
            ));
        }

        let priority = match &input.sub_category {
            Some(sub) => match self.directory.default_priority(sub).await {
                Ok(priority) => priority,
                Err(EngineError::NotFound(_)) => self.config.default_priority,
                Err(other) => return Err(other),
            },
            None => self.config.default_priority,
        };

        let year = now.year();
        let mut resynced = false;
        for _ in 0..self.config.max_id_attempts {
            let seq = self.store.next_sequence(year).await?;
            let request_id = format_request_id(&self.config.id_prefix, year, seq);
            let request =
                ServiceRequest::submitted(request_id.clone(), input.clone(), priority, now);
            if self.store.insert_request(request.clone()).await? {
                self.audit.publish(
                    AuditEvent::new(
                        "request.create",
                        actor.clone(),
                        AuditEntity::request(&request_id),
                        "service request submitted",
                    )
                    .with_meta(serde_json::json!({ "priority": priority.to_string() })),
                );
                return Ok(request);
            }

            tracing::warn!(%request_id, "request id already taken, counter is behind");
            if !resynced {
                let max = self
                    .store
                    .max_assigned_sequence(&self.config.id_prefix, year)
                    .await?;
                self.store.sync_sequence(year, max).await?;
                resynced = true;
            }
        }

        Err(EngineError::Store(format!(
            "could not claim a unique request id after {} attempts",
            self.config.max_id_attempts
        )))
    }

    pub async fn get_request(&self, request_id: &str) -> EngineResult<ServiceRequest> {
        self.load(request_id).await
    }

    /// Edit safe fields while the request is still `new`
    pub async fn update_request(
        &self,
        actor: &Actor,
        request_id: &str,
        patch: RequestPatch,
        now: DateTime<Utc>,
    ) -> EngineResult<ServiceRequest> {
        if patch.is_empty() {
            return Err(EngineError::Validation(
                "patch carries no changes".to_string(),
            ));
        }
        let mut request = self.load(request_id).await?;
        self.authorize(actor, &request, RequestAction::Edit)?;
        if request.status != RequestStatus::New {
            return Err(EngineError::Forbidden(format!(
                "request {} is {}, edits are only allowed while new",
                request_id, request.status
            )));
        }
        let changes = patch.changed_fields();
        request.apply_patch(patch, now);
        let saved = self
            .store
            .save_request(request_id, RequestStatus::New, request)
            .await?;
        self.audit.publish(
            AuditEvent::new(
                "request.update",
                actor.clone(),
                AuditEntity::request(request_id),
                "service request edited",
            )
            .with_meta(serde_json::json!({ "changes": changes })),
        );
        Ok(saved)
    }

    /// Delete a request that was never triaged
    pub async fn delete_request(&self, actor: &Actor, request_id: &str) -> EngineResult<()> {
        let request = self.load(request_id).await?;
        self.authorize(actor, &request, RequestAction::Delete)?;
        if request.status != RequestStatus::New {
            return Err(EngineError::Forbidden(format!(
                "request {} is {}, deletion is only allowed while new",
                request_id, request.status
            )));
        }
        self.store
            .delete_request(request_id, RequestStatus::New)
            .await?;
        self.audit.publish(AuditEvent::new(
            "request.delete",
            actor.clone(),
            AuditEntity::request(request_id),
            "service request deleted before triage",
        ));
        Ok(())
    }

    /// Attach an SLA policy to a `new` request, moving it to `triaged` (and
    /// straight on to `assigned` when a team comes with the attachment)
    pub async fn attach_sla(
        &self,
        actor: &Actor,
        request_id: &str,
        attachment: SlaAttachment,
        now: DateTime<Utc>,
    ) -> EngineResult<ServiceRequest> {
        let mut request = self.load(request_id).await?;
        self.authorize(actor, &request, RequestAction::ManageSla)?;
        if request.status != RequestStatus::New {
            return Err(EngineError::Forbidden(format!(
                "request {} is {}, an SLA can only be attached while new",
                request_id, request.status
            )));
        }
        if request.sla_policy.is_some() {
            return Err(EngineError::Validation(format!(
                "request {} already carries an SLA policy",
                request_id
            )));
        }

        if let Some(team_id) = &attachment.team_id {
            let zone = request.resolved_zone().ok_or_else(|| {
                EngineError::Validation(format!(
                    "request {} has no zone, a team cannot be validated",
                    request_id
                ))
            })?;
            self.directory.validate_team(team_id, zone).await?;
        }

        let team_id = attachment.team_id.clone();
        let policy = SlaPolicy::build(&request, attachment, now)?;
        request.sla_policy = Some(policy);

        apply_transition(&mut request, RequestStatus::Triaged, now);
        if let Some(team_id) = team_id {
            request.assignment.assigned_team_id = Some(team_id);
            apply_transition(&mut request, RequestStatus::Assigned, now);
        }
        let final_status = request.status;

        let saved = self
            .store
            .save_request(request_id, RequestStatus::New, request)
            .await?;

        self.materialize(
            &saved,
            now,
            Some(StatusChange {
                from: RequestStatus::New,
                to: final_status,
                actor: actor.clone(),
            }),
        )
        .await;

        self.audit.publish(
            AuditEvent::new(
                "sla.create",
                actor.clone(),
                AuditEntity::request(request_id),
                "SLA policy attached",
            )
            .with_meta(serde_json::json!({ "status": final_status.to_string() })),
        );
        Ok(saved)
    }

    /// Triage with directory-derived defaults: priority from the request's
    /// sub-category and target hours from the zone/priority tables
    pub async fn triage(
        &self,
        actor: &Actor,
        request_id: &str,
        team_id: Option<String>,
        now: DateTime<Utc>,
    ) -> EngineResult<ServiceRequest> {
        let request = self.load(request_id).await?;
        let zone = request
            .resolved_zone()
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "request {} has no zone, cannot derive a target",
                    request_id
                ))
            })?
            .to_string();
        let priority = match &request.sub_category {
            Some(sub) => self.directory.default_priority(sub).await?,
            None => request.priority,
        };
        let target_hours = self.directory.target_hours(&zone, priority).await?;
        self.attach_sla(
            actor,
            request_id,
            SlaAttachment {
                target_hours,
                breach_threshold_hours: None,
                team_id,
                escalation_steps: Vec::new(),
            },
            now,
        )
        .await
    }

    /// Amend the attached SLA policy
    ///
    /// Thresholds and steps may change while the request is open; team
    /// reassignment is limited to new/triaged/assigned. Once the request is
    /// resolved or closed the policy is immutable.
    pub async fn amend_sla(
        &self,
        actor: &Actor,
        request_id: &str,
        amendment: SlaAmendment,
        now: DateTime<Utc>,
    ) -> EngineResult<ServiceRequest> {
        let mut request = self.load(request_id).await?;
        self.authorize(actor, &request, RequestAction::ManageSla)?;
        let observed = request.status;
        if observed.is_terminal_for_sla() {
            return Err(EngineError::Forbidden(format!(
                "request {} is {}, its SLA policy is immutable",
                request_id, observed
            )));
        }
        let mut policy = request.sla_policy.take().ok_or_else(|| {
            EngineError::NotFound(format!("request {} has no SLA policy", request_id))
        })?;

        let mut changes = Vec::new();

        if let Some(team_change) = amendment.team_id.clone() {
            if !TEAM_MUTABLE_STATUSES.contains(&observed) {
                return Err(EngineError::Forbidden(format!(
                    "request {} is {}, the team can no longer change",
                    request_id, observed
                )));
            }
            match team_change {
                Some(team_id) => {
                    let zone = policy.zone.clone();
                    self.directory.validate_team(&team_id, &zone).await?;
                    let first_assignment = request.assignment.assigned_team_id.is_none();
                    request.assignment.assigned_team_id = Some(team_id.clone());
                    policy.team_id = Some(team_id);
                    if first_assignment {
                        if observed != RequestStatus::Assigned {
                            apply_transition(&mut request, RequestStatus::Assigned, now);
                        }
                    } else {
                        request.timestamps.reassigned_at = Some(now);
                    }
                    changes.push("team_id");
                }
                None => {
                    request.assignment.assigned_team_id = None;
                    policy.team_id = None;
                    if observed == RequestStatus::Assigned {
                        // Back to the triage queue; the assigned_at stamp
                        // stays as historical record.
                        request.status = RequestStatus::Triaged;
                    }
                    changes.push("team_id");
                }
            }
        }

        if let Some(name) = amendment.name {
            policy.name = name;
            changes.push("name");
        }
        if let Some(target) = amendment.target_hours {
            policy.target_hours = target;
            changes.push("target_hours");
        }
        if let Some(breach) = amendment.breach_threshold_hours {
            policy.breach_threshold_hours = breach;
            changes.push("breach_threshold_hours");
        }
        if let Some(steps) = amendment.escalation_steps {
            policy.escalation_steps = steps;
            changes.push("escalation_steps");
        }
        if let Some(active) = amendment.active {
            policy.active = active;
            changes.push("active");
        }
        if changes.is_empty() {
            return Err(EngineError::Validation(
                "amendment carries no changes".to_string(),
            ));
        }

        validate_thresholds(
            policy.target_hours,
            policy.breach_threshold_hours,
            &policy.escalation_steps,
        )?;
        policy.updated_at = now;
        request.sla_policy = Some(policy);
        request.touch(now);

        let saved = self.store.save_request(request_id, observed, request).await?;

        self.materialize(&saved, now, None).await;
        self.audit.publish(
            AuditEvent::new(
                "sla.update",
                actor.clone(),
                AuditEntity::request(request_id),
                "SLA policy amended",
            )
            .with_meta(serde_json::json!({ "changes": changes })),
        );
        Ok(saved)
    }

    /// Apply one validated lifecycle transition
    pub async fn transition(
        &self,
        actor: &Actor,
        request_id: &str,
        target: RequestStatus,
        now: DateTime<Utc>,
    ) -> EngineResult<ServiceRequest> {
        let mut request = self.load(request_id).await?;
        self.authorize(actor, &request, RequestAction::Transition)?;
        validate_transition(&request, target)?;
        let observed = request.status;
        apply_transition(&mut request, target, now);

        let saved = self.store.save_request(request_id, observed, request).await?;

        self.materialize(
            &saved,
            now,
            Some(StatusChange {
                from: observed,
                to: target,
                actor: actor.clone(),
            }),
        )
        .await;

        self.audit.publish(
            AuditEvent::new(
                "request.transition",
                actor.clone(),
                AuditEntity::request(request_id),
                format!("{} -> {}", observed, target),
            )
            .with_meta(serde_json::json!({
                "from": observed.to_string(),
                "to": target.to_string(),
            })),
        );
        Ok(saved)
    }

    /// Close the request, subject to the same transition rules
    pub async fn close(
        &self,
        actor: &Actor,
        request_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<ServiceRequest> {
        self.transition(actor, request_id, RequestStatus::Closed, now)
            .await
    }

    /// Citizen feedback on a resolved request; closes it
    ///
    /// Only the identified owner may submit, stars are 1 to 5, and the
    /// request must be exactly `resolved`. The feedback write happens after
    /// the close commits; a KPI recomputation failure after that is
    /// tolerated, the sweep will heal it.
    pub async fn submit_feedback(
        &self,
        actor: &Actor,
        request_id: &str,
        stars: u8,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> EngineResult<ServiceRequest> {
        if !(1..=5).contains(&stars) {
            return Err(EngineError::Validation(format!(
                "stars must be between 1 and 5, got {}",
                stars
            )));
        }
        let mut request = self.load(request_id).await?;
        if request.is_anonymous() {
            return Err(EngineError::Forbidden(format!(
                "request {} is anonymous, feedback is not available",
                request_id
            )));
        }
        self.authorize(actor, &request, RequestAction::Feedback)?;
        if request.status != RequestStatus::Resolved {
            return Err(EngineError::Forbidden(format!(
                "request {} is {}, feedback requires resolved",
                request_id, request.status
            )));
        }

        apply_transition(&mut request, RequestStatus::Closed, now);
        let saved = self
            .store
            .save_request(request_id, RequestStatus::Resolved, request)
            .await?;

        let mut stored = false;
        for _ in 0..MAX_LOG_ATTEMPTS {
            let log = self.store.load_performance_log(request_id).await?;
            let (revision, mut kpis) = match log {
                Some(log) => (log.revision, log.computed_kpis),
                None => (0, ComputedKpis::default()),
            };
            kpis.citizen_feedback = Some(CitizenFeedback {
                stars,
                comment: comment.clone(),
                submitted_at: now,
            });
            let written = self
                .store
                .upsert_performance_log(
                    request_id,
                    revision,
                    kpis,
                    vec![LogEvent::CitizenFeedback {
                        stars,
                        comment: comment.clone(),
                        by: actor.clone(),
                        at: now,
                    }],
                    now,
                )
                .await?;
            if written.is_some() {
                stored = true;
                break;
            }
        }
        if !stored {
            return Err(EngineError::Store(format!(
                "performance log for {} kept changing while recording feedback",
                request_id
            )));
        }

        self.materialize(
            &saved,
            now,
            Some(StatusChange {
                from: RequestStatus::Resolved,
                to: RequestStatus::Closed,
                actor: actor.clone(),
            }),
        )
        .await;

        self.audit.publish(
            AuditEvent::new(
                "request.feedback",
                actor.clone(),
                AuditEntity::request(request_id),
                "citizen feedback submitted, request closed",
            )
            .with_meta(serde_json::json!({ "stars": stars })),
        );
        Ok(saved)
    }

    /// Operator-triggered escalation, bumping the shared counter by one
    pub async fn manual_escalate(
        &self,
        actor: &Actor,
        request_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<u32> {
        let request = self.load(request_id).await?;
        self.authorize(actor, &request, RequestAction::Escalate)?;
        if request.status.is_terminal_for_sla() {
            return Err(EngineError::Forbidden(format!(
                "request {} is {}, escalation is no longer meaningful",
                request_id, request.status
            )));
        }

        let mut count = 0;
        let mut stored = false;
        for _ in 0..MAX_LOG_ATTEMPTS {
            let log = self.store.load_performance_log(request_id).await?;
            let (revision, mut kpis) = match log {
                Some(log) => (log.revision, log.computed_kpis),
                None => (0, ComputedKpis::default()),
            };
            kpis.escalation_count += 1;
            count = kpis.escalation_count;
            let written = self
                .store
                .upsert_performance_log(
                    request_id,
                    revision,
                    kpis,
                    vec![LogEvent::ManualEscalation {
                        escalation_count: count,
                        by: actor.clone(),
                        at: now,
                    }],
                    now,
                )
                .await?;
            if written.is_some() {
                stored = true;
                break;
            }
        }
        if !stored {
            return Err(EngineError::Store(format!(
                "performance log for {} kept changing while escalating",
                request_id
            )));
        }

        self.audit.publish(
            AuditEvent::new(
                "request.escalate",
                actor.clone(),
                AuditEntity::request(request_id),
                "manual escalation",
            )
            .with_meta(serde_json::json!({ "escalation_count": count })),
        );
        Ok(count)
    }

    /// Recompute the performance log for one request, used by the sweep
    pub async fn recompute(
        &self,
        request: &ServiceRequest,
        now: DateTime<Utc>,
    ) -> EngineResult<PerformanceLog> {
        self.materializer.recompute(request, now, None).await
    }
}
