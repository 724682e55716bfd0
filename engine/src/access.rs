//! Identity collaborator
//!
//! The engine never touches authentication mechanics; it only asks whether a
//! resolved actor is authorized for one mutation on one request. The default
//! policy mirrors the owner-or-staff rule: staff and system actors may drive
//! the lifecycle, a citizen may only touch their own non-anonymous request.

use serde::{Deserialize, Serialize};

use crate::request::types::ServiceRequest;

/// Who is acting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Citizen,
    Staff,
    System,
}

/// Resolved caller identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub actor_type: ActorType,
    pub actor_id: String,
}

impl Actor {
    pub fn citizen(id: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::Citizen,
            actor_id: id.into(),
        }
    }

    pub fn staff(id: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::Staff,
            actor_id: id.into(),
        }
    }

    pub fn system() -> Self {
        Self {
            actor_type: ActorType::System,
            actor_id: "cst".to_string(),
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.actor_type {
            ActorType::Citizen => "citizen",
            ActorType::Staff => "staff",
            ActorType::System => "system",
        };
        write!(f, "{}:{}", kind, self.actor_id)
    }
}

/// Mutations the engine asks authorization for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestAction {
    /// Edit safe fields while the request is still new
    Edit,
    /// Delete a new request
    Delete,
    /// Drive a lifecycle transition
    Transition,
    /// Attach or amend the SLA policy
    ManageSla,
    /// Submit citizen feedback on a resolved request
    Feedback,
    /// Manual escalation
    Escalate,
}

/// Authorization seam between the engine and the surrounding auth layer
pub trait AccessPolicy: Send + Sync {
    /// Whether `actor` may perform `action` on `request`
    fn is_authorized(&self, actor: &Actor, request: &ServiceRequest, action: RequestAction)
        -> bool;
}

/// Default policy: staff/system run the lifecycle, citizens own their data
pub struct OwnerOrStaff;

impl OwnerOrStaff {
    fn is_owner(actor: &Actor, request: &ServiceRequest) -> bool {
        // Anonymous requests have no owner at all.
        !request.citizen_ref.anonymous
            && request.citizen_ref.citizen_id.as_deref() == Some(actor.actor_id.as_str())
    }
}

impl AccessPolicy for OwnerOrStaff {
    fn is_authorized(
        &self,
        actor: &Actor,
        request: &ServiceRequest,
        action: RequestAction,
    ) -> bool {
        match actor.actor_type {
            ActorType::System => true,
            ActorType::Staff => !matches!(action, RequestAction::Feedback),
            ActorType::Citizen => match action {
                RequestAction::Edit | RequestAction::Delete | RequestAction::Feedback => {
                    Self::is_owner(actor, request)
                }
                RequestAction::Transition
                | RequestAction::ManageSla
                | RequestAction::Escalate => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::types::{
        CitizenRef, ContactChannel, Location, NewRequest, Priority,
    };
    use chrono::Utc;

    fn request(citizen_ref: CitizenRef) -> ServiceRequest {
        ServiceRequest::submitted(
            "CST-2026-0002".to_string(),
            NewRequest {
                citizen_ref,
                category: "waste".to_string(),
                sub_category: None,
                description: "Overflowing bin".to_string(),
                tags: vec![],
                location: Location {
                    coordinates: [0.0, 0.0],
                    address_hint: None,
                    zone_name: None,
                },
            },
            Priority::P4,
            Utc::now(),
        )
    }

    #[test]
    fn test_owner_may_edit_delete_and_feedback() {
        let req = request(CitizenRef::citizen("cit-1", ContactChannel::Email));
        let policy = OwnerOrStaff;
        let owner = Actor::citizen("cit-1");
        for action in [
            RequestAction::Edit,
            RequestAction::Delete,
            RequestAction::Feedback,
        ] {
            assert!(policy.is_authorized(&owner, &req, action));
        }
        assert!(!policy.is_authorized(&owner, &req, RequestAction::Transition));
    }

    #[test]
    fn test_non_owner_citizen_is_rejected() {
        let req = request(CitizenRef::citizen("cit-1", ContactChannel::Email));
        let stranger = Actor::citizen("cit-2");
        assert!(!OwnerOrStaff.is_authorized(&stranger, &req, RequestAction::Edit));
    }

    #[test]
    fn test_anonymous_request_has_no_owner() {
        let req = request(CitizenRef::anonymous());
        let someone = Actor::citizen("cit-1");
        assert!(!OwnerOrStaff.is_authorized(&someone, &req, RequestAction::Feedback));
    }

    #[test]
    fn test_staff_runs_lifecycle_but_not_feedback() {
        let req = request(CitizenRef::citizen("cit-1", ContactChannel::Email));
        let staff = Actor::staff("op-7");
        assert!(OwnerOrStaff.is_authorized(&staff, &req, RequestAction::Transition));
        assert!(OwnerOrStaff.is_authorized(&staff, &req, RequestAction::ManageSla));
        assert!(!OwnerOrStaff.is_authorized(&staff, &req, RequestAction::Feedback));
    }
}
