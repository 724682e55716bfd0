//! Core service-request types
//!
//! A `ServiceRequest` is the single source of truth for a citizen complaint:
//! its status drives the lifecycle, its timestamps are historical record only.
//! Derived views (KPIs, SLA state) live in the performance log and are always
//! recomputable from the request alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sla::SlaPolicy;

/// Human-readable request identifier, e.g. `CST-2026-0042`
pub type RequestId = String;

/// Identifier of a service team
pub type TeamId = String;

/// Identifier of a field agent
pub type AgentId = String;

/// Identifier of a registered citizen
pub type CitizenId = String;

/// Lifecycle status of a service request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Submitted by a citizen, not yet triaged
    New,
    /// SLA policy attached, waiting for a team
    Triaged,
    /// A team owns the request
    Assigned,
    /// Work has started in the field
    InProgress,
    /// Work finished, waiting for citizen feedback or operator close
    Resolved,
    /// Terminal state, no further transitions
    Closed,
}

impl RequestStatus {
    /// Whether the request still counts as open for the SLA sweep
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            Self::New | Self::Triaged | Self::Assigned | Self::InProgress
        )
    }

    /// Whether this status stops the SLA clock
    pub fn is_terminal_for_sla(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }

    /// Terminal state check: `closed` accepts no transitions at all
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Triaged => "triaged",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// Request priority, P1 highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    P1,
    P2,
    P3,
    P4,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P1 => write!(f, "P1"),
            Self::P2 => write!(f, "P2"),
            Self::P3 => write!(f, "P3"),
            Self::P4 => write!(f, "P4"),
        }
    }
}

/// How the citizen wants to be contacted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactChannel {
    Email,
    Sms,
    None,
}

/// Reference to the submitting citizen (or the anonymous marker)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitizenRef {
    /// Registered citizen id; required unless `anonymous`
    pub citizen_id: Option<CitizenId>,
    /// Anonymous requests have no feedback step and may be closed directly
    pub anonymous: bool,
    pub contact_channel: ContactChannel,
}

impl CitizenRef {
    /// An identified citizen
    pub fn citizen(id: impl Into<CitizenId>, contact_channel: ContactChannel) -> Self {
        Self {
            citizen_id: Some(id.into()),
            anonymous: false,
            contact_channel,
        }
    }

    /// An anonymous submission
    pub fn anonymous() -> Self {
        Self {
            citizen_id: None,
            anonymous: true,
            contact_channel: ContactChannel::None,
        }
    }
}

/// Lifecycle timestamps
///
/// `created_at` is always present; each lifecycle stamp is set at most once
/// and the sequence is monotonically non-decreasing. `reassigned_at` is the
/// one exception: it is re-stamped on every subsequent team change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timestamps {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub triaged_at: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub reassigned_at: Option<DateTime<Utc>>,
    pub in_progress_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Timestamps {
    /// Fresh timestamp block at submission time
    pub fn at_creation(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            triaged_at: None,
            assigned_at: None,
            reassigned_at: None,
            in_progress_at: None,
            resolved_at: None,
            closed_at: None,
        }
    }

    /// The lifecycle stage implied by the highest stamp set
    ///
    /// Used to check the invariant that `status` never disagrees with the
    /// timestamp history.
    pub fn implied_status(&self) -> RequestStatus {
        if self.closed_at.is_some() {
            RequestStatus::Closed
        } else if self.resolved_at.is_some() {
            RequestStatus::Resolved
        } else if self.in_progress_at.is_some() {
            RequestStatus::InProgress
        } else if self.assigned_at.is_some() {
            RequestStatus::Assigned
        } else if self.triaged_at.is_some() {
            RequestStatus::Triaged
        } else {
            RequestStatus::New
        }
    }
}

/// Submission location (GeoJSON-style point)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    /// `[lng, lat]`
    pub coordinates: [f64; 2],
    pub address_hint: Option<String>,
    /// Zone label, absent on historical documents; see
    /// [`ServiceRequest::resolved_zone`]
    pub zone_name: Option<String>,
}

/// Team/agent assignment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Assignment {
    pub assigned_team_id: Option<TeamId>,
    pub assigned_agent_id: Option<AgentId>,
}

/// Kind of attached evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Photo,
    Video,
    File,
}

/// Who uploaded an evidence item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadedBy {
    Citizen,
    Agent,
    Staff,
}

/// Evidence attached to a request; file storage itself is out of scope,
/// only the reference is tracked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub kind: EvidenceKind,
    pub url: String,
    pub uploaded_by: UploadedBy,
    pub uploaded_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// Input payload for a new citizen submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRequest {
    pub citizen_ref: CitizenRef,
    pub category: String,
    pub sub_category: Option<String>,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub location: Location,
}

/// Fields a citizen may edit while the request is still `new`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestPatch {
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub address_hint: Option<String>,
    pub zone_name: Option<String>,
    pub coordinates: Option<[f64; 2]>,
}

impl RequestPatch {
    /// Names of the fields this patch touches, for the change audit trail
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.category.is_some() {
            fields.push("category");
        }
        if self.sub_category.is_some() {
            fields.push("sub_category");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        if self.tags.is_some() {
            fields.push("tags");
        }
        if self.address_hint.is_some() {
            fields.push("address_hint");
        }
        if self.zone_name.is_some() {
            fields.push("zone_name");
        }
        if self.coordinates.is_some() {
            fields.push("coordinates");
        }
        fields
    }

    /// True when the patch carries no changes at all
    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }
}

/// A citizen-submitted service request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// Sequential-per-year human-readable id
    pub request_id: RequestId,

    pub citizen_ref: CitizenRef,
    pub category: String,
    pub sub_category: Option<String>,
    pub description: String,
    pub tags: Vec<String>,

    pub status: RequestStatus,
    pub priority: Priority,

    pub location: Location,
    /// Legacy top-level zone field from older document shapes
    pub zone: Option<String>,

    pub assignment: Assignment,

    /// Owned SLA policy, attached at triage
    pub sla_policy: Option<SlaPolicy>,

    pub timestamps: Timestamps,
    pub evidence: Vec<EvidenceItem>,
}

impl ServiceRequest {
    /// Build a fresh request in `new` status from a submission payload
    pub fn submitted(
        request_id: RequestId,
        input: NewRequest,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            citizen_ref: input.citizen_ref,
            category: input.category,
            sub_category: input.sub_category,
            description: input.description,
            tags: input.tags,
            status: RequestStatus::New,
            priority,
            location: input.location,
            zone: None,
            assignment: Assignment::default(),
            sla_policy: None,
            timestamps: Timestamps::at_creation(now),
            evidence: Vec::new(),
        }
    }

    /// Whether the request has no identifiable citizen
    pub fn is_anonymous(&self) -> bool {
        self.citizen_ref.anonymous
    }

    /// Resolve the zone across historical document shapes
    ///
    /// Fallback order: `location.zone_name`, then the legacy top-level
    /// `zone`, then the attached policy's zone. This is the only place the
    /// fallback chain lives.
    pub fn resolved_zone(&self) -> Option<&str> {
        self.location
            .zone_name
            .as_deref()
            .or(self.zone.as_deref())
            .or_else(|| self.sla_policy.as_ref().map(|p| p.zone.as_str()))
    }

    /// SLA reference start: triage time, falling back to creation time for
    /// requests that were never triaged
    pub fn sla_start(&self) -> DateTime<Utc> {
        self.timestamps
            .triaged_at
            .unwrap_or(self.timestamps.created_at)
    }

    /// SLA end: the first terminal stamp, if the request reached one
    pub fn sla_end(&self) -> Option<DateTime<Utc>> {
        self.timestamps.resolved_at.or(self.timestamps.closed_at)
    }

    /// Update the bookkeeping timestamp
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.timestamps.updated_at = now;
    }

    /// Check the status/timestamp coherence invariant
    ///
    /// One sanctioned divergence: clearing the team sends an `assigned`
    /// request back to `triaged` while `assigned_at` stays as historical
    /// record, so that teamless pair also counts as coherent.
    pub fn is_coherent(&self) -> bool {
        let implied = self.timestamps.implied_status();
        self.status == implied
            || (self.status == RequestStatus::Triaged
                && implied == RequestStatus::Assigned
                && self.assignment.assigned_team_id.is_none())
    }

    /// Apply a `new`-only edit patch
    pub fn apply_patch(&mut self, patch: RequestPatch, now: DateTime<Utc>) {
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(sub_category) = patch.sub_category {
            self.sub_category = Some(sub_category);
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(address_hint) = patch.address_hint {
            self.location.address_hint = Some(address_hint);
        }
        if let Some(zone_name) = patch.zone_name {
            self.location.zone_name = Some(zone_name);
        }
        if let Some(coordinates) = patch.coordinates {
            self.location.coordinates = coordinates;
        }
        self.touch(now);
    }
}
