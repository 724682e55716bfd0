//! Service-request data model, state machine and id sequencing

pub mod sequence;
pub mod state_machine;
pub mod types;

pub use state_machine::{allowed_next, apply_transition, validate_transition};
pub use types::{
    AgentId, Assignment, CitizenId, CitizenRef, ContactChannel, EvidenceItem, EvidenceKind,
    Location, NewRequest, Priority, RequestId, RequestPatch, RequestStatus, ServiceRequest,
    TeamId, Timestamps, UploadedBy,
};
