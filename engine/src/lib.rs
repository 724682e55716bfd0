//! Citizen service request lifecycle and SLA engine
//!
//! Core of a municipal service-request tracker: a forward-only request
//! state machine, per-request SLA policies with escalation steps, a
//! deterministic SLA clock, a performance-log materializer and a periodic
//! sweep that keeps derived KPIs fresh. Persistence, reference data and
//! authorization are collaborator traits; in-memory implementations are
//! provided for tests and small deployments.

pub mod access;
pub mod audit;
pub mod directory;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod perf;
pub mod request;
pub mod sla;
pub mod store;

pub use access::{AccessPolicy, Actor, ActorType, OwnerOrStaff, RequestAction};
pub use audit::{AuditBus, AuditEntity, AuditEvent};
pub use directory::{Directory, TableDirectory, TeamRef};
pub use engine::{EngineConfig, RequestEngine};
pub use error::{EngineError, EngineResult};
pub use monitor::{MonitorConfig, SlaMonitor, SweepSummary};
pub use perf::{CitizenFeedback, ComputedKpis, LogEvent, Materializer, PerformanceLog, StatusChange};
pub use request::types::{
    CitizenRef, ContactChannel, Location, NewRequest, Priority, RequestPatch, RequestStatus,
    ServiceRequest,
};
pub use sla::{
    EscalationStep, SlaAmendment, SlaAttachment, SlaPolicy, SlaSnapshot, SlaState,
};
pub use store::{MemoryStore, RequestStore};
