//! Performance log materialization

pub mod log;
pub mod materializer;

pub use log::{CitizenFeedback, ComputedKpis, LogEvent, PerformanceLog};
pub use materializer::{Materializer, StatusChange};
