//! Reference-data collaborator
//!
//! Teams, default priorities and zone/priority hour tables live outside the
//! engine. The `Directory` trait is the seam; `TableDirectory` is the
//! in-memory implementation used by tests and small deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::request::types::{Priority, TeamId};

/// A team that can own assigned requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: TeamId,
    pub name: String,
    /// Zones the team serves; empty means all zones
    pub zones: Vec<String>,
}

impl TeamRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, zones: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            zones,
        }
    }

    pub fn serves(&self, zone: &str) -> bool {
        self.zones.is_empty() || self.zones.iter().any(|z| z == zone)
    }
}

/// Reference-data lookups the engine depends on
#[async_trait]
pub trait Directory: Send + Sync {
    /// Resolve a team and check it serves the request's zone
    async fn validate_team(&self, team_id: &str, zone: &str) -> EngineResult<TeamRef>;

    /// Default priority for a sub-category
    async fn default_priority(&self, sub_category: &str) -> EngineResult<Priority>;

    /// Resolution target for a zone/priority pair, in hours
    async fn target_hours(&self, zone: &str, priority: Priority) -> EngineResult<f64>;
}

/// Shared reference to a directory
pub type SharedDirectory = Arc<dyn Directory>;

/// In-memory lookup tables
#[derive(Default)]
pub struct TableDirectory {
    teams: HashMap<TeamId, TeamRef>,
    priorities: HashMap<String, Priority>,
    zone_hours: HashMap<String, f64>,
    priority_hours: HashMap<Priority, f64>,
}

impl TableDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_team(mut self, team: TeamRef) -> Self {
        self.teams.insert(team.id.clone(), team);
        self
    }

    pub fn with_priority(mut self, sub_category: impl Into<String>, priority: Priority) -> Self {
        self.priorities.insert(sub_category.into(), priority);
        self
    }

    pub fn with_zone_hours(mut self, zone: impl Into<String>, hours: f64) -> Self {
        self.zone_hours.insert(zone.into(), hours);
        self
    }

    pub fn with_priority_hours(mut self, priority: Priority, hours: f64) -> Self {
        self.priority_hours.insert(priority, hours);
        self
    }

    pub fn shared(self) -> SharedDirectory {
        Arc::new(self)
    }
}

#[async_trait]
impl Directory for TableDirectory {
    async fn validate_team(&self, team_id: &str, zone: &str) -> EngineResult<TeamRef> {
        let team = self
            .teams
            .get(team_id)
            .ok_or_else(|| EngineError::NotFound(format!("team {}", team_id)))?;
        if !team.serves(zone) {
            return Err(EngineError::Validation(format!(
                "team {} does not serve zone {}",
                team_id, zone
            )));
        }
        Ok(team.clone())
    }

    async fn default_priority(&self, sub_category: &str) -> EngineResult<Priority> {
        self.priorities
            .get(sub_category)
            .copied()
            .ok_or_else(|| EngineError::NotFound(format!("sub-category {}", sub_category)))
    }

    async fn target_hours(&self, zone: &str, priority: Priority) -> EngineResult<f64> {
        let zone_hours = self
            .zone_hours
            .get(zone)
            .ok_or_else(|| EngineError::NotFound(format!("zone {}", zone)))?;
        let priority_hours = self
            .priority_hours
            .get(&priority)
            .ok_or_else(|| EngineError::NotFound(format!("priority {}", priority)))?;
        Ok(zone_hours + priority_hours)
    }
}
