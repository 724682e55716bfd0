//! Persistence collaborator
//!
//! The engine talks to storage through the narrow `RequestStore` trait; the
//! backing technology is out of scope. Every request mutation is a single
//! conditional write: the save is accepted only when the stored status still
//! equals the status the caller observed at read time, otherwise it fails
//! with a conflict. Performance-log upserts are conditional the same way,
//! on the log revision observed at read, which serializes all log writers
//! for a request through the store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{EngineError, EngineResult};
use crate::perf::log::{ComputedKpis, LogEvent, PerformanceLog};
use crate::request::sequence;
use crate::request::types::{RequestId, RequestStatus, ServiceRequest};
use chrono::{DateTime, Utc};

/// Shared reference to a request store
pub type SharedStore = Arc<dyn RequestStore>;

/// Narrow persistence interface consumed by the engine and the sweep
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Look up a request by its human-readable id
    async fn find_request(&self, request_id: &str) -> EngineResult<Option<ServiceRequest>>;

    /// Insert a new request; returns `false` when the id is already taken
    /// (uniqueness conflict, the caller resyncs the sequence and retries)
    async fn insert_request(&self, request: ServiceRequest) -> EngineResult<bool>;

    /// Conditional write: accepted only while the stored status equals
    /// `expected_status`, otherwise `ConflictError`
    async fn save_request(
        &self,
        request_id: &str,
        expected_status: RequestStatus,
        updated: ServiceRequest,
    ) -> EngineResult<ServiceRequest>;

    /// Conditional delete, only permitted from the expected status
    async fn delete_request(
        &self,
        request_id: &str,
        expected_status: RequestStatus,
    ) -> EngineResult<()>;

    /// Open requests (new/triaged/assigned/in_progress) for the sweep,
    /// bounded by `limit`
    async fn find_open_requests(&self, limit: usize) -> EngineResult<Vec<ServiceRequest>>;

    /// Load the performance log for a request, if one was materialized
    async fn load_performance_log(&self, request_id: &str)
        -> EngineResult<Option<PerformanceLog>>;

    /// Upsert the derived log: create it (with a `log_created` marker) when
    /// absent, overwrite `computed_kpis`, append `events` in order
    ///
    /// Conditioned on the revision the caller observed at read time (zero
    /// for an absent log). `Ok(None)` means another writer got in between;
    /// the caller must re-read and recompute its changes.
    async fn upsert_performance_log(
        &self,
        request_id: &str,
        expected_revision: u64,
        kpis: ComputedKpis,
        events: Vec<LogEvent>,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<PerformanceLog>>;

    /// Atomic increment-and-fetch of the per-year id counter
    async fn next_sequence(&self, year: i32) -> EngineResult<u64>;

    /// Self-healing resync: force the counter to `value` (the highest
    /// sequence already assigned for that year)
    async fn sync_sequence(&self, year: i32, value: u64) -> EngineResult<()>;

    /// Highest sequence number present among stored ids for the year
    async fn max_assigned_sequence(&self, prefix: &str, year: i32) -> EngineResult<u64>;
}

#[derive(Default)]
struct MemoryInner {
    requests: HashMap<RequestId, ServiceRequest>,
    logs: HashMap<RequestId, PerformanceLog>,
    counters: HashMap<i32, u64>,
}

/// In-memory store used by the engine tests and as the reference semantics
/// for real backends
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedStore {
        Arc::new(self)
    }

    fn lock(&self) -> EngineResult<std::sync::RwLockWriteGuard<'_, MemoryInner>> {
        self.inner
            .write()
            .map_err(|_| EngineError::Store("lock poisoned".to_string()))
    }

    /// Force the per-year counter, used to simulate a counter that fell
    /// behind the stored ids
    pub fn set_sequence(&self, year: i32, value: u64) {
        if let Ok(mut inner) = self.inner.write() {
            inner.counters.insert(year, value);
        }
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn find_request(&self, request_id: &str) -> EngineResult<Option<ServiceRequest>> {
        Ok(self.lock()?.requests.get(request_id).cloned())
    }

    async fn insert_request(&self, request: ServiceRequest) -> EngineResult<bool> {
        let mut inner = self.lock()?;
        if inner.requests.contains_key(&request.request_id) {
            return Ok(false);
        }
        inner.requests.insert(request.request_id.clone(), request);
        Ok(true)
    }

    async fn save_request(
        &self,
        request_id: &str,
        expected_status: RequestStatus,
        updated: ServiceRequest,
    ) -> EngineResult<ServiceRequest> {
        let mut inner = self.lock()?;
        let current = inner
            .requests
            .get(request_id)
            .ok_or_else(|| EngineError::NotFound(format!("request {}", request_id)))?;
        if current.status != expected_status {
            return Err(EngineError::Conflict {
                request_id: request_id.to_string(),
                expected: expected_status,
                actual: current.status,
            });
        }
        inner.requests.insert(request_id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn delete_request(
        &self,
        request_id: &str,
        expected_status: RequestStatus,
    ) -> EngineResult<()> {
        let mut inner = self.lock()?;
        let current = inner
            .requests
            .get(request_id)
            .ok_or_else(|| EngineError::NotFound(format!("request {}", request_id)))?;
        if current.status != expected_status {
            return Err(EngineError::Conflict {
                request_id: request_id.to_string(),
                expected: expected_status,
                actual: current.status,
            });
        }
        inner.requests.remove(request_id);
        Ok(())
    }

    async fn find_open_requests(&self, limit: usize) -> EngineResult<Vec<ServiceRequest>> {
        let inner = self.lock()?;
        let mut open: Vec<ServiceRequest> = inner
            .requests
            .values()
            .filter(|r| r.status.is_open())
            .cloned()
            .collect();
        // Deterministic sweep order.
        open.sort_by(|a, b| a.request_id.cmp(&b.request_id));
        open.truncate(limit);
        Ok(open)
    }

    async fn load_performance_log(
        &self,
        request_id: &str,
    ) -> EngineResult<Option<PerformanceLog>> {
        Ok(self.lock()?.logs.get(request_id).cloned())
    }

    async fn upsert_performance_log(
        &self,
        request_id: &str,
        expected_revision: u64,
        kpis: ComputedKpis,
        events: Vec<LogEvent>,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<PerformanceLog>> {
        let mut inner = self.lock()?;
        match inner.logs.get_mut(request_id) {
            Some(log) => {
                if log.revision != expected_revision {
                    return Ok(None);
                }
                log.computed_kpis = kpis;
                log.event_stream.extend(events);
                log.revision += 1;
                Ok(Some(log.clone()))
            }
            None => {
                if expected_revision != 0 {
                    return Ok(None);
                }
                let mut log = PerformanceLog::created(request_id.to_string(), now);
                log.computed_kpis = kpis;
                log.event_stream.extend(events);
                log.revision = 1;
                inner.logs.insert(request_id.to_string(), log.clone());
                Ok(Some(log))
            }
        }
    }

    async fn next_sequence(&self, year: i32) -> EngineResult<u64> {
        let mut inner = self.lock()?;
        let counter = inner.counters.entry(year).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn sync_sequence(&self, year: i32, value: u64) -> EngineResult<()> {
        self.lock()?.counters.insert(year, value);
        Ok(())
    }

    async fn max_assigned_sequence(&self, prefix: &str, year: i32) -> EngineResult<u64> {
        let inner = self.lock()?;
        Ok(inner
            .requests
            .keys()
            .filter_map(|id| sequence::parse_sequence(prefix, year, id))
            .max()
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::types::{
        CitizenRef, ContactChannel, Location, NewRequest, Priority,
    };

    fn request(id: &str) -> ServiceRequest {
        ServiceRequest::submitted(
            id.to_string(),
            NewRequest {
                citizen_ref: CitizenRef::citizen("cit-1", ContactChannel::Email),
                category: "roads".to_string(),
                sub_category: None,
                description: "test".to_string(),
                tags: vec![],
                location: Location {
                    coordinates: [0.0, 0.0],
                    address_hint: None,
                    zone_name: None,
                },
            },
            Priority::P3,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = MemoryStore::new();
        assert!(store.insert_request(request("CST-2026-0001")).await.unwrap());
        let found = store.find_request("CST-2026-0001").await.unwrap().unwrap();
        assert_eq!(found.status, RequestStatus::New);
    }

    #[tokio::test]
    async fn test_duplicate_insert_reports_conflict() {
        let store = MemoryStore::new();
        assert!(store.insert_request(request("CST-2026-0001")).await.unwrap());
        assert!(!store.insert_request(request("CST-2026-0001")).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_conditioned_on_observed_status() {
        let store = MemoryStore::new();
        store.insert_request(request("CST-2026-0001")).await.unwrap();

        let mut updated = request("CST-2026-0001");
        updated.status = RequestStatus::Triaged;
        store
            .save_request("CST-2026-0001", RequestStatus::New, updated.clone())
            .await
            .unwrap();

        // A second writer still holding the `new` snapshot loses the race.
        let err = store
            .save_request("CST-2026-0001", RequestStatus::New, updated)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_open_requests_excludes_terminal() {
        let store = MemoryStore::new();
        store.insert_request(request("CST-2026-0001")).await.unwrap();
        let mut closed = request("CST-2026-0002");
        closed.status = RequestStatus::Closed;
        store.insert_request(closed).await.unwrap();

        let open = store.find_open_requests(100).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].request_id, "CST-2026-0001");
    }

    #[tokio::test]
    async fn test_upsert_creates_log_once() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let log = store
            .upsert_performance_log("CST-2026-0001", 0, ComputedKpis::default(), vec![], now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(log.count_events("log_created"), 1);
        assert_eq!(log.revision, 1);

        let log = store
            .upsert_performance_log("CST-2026-0001", log.revision, ComputedKpis::default(), vec![], now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(log.count_events("log_created"), 1, "no duplicate marker");
        assert_eq!(log.revision, 2);
    }

    #[tokio::test]
    async fn test_upsert_rejects_stale_revision() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .upsert_performance_log("CST-2026-0001", 0, ComputedKpis::default(), vec![], now)
            .await
            .unwrap()
            .unwrap();

        // A writer still holding the pre-creation snapshot loses the race
        // and must re-read.
        let stale = store
            .upsert_performance_log("CST-2026-0001", 0, ComputedKpis::default(), vec![], now)
            .await
            .unwrap();
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn test_sequence_increments_and_resyncs() {
        let store = MemoryStore::new();
        assert_eq!(store.next_sequence(2026).await.unwrap(), 1);
        assert_eq!(store.next_sequence(2026).await.unwrap(), 2);

        store.insert_request(request("CST-2026-0009")).await.unwrap();
        let max = store.max_assigned_sequence("CST", 2026).await.unwrap();
        assert_eq!(max, 9);

        store.sync_sequence(2026, max).await.unwrap();
        assert_eq!(store.next_sequence(2026).await.unwrap(), 10);
    }
}
