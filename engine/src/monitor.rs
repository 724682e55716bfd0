//! Periodic SLA sweep
//!
//! A background loop that pages over open requests and recomputes each
//! performance log, firing any escalation steps crossed since the last pass.
//! One failing request never aborts the sweep; its error is logged and the
//! pass continues. Cancellation is checked between requests so shutdown is
//! prompt.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::engine::RequestEngine;
use crate::error::EngineResult;

/// Sweep tuning, overridable through the environment
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Pause between passes
    pub interval: Duration,
    /// Open requests processed per pass
    pub page_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let interval_secs = std::env::var("CST_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        let page_size = std::env::var("CST_SWEEP_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);
        Self {
            interval: Duration::from_secs(interval_secs),
            page_size,
        }
    }
}

/// Outcome of one sweep pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub processed: usize,
    pub failed: usize,
    /// True when the pass stopped early on cancellation
    pub cancelled: bool,
}

/// Background SLA monitor
pub struct SlaMonitor {
    engine: Arc<RequestEngine>,
    config: MonitorConfig,
}

impl SlaMonitor {
    pub fn new(engine: Arc<RequestEngine>, config: MonitorConfig) -> Self {
        Self { engine, config }
    }

    /// Run sweep passes until the token is cancelled
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            page_size = self.config.page_size,
            "sla monitor started"
        );
        loop {
            match self.sweep(&cancel).await {
                Ok(summary) => {
                    if summary.cancelled {
                        break;
                    }
                    tracing::debug!(
                        processed = summary.processed,
                        failed = summary.failed,
                        "sweep pass complete"
                    );
                }
                Err(error) => {
                    tracing::warn!(%error, "sweep pass failed, will retry next interval");
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = cancel.cancelled() => break,
            }
        }
        tracing::info!("sla monitor stopped");
    }

    /// One pass over the open requests
    pub async fn sweep(&self, cancel: &CancellationToken) -> EngineResult<SweepSummary> {
        let now = Utc::now();
        let open = self
            .engine
            .store()
            .find_open_requests(self.config.page_size)
            .await?;

        let mut summary = SweepSummary::default();
        for request in open {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            // Nothing to evaluate before triage attaches a policy, or while
            // the policy is deactivated.
            if !request.sla_policy.as_ref().is_some_and(|p| p.active) {
                continue;
            }
            match self.engine.recompute(&request, now).await {
                Ok(_) => summary.processed += 1,
                Err(error) => {
                    summary.failed += 1;
                    tracing::warn!(
                        request_id = %request.request_id,
                        %error,
                        "sweep recomputation failed for one request"
                    );
                }
            }
        }
        Ok(summary)
    }
}
