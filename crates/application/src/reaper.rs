//! Commitment reaper
//!
//! Optional background loop that errors out running contracts whose
//! commitments stopped heartbeating. Contracts never expire on their own;
//! this stays disabled unless configured on, and retry remains the way to
//! re-run a reaped job.

use charter_domain::shared_kernel::{JobId, Result};
use charter_domain::store::DispatchStore;
use chrono::{Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Disabled by default.
    pub enabled: bool,
    /// How long a commitment may go without a heartbeat.
    pub silence_threshold: Duration,
    /// Interval between checks.
    pub check_interval: StdDuration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            silence_threshold: Duration::minutes(5),
            check_interval: StdDuration::from_secs(30),
        }
    }
}

/// Background task over [`DispatchStore::expire_silent_commitments`].
pub struct CommitmentReaper {
    store: Arc<dyn DispatchStore>,
    config: ReaperConfig,
}

impl CommitmentReaper {
    pub fn new(store: Arc<dyn DispatchStore>, config: ReaperConfig) -> Self {
        Self { store, config }
    }

    /// Run one check, marking silent commitments' contracts as `error`.
    pub async fn check_once(&self) -> Result<Vec<JobId>> {
        let now = Utc::now();
        let cutoff = now - self.config.silence_threshold;
        let expired = self.store.expire_silent_commitments(cutoff, now).await?;
        if !expired.is_empty() {
            info!(count = expired.len(), "expired silent commitments");
        }
        Ok(expired)
    }

    /// Spawn the loop. Returns `None` when the reaper is disabled.
    pub fn spawn(self) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            return None;
        }
        Some(tokio::spawn(async move {
            let mut ticker = interval(self.config.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.check_once().await {
                    error!(error = %e, "commitment reaper check failed");
                }
            }
        }))
    }
}
