//! Background service that keeps orders moving.
//!
//! Each pass:
//! - advances every order waiting on scene videos (poll, then stitch when ready)
//! - fails orders stuck in a busy status past the stale threshold
//! - restarts paid orders whose trigger was lost

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use santa_pipeline::Orchestrator;

use crate::config::ApiConfig;
use crate::metrics::record_sweep;
use crate::services::trigger::spawn_run;

/// Orders visited per status per pass.
const SWEEP_BATCH: u32 = 100;

/// A paid order gets this long to be claimed by its own trigger.
const UNCLAIMED_GRACE: Duration = Duration::from_secs(120);

/// Counts from one sweeper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub advanced: usize,
    pub failed_stale: usize,
    pub restarted: usize,
}

pub struct SceneSweeper {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    stale_after: Duration,
    enabled: bool,
}

impl SceneSweeper {
    pub fn new(orchestrator: Arc<Orchestrator>, config: &ApiConfig) -> Self {
        Self {
            orchestrator,
            interval: config.sweep_interval,
            stale_after: config.stale_order_after,
            enabled: config.sweeper_enabled,
        }
    }

    /// Run passes forever. Spawn this as a background task.
    pub async fn run(&self) {
        if !self.enabled {
            info!("Scene sweeper is disabled");
            return;
        }

        info!("Starting scene sweeper (interval: {:?})", self.interval);

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Err(e) = self.sweep_once().await {
                error!("Scene sweep error: {:#}", e);
            }
        }
    }

    /// Run a single pass.
    pub async fn sweep_once(&self) -> anyhow::Result<SweepReport> {
        let now = Utc::now();

        let advanced = self.orchestrator.advance_in_flight(SWEEP_BATCH).await?;

        let stale_cutoff = now - chrono::Duration::from_std(self.stale_after)?;
        let failed_stale = self
            .orchestrator
            .fail_stale(stale_cutoff, SWEEP_BATCH)
            .await?;

        let unclaimed_cutoff = now - chrono::Duration::from_std(UNCLAIMED_GRACE)?;
        let unclaimed = self
            .orchestrator
            .unclaimed_paid(unclaimed_cutoff, SWEEP_BATCH)
            .await?;
        let restarted = unclaimed.len();
        for id in unclaimed {
            spawn_run(Arc::clone(&self.orchestrator), id, "sweeper");
        }

        let report = SweepReport {
            advanced,
            failed_stale,
            restarted,
        };
        record_sweep(advanced, failed_stale, restarted);
        if failed_stale > 0 || restarted > 0 {
            info!(
                "Scene sweep complete: {} advanced, {} failed as stale, {} restarted",
                advanced, failed_stale, restarted
            );
        }

        Ok(report)
    }
}
