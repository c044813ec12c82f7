//! In-process collection schedule.
//!
//! Deployments without an external cron trigger can enable `collector.schedule`; the collector
//! then runs on a fixed interval for as long as the server is up.

use super::collector::run_collection;
use crate::config::Config;
use sqlx::SqlitePool;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct CollectorScheduler {
    pool: SqlitePool,
    http: reqwest::Client,
    config: Config,
}

impl CollectorScheduler {
    pub fn new(pool: SqlitePool, http: reqwest::Client, config: Config) -> Self {
        Self { pool, http, config }
    }

    /// Collect on every tick until `shutdown` is cancelled. The first run happens immediately.
    pub async fn run(self, shutdown: CancellationToken) {
        let period = self.config.collector.schedule.interval;
        info!("Starting usage collector schedule (every {})", humantime::format_duration(period));

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Usage collector schedule shutting down");
                    break;
                }
                _ = interval.tick() => {
                    // A run in progress is abandoned on shutdown; its inserts are a single transaction.
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        result = run_collection(&self.pool, &self.http, &self.config) => {
                            if let Err(e) = result {
                                error!("Scheduled usage collection failed: {}", e);
                            }
                        }
                    }
                }
            }
        }
    }
}
