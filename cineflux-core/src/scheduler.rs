//! Adaptive swarm stats refresh.
//!
//! Popularity counters decay in usefulness over hours, not seconds, and
//! probing every source constantly would hammer the download engine. Each
//! source carries its own check interval: stable swarms back off towards
//! [`SchedulerConfig::max_interval`], volatile ones snap back towards
//! `min_interval`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use cineflux_model::PersistedSource;

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::ports::{SourceRepository, SwarmStatsProvider};

/// Percentage change between two counter readings.
///
/// A counter appearing out of nowhere reads as 100% volatile; one that stays
/// at zero reads as perfectly stable.
pub fn stats_volatility(previous: u32, current: u32) -> f64 {
    if previous == 0 {
        return if current > 0 { 100.0 } else { 0.0 };
    }
    let delta = f64::from(current) - f64::from(previous);
    (delta / f64::from(previous)).abs() * 100.0
}

/// Next check interval given the previous one and the observed volatility.
///
/// First check baselines at `min_interval`. A ±20% jitter keeps sources from
/// synchronizing their checks.
pub fn backoff_interval<R: Rng + ?Sized>(
    previous: Option<Duration>,
    volatility_percent: f64,
    config: &SchedulerConfig,
    rng: &mut R,
) -> Duration {
    let min = config.min_interval;
    let max = config.max_interval;
    let current = previous.unwrap_or(min);

    let next = if volatility_percent < 5.0 {
        (current * 2).min(max)
    } else if volatility_percent < 10.0 {
        current
    } else if volatility_percent > 50.0 {
        min
    } else if volatility_percent > 20.0 {
        (current / 2).max(min)
    } else {
        current.mul_f64(0.75).max(min)
    };

    let jitter = rng.random_range(0.8..1.2);
    next.mul_f64(jitter).clamp(min, max)
}

/// Periodically refreshes popularity counters for due sources.
pub struct StatsRefreshScheduler {
    repository: Arc<dyn SourceRepository>,
    stats: Arc<dyn SwarmStatsProvider>,
    config: SchedulerConfig,
}

impl std::fmt::Debug for StatsRefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsRefreshScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StatsRefreshScheduler {
    pub fn new(
        repository: Arc<dyn SourceRepository>,
        stats: Arc<dyn SwarmStatsProvider>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            repository,
            stats,
            config,
        }
    }

    /// Processes one batch of due sources and returns how many were
    /// refreshed. A failing source is logged and left on its current
    /// schedule; it never takes the rest of the batch down with it.
    pub async fn run_once(&self) -> Result<usize> {
        let due = self
            .repository
            .find_sources_needing_stats_check(self.config.batch_size)
            .await?;
        if due.is_empty() {
            return Ok(0);
        }
        debug!(count = due.len(), "refreshing swarm stats");

        let mut refreshed = 0;
        for source in &due {
            match self.refresh_source(source).await {
                Ok(()) => refreshed += 1,
                Err(err) => {
                    warn!(source = %source.id, hash = %source.hash, error = %err, "stats refresh failed");
                }
            }
        }
        Ok(refreshed)
    }

    async fn refresh_source(&self, source: &PersistedSource) -> Result<()> {
        let swarm = self.stats.fetch_stats(&source.hash).await?;

        let volatility = stats_volatility(source.broadcasters, swarm.broadcasters)
            .max(stats_volatility(source.watchers, swarm.watchers));
        let previous = source
            .last_stats_check_interval_ms
            .map(Duration::from_millis);
        let interval = backoff_interval(previous, volatility, &self.config, &mut rand::rng());

        self.repository
            .update_popularity(source.id, swarm.broadcasters, swarm.watchers)
            .await?;
        self.repository
            .update_stats_check_schedule(
                source.id,
                Utc::now() + chrono::Duration::from_std(interval).unwrap_or_default(),
                interval.as_millis() as u64,
            )
            .await?;

        debug!(
            source = %source.id,
            volatility = format_args!("{volatility:.1}%"),
            next_check_in_secs = interval.as_secs(),
            "stats refreshed"
        );
        Ok(())
    }

    /// Runs batches on the poll interval until `shutdown` flips to true.
    /// Batch-level failures are logged and retried on the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            "stats refresh scheduler started"
        );
        loop {
            if let Err(err) = self.run_once().await {
                warn!(error = %err, "stats refresh batch failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("stats refresh scheduler stopping");
                        return;
                    }
                }
            }
        }
    }
}
