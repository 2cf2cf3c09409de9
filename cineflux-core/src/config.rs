//! Runtime configuration for the acquisition pipeline.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

/// Endpoint settings for one content directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DirectoryEndpoint {
    /// Primary API base URL.
    pub base_url: String,
    /// Fallback mirrors tried in order when the primary fails at the
    /// transport level.
    pub mirrors: Vec<String>,
    /// Default requests-per-second budget.
    pub rate_limit: f64,
    /// Budget used for user-facing (high priority) lookups.
    pub high_priority_rate_limit: f64,
}

impl Default for DirectoryEndpoint {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            mirrors: Vec::new(),
            rate_limit: 1.0,
            high_priority_rate_limit: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DirectoriesConfig {
    pub yts: DirectoryEndpoint,
    pub therarbg: DirectoryEndpoint,
    /// Anti-bot challenge solver endpoint. When unset, directories that need
    /// one fall back to direct requests.
    pub challenge_proxy: Option<Url>,
}

impl Default for DirectoriesConfig {
    fn default() -> Self {
        Self {
            yts: DirectoryEndpoint {
                base_url: "https://yts.mx/api/v2".into(),
                mirrors: vec![
                    "https://yts.lt/api/v2".into(),
                    "https://yts.am/api/v2".into(),
                ],
                // 20 requests per minute for background work.
                rate_limit: 20.0 / 60.0,
                high_priority_rate_limit: 2.0,
            },
            therarbg: DirectoryEndpoint {
                base_url: "https://therarbg.to".into(),
                mirrors: vec!["https://therarbg.com".into()],
                rate_limit: 2.0,
                high_priority_rate_limit: 4.0,
            },
            challenge_proxy: None,
        }
    }
}

/// Stats refresh scheduling knobs. Intervals adapt per source between
/// `min_interval` and `max_interval` based on swarm volatility.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    #[serde(with = "humantime_serde_secs")]
    pub min_interval: Duration,
    #[serde(with = "humantime_serde_secs")]
    pub max_interval: Duration,
    /// How often the scheduler polls for due sources.
    #[serde(with = "humantime_serde_secs")]
    pub poll_interval: Duration,
    /// Due sources processed per tick.
    pub batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(6 * 3600),
            max_interval: Duration::from_secs(72 * 3600),
            poll_interval: Duration::from_secs(60),
            batch_size: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
    /// How long an on-demand stream request waits for a fresh directory
    /// search before giving up and answering with what is already persisted.
    #[serde(with = "humantime_serde_secs")]
    pub on_demand_budget: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            on_demand_budget: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CinefluxConfig {
    pub directories: DirectoriesConfig,
    pub scheduler: SchedulerConfig,
    pub search: SearchConfig,
}

impl CinefluxConfig {
    /// Loads configuration from an optional TOML file merged with
    /// `CINEFLUX_`-prefixed environment overrides
    /// (e.g. `CINEFLUX_SCHEDULER__BATCH_SIZE=10`).
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("CINEFLUX").separator("__"),
        );
        let settings = builder.build().context("failed to assemble configuration")?;
        settings
            .try_deserialize()
            .context("invalid cineflux configuration")
    }
}

/// Durations serialized as whole seconds, matching the config file format.
mod humantime_serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(de)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = CinefluxConfig::default();
        assert_eq!(cfg.scheduler.batch_size, 5);
        assert_eq!(cfg.scheduler.min_interval, Duration::from_secs(6 * 3600));
        assert_eq!(cfg.scheduler.max_interval, Duration::from_secs(72 * 3600));
        assert_eq!(cfg.search.on_demand_budget, Duration::from_secs(3));
        assert!(cfg.directories.yts.rate_limit < 1.0);
        assert!(cfg.directories.therarbg.high_priority_rate_limit > cfg.directories.therarbg.rate_limit);
    }

    #[test]
    fn scheduler_config_round_trips_as_seconds() {
        let cfg = SchedulerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: SchedulerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.min_interval, cfg.min_interval);
        assert_eq!(back.poll_interval, cfg.poll_interval);
    }
}
