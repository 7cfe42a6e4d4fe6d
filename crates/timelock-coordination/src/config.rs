//! Configuration for a timelock node.
//!
//! Every section has working defaults. Values come from a TOML file, from
//! `TIMELOCK_*` environment variables layered over the defaults, or from
//! defaults alone; all paths end in [`TimelockConfig::validate`].

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use tracing::info;

use crate::allocator::AllocatorConfig;
use crate::bound_store::BoundConfig;
use crate::coordinator::CoordinatorConfig;
use crate::error::ConfigError;
use crate::error::ParseTomlSnafu;
use crate::error::ReadFileSnafu;
use crate::lease::LeaseConfig;
use crate::lock_elector::ElectorConfig;
use crate::scheduler::SchedulerConfig;

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelockConfig {
    #[serde(default)]
    pub bound: BoundConfig,
    #[serde(default)]
    pub allocator: AllocatorConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub lease: LeaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub elector: ElectorConfig,
}

impl TimelockConfig {
    /// Load and validate a TOML file. Missing sections and fields take defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path: display.clone() })?;
        let config: Self = toml::from_str(&contents).context(ParseTomlSnafu { path: display })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `TIMELOCK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Use the file at `path` if given and present, otherwise the environment.
    pub fn load_with_optional_file(path: Option<impl AsRef<Path>>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            if path.as_ref().exists() {
                info!(path = %path.as_ref().display(), "loading configuration from file");
                return Self::from_toml_file(path);
            }
        }
        info!("loading configuration from environment variables");
        Self::from_env()
    }

    /// Write the configuration as TOML.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            value: String::new(),
            reason: format!("failed to serialize: {e}"),
        })?;
        std::fs::write(path, contents).map_err(|e| ConfigError::InvalidValue {
            key: "config_file".to_string(),
            value: path.display().to_string(),
            reason: format!("failed to write: {e}"),
        })
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        override_string(&lookup, "TIMELOCK_NAMESPACE", &mut config.bound.namespace);
        override_parsed(&lookup, "TIMELOCK_INITIAL_BOUND", &mut config.bound.initial_bound)?;

        override_parsed(
            &lookup,
            "TIMELOCK_OVERALLOCATION_MULTIPLIER",
            &mut config.allocator.overallocation_multiplier,
        )?;
        override_parsed(&lookup, "TIMELOCK_MIN_BUFFER", &mut config.allocator.min_buffer)?;

        override_parsed(
            &lookup,
            "TIMELOCK_GAIN_LEADERSHIP_BACKOFF_MS",
            &mut config.coordinator.gain_leadership_backoff_ms,
        )?;

        override_parsed(&lookup, "TIMELOCK_LEASE_LOCK_TTL_MS", &mut config.lease.lock_ttl_ms)?;
        override_parsed(&lookup, "TIMELOCK_LEASE_SAFETY_MARGIN_MS", &mut config.lease.safety_margin_ms)?;
        override_parsed(&lookup, "TIMELOCK_LEASE_REFRESH_THRESHOLD_MS", &mut config.lease.refresh_threshold_ms)?;

        override_string(&lookup, "TIMELOCK_SCHEDULER_LOCK_NAME", &mut config.scheduler.lock_name);
        override_parsed(&lookup, "TIMELOCK_SCHEDULER_LOCK_TTL_MS", &mut config.scheduler.lock_ttl_ms)?;
        override_parsed(&lookup, "TIMELOCK_SCHEDULER_PAUSE_MS", &mut config.scheduler.pause_ms)?;
        override_parsed(&lookup, "TIMELOCK_SCHEDULER_BATCH_SIZE", &mut config.scheduler.candidate_batch_size)?;
        override_parsed(&lookup, "TIMELOCK_SCHEDULER_ENABLED", &mut config.scheduler.enabled)?;

        override_string(&lookup, "TIMELOCK_ELECTION_NAME", &mut config.elector.election_name);
        override_parsed(&lookup, "TIMELOCK_ELECTION_POLL_INTERVAL_MS", &mut config.elector.poll_interval_ms)?;
        override_parsed(&lookup, "TIMELOCK_ELECTION_LOCK_TTL_MS", &mut config.elector.lock_ttl_ms)?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values no component can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(!self.bound.namespace.is_empty(), "bound.namespace", &self.bound.namespace, "must not be empty")?;
        require(
            self.allocator.overallocation_multiplier > 0,
            "allocator.overallocation_multiplier",
            self.allocator.overallocation_multiplier,
            "must be positive",
        )?;
        require(
            self.coordinator.gain_leadership_backoff_ms > 0,
            "coordinator.gain_leadership_backoff_ms",
            self.coordinator.gain_leadership_backoff_ms,
            "must be positive",
        )?;
        require(
            self.lease.safety_margin_ms < self.lease.lock_ttl_ms,
            "lease.safety_margin_ms",
            self.lease.safety_margin_ms,
            &format!("must be less than lease.lock_ttl_ms ({})", self.lease.lock_ttl_ms),
        )?;
        require(
            !self.scheduler.lock_name.is_empty(),
            "scheduler.lock_name",
            &self.scheduler.lock_name,
            "must not be empty",
        )?;
        require(
            self.scheduler.lock_ttl_ms > 0,
            "scheduler.lock_ttl_ms",
            self.scheduler.lock_ttl_ms,
            "must be positive",
        )?;
        require(
            self.scheduler.candidate_batch_size > 0,
            "scheduler.candidate_batch_size",
            self.scheduler.candidate_batch_size,
            "must be positive",
        )?;
        require(
            !self.elector.election_name.is_empty(),
            "elector.election_name",
            &self.elector.election_name,
            "must not be empty",
        )?;
        require(
            self.elector.poll_interval_ms > 0,
            "elector.poll_interval_ms",
            self.elector.poll_interval_ms,
            "must be positive",
        )?;
        require(
            self.elector.lock_ttl_ms > 0,
            "elector.lock_ttl_ms",
            self.elector.lock_ttl_ms,
            "must be positive",
        )?;
        Ok(())
    }
}

fn require(ok: bool, key: &str, value: impl ToString, reason: &str) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        })
    }
}

fn override_string(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut String) {
    if let Some(value) = lookup(key) {
        *target = value;
    }
}

fn override_parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(());
    };
    *target = raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.clone(),
        reason: e.to_string(),
    })?;
    Ok(())
}
