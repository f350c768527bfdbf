//! Engine configuration.
//!
//! Defaults can be overridden through environment variables:
//! - `STEWARD_VAULT` - vault root directory. Defaults to `./vault`.
//! - `STEWARD_PASS_INTERVAL_SECS` - seconds between passes. Defaults to `30`.
//! - `STEWARD_STALENESS_DAYS` - age at which a `needs_action` record is a
//!   bottleneck. Defaults to `3`.
//! - `STEWARD_STALL_THRESHOLD` - consecutive execution failures that mark a
//!   record stalled. Defaults to `3`.
//! - `STEWARD_COLLABORATOR_TIMEOUT_SECS` - bound on classification and
//!   execution calls. Defaults to `30`.
//! - `STEWARD_THROUGHPUT_WINDOW_HOURS` - window for the completed count.
//!   Defaults to `24`.

use crate::task::services::{MetricsPolicy, ReconcilePolicy};
use camino::Utf8PathBuf;
use chrono::TimeDelta;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the vault root.
pub const VAULT_VAR: &str = "STEWARD_VAULT";
const PASS_INTERVAL_VAR: &str = "STEWARD_PASS_INTERVAL_SECS";
const STALENESS_VAR: &str = "STEWARD_STALENESS_DAYS";
const STALL_THRESHOLD_VAR: &str = "STEWARD_STALL_THRESHOLD";
const COLLABORATOR_TIMEOUT_VAR: &str = "STEWARD_COLLABORATOR_TIMEOUT_SECS";
const THROUGHPUT_WINDOW_VAR: &str = "STEWARD_THROUGHPUT_WINDOW_HOURS";

const DEFAULT_VAULT: &str = "vault";

/// Errors returned while loading configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be used.
    #[error("invalid value for {name}: {reason}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Runtime settings for the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Vault root directory.
    pub vault: Utf8PathBuf,
    /// Interval between reconciliation passes.
    pub pass_interval: Duration,
    /// Age past which a `needs_action` record is a bottleneck.
    pub staleness: TimeDelta,
    /// Consecutive execution failures that mark a record stalled.
    pub stall_threshold: u32,
    /// Bound on each classification and execution call.
    pub collaborator_timeout: Duration,
    /// Window counted as recent throughput.
    pub throughput_window: TimeDelta,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vault: Utf8PathBuf::from(DEFAULT_VAULT),
            pass_interval: Duration::from_secs(30),
            staleness: TimeDelta::days(3),
            stall_threshold: 3,
            collaborator_timeout: Duration::from_secs(30),
            throughput_window: TimeDelta::hours(24),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable is set to an
    /// unparsable or zero value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable is set to an
    /// unparsable or zero value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let vault = lookup(VAULT_VAR)
            .filter(|value| !value.trim().is_empty())
            .map_or(defaults.vault, Utf8PathBuf::from);

        let pass_interval = positive::<u64>(&lookup, PASS_INTERVAL_VAR)?
            .map_or(defaults.pass_interval, Duration::from_secs);
        let staleness = positive::<i64>(&lookup, STALENESS_VAR)?
            .map_or(Ok(defaults.staleness), |days| {
                TimeDelta::try_days(days).ok_or_else(|| out_of_range(STALENESS_VAR))
            })?;
        let stall_threshold =
            positive::<u32>(&lookup, STALL_THRESHOLD_VAR)?.unwrap_or(defaults.stall_threshold);
        let collaborator_timeout = positive::<u64>(&lookup, COLLABORATOR_TIMEOUT_VAR)?
            .map_or(defaults.collaborator_timeout, Duration::from_secs);
        let throughput_window = positive::<i64>(&lookup, THROUGHPUT_WINDOW_VAR)?
            .map_or(Ok(defaults.throughput_window), |hours| {
                TimeDelta::try_hours(hours).ok_or_else(|| out_of_range(THROUGHPUT_WINDOW_VAR))
            })?;

        Ok(Self {
            vault,
            pass_interval,
            staleness,
            stall_threshold,
            collaborator_timeout,
            throughput_window,
        })
    }

    /// Returns the thresholds used by the metrics view.
    #[must_use]
    pub const fn metrics_policy(&self) -> MetricsPolicy {
        MetricsPolicy {
            staleness: self.staleness,
            stall_threshold: self.stall_threshold,
            throughput_window: self.throughput_window,
        }
    }

    /// Returns the tunables used by reconciliation passes.
    #[must_use]
    pub const fn reconcile_policy(&self) -> ReconcilePolicy {
        ReconcilePolicy {
            collaborator_timeout: self.collaborator_timeout,
            metrics: self.metrics_policy(),
        }
    }
}

fn positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr + Default + PartialOrd,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let value = raw
        .trim()
        .parse::<T>()
        .map_err(|err| ConfigError::InvalidValue {
            name,
            reason: err.to_string(),
        })?;
    if value <= T::default() {
        return Err(ConfigError::InvalidValue {
            name,
            reason: "must be greater than zero".to_owned(),
        });
    }
    Ok(Some(value))
}

fn out_of_range(name: &'static str) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        reason: "out of range".to_owned(),
    }
}
