//! nodekeeper.toml configuration parser.
//!
//! Every field has a default, so an empty file (or no file) yields a
//! working configuration. Two environment variables override
//! scaling-group capacity:
//! `DEFAULT_ASG_DESIRED_CAPACITY` and `DEFAULT_ASG_MIN_SIZE`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::GroupCapacity;

pub const ENV_DESIRED_CAPACITY: &str = "DEFAULT_ASG_DESIRED_CAPACITY";
pub const ENV_MIN_SIZE: &str = "DEFAULT_ASG_MIN_SIZE";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodekeeperConfig {
    pub controller: ControllerConfig,
    pub scaling: ScalingConfig,
    pub reactivation: ReactivationConfig,
    pub idle: IdleDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Maximum resource evaluations in flight at once.
    pub concurrency: usize,
    /// Period between invocations in daemon mode.
    pub interval_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScalingConfig {
    /// Desired capacity written when a scaling group is started.
    pub default_desired_capacity: u32,
    /// Min size written when a scaling group is started.
    pub default_min_size: u32,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            default_desired_capacity: 1,
            default_min_size: 1,
        }
    }
}

impl ScalingConfig {
    pub fn start_capacity(&self) -> GroupCapacity {
        GroupCapacity {
            desired: self.default_desired_capacity,
            min_size: self.default_min_size,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReactivationConfig {
    pub enabled: bool,
    /// Trailing window for the request-count check.
    pub traffic_window_secs: u64,
}

impl Default for ReactivationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            traffic_window_secs: 300,
        }
    }
}

impl ReactivationConfig {
    pub fn traffic_window(&self) -> Duration {
        Duration::from_secs(self.traffic_window_secs)
    }
}

/// Thresholds used when a resource carries an idle window but no
/// threshold tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IdleDefaults {
    pub network_idle_threshold: f64,
    pub cpu_idle_threshold: f64,
    pub idle_connection_threshold: f64,
}

impl Default for IdleDefaults {
    fn default() -> Self {
        Self {
            network_idle_threshold: 0.0,
            cpu_idle_threshold: 10.0,
            idle_connection_threshold: 0.0,
        }
    }
}

impl NodekeeperConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment overrides using the given lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_DESIRED_CAPACITY) {
            self.scaling.default_desired_capacity = parse_override(ENV_DESIRED_CAPACITY, &v)?;
        }
        if let Some(v) = lookup(ENV_MIN_SIZE) {
            self.scaling.default_min_size = parse_override(ENV_MIN_SIZE, &v)?;
        }
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }
}

fn parse_override(name: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
        name: name.to_string(),
        value: value.to_string(),
    })
}
