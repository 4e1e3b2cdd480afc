//! Tag taxonomy and derived policy.
//!
//! Tags are the controller's only wire contract. All keys are
//! case-sensitive; boolean flags are enabled only by the literal `"true"`.
//! `PolicySpec` is computed from a tag set at evaluation time and never
//! persisted. The only tags the controller writes back are the removal of
//! `to-be-started` and the `TerminationInProgress` marker.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::TagError;
use crate::types::{ResourceKind, Tags};

pub const AUTO_START: &str = "AutoStart";
pub const AUTO_STOP: &str = "AutoStop";
pub const AUTO_TERMINATE: &str = "AutoTerminate";
pub const START_SCHEDULE: &str = "start-schedule";
pub const STOP_SCHEDULE: &str = "stop-schedule";
pub const MAX_RUNTIME: &str = "max-runtime";
pub const IDLE_STOP_TIME: &str = "idle-stop-time";
pub const CPU_IDLE_STOP_TIME: &str = "cpu-idle-stop-time";
pub const NETWORK_IDLE_THRESHOLD: &str = "network-idle-threshold";
pub const CPU_IDLE_THRESHOLD: &str = "cpu-idle-threshold";
pub const MAX_IDLE_TIME: &str = "max-idle-time";
pub const IDLE_CONNECTION_THRESHOLD: &str = "idle-connection-threshold";
pub const DEPENDS_ON: &str = "depends-on";
pub const TO_BE_STARTED: &str = "to-be-started";
pub const ASSOCIATED_ELB: &str = "AssociatedELB";
pub const TERMINATION_IN_PROGRESS: &str = "TerminationInProgress";

/// Tag keys that put a resource into the managed population.
///
/// A resource carrying none of these is never fetched by the driver.
pub fn population_keys(kind: ResourceKind) -> Vec<&'static str> {
    let mut keys = vec![AUTO_START, AUTO_STOP, DEPENDS_ON, TO_BE_STARTED];
    if kind == ResourceKind::ComputeInstance {
        keys.push(AUTO_TERMINATE);
    }
    keys
}

/// Policy derived from a resource's tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicySpec {
    pub auto_start: bool,
    pub auto_stop: bool,
    pub auto_terminate: bool,
    pub start_schedule: Option<String>,
    pub stop_schedule: Option<String>,
    pub max_runtime: Option<String>,
    pub idle_stop_time: Option<String>,
    pub cpu_idle_stop_time: Option<String>,
    pub network_idle_threshold: Option<f64>,
    pub cpu_idle_threshold: Option<f64>,
    pub max_idle_time: Option<String>,
    pub idle_connection_threshold: Option<f64>,
    pub depends_on: Option<String>,
    pub to_be_started: bool,
    pub associated_lb: Option<String>,
}

impl PolicySpec {
    /// Read every recognised key off a tag set.
    pub fn from_tags(tags: &Tags) -> Self {
        let text = |key: &str| tags.get(key).cloned();
        let flag = |key: &str| tags.get(key).is_some_and(|v| v == "true");
        let number = |key: &str| tags.get(key).and_then(|v| v.trim().parse::<f64>().ok());

        Self {
            auto_start: flag(AUTO_START),
            auto_stop: flag(AUTO_STOP),
            auto_terminate: flag(AUTO_TERMINATE),
            start_schedule: text(START_SCHEDULE),
            stop_schedule: text(STOP_SCHEDULE),
            max_runtime: text(MAX_RUNTIME),
            idle_stop_time: text(IDLE_STOP_TIME),
            cpu_idle_stop_time: text(CPU_IDLE_STOP_TIME),
            network_idle_threshold: number(NETWORK_IDLE_THRESHOLD),
            cpu_idle_threshold: number(CPU_IDLE_THRESHOLD),
            max_idle_time: text(MAX_IDLE_TIME),
            idle_connection_threshold: number(IDLE_CONNECTION_THRESHOLD),
            depends_on: text(DEPENDS_ON),
            to_be_started: flag(TO_BE_STARTED),
            associated_lb: text(ASSOCIATED_ELB),
        }
    }
}

/// Parse an idle window of the form `<int>m` or `<int>h`.
pub fn parse_idle_window(key: &str, value: &str) -> Result<Duration, TagError> {
    let invalid = || TagError::InvalidDuration {
        key: key.to_string(),
        value: value.to_string(),
    };

    let value_trimmed = value.trim();
    let unit = value_trimmed.chars().last().ok_or_else(invalid)?;
    let amount: u64 = value_trimmed[..value_trimmed.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| invalid())?;

    let secs = match unit.to_ascii_lowercase() {
        'm' => amount.checked_mul(60),
        'h' => amount.checked_mul(60 * 60),
        _ => None,
    };
    secs.map(Duration::from_secs).ok_or_else(invalid)
}

/// Parse a `max-runtime` value (`<int>h`) into whole hours.
pub fn parse_max_runtime_hours(value: &str) -> Option<u64> {
    value.trim().trim_end_matches('h').parse().ok()
}

/// True when the resource has been up for at least `max_hours`.
pub fn max_runtime_exceeded(launched_at: DateTime<Utc>, now: DateTime<Utc>, max_hours: u64) -> bool {
    let running_hours = (now - launched_at).num_seconds() as f64 / 3600.0;
    running_hours >= max_hours as f64
}
