//! Domain types for managed resources.
//!
//! A `ManagedResource` is a provider-agnostic snapshot of one compute
//! instance, database instance, database cluster, or scaling group: its
//! identity, coarsened lifecycle state, and tag set. Policy is never stored
//! on the resource; it is derived from `tags` each time the resource is
//! evaluated (see `crate::tags::PolicySpec`).

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reference::ResourceRef;

/// Tag set of a resource. Keys are case-sensitive and unique.
pub type Tags = HashMap<String, String>;

// ── Kinds and states ──────────────────────────────────────────────

/// The four kinds of resource the controller manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ComputeInstance,
    DatabaseInstance,
    DatabaseCluster,
    ScalingGroup,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::ComputeInstance,
        ResourceKind::DatabaseInstance,
        ResourceKind::DatabaseCluster,
        ResourceKind::ScalingGroup,
    ];

    /// Database instances and clusters share one decision table.
    pub fn is_database(self) -> bool {
        matches!(self, Self::DatabaseInstance | Self::DatabaseCluster)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ComputeInstance => "compute_instance",
            Self::DatabaseInstance => "database_instance",
            Self::DatabaseCluster => "database_cluster",
            Self::ScalingGroup => "scaling_group",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarsened view of the provider-reported status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Stopped,
    Transitioning,
    Running,
}

impl LifecycleState {
    /// Map a raw provider status string to a lifecycle state.
    ///
    /// Compute instances report `running`/`stopped`; databases report
    /// `available`/`stopped`. Anything else (pending, stopping, starting,
    /// terminated, backing-up, ...) is `Transitioning`, which no policy
    /// branch acts on.
    pub fn from_provider_status(kind: ResourceKind, status: &str) -> Self {
        match (kind, status) {
            (_, "stopped") => Self::Stopped,
            (ResourceKind::ComputeInstance, "running") => Self::Running,
            (ResourceKind::DatabaseInstance | ResourceKind::DatabaseCluster, "available") => {
                Self::Running
            }
            _ => Self::Transitioning,
        }
    }

    /// Scaling groups have no status; desired capacity decides.
    pub fn from_desired_capacity(desired: u32) -> Self {
        if desired > 0 {
            Self::Running
        } else {
            Self::Stopped
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Transitioning => "transitioning",
            Self::Running => "running",
        };
        f.write_str(s)
    }
}

// ── Resources ─────────────────────────────────────────────────────

/// A snapshot of one managed resource as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagedResource {
    /// Provider identifier (instance id, DB identifier, group name).
    pub id: String,
    pub kind: ResourceKind,
    /// Fully qualified reference string, the form `depends-on` tags use.
    pub arn: String,
    pub state: LifecycleState,
    #[serde(default)]
    pub tags: Tags,
    /// Launch time, used by the max-runtime check on compute instances.
    #[serde(default)]
    pub launched_at: Option<DateTime<Utc>>,
    /// Desired capacity, scaling groups only.
    #[serde(default)]
    pub desired_capacity: Option<u32>,
}

impl ManagedResource {
    /// Typed reference to this resource.
    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(self.kind, &self.id, &self.arn)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// True when the tag is present with the literal value `"true"`.
    pub fn flag(&self, key: &str) -> bool {
        self.tag(key) == Some("true")
    }

    /// Running-equivalent: running/available, or a group with capacity.
    pub fn is_running(&self) -> bool {
        self.effective_state() == LifecycleState::Running
    }

    /// Stopped-equivalent: stopped, or a group scaled to zero.
    pub fn is_stopped(&self) -> bool {
        self.effective_state() == LifecycleState::Stopped
    }

    /// A scaling group's desired capacity wins over its reported state;
    /// a group record without one falls back to `state`.
    fn effective_state(&self) -> LifecycleState {
        match (self.kind, self.desired_capacity) {
            (ResourceKind::ScalingGroup, Some(desired)) => LifecycleState::from_desired_capacity(desired),
            _ => self.state,
        }
    }
}

/// Capacity written to a scaling group when it is started or stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCapacity {
    pub desired: u32,
    pub min_size: u32,
}

impl GroupCapacity {
    pub const ZERO: GroupCapacity = GroupCapacity {
        desired: 0,
        min_size: 0,
    };
}

/// Which resources a population query returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagFilter {
    /// Resources carrying at least one of these keys.
    AnyKey(Vec<String>),
    /// Resources whose tag `key` has exactly `value`.
    Equals { key: String, value: String },
}

impl TagFilter {
    pub fn any_key<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AnyKey(keys.into_iter().map(Into::into).collect())
    }

    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equals {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Apply the filter to a tag set.
    pub fn matches(&self, tags: &Tags) -> bool {
        match self {
            Self::AnyKey(keys) => keys.iter().any(|k| tags.contains_key(k)),
            Self::Equals { key, value } => tags.get(key) == Some(value),
        }
    }
}

// ── Load balancers ────────────────────────────────────────────────

/// A load balancer fronting managed resources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadBalancer {
    /// Identifier matched against `AssociatedELB` tags.
    pub arn: String,
    pub name: String,
}

/// Aggregated target-group health for one load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetHealth {
    /// True when any target in any group reports healthy.
    pub has_healthy_target: bool,
}

// ── Idle signals ──────────────────────────────────────────────────

/// The usage metric an idle signal is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Compute: inbound network bytes (sum per period).
    NetworkIn,
    /// Compute: CPU utilisation percent (average per period).
    CpuUtilization,
    /// Database: open connections (maximum per period).
    DatabaseConnections,
    /// Load balancer: request count (sum per period).
    RequestCount,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkIn => "network_in",
            Self::CpuUtilization => "cpu_utilization",
            Self::DatabaseConnections => "database_connections",
            Self::RequestCount => "request_count",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Question put to the metrics collaborator: "has this resource stayed
/// below `threshold` on `metric` for the `window` ending at `until`?"
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdleQuery {
    pub metric: MetricKind,
    pub window: Duration,
    pub threshold: f64,
    /// End of the window, normally the evaluation instant.
    pub until: DateTime<Utc>,
}

impl IdleQuery {
    /// Start of the window.
    pub fn since(&self) -> DateTime<Utc> {
        window_start(self.until, self.window)
    }
}

/// `until - window`, saturating at the earliest representable instant.
pub fn window_start(until: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|w| until.checked_sub_signed(w))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(kind: ResourceKind, state: LifecycleState) -> ManagedResource {
        ManagedResource {
            id: "r-1".to_string(),
            kind,
            arn: "arn:aws:ec2:us-east-1:123456789012:instance/r-1".to_string(),
            state,
            tags: Tags::new(),
            launched_at: None,
            desired_capacity: None,
        }
    }

    #[test]
    fn compute_status_coarsening() {
        let k = ResourceKind::ComputeInstance;
        assert_eq!(LifecycleState::from_provider_status(k, "running"), LifecycleState::Running);
        assert_eq!(LifecycleState::from_provider_status(k, "stopped"), LifecycleState::Stopped);
        assert_eq!(
            LifecycleState::from_provider_status(k, "pending"),
            LifecycleState::Transitioning
        );
        assert_eq!(
            LifecycleState::from_provider_status(k, "available"),
            LifecycleState::Transitioning
        );
    }

    #[test]
    fn database_status_coarsening() {
        for k in [ResourceKind::DatabaseInstance, ResourceKind::DatabaseCluster] {
            assert_eq!(LifecycleState::from_provider_status(k, "available"), LifecycleState::Running);
            assert_eq!(LifecycleState::from_provider_status(k, "stopped"), LifecycleState::Stopped);
            assert_eq!(
                LifecycleState::from_provider_status(k, "starting"),
                LifecycleState::Transitioning
            );
        }
    }

    #[test]
    fn scaling_group_state_follows_capacity() {
        let mut group = resource(ResourceKind::ScalingGroup, LifecycleState::Running);
        group.desired_capacity = Some(0);
        assert!(group.is_stopped());
        assert!(!group.is_running());

        group.desired_capacity = Some(2);
        assert!(group.is_running());
        assert_eq!(LifecycleState::from_desired_capacity(2), LifecycleState::Running);
        assert_eq!(LifecycleState::from_desired_capacity(0), LifecycleState::Stopped);
    }

    #[test]
    fn scaling_group_without_capacity_uses_reported_state() {
        let json = r#"{
            "id": "web-asg",
            "kind": "scaling_group",
            "arn": "arn:aws:autoscaling:us-east-1:123456789012:autoScalingGroup:uuid:autoScalingGroupName/web-asg",
            "state": "running"
        }"#;
        let mut group: ManagedResource = serde_json::from_str(json).unwrap();
        assert_eq!(group.desired_capacity, None);
        assert!(group.is_running());
        assert!(!group.is_stopped());

        group.state = LifecycleState::Stopped;
        assert!(group.is_stopped());

        group.state = LifecycleState::Transitioning;
        assert!(!group.is_running());
        assert!(!group.is_stopped());
    }

    #[test]
    fn flag_requires_literal_true() {
        let mut r = resource(ResourceKind::ComputeInstance, LifecycleState::Running);
        r.tags.insert("AutoStop".to_string(), "true".to_string());
        r.tags.insert("AutoStart".to_string(), "True".to_string());
        assert!(r.flag("AutoStop"));
        assert!(!r.flag("AutoStart"));
        assert!(!r.flag("AutoTerminate"));
    }

    #[test]
    fn tag_filter_any_key_and_equals() {
        let mut tags = Tags::new();
        tags.insert("AssociatedELB".to_string(), "lb-1".to_string());

        assert!(TagFilter::any_key(["AutoStart", "AssociatedELB"]).matches(&tags));
        assert!(!TagFilter::any_key(["AutoStart"]).matches(&tags));
        assert!(TagFilter::equals("AssociatedELB", "lb-1").matches(&tags));
        assert!(!TagFilter::equals("AssociatedELB", "lb-2").matches(&tags));
    }

    #[test]
    fn resource_json_defaults_optional_fields() {
        let json = r#"{
            "id": "db-1",
            "kind": "database_instance",
            "arn": "arn:aws:rds:us-east-1:123456789012:db:db-1",
            "state": "stopped"
        }"#;
        let r: ManagedResource = serde_json::from_str(json).unwrap();
        assert!(r.tags.is_empty());
        assert!(r.launched_at.is_none());
        assert_eq!(r.reference().kind(), ResourceKind::DatabaseInstance);
    }
}
