//! Record types persisted in the inventory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nodekeeper_core::{LoadBalancer, ManagedResource, MetricKind, ResourceKind, ResourceRef};

/// Table key for a resource: `{kind}/{id}`.
pub fn resource_key(kind: ResourceKind, id: &str) -> String {
    format!("{kind}/{id}")
}

// ── Load balancers ─────────────────────────────────────────────────

/// One registered target and its last reported health.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetRecord {
    pub id: String,
    pub healthy: bool,
}

/// A load balancer with the targets of all its target groups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadBalancerRecord {
    pub arn: String,
    pub name: String,
    #[serde(default)]
    pub targets: Vec<TargetRecord>,
}

impl LoadBalancerRecord {
    pub fn balancer(&self) -> LoadBalancer {
        LoadBalancer {
            arn: self.arn.clone(),
            name: self.name.clone(),
        }
    }

    pub fn has_healthy_target(&self) -> bool {
        self.targets.iter().any(|t| t.healthy)
    }
}

// ── Metrics ────────────────────────────────────────────────────────

/// One metric datapoint for a resource or load balancer.
///
/// `subject` is the resource table key for resources and the ARN for load
/// balancers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub subject: String,
    pub metric: MetricKind,
    pub at: DateTime<Utc>,
    pub value: f64,
}

impl MetricSample {
    pub fn for_resource(reference: &ResourceRef, metric: MetricKind, at: DateTime<Utc>, value: f64) -> Self {
        Self {
            subject: resource_key(reference.kind(), reference.id()),
            metric,
            at,
            value,
        }
    }

    pub fn for_load_balancer(lb: &LoadBalancer, at: DateTime<Utc>, requests: f64) -> Self {
        Self {
            subject: lb.arn.clone(),
            metric: MetricKind::RequestCount,
            at,
            value: requests,
        }
    }

    /// Key prefix shared by every sample of one subject and metric.
    pub fn series_prefix(subject: &str, metric: MetricKind) -> String {
        format!("{subject}|{metric}|")
    }

    pub fn table_key(&self) -> String {
        format!(
            "{}{:020}",
            Self::series_prefix(&self.subject, self.metric),
            self.at.timestamp_millis().max(0)
        )
    }
}

// ── Journal ────────────────────────────────────────────────────────

/// A mutating call issued against the inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum JournalOp {
    Start,
    Stop,
    Terminate,
    SetCapacity { desired: u32, min_size: u32 },
    SetTag { key: String, value: String },
    RemoveTag { key: String },
}

/// One journal line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalEntry {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub kind: ResourceKind,
    pub resource_id: String,
    pub arn: String,
    #[serde(flatten)]
    pub op: JournalOp,
}

// ── Import ─────────────────────────────────────────────────────────

/// A fleet description loaded with `nodekeeperd import`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Fleet {
    pub resources: Vec<ManagedResource>,
    pub load_balancers: Vec<LoadBalancerRecord>,
    pub samples: Vec<MetricSample>,
}

/// Counts of records written by an import.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ImportReport {
    pub resources: usize,
    pub load_balancers: usize,
    pub samples: usize,
}
