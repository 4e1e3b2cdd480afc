//! Reactivation monitor — one pass over every load balancer.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use nodekeeper_core::tags::ASSOCIATED_ELB;
use nodekeeper_core::{
    LoadBalancer, LoadBalancerProvider, ManagedResource, MetricsProvider, NodekeeperConfig,
    ProviderResult, Providers, ResourceKind, ResourceProvider, TagFilter,
};
use nodekeeper_policy::Actuator;

use crate::demand::DemandStatus;

/// Kinds started when their balancer is demanded.
const REACTIVATED_KINDS: [ResourceKind; 2] = [ResourceKind::ScalingGroup, ResourceKind::DatabaseInstance];

/// What one monitor pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReactivationReport {
    pub balancers_checked: usize,
    /// ARNs of balancers that had traffic and no healthy target.
    pub demanded: Vec<String>,
    /// ARNs of resources started.
    pub started: Vec<String>,
    /// Provider calls that failed (balancer checks and starts).
    pub failures: usize,
}

pub struct ReactivationMonitor {
    resources: Arc<dyn ResourceProvider>,
    load_balancers: Arc<dyn LoadBalancerProvider>,
    metrics: Arc<dyn MetricsProvider>,
    actuator: Actuator,
    traffic_window: Duration,
}

impl ReactivationMonitor {
    pub fn new(providers: &Providers, config: &NodekeeperConfig) -> Self {
        Self {
            resources: providers.resources.clone(),
            load_balancers: providers.load_balancers.clone(),
            metrics: providers.metrics.clone(),
            actuator: Actuator::new(providers.resources.clone(), config.scaling.start_capacity()),
            traffic_window: config.reactivation.traffic_window(),
        }
    }

    /// Check every load balancer and start the resources behind demanded
    /// ones. Never fails; errors are logged and counted.
    pub async fn run(&self, now: DateTime<Utc>) -> ReactivationReport {
        let mut report = ReactivationReport::default();

        let balancers = match self.load_balancers.list_load_balancers().await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to list load balancers");
                report.failures += 1;
                return report;
            }
        };
        info!(count = balancers.len(), "monitoring load balancers");

        for lb in &balancers {
            report.balancers_checked += 1;

            let status = match self.demand(lb, now).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(lb = %lb.name, error = %e, "failed to check load balancer");
                    report.failures += 1;
                    continue;
                }
            };
            debug!(lb = %lb.name, ?status, "load balancer status");

            if !status.needs_reactivation() {
                continue;
            }

            info!(
                lb = %lb.name,
                "load balancer has no handlers and incoming requests, activating associated resources"
            );
            report.demanded.push(lb.arn.clone());
            self.activate_associated(lb, &mut report).await;
        }

        report
    }

    async fn demand(&self, lb: &LoadBalancer, now: DateTime<Utc>) -> ProviderResult<DemandStatus> {
        let health = self.load_balancers.target_health(lb).await?;
        let requests = self
            .metrics
            .request_count(lb, self.traffic_window, now)
            .await?;
        Ok(DemandStatus::new(health, requests))
    }

    async fn activate_associated(&self, lb: &LoadBalancer, report: &mut ReactivationReport) {
        let filter = TagFilter::equals(ASSOCIATED_ELB, lb.arn.as_str());

        for kind in REACTIVATED_KINDS {
            let associated = match self.resources.list_resources(kind, &filter).await {
                Ok(list) => list,
                Err(e) => {
                    warn!(lb = %lb.name, %kind, error = %e, "failed to list associated resources");
                    report.failures += 1;
                    continue;
                }
            };

            for resource in associated {
                self.activate(&resource, report).await;
            }
        }
    }

    /// Start one associated resource without walking its `depends-on`
    /// chain. Databases also drop a pending `to-be-started` flag, since
    /// they are now up; scaling groups keep theirs.
    async fn activate(&self, resource: &ManagedResource, report: &mut ReactivationReport) {
        if !resource.is_stopped() {
            debug!(resource = %resource.arn, state = %resource.state, "associated resource not stopped");
            return;
        }

        let reference = resource.reference();
        if let Err(e) = self.actuator.start(&reference).await {
            warn!(resource = %resource.arn, error = %e, "failed to reactivate");
            report.failures += 1;
            return;
        }
        info!(resource = %resource.arn, kind = %resource.kind, "reactivated");
        report.started.push(resource.arn.clone());

        if resource.kind.is_database() {
            if let Err(e) = self.actuator.clear_start_flag(&reference, &resource.tags).await {
                warn!(resource = %resource.arn, error = %e, "failed to clear start flag");
                report.failures += 1;
            }
        }
    }
}
