//! Collaborator trait implementations over the inventory.
//!
//! State changes mirror what the cloud would report afterwards: a started
//! instance is `Running` with a fresh launch time, a stopped one `Stopped`,
//! a terminated instance stays listed as `Transitioning` (the provider's
//! `terminated` status coarsens that way), and a scaling group's state
//! follows its new desired capacity.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use nodekeeper_core::{
    GroupCapacity, IdleQuery, LifecycleState, LoadBalancer, LoadBalancerProvider, ManagedResource,
    MetricKind, MetricsProvider, ProviderError, ProviderFuture, ResourceKind, ResourceProvider,
    ResourceRef, TagFilter, TargetHealth, window_start,
};

use crate::error::StateError;
use crate::idle;
use crate::store::InventoryStore;
use crate::types::{JournalOp, resource_key};

fn provider_error<'a>(operation: &'static str, target: &'a str) -> impl FnOnce(StateError) -> ProviderError + 'a {
    move |e| match e {
        StateError::NotFound(key) => ProviderError::NotFound(key),
        StateError::Unsupported { operation, kind } => ProviderError::Unsupported { operation, kind },
        other => ProviderError::call(operation, target, other),
    }
}

fn unsupported(operation: &'static str, kind: ResourceKind) -> StateError {
    StateError::Unsupported {
        operation,
        kind: kind.to_string(),
    }
}

impl InventoryStore {
    fn mutate(
        &self,
        operation: &'static str,
        reference: &ResourceRef,
        op: JournalOp,
        change: impl FnOnce(&mut ManagedResource) -> Result<(), StateError>,
    ) -> Result<(), ProviderError> {
        self.mutate_resource(reference, op, change)
            .map_err(provider_error(operation, reference.arn()))
    }
}

impl ResourceProvider for InventoryStore {
    fn list_resources<'a>(
        &'a self,
        kind: ResourceKind,
        filter: &'a TagFilter,
    ) -> ProviderFuture<'a, Vec<ManagedResource>> {
        Box::pin(async move {
            let all = self
                .list_resources_by_kind(kind)
                .map_err(provider_error("list_resources", kind.as_str()))?;
            let matching: Vec<_> = all.into_iter().filter(|r| filter.matches(&r.tags)).collect();
            debug!(%kind, count = matching.len(), "listed resources");
            Ok(matching)
        })
    }

    fn describe<'a>(&'a self, reference: &'a ResourceRef) -> ProviderFuture<'a, Option<ManagedResource>> {
        Box::pin(async move {
            self.get_resource(reference)
                .map_err(provider_error("describe", reference.arn()))
        })
    }

    fn start<'a>(&'a self, reference: &'a ResourceRef) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.mutate("start", reference, JournalOp::Start, |r| {
                if r.kind == ResourceKind::ScalingGroup {
                    return Err(unsupported("start", r.kind));
                }
                if r.kind == ResourceKind::ComputeInstance {
                    r.launched_at = Some(Utc::now());
                }
                r.state = LifecycleState::Running;
                Ok(())
            })
        })
    }

    fn stop<'a>(&'a self, reference: &'a ResourceRef) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.mutate("stop", reference, JournalOp::Stop, |r| {
                if r.kind == ResourceKind::ScalingGroup {
                    return Err(unsupported("stop", r.kind));
                }
                r.state = LifecycleState::Stopped;
                Ok(())
            })
        })
    }

    fn terminate<'a>(&'a self, reference: &'a ResourceRef) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.mutate("terminate", reference, JournalOp::Terminate, |r| {
                if r.kind != ResourceKind::ComputeInstance {
                    return Err(unsupported("terminate", r.kind));
                }
                r.state = LifecycleState::from_provider_status(r.kind, "terminated");
                Ok(())
            })
        })
    }

    fn set_capacity<'a>(
        &'a self,
        reference: &'a ResourceRef,
        capacity: GroupCapacity,
    ) -> ProviderFuture<'a, ()> {
        let op = JournalOp::SetCapacity {
            desired: capacity.desired,
            min_size: capacity.min_size,
        };
        Box::pin(async move {
            self.mutate("set_capacity", reference, op, |r| {
                if r.kind != ResourceKind::ScalingGroup {
                    return Err(unsupported("set_capacity", r.kind));
                }
                r.desired_capacity = Some(capacity.desired);
                r.state = LifecycleState::from_desired_capacity(capacity.desired);
                Ok(())
            })
        })
    }

    fn set_tag<'a>(
        &'a self,
        reference: &'a ResourceRef,
        key: &'a str,
        value: &'a str,
    ) -> ProviderFuture<'a, ()> {
        let op = JournalOp::SetTag {
            key: key.to_string(),
            value: value.to_string(),
        };
        Box::pin(async move {
            self.mutate("set_tag", reference, op, |r| {
                r.tags.insert(key.to_string(), value.to_string());
                Ok(())
            })
        })
    }

    fn remove_tag<'a>(&'a self, reference: &'a ResourceRef, key: &'a str) -> ProviderFuture<'a, ()> {
        let op = JournalOp::RemoveTag { key: key.to_string() };
        Box::pin(async move {
            self.mutate("remove_tag", reference, op, |r| {
                r.tags.remove(key);
                Ok(())
            })
        })
    }
}

impl LoadBalancerProvider for InventoryStore {
    fn list_load_balancers(&self) -> ProviderFuture<'_, Vec<LoadBalancer>> {
        Box::pin(async move {
            let records = self
                .list_load_balancer_records()
                .map_err(provider_error("list_load_balancers", "inventory"))?;
            Ok(records.iter().map(|r| r.balancer()).collect())
        })
    }

    fn target_health<'a>(&'a self, lb: &'a LoadBalancer) -> ProviderFuture<'a, TargetHealth> {
        Box::pin(async move {
            let record = self
                .get_load_balancer(&lb.arn)
                .map_err(provider_error("target_health", &lb.arn))?
                .ok_or_else(|| ProviderError::NotFound(lb.arn.clone()))?;
            Ok(TargetHealth {
                has_healthy_target: record.has_healthy_target(),
            })
        })
    }
}

impl MetricsProvider for InventoryStore {
    fn idle_signal<'a>(&'a self, reference: &'a ResourceRef, query: IdleQuery) -> ProviderFuture<'a, bool> {
        Box::pin(async move {
            let subject = resource_key(reference.kind(), reference.id());
            let samples = self
                .list_samples(&subject, query.metric, query.since(), query.until)
                .map_err(provider_error("idle_signal", reference.arn()))?;
            let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
            let idle = idle::classify(query.metric, &values, query.threshold);
            debug!(
                resource = %reference,
                metric = %query.metric,
                datapoints = values.len(),
                idle,
                "classified idle signal"
            );
            Ok(idle)
        })
    }

    fn request_count<'a>(
        &'a self,
        lb: &'a LoadBalancer,
        window: Duration,
        until: DateTime<Utc>,
    ) -> ProviderFuture<'a, f64> {
        Box::pin(async move {
            let samples = self
                .list_samples(&lb.arn, MetricKind::RequestCount, window_start(until, window), until)
                .map_err(provider_error("request_count", &lb.arn))?;
            Ok(samples.iter().map(|s| s.value).sum())
        })
    }
}
