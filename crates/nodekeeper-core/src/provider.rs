//! Collaborator traits for the cloud provider.
//!
//! The controller never holds a global client. Each capability is an
//! injected trait object, so the policy engine, dependency resolver and
//! reactivation monitor run unchanged against a real provider binding, the
//! redb inventory, or a test fake.
//!
//! Methods return boxed futures so the traits stay object-safe behind
//! `Arc<dyn ...>`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::ProviderResult;
use crate::reference::ResourceRef;
use crate::types::{
    GroupCapacity, IdleQuery, LoadBalancer, ManagedResource, ResourceKind, TagFilter, TargetHealth,
};

/// Boxed future alias for provider calls.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = ProviderResult<T>> + Send + 'a>>;

/// Describe and mutate compute instances, databases and scaling groups.
///
/// Implementations dispatch on `ResourceRef::kind()`; verbs a kind does not
/// support (terminating a database, start/stop on a scaling group) return
/// `ProviderError::Unsupported`.
pub trait ResourceProvider: Send + Sync {
    /// Fetch every resource of `kind` whose tags satisfy `filter`.
    fn list_resources<'a>(
        &'a self,
        kind: ResourceKind,
        filter: &'a TagFilter,
    ) -> ProviderFuture<'a, Vec<ManagedResource>>;

    /// Fetch the current snapshot of one resource, or `None` if it is gone.
    fn describe<'a>(&'a self, reference: &'a ResourceRef) -> ProviderFuture<'a, Option<ManagedResource>>;

    fn start<'a>(&'a self, reference: &'a ResourceRef) -> ProviderFuture<'a, ()>;

    fn stop<'a>(&'a self, reference: &'a ResourceRef) -> ProviderFuture<'a, ()>;

    fn terminate<'a>(&'a self, reference: &'a ResourceRef) -> ProviderFuture<'a, ()>;

    /// Write desired capacity and min size on a scaling group.
    fn set_capacity<'a>(
        &'a self,
        reference: &'a ResourceRef,
        capacity: GroupCapacity,
    ) -> ProviderFuture<'a, ()>;

    fn set_tag<'a>(
        &'a self,
        reference: &'a ResourceRef,
        key: &'a str,
        value: &'a str,
    ) -> ProviderFuture<'a, ()>;

    fn remove_tag<'a>(&'a self, reference: &'a ResourceRef, key: &'a str) -> ProviderFuture<'a, ()>;
}

/// Enumerate load balancers and read their target health.
pub trait LoadBalancerProvider: Send + Sync {
    fn list_load_balancers(&self) -> ProviderFuture<'_, Vec<LoadBalancer>>;

    fn target_health<'a>(&'a self, lb: &'a LoadBalancer) -> ProviderFuture<'a, TargetHealth>;
}

/// Usage metrics reduced to the answers the policy needs.
pub trait MetricsProvider: Send + Sync {
    /// Has the resource stayed below the query threshold for the window?
    fn idle_signal<'a>(&'a self, reference: &'a ResourceRef, query: IdleQuery) -> ProviderFuture<'a, bool>;

    /// Total requests a load balancer received over the `window` ending at
    /// `until`.
    fn request_count<'a>(
        &'a self,
        lb: &'a LoadBalancer,
        window: Duration,
        until: DateTime<Utc>,
    ) -> ProviderFuture<'a, f64>;
}

/// The full set of collaborators one control-loop invocation uses.
#[derive(Clone)]
pub struct Providers {
    pub resources: Arc<dyn ResourceProvider>,
    pub load_balancers: Arc<dyn LoadBalancerProvider>,
    pub metrics: Arc<dyn MetricsProvider>,
}

impl Providers {
    pub fn new(
        resources: Arc<dyn ResourceProvider>,
        load_balancers: Arc<dyn LoadBalancerProvider>,
        metrics: Arc<dyn MetricsProvider>,
    ) -> Self {
        Self {
            resources,
            load_balancers,
            metrics,
        }
    }

    /// Use one value that implements every capability.
    pub fn from_single<P>(provider: Arc<P>) -> Self
    where
        P: ResourceProvider + LoadBalancerProvider + MetricsProvider + 'static,
    {
        Self {
            resources: provider.clone(),
            load_balancers: provider.clone(),
            metrics: provider,
        }
    }
}
