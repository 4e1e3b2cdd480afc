//! Policy engine — one decision pass per resource.
//!
//! The engine reads a resource snapshot, derives its `PolicySpec` from the
//! tag set, and walks three branches:
//!
//! 1. **start** — stopped, and either `AutoStart` with a matching
//!    `start-schedule` or `to-be-started`. Runs the dependency cascade and
//!    returns without looking at the other branches.
//! 2. **stop** — running with `AutoStop`. Vetoed by a `depends-on` tag or a
//!    running dependent; otherwise fires on `stop-schedule` or an idle
//!    signal for the kind's metric.
//! 3. **terminate** — compute instances only, running with `AutoTerminate`
//!    and past `max-runtime`. Evaluated independently of branch 2, so both
//!    can fire in one pass.
//!
//! The engine holds no state between evaluations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use nodekeeper_core::config::IdleDefaults;
use nodekeeper_core::tags::{self, CPU_IDLE_STOP_TIME, IDLE_STOP_TIME, MAX_IDLE_TIME};
use nodekeeper_core::{
    IdleQuery, ManagedResource, MetricKind, MetricsProvider, NodekeeperConfig, PolicySpec,
    Providers, ResourceKind, ResourceRef,
};
use nodekeeper_schedule::ScheduleExpression;

use crate::actuator::Actuator;
use crate::error::PolicyResult;
use crate::resolver::DependencyResolver;

/// Why a start fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartTrigger {
    Schedule,
    Flag,
}

/// Why a stop fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Schedule,
    NetworkIdle,
    CpuIdle,
    ConnectionIdle,
}

/// An action the engine issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum Action {
    Started { trigger: StartTrigger },
    Stopped { reason: StopReason },
    Terminated,
}

/// A branch that was deliberately suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Veto {
    /// The resource declares `depends-on`, which disables auto-stop.
    DeclaredDependency,
    /// A running resource depends on this one.
    LiveDependents,
}

/// Outcome of evaluating one resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub resource: String,
    pub kind: ResourceKind,
    pub actions: Vec<Action>,
    pub vetoes: Vec<Veto>,
}

impl Evaluation {
    fn new(resource: &ManagedResource) -> Self {
        Self {
            resource: resource.arn.clone(),
            kind: resource.kind,
            actions: Vec::new(),
            vetoes: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }
}

#[derive(Clone)]
pub struct PolicyEngine {
    metrics: Arc<dyn MetricsProvider>,
    actuator: Actuator,
    resolver: DependencyResolver,
    idle_defaults: IdleDefaults,
}

impl PolicyEngine {
    pub fn new(providers: &Providers, config: &NodekeeperConfig) -> Self {
        let actuator = Actuator::new(
            providers.resources.clone(),
            config.scaling.start_capacity(),
        );
        let resolver = DependencyResolver::new(providers.resources.clone(), actuator.clone());
        Self {
            metrics: providers.metrics.clone(),
            actuator,
            resolver,
            idle_defaults: config.idle.clone(),
        }
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    /// Evaluate one resource at `now` and issue whatever actions apply.
    pub async fn evaluate(
        &self,
        resource: &ManagedResource,
        now: DateTime<Utc>,
    ) -> PolicyResult<Evaluation> {
        let policy = PolicySpec::from_tags(&resource.tags);
        let mut evaluation = Evaluation::new(resource);

        debug!(
            resource = %resource.arn,
            kind = %resource.kind,
            state = %resource.state,
            auto_start = policy.auto_start,
            auto_stop = policy.auto_stop,
            auto_terminate = policy.auto_terminate,
            "evaluating resource"
        );

        if let Some(trigger) = self.start_trigger(resource, &policy, now) {
            info!(resource = %resource.arn, ?trigger, "start condition met");
            self.resolver.start_with_dependencies(resource).await?;
            evaluation.actions.push(Action::Started { trigger });
            return Ok(evaluation);
        }

        if policy.auto_stop && resource.is_running() {
            self.stop_branch(resource, &policy, now, &mut evaluation)
                .await?;
        }

        if resource.kind == ResourceKind::ComputeInstance
            && policy.auto_terminate
            && resource.is_running()
        {
            self.terminate_branch(resource, &policy, now, &mut evaluation)
                .await?;
        }

        if evaluation.is_noop() {
            debug!(resource = %resource.arn, "no action");
        }
        Ok(evaluation)
    }

    fn start_trigger(
        &self,
        resource: &ManagedResource,
        policy: &PolicySpec,
        now: DateTime<Utc>,
    ) -> Option<StartTrigger> {
        if !resource.is_stopped() {
            return None;
        }
        if policy.to_be_started {
            return Some(StartTrigger::Flag);
        }
        let scheduled = policy.auto_start
            && policy
                .start_schedule
                .as_deref()
                .is_some_and(|raw| schedule_matches(resource, raw, now));
        scheduled.then_some(StartTrigger::Schedule)
    }

    async fn stop_branch(
        &self,
        resource: &ManagedResource,
        policy: &PolicySpec,
        now: DateTime<Utc>,
        evaluation: &mut Evaluation,
    ) -> PolicyResult<()> {
        let reference = resource.reference();

        if let Some(dependency) = &policy.depends_on {
            info!(
                resource = %reference,
                dependency = %dependency,
                "resource declares a dependency, auto-stop suppressed"
            );
            evaluation.vetoes.push(Veto::DeclaredDependency);
            return Ok(());
        }

        if self.resolver.has_live_dependents(&reference).await? {
            info!(resource = %reference, "cannot stop, running dependents exist");
            evaluation.vetoes.push(Veto::LiveDependents);
            return Ok(());
        }

        let Some(reason) = self.stop_reason(resource, policy, now).await? else {
            debug!(resource = %reference, "no stop condition met");
            return Ok(());
        };

        info!(resource = %reference, ?reason, "stop condition met");
        self.actuator.stop(&reference).await?;
        evaluation.actions.push(Action::Stopped { reason });
        Ok(())
    }

    async fn stop_reason(
        &self,
        resource: &ManagedResource,
        policy: &PolicySpec,
        now: DateTime<Utc>,
    ) -> PolicyResult<Option<StopReason>> {
        if policy
            .stop_schedule
            .as_deref()
            .is_some_and(|raw| schedule_matches(resource, raw, now))
        {
            return Ok(Some(StopReason::Schedule));
        }

        let reference = resource.reference();
        match resource.kind {
            ResourceKind::ComputeInstance => {
                if let Some(window) = &policy.idle_stop_time {
                    let query = IdleQuery {
                        metric: MetricKind::NetworkIn,
                        window: tags::parse_idle_window(IDLE_STOP_TIME, window)?,
                        threshold: policy
                            .network_idle_threshold
                            .unwrap_or(self.idle_defaults.network_idle_threshold),
                        until: now,
                    };
                    if self.idle(&reference, query).await? {
                        return Ok(Some(StopReason::NetworkIdle));
                    }
                }
                if let Some(window) = &policy.cpu_idle_stop_time {
                    let query = IdleQuery {
                        metric: MetricKind::CpuUtilization,
                        window: tags::parse_idle_window(CPU_IDLE_STOP_TIME, window)?,
                        threshold: policy
                            .cpu_idle_threshold
                            .unwrap_or(self.idle_defaults.cpu_idle_threshold),
                        until: now,
                    };
                    if self.idle(&reference, query).await? {
                        return Ok(Some(StopReason::CpuIdle));
                    }
                }
            }
            ResourceKind::DatabaseInstance | ResourceKind::DatabaseCluster => {
                if let Some(window) = &policy.max_idle_time {
                    let query = IdleQuery {
                        metric: MetricKind::DatabaseConnections,
                        window: tags::parse_idle_window(MAX_IDLE_TIME, window)?,
                        threshold: policy
                            .idle_connection_threshold
                            .unwrap_or(self.idle_defaults.idle_connection_threshold),
                        until: now,
                    };
                    if self.idle(&reference, query).await? {
                        return Ok(Some(StopReason::ConnectionIdle));
                    }
                }
            }
            ResourceKind::ScalingGroup => {}
        }
        Ok(None)
    }

    async fn idle(&self, reference: &ResourceRef, query: IdleQuery) -> PolicyResult<bool> {
        let idle = self.metrics.idle_signal(reference, query).await?;
        debug!(
            resource = %reference,
            metric = %query.metric,
            window_secs = query.window.as_secs(),
            threshold = query.threshold,
            idle,
            "idle signal"
        );
        Ok(idle)
    }

    async fn terminate_branch(
        &self,
        resource: &ManagedResource,
        policy: &PolicySpec,
        now: DateTime<Utc>,
        evaluation: &mut Evaluation,
    ) -> PolicyResult<()> {
        let Some(max_hours) = policy
            .max_runtime
            .as_deref()
            .and_then(tags::parse_max_runtime_hours)
        else {
            return Ok(());
        };
        let Some(launched_at) = resource.launched_at else {
            debug!(resource = %resource.arn, "no launch time available");
            return Ok(());
        };
        if !tags::max_runtime_exceeded(launched_at, now, max_hours) {
            return Ok(());
        }

        let reference = resource.reference();
        if self.resolver.has_live_dependents(&reference).await? {
            info!(resource = %reference, "cannot terminate, running dependents exist");
            evaluation.vetoes.push(Veto::LiveDependents);
            return Ok(());
        }

        info!(resource = %reference, max_hours, "max runtime exceeded");
        self.actuator.terminate(&reference).await?;
        evaluation.actions.push(Action::Terminated);
        Ok(())
    }
}

/// Parse and match a schedule tag. A schedule that fails to parse is
/// logged and treated as not matching.
fn schedule_matches(resource: &ManagedResource, raw: &str, now: DateTime<Utc>) -> bool {
    match ScheduleExpression::parse(raw) {
        Ok(schedule) => schedule.matches(&now),
        Err(e) => {
            warn!(resource = %resource.arn, error = %e, "ignoring schedule");
            false
        }
    }
}
