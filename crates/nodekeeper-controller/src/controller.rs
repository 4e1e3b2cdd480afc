//! Control-loop driver.
//!
//! One `run_control_loop` call is one invocation: fetch each population,
//! evaluate every resource through the limiter, then run the reactivation
//! monitor once. Evaluations are isolated from each other; a failure is
//! logged at the task boundary and counted in the summary.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use nodekeeper_core::tags::population_keys;
use nodekeeper_core::{ManagedResource, NodekeeperConfig, Providers, ResourceKind, TagFilter};
use nodekeeper_policy::{Evaluation, PolicyEngine, PolicyResult};
use nodekeeper_reactivate::ReactivationMonitor;

use crate::error::LimiterResult;
use crate::limiter::ConcurrencyLimiter;
use crate::summary::Summary;

type TaskOutput = (ResourceKind, String, PolicyResult<Evaluation>);

pub struct Controller {
    providers: Providers,
    engine: Arc<PolicyEngine>,
    reactivation: Option<ReactivationMonitor>,
    concurrency: usize,
}

impl Controller {
    /// Build a controller. Fails only on a zero concurrency limit.
    pub fn new(providers: Providers, config: &NodekeeperConfig) -> LimiterResult<Self> {
        // Validate the limit up front rather than on the first invocation.
        ConcurrencyLimiter::new(config.controller.concurrency)?;

        let reactivation = config
            .reactivation
            .enabled
            .then(|| ReactivationMonitor::new(&providers, config));

        Ok(Self {
            engine: Arc::new(PolicyEngine::new(&providers, config)),
            providers,
            reactivation,
            concurrency: config.controller.concurrency,
        })
    }

    /// Run one invocation at the current time.
    pub async fn run_control_loop(&self) -> Summary {
        self.run_at(Utc::now()).await
    }

    /// Run one invocation with `now` as the evaluation instant.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Summary {
        let clock = Instant::now();
        let mut summary = Summary::new(now);
        info!(%now, concurrency = self.concurrency, "control loop started");

        match ConcurrencyLimiter::new(self.concurrency) {
            Ok(limiter) => self.evaluate_populations(&limiter, now, &mut summary).await,
            Err(e) => error!(error = %e, "cannot build concurrency limiter"),
        }

        if let Some(monitor) = &self.reactivation {
            summary.reactivation = Some(monitor.run(now).await);
        }

        summary.elapsed_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            evaluated = summary.evaluated(),
            failed = summary.failed(),
            elapsed_ms = summary.elapsed_ms,
            "control loop completed"
        );
        summary
    }

    async fn evaluate_populations(
        &self,
        limiter: &ConcurrencyLimiter,
        now: DateTime<Utc>,
        summary: &mut Summary,
    ) {
        let mut tasks: JoinSet<TaskOutput> = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, (ResourceKind, String)> = HashMap::new();

        for kind in ResourceKind::ALL {
            let Some(population) = self.fetch_population(kind, summary).await else {
                continue;
            };

            for resource in population {
                // Acquiring here, in fetch order, is what makes admission FIFO.
                let slot = match limiter.acquire().await {
                    Ok(slot) => slot,
                    Err(e) => {
                        warn!(resource = %resource.arn, error = %e, "no slot for evaluation");
                        summary.kind_mut(kind).record_failure();
                        continue;
                    }
                };

                let engine = self.engine.clone();
                let arn = resource.arn.clone();
                let handle = tasks.spawn(async move {
                    let _slot = slot;
                    let result = engine.evaluate(&resource, now).await;
                    (resource.kind, resource.arn, result)
                });
                in_flight.insert(handle.id(), (kind, arn));
            }
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, (kind, arn, result))) => {
                    in_flight.remove(&id);
                    match result {
                        Ok(evaluation) => {
                            debug!(resource = %arn, actions = ?evaluation.actions, "evaluation finished");
                            summary.kind_mut(kind).record(&evaluation);
                        }
                        Err(e) => {
                            warn!(resource = %arn, %kind, error = %e, "evaluation failed");
                            summary.kind_mut(kind).record_failure();
                        }
                    }
                }
                Err(join_error) => {
                    let id = join_error.id();
                    let (kind, arn) = in_flight
                        .remove(&id)
                        .unwrap_or((ResourceKind::ComputeInstance, String::from("<unknown>")));
                    error!(resource = %arn, %kind, error = %join_error, "evaluation task aborted");
                    summary.kind_mut(kind).record_failure();
                }
            }
        }
    }

    async fn fetch_population(
        &self,
        kind: ResourceKind,
        summary: &mut Summary,
    ) -> Option<Vec<ManagedResource>> {
        let filter = TagFilter::any_key(population_keys(kind));
        match self.providers.resources.list_resources(kind, &filter).await {
            Ok(population) => {
                info!(%kind, count = population.len(), "fetched resources to manage");
                Some(population)
            }
            Err(e) => {
                warn!(%kind, error = %e, "failed to fetch resources to manage");
                summary.kind_mut(kind).fetch_failed = true;
                None
            }
        }
    }

    /// Invoke the control loop every `interval` until `shutdown` changes.
    pub async fn run_periodic(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "controller daemon started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let summary = self.run_control_loop().await;
                    if !summary.is_clean() {
                        warn!(failed = summary.failed(), "control loop finished with failures");
                    }
                }
                _ = shutdown.changed() => {
                    info!("controller daemon shutting down");
                    break;
                }
            }
        }
    }
}
