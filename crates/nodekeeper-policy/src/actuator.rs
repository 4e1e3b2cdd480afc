//! Kind-aware lifecycle verbs.
//!
//! Compute instances and databases have native start/stop calls. Scaling
//! groups do not: starting one writes the configured desired capacity and
//! min size, stopping one writes zero for both.

use std::sync::Arc;

use tracing::info;

use nodekeeper_core::tags::{TERMINATION_IN_PROGRESS, TO_BE_STARTED};
use nodekeeper_core::{GroupCapacity, ProviderResult, ResourceKind, ResourceProvider, ResourceRef, Tags};

#[derive(Clone)]
pub struct Actuator {
    resources: Arc<dyn ResourceProvider>,
    start_capacity: GroupCapacity,
}

impl Actuator {
    pub fn new(resources: Arc<dyn ResourceProvider>, start_capacity: GroupCapacity) -> Self {
        Self {
            resources,
            start_capacity,
        }
    }

    pub async fn start(&self, reference: &ResourceRef) -> ProviderResult<()> {
        info!(resource = %reference, kind = %reference.kind(), "starting");
        match reference.kind() {
            ResourceKind::ScalingGroup => {
                self.resources
                    .set_capacity(reference, self.start_capacity)
                    .await?
            }
            _ => self.resources.start(reference).await?,
        }
        info!(resource = %reference, "started");
        Ok(())
    }

    pub async fn stop(&self, reference: &ResourceRef) -> ProviderResult<()> {
        info!(resource = %reference, kind = %reference.kind(), "stopping");
        match reference.kind() {
            ResourceKind::ScalingGroup => {
                self.resources
                    .set_capacity(reference, GroupCapacity::ZERO)
                    .await?
            }
            _ => self.resources.stop(reference).await?,
        }
        info!(resource = %reference, "stopped");
        Ok(())
    }

    /// Mark the instance and terminate it.
    pub async fn terminate(&self, reference: &ResourceRef) -> ProviderResult<()> {
        info!(resource = %reference, "terminating");
        self.resources
            .set_tag(reference, TERMINATION_IN_PROGRESS, "true")
            .await?;
        self.resources.terminate(reference).await?;
        info!(resource = %reference, "terminated");
        Ok(())
    }

    /// Remove `to-be-started` if the resource carried it.
    pub async fn clear_start_flag(&self, reference: &ResourceRef, tags: &Tags) -> ProviderResult<()> {
        if tags.contains_key(TO_BE_STARTED) {
            self.resources.remove_tag(reference, TO_BE_STARTED).await?;
            info!(resource = %reference, "removed to-be-started tag");
        }
        Ok(())
    }
}
