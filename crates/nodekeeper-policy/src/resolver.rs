//! Dependency resolver — start cascades and the live-dependents veto.
//!
//! A resource's `depends-on` tag names one other resource. Before a
//! resource is started, its dependency is started first, and that
//! dependency's own dependency before it, and so on. The chain is walked
//! against the provider (never through in-process pointers) under a
//! `VisitedSet` that is created fresh for each top-level start and dropped
//! when the cascade ends.
//!
//! ```text
//! start_with_dependencies(A)        visited = {A}
//!   ensure_started(B)               visited = {A, B}   B stopped
//!     ensure_started(A)             A already visited → return
//!     start(B)
//!   start(A)
//! ```
//!
//! A revisit ends that branch only. A failure anywhere in the chain fails
//! closed: nothing above the failed resource is started.
//!
//! The cascade runs inside the caller's concurrency slot; it never takes
//! additional slots.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, warn};

use nodekeeper_core::tags::DEPENDS_ON;
use nodekeeper_core::{ManagedResource, ResourceKind, ResourceProvider, ResourceRef, TagFilter};

use crate::actuator::Actuator;
use crate::error::{PolicyError, PolicyResult};

/// Resources already entered during one cascade.
pub type VisitedSet = HashSet<ResourceRef>;

type CascadeFuture<'a> = Pin<Box<dyn Future<Output = PolicyResult<()>> + Send + 'a>>;

#[derive(Clone)]
pub struct DependencyResolver {
    resources: Arc<dyn ResourceProvider>,
    actuator: Actuator,
}

impl DependencyResolver {
    pub fn new(resources: Arc<dyn ResourceProvider>, actuator: Actuator) -> Self {
        Self {
            resources,
            actuator,
        }
    }

    /// Start `resource` after its dependency chain, then clear its
    /// `to-be-started` flag. The visited set is seeded with the resource
    /// itself.
    pub async fn start_with_dependencies(&self, resource: &ManagedResource) -> PolicyResult<()> {
        let mut visited = VisitedSet::new();
        visited.insert(resource.reference());
        self.start_chain(resource, &mut visited).await
    }

    /// Ensure the referenced resource is running, starting its own
    /// dependency first when it is stopped.
    ///
    /// Returns immediately when `reference` was already visited in this
    /// cascade, or when the resource is not stopped.
    pub fn ensure_started<'a>(
        &'a self,
        reference: &'a ResourceRef,
        visited: &'a mut VisitedSet,
    ) -> CascadeFuture<'a> {
        Box::pin(async move {
            if !visited.insert(reference.clone()) {
                warn!(
                    resource = %reference,
                    "circular dependency detected, skipping to prevent infinite loop"
                );
                return Ok(());
            }

            let resource = self.resources.describe(reference).await?.ok_or_else(|| {
                PolicyError::DependencyNotFound {
                    reference: reference.to_string(),
                    dependent: visited_summary(visited),
                }
            })?;

            if !resource.is_stopped() {
                debug!(
                    resource = %reference,
                    state = %resource.state,
                    "dependency not stopped, nothing to start"
                );
                return Ok(());
            }

            info!(resource = %reference, "starting dependency");
            self.start_chain(&resource, visited).await
        })
    }

    /// True when any running resource declares `depends-on` = `reference`.
    ///
    /// Scaling groups count as running while desired capacity is above
    /// zero.
    pub async fn has_live_dependents(&self, reference: &ResourceRef) -> PolicyResult<bool> {
        let filter = TagFilter::any_key([DEPENDS_ON]);

        for kind in ResourceKind::ALL {
            let candidates = self.resources.list_resources(kind, &filter).await?;
            let live = candidates.iter().find(|c| {
                c.is_running()
                    && c.tag(DEPENDS_ON)
                        .and_then(ResourceRef::parse)
                        .is_some_and(|target| &target == reference)
            });

            if let Some(dependent) = live {
                info!(
                    resource = %reference,
                    dependent = %dependent.arn,
                    "resource has a running dependent"
                );
                return Ok(true);
            }
        }

        debug!(resource = %reference, "no running dependents");
        Ok(false)
    }

    async fn start_chain(&self, resource: &ManagedResource, visited: &mut VisitedSet) -> PolicyResult<()> {
        let reference = resource.reference();

        if let Some(raw) = resource.tag(DEPENDS_ON) {
            match ResourceRef::parse(raw) {
                Some(dependency) => {
                    debug!(
                        resource = %reference,
                        dependency = %dependency,
                        "checking dependency before start"
                    );
                    self.ensure_started(&dependency, visited).await?;
                    debug!(resource = %reference, "dependency check complete");
                }
                None => {
                    warn!(
                        resource = %reference,
                        dependency = %raw,
                        "invalid reference format for dependency, skipping dependency check"
                    );
                }
            }
        }

        self.actuator.start(&reference).await?;
        self.actuator
            .clear_start_flag(&reference, &resource.tags)
            .await?;
        Ok(())
    }
}

fn visited_summary(visited: &VisitedSet) -> String {
    let mut ids: Vec<&str> = visited.iter().map(ResourceRef::id).collect();
    ids.sort_unstable();
    ids.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodekeeper_core::tags::TO_BE_STARTED;
    use nodekeeper_core::{GroupCapacity, LifecycleState, Tags};
    use nodekeeper_state::{InventoryStore, JournalOp};

    fn arn(kind: ResourceKind, id: &str) -> String {
        ResourceRef::format_arn(kind, "us-east-1", "123456789012", id)
    }

    fn resource(kind: ResourceKind, id: &str, state: LifecycleState, tags: &[(&str, &str)]) -> ManagedResource {
        let desired_capacity = (kind == ResourceKind::ScalingGroup)
            .then_some(if state == LifecycleState::Running { 2 } else { 0 });
        ManagedResource {
            id: id.to_string(),
            kind,
            arn: arn(kind, id),
            state,
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Tags>(),
            launched_at: None,
            desired_capacity,
        }
    }

    fn resolver(store: &InventoryStore) -> DependencyResolver {
        let provider: Arc<dyn ResourceProvider> = Arc::new(store.clone());
        let actuator = Actuator::new(provider.clone(), GroupCapacity { desired: 1, min_size: 1 });
        DependencyResolver::new(provider, actuator)
    }

    fn ops(store: &InventoryStore) -> Vec<(String, JournalOp)> {
        store
            .list_journal()
            .unwrap()
            .into_iter()
            .map(|e| (e.resource_id, e.op))
            .collect()
    }

    #[tokio::test]
    async fn starts_dependency_before_dependent() {
        let store = InventoryStore::open_in_memory().unwrap();
        let db_arn = arn(ResourceKind::DatabaseInstance, "orders-db");
        let app = resource(
            ResourceKind::ComputeInstance,
            "i-app",
            LifecycleState::Stopped,
            &[(DEPENDS_ON, db_arn.as_str()), (TO_BE_STARTED, "true")],
        );
        store.put_resource(&app).unwrap();
        store
            .put_resource(&resource(
                ResourceKind::DatabaseInstance,
                "orders-db",
                LifecycleState::Stopped,
                &[],
            ))
            .unwrap();

        resolver(&store).start_with_dependencies(&app).await.unwrap();

        assert_eq!(
            ops(&store),
            vec![
                ("orders-db".to_string(), JournalOp::Start),
                ("i-app".to_string(), JournalOp::Start),
                (
                    "i-app".to_string(),
                    JournalOp::RemoveTag {
                        key: TO_BE_STARTED.to_string()
                    }
                ),
            ]
        );
    }

    #[tokio::test]
    async fn running_dependency_is_not_restarted() {
        let store = InventoryStore::open_in_memory().unwrap();
        let db_arn = arn(ResourceKind::DatabaseCluster, "aurora");
        let app = resource(
            ResourceKind::ComputeInstance,
            "i-app",
            LifecycleState::Stopped,
            &[(DEPENDS_ON, db_arn.as_str())],
        );
        store.put_resource(&app).unwrap();
        store
            .put_resource(&resource(
                ResourceKind::DatabaseCluster,
                "aurora",
                LifecycleState::Running,
                &[],
            ))
            .unwrap();

        resolver(&store).start_with_dependencies(&app).await.unwrap();

        assert_eq!(ops(&store), vec![("i-app".to_string(), JournalOp::Start)]);
    }

    #[tokio::test]
    async fn transitioning_dependency_is_neither_started_nor_fatal() {
        let store = InventoryStore::open_in_memory().unwrap();
        let db_arn = arn(ResourceKind::DatabaseInstance, "orders-db");
        let app = resource(
            ResourceKind::ComputeInstance,
            "i-app",
            LifecycleState::Stopped,
            &[(DEPENDS_ON, db_arn.as_str())],
        );
        store.put_resource(&app).unwrap();
        store
            .put_resource(&resource(
                ResourceKind::DatabaseInstance,
                "orders-db",
                LifecycleState::Transitioning,
                &[],
            ))
            .unwrap();

        resolver(&store).start_with_dependencies(&app).await.unwrap();

        assert_eq!(ops(&store), vec![("i-app".to_string(), JournalOp::Start)]);
    }

    #[tokio::test]
    async fn transitive_chain_starts_deepest_first() {
        let store = InventoryStore::open_in_memory().unwrap();
        let c_arn = arn(ResourceKind::DatabaseInstance, "c");
        let b_arn = arn(ResourceKind::ScalingGroup, "b");
        let a = resource(
            ResourceKind::ComputeInstance,
            "a",
            LifecycleState::Stopped,
            &[(DEPENDS_ON, b_arn.as_str())],
        );
        store.put_resource(&a).unwrap();
        store
            .put_resource(&resource(
                ResourceKind::ScalingGroup,
                "b",
                LifecycleState::Stopped,
                &[(DEPENDS_ON, c_arn.as_str())],
            ))
            .unwrap();
        store
            .put_resource(&resource(ResourceKind::DatabaseInstance, "c", LifecycleState::Stopped, &[]))
            .unwrap();

        resolver(&store).start_with_dependencies(&a).await.unwrap();

        assert_eq!(
            ops(&store),
            vec![
                ("c".to_string(), JournalOp::Start),
                (
                    "b".to_string(),
                    JournalOp::SetCapacity {
                        desired: 1,
                        min_size: 1
                    }
                ),
                ("a".to_string(), JournalOp::Start),
            ]
        );
    }

    #[tokio::test]
    async fn cycle_terminates_and_starts_each_member_once() {
        let store = InventoryStore::open_in_memory().unwrap();
        let a_arn = arn(ResourceKind::ComputeInstance, "a");
        let b_arn = arn(ResourceKind::ComputeInstance, "b");
        let c_arn = arn(ResourceKind::ComputeInstance, "c");
        let a = resource(
            ResourceKind::ComputeInstance,
            "a",
            LifecycleState::Stopped,
            &[(DEPENDS_ON, b_arn.as_str())],
        );
        store.put_resource(&a).unwrap();
        store
            .put_resource(&resource(
                ResourceKind::ComputeInstance,
                "b",
                LifecycleState::Stopped,
                &[(DEPENDS_ON, c_arn.as_str())],
            ))
            .unwrap();
        store
            .put_resource(&resource(
                ResourceKind::ComputeInstance,
                "c",
                LifecycleState::Stopped,
                &[(DEPENDS_ON, a_arn.as_str())],
            ))
            .unwrap();

        resolver(&store).start_with_dependencies(&a).await.unwrap();

        assert_eq!(
            ops(&store),
            vec![
                ("c".to_string(), JournalOp::Start),
                ("b".to_string(), JournalOp::Start),
                ("a".to_string(), JournalOp::Start),
            ]
        );
    }

    #[tokio::test]
    async fn self_dependency_is_a_trivial_cycle() {
        let store = InventoryStore::open_in_memory().unwrap();
        let a_arn = arn(ResourceKind::DatabaseInstance, "a");
        let a = resource(
            ResourceKind::DatabaseInstance,
            "a",
            LifecycleState::Stopped,
            &[(DEPENDS_ON, a_arn.as_str())],
        );
        store.put_resource(&a).unwrap();

        resolver(&store).start_with_dependencies(&a).await.unwrap();
        assert_eq!(ops(&store), vec![("a".to_string(), JournalOp::Start)]);
    }

    #[tokio::test]
    async fn missing_dependency_fails_closed() {
        let store = InventoryStore::open_in_memory().unwrap();
        let ghost = arn(ResourceKind::DatabaseInstance, "ghost");
        let app = resource(
            ResourceKind::ComputeInstance,
            "i-app",
            LifecycleState::Stopped,
            &[(DEPENDS_ON, ghost.as_str())],
        );
        store.put_resource(&app).unwrap();

        let err = resolver(&store).start_with_dependencies(&app).await.unwrap_err();
        assert!(matches!(err, PolicyError::DependencyNotFound { .. }));
        assert!(ops(&store).is_empty());
    }

    #[tokio::test]
    async fn unparsable_reference_skips_dependency_step() {
        let store = InventoryStore::open_in_memory().unwrap();
        let app = resource(
            ResourceKind::ComputeInstance,
            "i-app",
            LifecycleState::Stopped,
            &[(DEPENDS_ON, "orders-db")],
        );
        store.put_resource(&app).unwrap();

        resolver(&store).start_with_dependencies(&app).await.unwrap();
        assert_eq!(ops(&store), vec![("i-app".to_string(), JournalOp::Start)]);
    }

    #[tokio::test]
    async fn visited_sets_are_not_shared_between_cascades() {
        let store = InventoryStore::open_in_memory().unwrap();
        let shared = arn(ResourceKind::DatabaseInstance, "shared");
        for id in ["x", "y"] {
            store
                .put_resource(&resource(
                    ResourceKind::ComputeInstance,
                    id,
                    LifecycleState::Stopped,
                    &[(DEPENDS_ON, shared.as_str())],
                ))
                .unwrap();
        }
        store
            .put_resource(&resource(
                ResourceKind::DatabaseInstance,
                "shared",
                LifecycleState::Stopped,
                &[],
            ))
            .unwrap();

        let resolver = resolver(&store);
        let x_ref = ResourceRef::parse(&arn(ResourceKind::ComputeInstance, "x")).unwrap();
        let y_ref = ResourceRef::parse(&arn(ResourceKind::ComputeInstance, "y")).unwrap();
        let x = store.get_resource(&x_ref).unwrap().unwrap();
        resolver.start_with_dependencies(&x).await.unwrap();
        let y = store.get_resource(&y_ref).unwrap().unwrap();
        resolver.start_with_dependencies(&y).await.unwrap();

        // The second cascade sees the shared dependency running, not visited.
        assert_eq!(
            ops(&store),
            vec![
                ("shared".to_string(), JournalOp::Start),
                ("x".to_string(), JournalOp::Start),
                ("y".to_string(), JournalOp::Start),
            ]
        );
    }

    #[tokio::test]
    async fn live_dependents_counts_only_running_resources() {
        let store = InventoryStore::open_in_memory().unwrap();
        let db_arn = arn(ResourceKind::DatabaseInstance, "orders-db");
        let db_ref = ResourceRef::parse(&db_arn).unwrap();
        store
            .put_resource(&resource(
                ResourceKind::ComputeInstance,
                "i-stopped",
                LifecycleState::Stopped,
                &[(DEPENDS_ON, db_arn.as_str())],
            ))
            .unwrap();
        store
            .put_resource(&resource(
                ResourceKind::ScalingGroup,
                "idle-group",
                LifecycleState::Stopped,
                &[(DEPENDS_ON, db_arn.as_str())],
            ))
            .unwrap();

        let resolver = resolver(&store);
        assert!(!resolver.has_live_dependents(&db_ref).await.unwrap());

        store
            .put_resource(&resource(
                ResourceKind::ScalingGroup,
                "web",
                LifecycleState::Running,
                &[(DEPENDS_ON, "arn:aws:rds:*:*:db:orders-db")],
            ))
            .unwrap();
        assert!(resolver.has_live_dependents(&db_ref).await.unwrap());
    }
}
