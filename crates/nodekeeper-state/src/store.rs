//! InventoryStore — redb-backed fleet inventory.
//!
//! Typed CRUD over resources, load balancers and metric samples, plus the
//! transactional mutate-and-journal path the provider implementation uses.
//! Supports on-disk and in-memory backends (the latter for tests).

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use nodekeeper_core::{ManagedResource, MetricKind, ResourceKind, ResourceRef};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe inventory backed by redb.
#[derive(Clone)]
pub struct InventoryStore {
    db: Arc<Database>,
}

impl InventoryStore {
    /// Open (or create) a persistent inventory at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "inventory opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory inventory.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory inventory opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        txn.open_table(LOAD_BALANCERS).map_err(map_err!(Table))?;
        txn.open_table(METRIC_SAMPLES).map_err(map_err!(Table))?;
        txn.open_table(JOURNAL).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Resources ──────────────────────────────────────────────────

    /// Insert or replace a resource snapshot. Not journaled.
    pub fn put_resource(&self, resource: &ManagedResource) -> StateResult<()> {
        let key = resource_key(resource.kind, &resource.id);
        let value = serde_json::to_vec(resource).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "resource stored");
        Ok(())
    }

    /// Look a resource up by kind and identifier.
    pub fn get_resource(&self, reference: &ResourceRef) -> StateResult<Option<ManagedResource>> {
        let key = resource_key(reference.kind(), reference.id());
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let resource: ManagedResource =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(resource))
            }
            None => Ok(None),
        }
    }

    /// List every resource of one kind, in key order.
    pub fn list_resources_by_kind(&self, kind: ResourceKind) -> StateResult<Vec<ManagedResource>> {
        let prefix = format!("{kind}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let resource: ManagedResource =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(resource);
            }
        }
        Ok(results)
    }

    /// Delete a resource. Returns true if it existed.
    pub fn delete_resource(&self, reference: &ResourceRef) -> StateResult<bool> {
        let key = resource_key(reference.kind(), reference.id());
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "resource deleted");
        Ok(existed)
    }

    /// Apply `change` to a stored resource and journal `op`, atomically.
    ///
    /// If `change` fails nothing is written.
    pub(crate) fn mutate_resource<F>(&self, reference: &ResourceRef, op: JournalOp, change: F) -> StateResult<()>
    where
        F: FnOnce(&mut ManagedResource) -> StateResult<()>,
    {
        let key = resource_key(reference.kind(), reference.id());
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let resource = {
            let mut table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            let raw = table
                .get(key.as_str())
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_vec())
                .ok_or_else(|| StateError::NotFound(key.clone()))?;
            let mut resource: ManagedResource =
                serde_json::from_slice(&raw).map_err(map_err!(Deserialize))?;

            change(&mut resource)?;

            let value = serde_json::to_vec(&resource).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            resource
        };
        let seq = {
            let mut journal = txn.open_table(JOURNAL).map_err(map_err!(Table))?;
            let seq = journal
                .last()
                .map_err(map_err!(Read))?
                .map_or(1, |(k, _)| k.value() + 1);
            let entry = JournalEntry {
                seq,
                at: Utc::now(),
                kind: resource.kind,
                resource_id: resource.id.clone(),
                arn: resource.arn.clone(),
                op,
            };
            let value = serde_json::to_vec(&entry).map_err(map_err!(Serialize))?;
            journal
                .insert(seq, value.as_slice())
                .map_err(map_err!(Write))?;
            seq
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, seq, "resource mutated");
        Ok(())
    }

    // ── Load balancers ─────────────────────────────────────────────

    pub fn put_load_balancer(&self, record: &LoadBalancerRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(LOAD_BALANCERS).map_err(map_err!(Table))?;
            table
                .insert(record.arn.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(arn = %record.arn, "load balancer stored");
        Ok(())
    }

    pub fn get_load_balancer(&self, arn: &str) -> StateResult<Option<LoadBalancerRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(LOAD_BALANCERS).map_err(map_err!(Table))?;
        match table.get(arn).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: LoadBalancerRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub fn list_load_balancer_records(&self) -> StateResult<Vec<LoadBalancerRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(LOAD_BALANCERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: LoadBalancerRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    // ── Metric samples ─────────────────────────────────────────────

    pub fn put_sample(&self, sample: &MetricSample) -> StateResult<()> {
        let key = sample.table_key();
        let value = serde_json::to_vec(sample).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(METRIC_SAMPLES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Samples of one series with `since <= at <= until`, oldest first.
    pub fn list_samples(
        &self,
        subject: &str,
        metric: MetricKind,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StateResult<Vec<MetricSample>> {
        let prefix = MetricSample::series_prefix(subject, metric);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(METRIC_SAMPLES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                continue;
            }
            let sample: MetricSample =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if sample.at >= since && sample.at <= until {
                results.push(sample);
            }
        }
        Ok(results)
    }

    // ── Journal ────────────────────────────────────────────────────

    /// Every journaled call, in the order it was issued.
    pub fn list_journal(&self) -> StateResult<Vec<JournalEntry>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(JOURNAL).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let entry: JournalEntry =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(entry);
        }
        Ok(results)
    }

    // ── Import ─────────────────────────────────────────────────────

    /// Load a fleet description, replacing records with the same keys.
    pub fn import(&self, fleet: &Fleet) -> StateResult<ImportReport> {
        for resource in &fleet.resources {
            self.put_resource(resource)?;
        }
        for record in &fleet.load_balancers {
            self.put_load_balancer(record)?;
        }
        for sample in &fleet.samples {
            self.put_sample(sample)?;
        }
        let report = ImportReport {
            resources: fleet.resources.len(),
            load_balancers: fleet.load_balancers.len(),
            samples: fleet.samples.len(),
        };
        debug!(?report, "fleet imported");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use nodekeeper_core::{LifecycleState, Tags};

    fn compute(id: &str, state: LifecycleState) -> ManagedResource {
        ManagedResource {
            id: id.to_string(),
            kind: ResourceKind::ComputeInstance,
            arn: ResourceRef::format_arn(ResourceKind::ComputeInstance, "us-east-1", "123456789012", id),
            state,
            tags: Tags::new(),
            launched_at: None,
            desired_capacity: None,
        }
    }

    #[test]
    fn resource_put_and_get() {
        let store = InventoryStore::open_in_memory().unwrap();
        let r = compute("i-1", LifecycleState::Running);
        store.put_resource(&r).unwrap();

        assert_eq!(store.get_resource(&r.reference()).unwrap(), Some(r));
    }

    #[test]
    fn lookup_ignores_reference_spelling() {
        let store = InventoryStore::open_in_memory().unwrap();
        let r = compute("i-1", LifecycleState::Running);
        store.put_resource(&r).unwrap();

        let other_region = ResourceRef::parse("arn:aws:ec2:eu-west-1:999:instance/i-1").unwrap();
        assert!(store.get_resource(&other_region).unwrap().is_some());
    }

    #[test]
    fn list_by_kind_filters_other_kinds() {
        let store = InventoryStore::open_in_memory().unwrap();
        store.put_resource(&compute("i-1", LifecycleState::Running)).unwrap();
        store.put_resource(&compute("i-2", LifecycleState::Stopped)).unwrap();
        let mut db = compute("db-1", LifecycleState::Stopped);
        db.kind = ResourceKind::DatabaseInstance;
        store.put_resource(&db).unwrap();

        assert_eq!(store.list_resources_by_kind(ResourceKind::ComputeInstance).unwrap().len(), 2);
        assert_eq!(store.list_resources_by_kind(ResourceKind::DatabaseInstance).unwrap().len(), 1);
        assert!(store.list_resources_by_kind(ResourceKind::ScalingGroup).unwrap().is_empty());
    }

    #[test]
    fn delete_resource() {
        let store = InventoryStore::open_in_memory().unwrap();
        let r = compute("i-1", LifecycleState::Running);
        store.put_resource(&r).unwrap();

        assert!(store.delete_resource(&r.reference()).unwrap());
        assert!(!store.delete_resource(&r.reference()).unwrap());
        assert!(store.get_resource(&r.reference()).unwrap().is_none());
    }

    #[test]
    fn mutation_is_journaled_with_increasing_sequence() {
        let store = InventoryStore::open_in_memory().unwrap();
        let r = compute("i-1", LifecycleState::Stopped);
        store.put_resource(&r).unwrap();

        for op in [JournalOp::Start, JournalOp::Stop] {
            store
                .mutate_resource(&r.reference(), op, |_| Ok(()))
                .unwrap();
        }

        let journal = store.list_journal().unwrap();
        assert_eq!(journal.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(journal[0].op, JournalOp::Start);
        assert_eq!(journal[1].resource_id, "i-1");
    }

    #[test]
    fn failed_mutation_writes_nothing() {
        let store = InventoryStore::open_in_memory().unwrap();
        let r = compute("i-1", LifecycleState::Stopped);
        store.put_resource(&r).unwrap();

        let result = store.mutate_resource(&r.reference(), JournalOp::Start, |res| {
            res.state = LifecycleState::Running;
            Err(StateError::Unsupported {
                operation: "start",
                kind: "test".to_string(),
            })
        });

        assert!(result.is_err());
        assert!(store.list_journal().unwrap().is_empty());
        assert_eq!(
            store.get_resource(&r.reference()).unwrap().unwrap().state,
            LifecycleState::Stopped
        );
    }

    #[test]
    fn mutating_missing_resource_is_not_found() {
        let store = InventoryStore::open_in_memory().unwrap();
        let r = compute("i-ghost", LifecycleState::Stopped);
        let err = store
            .mutate_resource(&r.reference(), JournalOp::Start, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[test]
    fn samples_are_windowed() {
        let store = InventoryStore::open_in_memory().unwrap();
        let r = compute("i-1", LifecycleState::Running);
        let now = Utc.with_ymd_and_hms(2024, 6, 11, 2, 0, 0).unwrap();
        for minutes in [0, 10, 30, 90] {
            store
                .put_sample(&MetricSample::for_resource(
                    &r.reference(),
                    MetricKind::CpuUtilization,
                    now - Duration::minutes(minutes),
                    1.0,
                ))
                .unwrap();
        }
        store
            .put_sample(&MetricSample::for_resource(
                &r.reference(),
                MetricKind::NetworkIn,
                now,
                1.0,
            ))
            .unwrap();

        let key = resource_key(r.kind, &r.id);
        let samples = store
            .list_samples(&key, MetricKind::CpuUtilization, now - Duration::minutes(30), now)
            .unwrap();
        assert_eq!(samples.len(), 3);
        assert!(samples.windows(2).all(|w| w[0].at <= w[1].at));
    }

    #[test]
    fn import_writes_every_section() {
        let store = InventoryStore::open_in_memory().unwrap();
        let fleet = Fleet {
            resources: vec![compute("i-1", LifecycleState::Running)],
            load_balancers: vec![LoadBalancerRecord {
                arn: "arn:aws:elasticloadbalancing:us-east-1:1:loadbalancer/app/web/1".to_string(),
                name: "web".to_string(),
                targets: vec![TargetRecord {
                    id: "i-1".to_string(),
                    healthy: true,
                }],
            }],
            samples: Vec::new(),
        };

        let report = store.import(&fleet).unwrap();
        assert_eq!(report.resources, 1);
        assert_eq!(report.load_balancers, 1);
        assert_eq!(store.list_load_balancer_records().unwrap(), fleet.load_balancers);
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.redb");
        let r = compute("i-1", LifecycleState::Stopped);

        {
            let store = InventoryStore::open(&path).unwrap();
            store.put_resource(&r).unwrap();
            store
                .mutate_resource(&r.reference(), JournalOp::Start, |_| Ok(()))
                .unwrap();
        }

        let store = InventoryStore::open(&path).unwrap();
        assert!(store.get_resource(&r.reference()).unwrap().is_some());
        assert_eq!(store.list_journal().unwrap().len(), 1);
    }
}
