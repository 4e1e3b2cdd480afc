//! redb table definitions for the inventory store.

use redb::TableDefinition;

/// Resource snapshots keyed by `{kind}/{id}`.
pub const RESOURCES: TableDefinition<&str, &[u8]> = TableDefinition::new("resources");

/// Load balancers keyed by ARN.
pub const LOAD_BALANCERS: TableDefinition<&str, &[u8]> = TableDefinition::new("load_balancers");

/// Metric samples keyed by `{subject}|{metric}|{epoch_millis:020}`.
pub const METRIC_SAMPLES: TableDefinition<&str, &[u8]> = TableDefinition::new("metric_samples");

/// Action journal keyed by a monotonically increasing sequence number.
pub const JOURNAL: TableDefinition<u64, &[u8]> = TableDefinition::new("journal");
