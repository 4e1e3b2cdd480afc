//! Idle classification over stored metric samples.
//!
//! Each metric has its own rule. Datapoints are one per reporting period
//! (five minutes), so the minimum counts mean "at least half an hour of
//! data" for compute and "at least a quarter hour" for databases.
//!
//! | Metric | Datapoints | Idle when |
//! |---|---|---|
//! | network in (sum) | more than 5 | every value ≤ threshold |
//! | CPU (average) | more than 5 | every value < threshold |
//! | DB connections (maximum) | more than 2 | any value ≤ threshold |
//!
//! Load-balancer request counts are summed by `request_count` and never
//! classified here.

use nodekeeper_core::MetricKind;

const MIN_COMPUTE_DATAPOINTS: usize = 6;
const MIN_DATABASE_DATAPOINTS: usize = 3;

/// Decide whether `values`, all inside the query window, read as idle.
pub fn classify(metric: MetricKind, values: &[f64], threshold: f64) -> bool {
    match metric {
        MetricKind::NetworkIn => {
            values.len() >= MIN_COMPUTE_DATAPOINTS && values.iter().all(|v| *v <= threshold)
        }
        MetricKind::CpuUtilization => {
            values.len() >= MIN_COMPUTE_DATAPOINTS && values.iter().all(|v| *v < threshold)
        }
        MetricKind::DatabaseConnections => {
            values.len() >= MIN_DATABASE_DATAPOINTS && values.iter().any(|v| *v <= threshold)
        }
        MetricKind::RequestCount => false,
    }
}
