//! Run summary returned by one control-loop invocation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use nodekeeper_core::ResourceKind;
use nodekeeper_policy::{Action, Evaluation};
use nodekeeper_reactivate::ReactivationReport;

/// Counts for one resource kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindSummary {
    pub evaluated: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub started: usize,
    pub stopped: usize,
    pub terminated: usize,
    pub vetoed: usize,
    /// The population fetch itself failed, so nothing was evaluated.
    pub fetch_failed: bool,
}

impl KindSummary {
    pub fn record(&mut self, evaluation: &Evaluation) {
        self.evaluated += 1;
        self.succeeded += 1;
        self.vetoed += evaluation.vetoes.len();
        for action in &evaluation.actions {
            match action {
                Action::Started { .. } => self.started += 1,
                Action::Stopped { .. } => self.stopped += 1,
                Action::Terminated => self.terminated += 1,
            }
        }
    }

    pub fn record_failure(&mut self) {
        self.evaluated += 1;
        self.failed += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub kinds: BTreeMap<ResourceKind, KindSummary>,
    /// `None` when reactivation is disabled.
    pub reactivation: Option<ReactivationReport>,
}

impl Summary {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            elapsed_ms: 0,
            kinds: ResourceKind::ALL
                .into_iter()
                .map(|k| (k, KindSummary::default()))
                .collect(),
            reactivation: None,
        }
    }

    pub fn kind_mut(&mut self, kind: ResourceKind) -> &mut KindSummary {
        self.kinds.entry(kind).or_default()
    }

    pub fn kind(&self, kind: ResourceKind) -> Option<&KindSummary> {
        self.kinds.get(&kind)
    }

    pub fn evaluated(&self) -> usize {
        self.kinds.values().map(|k| k.evaluated).sum()
    }

    pub fn failed(&self) -> usize {
        self.kinds.values().map(|k| k.failed).sum()
    }

    /// True when every fetch and every evaluation succeeded.
    pub fn is_clean(&self) -> bool {
        let reactivation_failures = self.reactivation.as_ref().map_or(0, |r| r.failures);
        self.failed() == 0
            && reactivation_failures == 0
            && self.kinds.values().all(|k| !k.fetch_failed)
    }
}
