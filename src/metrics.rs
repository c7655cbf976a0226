//! Per-node-group time-to-ready histograms (spec §4.2, "optional" output).
//!
//! Each group accumulates an `Estimator` over the seconds each of its nodes
//! took to become ready.

use std::collections::HashMap;

use average::{concatenate, Estimate, Max, Mean, Min, Variance};

use crate::cloud_provider::GroupId;

concatenate!(
    Estimator,
    [Min, min],
    [Max, max],
    [Mean, mean],
    [Variance, population_variance]
);

#[derive(Debug, Default)]
pub struct TimeToReadyStats {
    estimator: Estimator,
    count: u64,
}

impl TimeToReadyStats {
    fn add(&mut self, seconds: f64) {
        self.estimator.add(seconds);
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> f64 {
        self.estimator.min()
    }

    pub fn max(&self) -> f64 {
        self.estimator.max()
    }

    pub fn mean(&self) -> f64 {
        self.estimator.mean()
    }

    pub fn population_variance(&self) -> f64 {
        self.estimator.population_variance()
    }
}

/// Accumulates, per node group, how long each node took from `creationTime`
/// to first observed `Ready=True`. Fed a node at most once per transition by
/// the registry, which is the only caller positioned to compare consecutive
/// snapshots.
#[derive(Debug, Default)]
pub struct TimeToReadyCollector {
    stats: HashMap<GroupId, TimeToReadyStats>,
    seen_ready: std::collections::HashSet<String>,
}

impl TimeToReadyCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a node's time-to-ready the first time it is observed ready.
    /// Subsequent calls for the same node name are no-ops.
    pub fn record_ready(&mut self, node_name: &str, group: &GroupId, seconds: f64) {
        if !self.seen_ready.insert(node_name.to_string()) {
            return;
        }
        self.stats.entry(group.clone()).or_default().add(seconds);
    }

    pub fn stats_for(&self, group: &GroupId) -> Option<&TimeToReadyStats> {
        self.stats.get(group)
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupId> {
        self.stats.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_time_to_ready_once_per_node() {
        let mut collector = TimeToReadyCollector::new();
        let group = GroupId::from("ng1");
        collector.record_ready("ng1-1", &group, 30.0);
        collector.record_ready("ng1-1", &group, 999.0); // ignored, already seen
        collector.record_ready("ng1-2", &group, 90.0);

        let stats = collector.stats_for(&group).unwrap();
        assert_eq!(stats.count(), 2);
        assert_eq!(stats.min(), 30.0);
        assert_eq!(stats.max(), 90.0);
    }

    #[test]
    fn unknown_group_has_no_stats() {
        let collector = TimeToReadyCollector::new();
        assert!(collector.stats_for(&GroupId::from("ghost")).is_none());
    }
}
