//! Readiness classifier (spec §4.2).
//!
//! Buckets the latest node snapshot into `Ready` / `Unready` / `NotStarted` /
//! `LongUnregistered` / `Deleted`. `LongUnregistered` entries are not `Node`s
//! at all (they are cloud instances the reconciler has not seen register as
//! cluster nodes within the provisioning window) and are folded in by name
//! alone; everything else is classified per-`Node`.
//!
//! Per-group time-to-ready histograms (the "optional" output in spec §4.2)
//! are accumulated by `crate::metrics` from the registry, which is the only
//! place that can compare a node's readiness across consecutive updates.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ClusterStateRegistryConfig;
use crate::node::Node;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum NodeBucket {
    Ready,
    Unready,
    NotStarted,
    Deleted,
}

/// Classifies a single registered node, top-to-bottom per spec §4.2 rules
/// 1, 3, 4, 5 (rule 2, the to-be-deleted taint, does not affect the bucket —
/// it only excuses the node from upcoming-count and scale-up-satisfaction
/// bookkeeping elsewhere).
pub fn classify_node(
    node: &Node,
    now: DateTime<Utc>,
    is_cloud_deleted: bool,
    config: &ClusterStateRegistryConfig,
) -> NodeBucket {
    if is_cloud_deleted {
        return NodeBucket::Deleted;
    }

    let within_startup_window = node.age_seconds(now) <= config.max_node_startup_time;
    if !node.is_ready() && within_startup_window && node.has_taint(&config.not_ready_taint_key) {
        return NodeBucket::NotStarted;
    }

    if node.is_ready() {
        NodeBucket::Ready
    } else {
        NodeBucket::Unready
    }
}

/// Disjoint partition of the observed node set, the façade's
/// `GetClusterReadiness()` return value.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReadinessReport {
    pub ready: Vec<String>,
    pub unready: Vec<String>,
    pub not_started: Vec<String>,
    pub long_unregistered: Vec<String>,
    pub deleted: Vec<String>,
}

impl ReadinessReport {
    /// Count of nodes that count against health thresholds: `Unready` nodes
    /// only — `NotStarted` is explicitly excluded (spec §4.5).
    pub fn unready_count_for_health(&self) -> usize {
        self.unready.len()
    }

    pub fn total_registered(&self) -> usize {
        self.ready.len() + self.unready.len() + self.not_started.len() + self.deleted.len()
    }
}

/// Classifies every node in `nodes` plus the reconciler's long-unregistered
/// instance ids into a single disjoint `ReadinessReport`.
pub fn classify_nodes(
    nodes: &[Node],
    cloud_deleted_names: &HashSet<String>,
    long_unregistered_provider_ids: &HashSet<String>,
    now: DateTime<Utc>,
    config: &ClusterStateRegistryConfig,
) -> ReadinessReport {
    let mut report = ReadinessReport::default();

    for node in nodes {
        let is_deleted = cloud_deleted_names.contains(&node.name);
        match classify_node(node, now, is_deleted, config) {
            NodeBucket::Ready => report.ready.push(node.name.clone()),
            NodeBucket::Unready => report.unready.push(node.name.clone()),
            NodeBucket::NotStarted => report.not_started.push(node.name.clone()),
            NodeBucket::Deleted => report.deleted.push(node.name.clone()),
        }
    }

    report.long_unregistered = long_unregistered_provider_ids.iter().cloned().collect();
    report.long_unregistered.sort();

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ConditionStatus, ReadyCondition, Taint};

    fn node(name: &str, age_secs: i64, ready: bool, taints: Vec<&str>) -> Node {
        let now = Utc::now();
        Node {
            name: name.to_string(),
            provider_id: Some(format!("prov-{name}")),
            creation_time: now - chrono::Duration::seconds(age_secs),
            ready: ReadyCondition {
                status: if ready {
                    ConditionStatus::True
                } else {
                    ConditionStatus::False
                },
                last_transition: now,
            },
            taints: taints.into_iter().map(Taint::new).collect(),
        }
    }

    #[test]
    fn s3_not_started_vs_unready_vs_ready() {
        let config = ClusterStateRegistryConfig {
            max_node_startup_time: 15.0 * 60.0,
            ..Default::default()
        };
        let now = Utc::now();

        // Created 10m ago, Ready=False for 4m, carries not-ready taint.
        let n = node("n1", 600, false, vec!["node.kubernetes.io/not-ready"]);
        assert_eq!(
            classify_node(&n, now, false, &config),
            NodeBucket::NotStarted
        );

        // Same node, taint removed, still Ready=False.
        let n = node("n1", 600, false, vec![]);
        assert_eq!(classify_node(&n, now, false, &config), NodeBucket::Unready);

        // Same node, now Ready=True.
        let n = node("n1", 600, true, vec![]);
        assert_eq!(classify_node(&n, now, false, &config), NodeBucket::Ready);
    }

    #[test]
    fn old_unready_node_is_never_not_started() {
        let config = ClusterStateRegistryConfig {
            max_node_startup_time: 60.0,
            ..Default::default()
        };
        let now = Utc::now();
        let n = node("n1", 3600, false, vec!["node.kubernetes.io/not-ready"]);
        assert_eq!(classify_node(&n, now, false, &config), NodeBucket::Unready);
    }

    #[test]
    fn cloud_deleted_overrides_everything() {
        let config = ClusterStateRegistryConfig::default();
        let now = Utc::now();
        let n = node("n1", 0, true, vec![]);
        assert_eq!(classify_node(&n, now, true, &config), NodeBucket::Deleted);
    }

    #[test]
    fn classify_nodes_partitions_disjointly() {
        let config = ClusterStateRegistryConfig::default();
        let now = Utc::now();
        let nodes = vec![
            node("ready1", 1000, true, vec![]),
            node("unready1", 1000, false, vec![]),
            node("deleted1", 1000, true, vec![]),
        ];
        let mut deleted = HashSet::new();
        deleted.insert("deleted1".to_string());
        let mut long_unreg = HashSet::new();
        long_unreg.insert("prov-ghost".to_string());

        let report = classify_nodes(&nodes, &deleted, &long_unreg, now, &config);
        assert_eq!(report.ready, vec!["ready1"]);
        assert_eq!(report.unready, vec!["unready1"]);
        assert_eq!(report.deleted, vec!["deleted1"]);
        assert_eq!(report.long_unregistered, vec!["prov-ghost"]);
        assert_eq!(report.total_registered(), 3);
    }
}
