//! Health evaluator (spec §4.5): applies thresholds to readiness data to
//! produce cluster-wide and per-group health verdicts, and gates scale-up
//! safety.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::backoff::BackoffTracker;
use crate::cloud_provider::GroupId;
use crate::config::ClusterStateRegistryConfig;
use crate::node::Node;
use crate::readiness::{classify_node, NodeBucket};
use crate::reconciler::IncorrectNodeGroupSize;

/// `unreadyCount ≤ OkTotalUnreadyCount` OR `unreadyCount / totalCount × 100 ≤
/// MaxTotalUnreadyPercentage`. `NotStarted` nodes never count as unready.
fn is_healthy_share(unready: usize, total: usize, config: &ClusterStateRegistryConfig) -> bool {
    if total == 0 {
        return true;
    }
    if unready <= config.ok_total_unready_count as usize {
        return true;
    }
    let percentage = unready as f64 / total as f64 * 100.0;
    percentage <= config.max_total_unready_percentage
}

/// Counts `Unready` nodes against `total` registered nodes cluster-wide,
/// cloud-deleted nodes excluded (they're neither ready nor pending startup,
/// they're gone) and `NotStarted` nodes excluded from the unready count only.
pub fn is_cluster_healthy(
    nodes: &[Node],
    cloud_deleted_names: &HashSet<String>,
    now: DateTime<Utc>,
    config: &ClusterStateRegistryConfig,
) -> bool {
    let (unready, total) = unready_share(nodes, None, cloud_deleted_names, now, config);
    is_healthy_share(unready, total, config)
}

/// Node group healthy iff it has no stale `IncorrectNodeGroupSize` and its
/// local unready share passes the same threshold as the cluster-wide check.
pub fn is_node_group_healthy(
    nodes: &[Node],
    node_groups: &HashMap<String, GroupId>,
    group: &GroupId,
    cloud_deleted_names: &HashSet<String>,
    incorrect_sizes: &std::collections::HashMap<GroupId, IncorrectNodeGroupSize>,
    now: DateTime<Utc>,
    config: &ClusterStateRegistryConfig,
) -> bool {
    let stale_incorrect_size = incorrect_sizes
        .get(group)
        .map(|entry| {
            (now - entry.first_observed).num_milliseconds() as f64 / 1000.0
                > config.incorrect_size_grace_period()
        })
        .unwrap_or(false);
    if stale_incorrect_size {
        return false;
    }

    let (unready, total) = unready_share(nodes, Some((node_groups, group)), cloud_deleted_names, now, config);
    is_healthy_share(unready, total, config)
}

fn unready_share(
    nodes: &[Node],
    group: Option<(&HashMap<String, GroupId>, &GroupId)>,
    cloud_deleted_names: &HashSet<String>,
    now: DateTime<Utc>,
    config: &ClusterStateRegistryConfig,
) -> (usize, usize) {
    let mut unready = 0usize;
    let mut total = 0usize;
    for node in nodes {
        if let Some((node_groups, group)) = group {
            if node_groups.get(&node.name) != Some(group) {
                continue;
            }
        }
        total += 1;
        let is_deleted = cloud_deleted_names.contains(&node.name);
        if classify_node(node, now, is_deleted, config) == NodeBucket::Unready {
            unready += 1;
        }
    }
    (unready, total)
}

/// Safe to scale up iff the group is healthy, not currently backed off, and
/// thus has no outstanding failed scale-up within the backoff window — the
/// backoff schedule *is* that window (§4.1/§4.5).
pub fn is_safe_to_scale_up(
    group_healthy: bool,
    group: &GroupId,
    now: DateTime<Utc>,
    backoff: &BackoffTracker,
) -> bool {
    group_healthy && !backoff.is_backed_off(group, now)
}
