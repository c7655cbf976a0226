//! Upcoming-nodes projector (spec §4.6).
//!
//! `upcomingCount(g) = targetSize − registeredNodesInG − notStartedInG −
//! longUnregisteredInG − toBeDeletedInG`, clamped at ≥ 0. spec.md's own
//! formula prints a `+ toBeDeletedInG` but its prose ("subtracted from both
//! terms") and worked scenario S5 (`target=2, have=2`, one node draining ⇒
//! `upcomingNodes["ng5"] == 0`) only hold with a `−`; see DESIGN.md for the
//! resolution. `notStartedInG` additionally excludes draining nodes from the
//! `upcomingRegistered` listing (the other "term" the taint is subtracted
//! from) — a node about to be removed is never "upcoming".

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::config::ClusterStateRegistryConfig;
use crate::node::Node;
use crate::readiness::{classify_node, NodeBucket};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpcomingProjection {
    pub upcoming_count: u64,
    pub upcoming_registered: Vec<String>,
}

/// Projects upcoming nodes for one group. `nodes_in_group` should already be
/// filtered to this group's registered nodes; `long_unregistered_count` comes
/// from the reconciler's output for the same group.
pub fn project_upcoming(
    nodes_in_group: &[&Node],
    target_size: u64,
    long_unregistered_count: u64,
    cloud_deleted_names: &HashSet<String>,
    now: DateTime<Utc>,
    config: &ClusterStateRegistryConfig,
) -> UpcomingProjection {
    let mut registered = 0i64;
    let mut not_started = 0i64;
    let mut to_be_deleted = 0i64;
    let mut upcoming_registered = Vec::new();

    for node in nodes_in_group {
        let is_deleted = cloud_deleted_names.contains(&node.name);
        let bucket = classify_node(node, now, is_deleted, config);
        if bucket == NodeBucket::Deleted {
            continue;
        }
        registered += 1;

        let draining = node.has_taint(&config.to_be_deleted_taint_key);
        if draining {
            to_be_deleted += 1;
        }
        if bucket == NodeBucket::NotStarted {
            if !draining {
                not_started += 1;
                upcoming_registered.push(node.name.clone());
            }
        }
    }
    upcoming_registered.sort();

    let raw =
        target_size as i64 - registered - not_started - long_unregistered_count as i64 - to_be_deleted;

    UpcomingProjection {
        upcoming_count: raw.max(0) as u64,
        upcoming_registered,
    }
}
