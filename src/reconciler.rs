//! Reconciler (spec §4.4): cross-references the cloud-provider instance list
//! against the cluster-side node list, per node group.
//!
//! Walks each group's instance list against the attributed cluster-side
//! nodes and tracks sticky, cross-cycle reconciliation state: unregistered
//! instances, cloud-side deletions, and incorrect-size mismatches.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;

use crate::cloud_provider::{CloudProvider, CloudProviderError, GroupId};
use crate::config::ClusterStateRegistryConfig;
use crate::node::Node;

/// A cloud instance with no matching cluster-side node yet.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UnregisteredNode {
    pub provider_id: String,
    pub group: GroupId,
    pub first_seen: DateTime<Utc>,
    /// Set once the provisioning window has expired. See SPEC_FULL.md §C.1:
    /// long-unregistered nodes are excluded from upcoming counts but remain
    /// listed here rather than being removed from this report.
    pub is_long_unregistered: bool,
}

/// Sticky record of a node group whose registered size does not match its
/// target. `first_observed` only moves forward when the mismatch itself
/// changes (spec §3 invariant).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IncorrectNodeGroupSize {
    pub expected: u64,
    pub current: u64,
    pub first_observed: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub cloud_deleted_names: HashSet<String>,
    pub unregistered: Vec<UnregisteredNode>,
    pub long_unregistered_provider_ids: HashSet<String>,
    pub incorrect_sizes: HashMap<GroupId, IncorrectNodeGroupSize>,
    pub registered_counts: HashMap<GroupId, u64>,
    pub target_sizes: HashMap<GroupId, u64>,
    /// Groups for which cloud-deletion detection degraded to taint-based
    /// inference this cycle (provider instances unavailable).
    pub degraded_groups: HashSet<GroupId>,
    /// Attribution of every observed node to its owning group, resolved via
    /// `CloudProvider::node_group_for_node` (spec §6). Nodes absent from this
    /// map are unattributed input.
    pub node_groups: HashMap<String, GroupId>,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    unregistered: HashMap<String, (GroupId, DateTime<Utc>)>,
    cloud_deleted: HashMap<String, DateTime<Utc>>,
    /// Subset of `cloud_deleted` keys that were inferred from the to-be-deleted
    /// taint rather than confirmed by the cloud provider's instance list —
    /// these are dropped the moment the taint is no longer present, since the
    /// taint was the only evidence for them.
    degraded_deleted: HashSet<String>,
    incorrect_sizes: HashMap<GroupId, IncorrectNodeGroupSize>,
    instance_cache: HashMap<GroupId, Vec<crate::cloud_provider::Instance>>,
    invalidated: HashSet<GroupId>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate_node_instances_cache_entry(&mut self, group: &GroupId) {
        self.invalidated.insert(group.clone());
    }

    pub fn cloud_provider_deleted_node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cloud_deleted.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn incorrect_node_group_sizes(&self) -> &HashMap<GroupId, IncorrectNodeGroupSize> {
        &self.incorrect_sizes
    }

    /// Runs one reconciliation pass. Must be called before scale-request
    /// aging within the same `UpdateNodes` (spec §4.4 ordering note).
    pub fn reconcile(
        &mut self,
        nodes: &[Node],
        cloud_provider: &dyn CloudProvider,
        now: DateTime<Utc>,
        config: &ClusterStateRegistryConfig,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        let groups = cloud_provider.node_groups();

        let node_groups: HashMap<String, GroupId> = nodes
            .iter()
            .filter_map(|n| cloud_provider.node_group_for_node(n).map(|g| (n.name.clone(), g)))
            .collect();

        for group_handle in &groups {
            let group = group_handle.id();
            let registered: Vec<&Node> = nodes
                .iter()
                .filter(|n| node_groups.get(&n.name) == Some(&group))
                .collect();
            outcome
                .registered_counts
                .insert(group.clone(), registered.len() as u64);
            outcome
                .target_sizes
                .insert(group.clone(), group_handle.target_size());

            let instances = self.fetch_instances(&group, group_handle.as_ref(), &mut outcome);

            if let Some(instances) = instances {
                let provider_ids_present: HashSet<&str> =
                    instances.iter().map(|i| i.provider_id.as_str()).collect();

                self.reconcile_unregistered(&group, &registered, &provider_ids_present, now, config, &mut outcome);
                self.reconcile_cloud_deleted(&registered, &provider_ids_present, now);
            } else {
                self.reconcile_cloud_deleted_degraded(&registered, config, now);
            }

            self.reconcile_incorrect_size(&group, registered.len() as u64, group_handle.target_size(), now);
        }

        // A node leaves the deleted set only when the cluster-side listing no
        // longer contains it (spec §4.4), independent of per-group instance
        // availability.
        let present_names: HashSet<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        self.cloud_deleted.retain(|name, _| present_names.contains(name.as_str()));
        self.degraded_deleted.retain(|name| present_names.contains(name.as_str()));

        outcome.cloud_deleted_names = self.cloud_deleted.keys().cloned().collect();
        outcome.incorrect_sizes = self.incorrect_sizes.clone();
        outcome.node_groups = node_groups;

        outcome
    }

    fn fetch_instances(
        &mut self,
        group: &GroupId,
        group_handle: &dyn crate::cloud_provider::NodeGroup,
        outcome: &mut ReconcileOutcome,
    ) -> Option<Vec<crate::cloud_provider::Instance>> {
        let needs_fetch = self.invalidated.remove(group) || !self.instance_cache.contains_key(group);
        if !needs_fetch {
            return self.instance_cache.get(group).cloned();
        }

        match group_handle.instances() {
            Ok(list) => {
                self.instance_cache.insert(group.clone(), list.clone());
                Some(list)
            }
            Err(CloudProviderError::NotImplemented) => {
                warn!(
                    "node group {group} does not implement instances(); cloud-deletion detection degraded to taint-based inference"
                );
                self.instance_cache.remove(group);
                outcome.degraded_groups.insert(group.clone());
                None
            }
            Err(CloudProviderError::Transient(msg)) => {
                warn!("transient error listing instances for node group {group}: {msg}; preserving previous state");
                self.instance_cache.get(group).cloned()
            }
        }
    }

    fn reconcile_unregistered(
        &mut self,
        group: &GroupId,
        registered: &[&Node],
        provider_ids_present: &HashSet<&str>,
        now: DateTime<Utc>,
        config: &ClusterStateRegistryConfig,
        outcome: &mut ReconcileOutcome,
    ) {
        let registered_provider_ids: HashSet<&str> = registered
            .iter()
            .filter_map(|n| n.provider_id.as_deref())
            .collect();

        // Drop unregistered entries for provider ids the cloud provider no
        // longer lists at all.
        self.unregistered
            .retain(|provider_id, _| provider_ids_present.contains(provider_id.as_str()));

        for provider_id in provider_ids_present {
            if registered_provider_ids.contains(provider_id) {
                continue;
            }
            let entry = self
                .unregistered
                .entry((*provider_id).to_string())
                .or_insert((group.clone(), now));
            let first_seen = entry.1;
            let is_long_unregistered =
                (now - first_seen).num_milliseconds() as f64 / 1000.0 > config.max_node_provision_time;

            if is_long_unregistered {
                outcome
                    .long_unregistered_provider_ids
                    .insert((*provider_id).to_string());
            }
            outcome.unregistered.push(UnregisteredNode {
                provider_id: (*provider_id).to_string(),
                group: group.clone(),
                first_seen,
                is_long_unregistered,
            });
        }
    }

    fn reconcile_cloud_deleted(
        &mut self,
        registered: &[&Node],
        provider_ids_present: &HashSet<&str>,
        now: DateTime<Utc>,
    ) {
        for node in registered {
            let Some(provider_id) = node.provider_id.as_deref() else {
                continue;
            };
            if provider_ids_present.contains(provider_id) {
                continue;
            }
            self.cloud_deleted.entry(node.name.clone()).or_insert(now);
            self.degraded_deleted.remove(&node.name);
        }
    }

    /// Taint-based fallback for cloud-deletion detection when the provider
    /// can't enumerate instances (spec §7 "provider unsupported",
    /// SPEC_FULL.md §C.2): a registered node carrying the to-be-deleted taint
    /// is presumed deleted, since the only confirmation path — the instance
    /// list — is unavailable. The presumption is withdrawn the moment the
    /// taint is removed, as it's the sole evidence behind it.
    fn reconcile_cloud_deleted_degraded(
        &mut self,
        registered: &[&Node],
        config: &ClusterStateRegistryConfig,
        now: DateTime<Utc>,
    ) {
        for node in registered {
            if node.has_taint(&config.to_be_deleted_taint_key) {
                self.cloud_deleted.entry(node.name.clone()).or_insert(now);
                self.degraded_deleted.insert(node.name.clone());
            } else if self.degraded_deleted.remove(&node.name) {
                self.cloud_deleted.remove(&node.name);
            }
        }
    }

    fn reconcile_incorrect_size(
        &mut self,
        group: &GroupId,
        current: u64,
        expected: u64,
        now: DateTime<Utc>,
    ) {
        if current == expected {
            self.incorrect_sizes.remove(group);
            return;
        }

        match self.incorrect_sizes.get_mut(group) {
            Some(existing) if existing.expected == expected && existing.current == current => {
                // Unchanged mismatch: first_observed stays put (spec §3 invariant).
            }
            _ => {
                self.incorrect_sizes.insert(
                    group.clone(),
                    IncorrectNodeGroupSize {
                        expected,
                        current,
                        first_observed: now,
                    },
                );
            }
        }
    }
}
