//! Registry façade (spec §4.8): the external API and its lock discipline.
//!
//! A single struct owning every other component, wrapped in an `RwLock`
//! (spec §5: one writer, many concurrent readers).

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use log::info;

use crate::backoff::BackoffTracker;
use crate::cloud_provider::{CloudProvider, GroupId};
use crate::config::ClusterStateRegistryConfig;
use crate::error::{CsrError, Result};
use crate::health::{is_cluster_healthy, is_node_group_healthy, is_safe_to_scale_up};
use crate::metrics::TimeToReadyCollector;
use crate::node::{Node, Pod};
use crate::readiness::{classify_nodes, ReadinessReport};
use crate::reconciler::{IncorrectNodeGroupSize, ReconcileOutcome, Reconciler, UnregisteredNode};
use crate::scale_requests::{
    ScaleDownRequest, ScaleRequestLedger, ScaleUpFailure, ScaleUpFailureReason,
};
use crate::status::{GroupStatusInput, ScaleDownCandidates, Status, StatusPublisher};
use crate::upcoming::{project_upcoming, UpcomingProjection};

struct Inner {
    config: ClusterStateRegistryConfig,
    cloud_provider: Box<dyn CloudProvider>,
    nodes: Vec<Node>,
    reconciler: Reconciler,
    backoff: BackoffTracker,
    ledger: ScaleRequestLedger,
    time_to_ready: TimeToReadyCollector,
    scale_down_candidates: ScaleDownCandidates,
    status_publisher: StatusPublisher,
    readiness: ReadinessReport,
    last_reconcile: ReconcileOutcome,
}

/// The cluster state registry: the single authority reconciling orchestrator
/// nodes, cloud-provider instances, and the autoscaler's own scale requests
/// into one consistent view (spec §1).
pub struct ClusterStateRegistry {
    inner: RwLock<Inner>,
}

impl ClusterStateRegistry {
    pub fn new(config: ClusterStateRegistryConfig, cloud_provider: Box<dyn CloudProvider>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: RwLock::new(Inner {
                config,
                cloud_provider,
                nodes: Vec::new(),
                reconciler: Reconciler::new(),
                backoff: BackoffTracker::new(),
                ledger: ScaleRequestLedger::new(),
                time_to_ready: TimeToReadyCollector::new(),
                scale_down_candidates: ScaleDownCandidates::new(),
                status_publisher: StatusPublisher::new(),
                readiness: ReadinessReport::default(),
                last_reconcile: ReconcileOutcome::default(),
            }),
        })
    }

    /// `UpdateNodes(nodes, pods, now)` (spec §4.8). Takes the write lock for
    /// its entire body (spec §5): reconciliation, then scale-request aging,
    /// then readiness classification, all observe one consistent snapshot.
    pub fn update_nodes(
        &self,
        nodes: Option<&[Node]>,
        pods: Option<&[Pod]>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let nodes = nodes.ok_or(CsrError::NilNodeList)?;
        pods.ok_or(CsrError::NilPodList)?;

        let mut inner = self.inner.write().expect("registry lock poisoned");

        let outcome = inner
            .reconciler
            .reconcile(nodes, inner.cloud_provider.as_ref(), now, &inner.config);

        // Scale-request aging runs after reconciliation so newly observed
        // nodes can satisfy pending requests before a timeout is declared
        // (spec §4.4 ordering note).
        let mut new_ready_counts: HashMap<GroupId, u64> = HashMap::new();
        let live_groups: Vec<GroupId> = inner.ledger.live_scale_up_groups().cloned().collect();
        for group in &live_groups {
            let request_time = inner.ledger.live_scale_up(group).map(|r| r.time);
            let Some(request_time) = request_time else {
                continue;
            };
            let count = nodes
                .iter()
                .filter(|n| {
                    outcome.node_groups.get(&n.name) == Some(group)
                        && n.is_ready()
                        && n.creation_time >= request_time
                        && !n.has_taint(&inner.config.to_be_deleted_taint_key)
                })
                .count() as u64;
            new_ready_counts.insert(group.clone(), count);
        }
        let aging = inner.ledger.age(now, &new_ready_counts);
        for group in &aging.satisfied_groups {
            inner.backoff.remove_backoff(group);
        }
        let config_for_backoff = inner.config.clone();
        for failure in &aging.failures {
            inner.backoff.backoff(&failure.group, now, &config_for_backoff);
        }

        let readiness = classify_nodes(
            nodes,
            &outcome.cloud_deleted_names,
            &outcome.long_unregistered_provider_ids,
            now,
            &inner.config,
        );

        for node in nodes {
            if node.is_ready() {
                if let Some(group) = outcome.node_groups.get(&node.name) {
                    inner.time_to_ready.record_ready(&node.name, group, node.age_seconds(now));
                }
            }
        }

        info!(
            "update_nodes: {} ready, {} unready, {} not_started, {} deleted",
            readiness.ready.len(),
            readiness.unready.len(),
            readiness.not_started.len(),
            readiness.deleted.len()
        );

        inner.nodes = nodes.to_vec();
        inner.readiness = readiness;
        inner.last_reconcile = outcome;

        Ok(())
    }

    /// `UpdateScaleDownCandidates(nodes, now)`. Latches candidate groups for
    /// the next `GetStatus` call (SPEC_FULL.md §C.3); `now` is accepted for
    /// interface symmetry with the rest of the façade but not otherwise used.
    pub fn update_scale_down_candidates(&self, nodes: &[Node], _now: DateTime<Utc>) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let groups: Vec<GroupId> = nodes
            .iter()
            .filter_map(|n| inner.cloud_provider.node_group_for_node(n))
            .collect();
        inner.scale_down_candidates.update(groups);
    }

    pub fn register_or_update_scale_up(&self, group: GroupId, delta: i64, now: DateTime<Utc>) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let max_provision_time = inner.config.max_node_provision_time;
        inner
            .ledger
            .register_or_update_scale_up(group, delta, now, max_provision_time);
    }

    pub fn register_scale_down(&self, req: ScaleDownRequest) {
        self.inner
            .write()
            .expect("registry lock poisoned")
            .ledger
            .register_scale_down(req);
    }

    /// `RegisterFailedScaleUp(group, reason, now)`: an explicit failure
    /// report starts backoff immediately, same as a timed-out aging pass.
    pub fn register_failed_scale_up(
        &self,
        group: GroupId,
        reason: ScaleUpFailureReason,
        now: DateTime<Utc>,
    ) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.ledger.register_failed_scale_up(group.clone(), reason, now);
        let config = inner.config.clone();
        inner.backoff.backoff(&group, now, &config);
    }

    pub fn is_cluster_healthy(&self) -> bool {
        let inner = self.inner.read().expect("registry lock poisoned");
        is_cluster_healthy(
            &inner.nodes,
            &inner.last_reconcile.cloud_deleted_names,
            Utc::now(),
            &inner.config,
        )
    }

    pub fn is_node_group_healthy(&self, group: &GroupId) -> bool {
        let inner = self.inner.read().expect("registry lock poisoned");
        is_node_group_healthy(
            &inner.nodes,
            &inner.last_reconcile.node_groups,
            group,
            &inner.last_reconcile.cloud_deleted_names,
            &inner.last_reconcile.incorrect_sizes,
            Utc::now(),
            &inner.config,
        )
    }

    pub fn is_node_group_scaling_up(&self, group: &GroupId) -> bool {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .ledger
            .has_live_scale_up(group)
    }

    pub fn is_node_group_safe_to_scale_up(&self, group: &GroupId, now: DateTime<Utc>) -> bool {
        let inner = self.inner.read().expect("registry lock poisoned");
        let healthy = is_node_group_healthy(
            &inner.nodes,
            &inner.last_reconcile.node_groups,
            group,
            &inner.last_reconcile.cloud_deleted_names,
            &inner.last_reconcile.incorrect_sizes,
            now,
            &inner.config,
        );
        is_safe_to_scale_up(healthy, group, now, &inner.backoff)
    }

    /// `GetUpcomingNodes()` (spec §4.8, §4.6).
    pub fn get_upcoming_nodes(&self) -> (HashMap<GroupId, u64>, HashMap<GroupId, Vec<String>>) {
        let inner = self.inner.read().expect("registry lock poisoned");
        let now = Utc::now();
        let mut counts = HashMap::new();
        let mut registered = HashMap::new();

        for group in inner.last_reconcile.target_sizes.keys() {
            let target = inner.last_reconcile.target_sizes[group];
            let nodes_in_group: Vec<&Node> = inner
                .nodes
                .iter()
                .filter(|n| inner.last_reconcile.node_groups.get(&n.name) == Some(group))
                .collect();
            let long_unregistered_count = inner
                .last_reconcile
                .unregistered
                .iter()
                .filter(|u| &u.group == group && u.is_long_unregistered)
                .count() as u64;

            let UpcomingProjection {
                upcoming_count,
                upcoming_registered,
            } = project_upcoming(
                &nodes_in_group,
                target,
                long_unregistered_count,
                &inner.last_reconcile.cloud_deleted_names,
                now,
                &inner.config,
            );
            counts.insert(group.clone(), upcoming_count);
            registered.insert(group.clone(), upcoming_registered);
        }

        (counts, registered)
    }

    pub fn get_unregistered_nodes(&self) -> Vec<UnregisteredNode> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .last_reconcile
            .unregistered
            .clone()
    }

    pub fn get_cloud_provider_deleted_node_names(&self) -> Vec<String> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .reconciler
            .cloud_provider_deleted_node_names()
    }

    pub fn get_cluster_readiness(&self) -> ReadinessReport {
        self.inner.read().expect("registry lock poisoned").readiness.clone()
    }

    pub fn get_scale_up_failures(&self) -> HashMap<GroupId, Vec<ScaleUpFailure>> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .ledger
            .scale_up_failures()
            .clone()
    }

    pub fn clear_scale_up_failures(&self) {
        self.inner
            .write()
            .expect("registry lock poisoned")
            .ledger
            .clear_scale_up_failures();
    }

    /// `GetAutoscaledNodesCount()`: excludes nodes from groups the cloud
    /// provider does not currently expose (spec §4.8, §7 "input
    /// inconsistency").
    pub fn get_autoscaled_nodes_count(&self) -> (u64, u64) {
        let inner = self.inner.read().expect("registry lock poisoned");
        let current: u64 = inner.last_reconcile.registered_counts.values().sum();
        let target: u64 = inner.last_reconcile.target_sizes.values().sum();
        (current, target)
    }

    pub fn invalidate_node_instances_cache_entry(&self, group: &GroupId) {
        self.inner
            .write()
            .expect("registry lock poisoned")
            .reconciler
            .invalidate_node_instances_cache_entry(group);
    }

    pub fn incorrect_node_group_sizes(&self) -> HashMap<GroupId, IncorrectNodeGroupSize> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .last_reconcile
            .incorrect_sizes
            .clone()
    }

    /// `GetStatus(now)` (spec §4.7/§4.8). Mutates the publisher's
    /// `LastTransitionTime` bookkeeping, so it takes the write lock even
    /// though callers think of it as a read.
    pub fn get_status(&self, now: DateTime<Utc>) -> Status {
        let mut inner = self.inner.write().expect("registry lock poisoned");

        let cluster_healthy = is_cluster_healthy(
            &inner.nodes,
            &inner.last_reconcile.cloud_deleted_names,
            now,
            &inner.config,
        );
        let cluster_scaling_up = inner.ledger.has_any_live_scale_up();
        let cluster_has_candidates = inner.scale_down_candidates.any();

        let groups: Vec<GroupId> = inner.last_reconcile.target_sizes.keys().cloned().collect();
        let group_inputs: Vec<GroupStatusInput> = groups
            .into_iter()
            .map(|group| {
                let healthy = is_node_group_healthy(
                    &inner.nodes,
                    &inner.last_reconcile.node_groups,
                    &group,
                    &inner.last_reconcile.cloud_deleted_names,
                    &inner.last_reconcile.incorrect_sizes,
                    now,
                    &inner.config,
                );
                let scaling_up = inner.ledger.has_live_scale_up(&group);
                let has_scale_down_candidates = inner.scale_down_candidates.has_candidates(&group);
                GroupStatusInput {
                    group,
                    healthy,
                    scaling_up,
                    has_scale_down_candidates,
                }
            })
            .collect();

        inner.status_publisher.publish(
            cluster_healthy,
            cluster_scaling_up,
            cluster_has_candidates,
            &group_inputs,
            now,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud_provider::{CloudProviderError, Instance, NodeGroup};
    use crate::node::{ConditionStatus, ReadyCondition};

    struct FakeGroup {
        id: GroupId,
        target_size: u64,
        instances: Vec<Instance>,
    }

    impl NodeGroup for FakeGroup {
        fn id(&self) -> GroupId {
            self.id.clone()
        }
        fn min_size(&self) -> u64 {
            0
        }
        fn max_size(&self) -> u64 {
            10
        }
        fn target_size(&self) -> u64 {
            self.target_size
        }
        fn instances(&self) -> std::result::Result<Vec<Instance>, CloudProviderError> {
            Ok(self.instances.clone())
        }
    }

    struct FakeProvider {
        groups: Vec<(GroupId, u64, Vec<Instance>)>,
    }

    impl CloudProvider for FakeProvider {
        fn node_groups(&self) -> Vec<Box<dyn NodeGroup>> {
            self.groups
                .iter()
                .map(|(id, target, instances)| {
                    Box::new(FakeGroup {
                        id: id.clone(),
                        target_size: *target,
                        instances: instances.clone(),
                    }) as Box<dyn NodeGroup>
                })
                .collect()
        }

        fn node_group_for_node(&self, node: &Node) -> Option<GroupId> {
            let provider_id = node.provider_id.as_deref()?;
            self.groups
                .iter()
                .find(|(id, _, _)| provider_id.starts_with(&format!("{}-", id.0)))
                .map(|(id, _, _)| id.clone())
        }
    }

    fn node(name: &str, _group: &str, ready: bool) -> Node {
        let now = Utc::now();
        Node {
            name: name.to_string(),
            provider_id: Some(name.to_string()),
            creation_time: now - chrono::Duration::minutes(5),
            ready: ReadyCondition {
                status: if ready {
                    ConditionStatus::True
                } else {
                    ConditionStatus::False
                },
                last_transition: now,
            },
            taints: vec![],
        }
    }

    #[test]
    fn s1_scale_up_in_progress() {
        let provider = FakeProvider {
            groups: vec![
                (
                    GroupId::from("ng1"),
                    5,
                    vec![Instance { provider_id: "ng1-1".to_string() }],
                ),
                (
                    GroupId::from("ng2"),
                    1,
                    vec![Instance { provider_id: "ng2-1".to_string() }],
                ),
            ],
        };
        let registry =
            ClusterStateRegistry::new(ClusterStateRegistryConfig::default(), Box::new(provider)).unwrap();

        let now = Utc::now();
        registry.register_or_update_scale_up(GroupId::from("ng1"), 4, now);

        let nodes = vec![node("ng1-1", "ng1", true), node("ng2-1", "ng2", true)];
        registry.update_nodes(Some(&nodes), Some(&[]), now).unwrap();

        assert!(registry.is_cluster_healthy());
        assert!(registry.get_scale_up_failures().is_empty());

        let status = registry.get_status(now);
        let ng1 = status
            .node_group_statuses
            .iter()
            .find(|g| g.group == GroupId::from("ng1"))
            .unwrap();
        let ng2 = status
            .node_group_statuses
            .iter()
            .find(|g| g.group == GroupId::from("ng2"))
            .unwrap();
        use crate::status::{ConditionState, ConditionType};
        let ng1_scale_up = ng1
            .conditions
            .iter()
            .find(|c| c.condition_type == ConditionType::ScaleUp)
            .unwrap();
        let ng2_scale_up = ng2
            .conditions
            .iter()
            .find(|c| c.condition_type == ConditionType::ScaleUp)
            .unwrap();
        assert_eq!(ng1_scale_up.status, ConditionState::InProgress);
        assert_eq!(ng2_scale_up.status, ConditionState::NoActivity);
    }

    #[test]
    fn update_nodes_rejects_nil_inputs() {
        let provider = FakeProvider { groups: vec![] };
        let registry =
            ClusterStateRegistry::new(ClusterStateRegistryConfig::default(), Box::new(provider)).unwrap();
        let now = Utc::now();
        assert!(matches!(
            registry.update_nodes(None, Some(&[]), now),
            Err(CsrError::NilNodeList)
        ));
        assert!(matches!(
            registry.update_nodes(Some(&[]), None, now),
            Err(CsrError::NilPodList)
        ));
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let provider = FakeProvider { groups: vec![] };
        let mut config = ClusterStateRegistryConfig::default();
        config.max_total_unready_percentage = -1.0;
        assert!(ClusterStateRegistry::new(config, Box::new(provider)).is_err());
    }
}
