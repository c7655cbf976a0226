//! Shared fixtures for black-box registry scenario tests.

use chrono::{DateTime, Utc};
use cluster_state_registry::cloud_provider::{CloudProviderError, Instance, NodeGroup};
use cluster_state_registry::node::{ConditionStatus, Node, ReadyCondition, Taint};
use cluster_state_registry::{CloudProvider, GroupId};

pub struct FixtureGroup {
    pub id: GroupId,
    pub target_size: u64,
    pub instances: Vec<Instance>,
}

impl NodeGroup for FixtureGroup {
    fn id(&self) -> GroupId {
        self.id.clone()
    }
    fn min_size(&self) -> u64 {
        0
    }
    fn max_size(&self) -> u64 {
        20
    }
    fn target_size(&self) -> u64 {
        self.target_size
    }
    fn instances(&self) -> Result<Vec<Instance>, CloudProviderError> {
        Ok(self.instances.clone())
    }
}

pub struct FixtureProvider {
    pub groups: Vec<FixtureGroup>,
}

impl CloudProvider for FixtureProvider {
    fn node_groups(&self) -> Vec<Box<dyn NodeGroup>> {
        self.groups
            .iter()
            .map(|g| {
                Box::new(FixtureGroup {
                    id: g.id.clone(),
                    target_size: g.target_size,
                    instances: g.instances.clone(),
                }) as Box<dyn NodeGroup>
            })
            .collect()
    }

    fn node_group_for_node(&self, node: &Node) -> Option<GroupId> {
        let provider_id = node.provider_id.as_deref()?;
        self.groups
            .iter()
            .find(|g| provider_id.starts_with(&format!("{}-", g.id.0)))
            .map(|g| g.id.clone())
    }
}

pub fn instance(provider_id: &str) -> Instance {
    Instance { provider_id: provider_id.to_string() }
}

/// A registered node, ready or not, created `age` before `now`, carrying the
/// given taint keys.
/// `group` is unused by the `Node` record itself (attribution is resolved via
/// `CloudProvider::node_group_for_node`) but kept on the signature since every
/// fixture node name is already prefixed with its intended group.
pub fn node_aged(
    name: &str,
    _group: &str,
    age: chrono::Duration,
    ready: bool,
    taints: Vec<&str>,
    now: DateTime<Utc>,
) -> Node {
    Node {
        name: name.to_string(),
        provider_id: Some(name.to_string()),
        creation_time: now - age,
        ready: ReadyCondition {
            status: if ready { ConditionStatus::True } else { ConditionStatus::False },
            last_transition: now,
        },
        taints: taints.into_iter().map(Taint::new).collect(),
    }
}

pub fn node(name: &str, group: &str, ready: bool, now: DateTime<Utc>) -> Node {
    node_aged(name, group, chrono::Duration::minutes(10), ready, vec![], now)
}

/// A single-group cloud provider whose instance list can be mutated after
/// construction, for scenarios that exercise cache invalidation against a
/// cloud-provider-side change (e.g. S4).
pub struct MutableProvider {
    pub group: GroupId,
    pub target_size: u64,
    pub instances: std::sync::Arc<std::sync::Mutex<Vec<Instance>>>,
}

struct MutableGroup {
    id: GroupId,
    target_size: u64,
    instances: std::sync::Arc<std::sync::Mutex<Vec<Instance>>>,
}

impl NodeGroup for MutableGroup {
    fn id(&self) -> GroupId {
        self.id.clone()
    }
    fn min_size(&self) -> u64 {
        0
    }
    fn max_size(&self) -> u64 {
        20
    }
    fn target_size(&self) -> u64 {
        self.target_size
    }
    fn instances(&self) -> Result<Vec<Instance>, CloudProviderError> {
        Ok(self.instances.lock().unwrap().clone())
    }
}

impl CloudProvider for MutableProvider {
    fn node_groups(&self) -> Vec<Box<dyn NodeGroup>> {
        vec![Box::new(MutableGroup {
            id: self.group.clone(),
            target_size: self.target_size,
            instances: self.instances.clone(),
        })]
    }

    fn node_group_for_node(&self, node: &Node) -> Option<GroupId> {
        let provider_id = node.provider_id.as_deref()?;
        if provider_id.starts_with(&format!("{}-", self.group.0)) {
            Some(self.group.clone())
        } else {
            None
        }
    }
}
