//! Status publisher (spec §4.7): assembles the structured condition report,
//! preserving `LastTransitionTime` across updates.
//!
//! The publisher both remembers the previous cycle's conditions (to decide
//! whether a transition really happened) and builds the next one.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cloud_provider::GroupId;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub enum ConditionType {
    Health,
    ScaleUp,
    ScaleDown,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum ConditionState {
    Healthy,
    Unhealthy,
    InProgress,
    /// Reserved: no current condition rule produces this state.
    NotNeeded,
    NoActivity,
    CandidatesPresent,
    NoCandidates,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: ConditionState,
    pub last_probe_time: DateTime<Utc>,
    pub last_transition_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
enum Scope {
    Cluster,
    Group(GroupId),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NodeGroupStatus {
    pub group: GroupId,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Status {
    pub clusterwide_conditions: Vec<Condition>,
    pub node_group_statuses: Vec<NodeGroupStatus>,
}

/// Per-group inputs the publisher needs to derive conditions; everything
/// upstream (health, ledger, candidates) has already been computed.
pub struct GroupStatusInput {
    pub group: GroupId,
    pub healthy: bool,
    pub scaling_up: bool,
    pub has_scale_down_candidates: bool,
}

/// Owns the previous cycle's conditions, keyed by `(scope, type)`, so that
/// `LastTransitionTime` only advances when a condition's `Status` actually
/// changes (spec §3 invariant, testable property 5).
#[derive(Debug, Default)]
pub struct StatusPublisher {
    previous: HashMap<(Scope, ConditionType), Condition>,
}

impl StatusPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(
        &mut self,
        cluster_healthy: bool,
        cluster_scaling_up: bool,
        cluster_has_candidates: bool,
        groups: &[GroupStatusInput],
        now: DateTime<Utc>,
    ) -> Status {
        let mut next = HashMap::new();

        let clusterwide_conditions = self.build_scope_conditions(
            &Scope::Cluster,
            cluster_healthy,
            cluster_scaling_up,
            cluster_has_candidates,
            now,
            &mut next,
        );

        let node_group_statuses = groups
            .iter()
            .map(|g| NodeGroupStatus {
                group: g.group.clone(),
                conditions: self.build_scope_conditions(
                    &Scope::Group(g.group.clone()),
                    g.healthy,
                    g.scaling_up,
                    g.has_scale_down_candidates,
                    now,
                    &mut next,
                ),
            })
            .collect();

        self.previous = next;

        Status {
            clusterwide_conditions,
            node_group_statuses,
        }
    }

    fn build_scope_conditions(
        &self,
        scope: &Scope,
        healthy: bool,
        scaling_up: bool,
        has_candidates: bool,
        now: DateTime<Utc>,
        next: &mut HashMap<(Scope, ConditionType), Condition>,
    ) -> Vec<Condition> {
        let health_status = if healthy {
            ConditionState::Healthy
        } else {
            ConditionState::Unhealthy
        };
        let scale_up_status = if scaling_up {
            ConditionState::InProgress
        } else {
            ConditionState::NoActivity
        };
        let scale_down_status = if has_candidates {
            ConditionState::CandidatesPresent
        } else {
            ConditionState::NoCandidates
        };

        [
            (ConditionType::Health, health_status),
            (ConditionType::ScaleUp, scale_up_status),
            (ConditionType::ScaleDown, scale_down_status),
        ]
        .into_iter()
        .map(|(condition_type, status)| {
            let last_transition_time = self
                .previous
                .get(&(scope.clone(), condition_type))
                .filter(|prev| prev.status == status)
                .map(|prev| prev.last_transition_time)
                .unwrap_or(now);
            let condition = Condition {
                condition_type,
                status,
                last_probe_time: now,
                last_transition_time,
            };
            next.insert((scope.clone(), condition_type), condition.clone());
            condition
        })
        .collect()
    }
}

/// Tracks which groups currently have scale-down candidates latched from the
/// last `UpdateScaleDownCandidates` call. See SPEC_FULL.md §C.3: candidates
/// persist until the next call rather than being consumed by one `GetStatus`.
#[derive(Debug, Default)]
pub struct ScaleDownCandidates {
    groups: HashSet<GroupId>,
}

impl ScaleDownCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, groups: impl IntoIterator<Item = GroupId>) {
        self.groups = groups.into_iter().collect();
    }

    pub fn has_candidates(&self, group: &GroupId) -> bool {
        self.groups.contains(group)
    }

    pub fn any(&self) -> bool {
        !self.groups.is_empty()
    }
}
