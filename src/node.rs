//! Node record owned by the cluster state registry.
//!
//! A plain `Deserialize`-able record plus a small condition sub-type, using
//! real wall-clock timestamps throughout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of the node's `Ready` condition, following the Kubernetes
/// tri-state condition convention (`True` / `False` / `Unknown`).
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// The node's `Ready` condition: current status plus when it last changed.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ReadyCondition {
    pub status: ConditionStatus,
    pub last_transition: DateTime<Utc>,
}

/// A taint as observed from the orchestrator. Only the key is used for
/// matching against the configured to-be-deleted/not-ready taint keys; value
/// and effect are carried for completeness and future extension.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Taint {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub effect: Option<String>,
}

impl Taint {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            effect: None,
        }
    }
}

/// Immutable snapshot of a cluster node as supplied by the orchestrator for a
/// single `UpdateNodes` call. The registry never mutates a `Node` it has been
/// given; it only classifies and compares snapshots. Group attribution is not
/// carried on the node itself — it is resolved against the cloud provider via
/// `CloudProvider::node_group_for_node` (spec §6).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub provider_id: Option<String>,
    pub creation_time: DateTime<Utc>,
    pub ready: ReadyCondition,
    #[serde(default)]
    pub taints: Vec<Taint>,
}

impl Node {
    pub fn has_taint(&self, key: &str) -> bool {
        self.taints.iter().any(|t| t.key == key)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.status == ConditionStatus::True
    }

    /// Age of the node, in seconds, at `now`. Negative ages (clock skew) are
    /// clamped to zero rather than propagated as "younger than just-created".
    pub fn age_seconds(&self, now: DateTime<Utc>) -> f64 {
        let seconds = (now - self.creation_time).num_milliseconds() as f64 / 1000.0;
        seconds.max(0.0)
    }
}

/// Placeholder for the orchestrator's pod listing. The registry never reads
/// pod fields — pod scheduling is out of scope — it only needs the list's
/// presence for the same nil-input check `UpdateNodes` applies to `nodes`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Pod {
    pub name: String,
}
