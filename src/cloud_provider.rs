//! The cloud-provider contract the registry consumes (spec §6).
//!
//! A small trait object held as `Box<dyn Trait>`, implemented by whatever
//! concrete driver the caller wires in. The registry never talks to a real
//! cloud API directly — drivers are an external collaborator.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::Node;

/// Opaque node group identifier. The registry never interprets this beyond
/// equality/ordering/hashing — it is a handle, not owned data (spec §3).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(pub String);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        GroupId(s.to_string())
    }
}

impl From<String> for GroupId {
    fn from(s: String) -> Self {
        GroupId(s)
    }
}

/// A single cloud instance as reported by `NodeGroup::instances()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub provider_id: String,
}

/// Errors a cloud-provider driver may surface. `NotImplemented` lets a driver
/// decline an optional capability (e.g. `has_instance`) without that being a
/// failure — the reconciler falls back to an alternative detection path
/// (spec §7 "provider unsupported").
#[derive(Debug, Error)]
pub enum CloudProviderError {
    #[error("capability not implemented by this cloud provider")]
    NotImplemented,

    #[error("transient cloud provider error: {0}")]
    Transient(String),
}

/// External handle to a managed node group (spec §3 "NodeGroup (external
/// handle)"). The registry references groups through this trait; it never
/// owns or constructs node groups itself.
pub trait NodeGroup: Send {
    fn id(&self) -> GroupId;
    fn min_size(&self) -> u64;
    fn max_size(&self) -> u64;
    fn target_size(&self) -> u64;

    /// Current cloud-provider-side instances of this group. May return
    /// `CloudProviderError::NotImplemented` if the driver cannot enumerate
    /// instances, in which case cloud-deletion detection degrades to
    /// taint-based inference (spec §7, SPEC_FULL.md §C.2).
    fn instances(&self) -> Result<Vec<Instance>, CloudProviderError>;
}

/// The cloud-provider contract consumed by the registry (spec §6).
pub trait CloudProvider: Send {
    fn node_groups(&self) -> Vec<Box<dyn NodeGroup>>;

    /// Attributes a node to its owning group. The registry never infers group
    /// membership from the node record itself; every group-scoped operation
    /// resolves attribution through this call. `None` means the node is
    /// unattributed input (spec §7 "input inconsistency": counted for
    /// readiness, ignored for group accounting).
    fn node_group_for_node(&self, node: &Node) -> Option<GroupId>;

    /// Optional fast-path membership check. Default implementation reports
    /// the capability as unimplemented; drivers that can answer this cheaply
    /// should override it.
    fn has_instance(&self, _provider_id: &str) -> Result<bool, CloudProviderError> {
        Err(CloudProviderError::NotImplemented)
    }
}
