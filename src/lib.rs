//! Cluster state registry: the reconciliation core of a cluster autoscaler.
//!
//! Fuses three asynchronous realities — orchestrator nodes, cloud-provider
//! instances, and the autoscaler's own scale requests — into one consistent,
//! queryable view. See [`registry::ClusterStateRegistry`] for the public
//! façade.

pub mod backoff;
pub mod cloud_provider;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod node;
pub mod readiness;
pub mod reconciler;
pub mod registry;
pub mod scale_requests;
pub mod status;
pub mod upcoming;

pub use cloud_provider::{CloudProvider, CloudProviderError, GroupId, Instance, NodeGroup};
pub use config::ClusterStateRegistryConfig;
pub use error::{CsrError, Result};
pub use node::{Node, Pod};
pub use readiness::{NodeBucket, ReadinessReport};
pub use reconciler::{IncorrectNodeGroupSize, UnregisteredNode};
pub use registry::ClusterStateRegistry;
pub use scale_requests::{ScaleDownRequest, ScaleUpFailure, ScaleUpFailureReason};
pub use status::{Condition, ConditionState, ConditionType, Status};
