//! Config fields for the cluster state registry.
//!
//! A `Deserialize` struct with a `#[serde(default = "...")]` helper function
//! per tunable, plus a hand-written `Default` impl that calls the same
//! helpers so code-constructed configs and file-loaded configs agree.

use serde::Deserialize;

use crate::error::{CsrError, Result};

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ClusterStateRegistryConfig {
    /// Cluster is unhealthy once unready nodes exceed this share of all nodes,
    /// unless `ok_total_unready_count` already excuses it.
    #[serde(default = "max_total_unready_percentage_default")]
    pub max_total_unready_percentage: f64,

    /// Below this absolute unready count the cluster is healthy regardless of
    /// percentage.
    #[serde(default = "ok_total_unready_count_default")]
    pub ok_total_unready_count: u64,

    /// Seconds allowed for a cloud instance to register as a cluster node, and
    /// for a scale-up request to be satisfied, before it is a failure.
    #[serde(default = "max_node_provision_time_default")]
    pub max_node_provision_time: f64,

    /// Seconds after creation during which an unready node carrying the
    /// not-ready taint is `NotStarted` rather than `Unready`.
    #[serde(default = "max_node_startup_time_default")]
    pub max_node_startup_time: f64,

    /// How long a node group's `IncorrectNodeGroupSize` may persist before it
    /// counts against group health. Defaults to `max_node_provision_time` when
    /// unset: a group mid-scale-up should not be penalized before it has even
    /// had time to reach target size.
    #[serde(default)]
    pub incorrect_size_grace_period: Option<f64>,

    /// Initial backoff duration in seconds.
    #[serde(default = "backoff_initial_default")]
    pub backoff_initial: f64,

    /// Backoff duration cap in seconds.
    #[serde(default = "backoff_max_default")]
    pub backoff_max: f64,

    /// If the last backoff for a group was longer ago than this (seconds),
    /// the schedule resets to `backoff_initial` instead of doubling further.
    #[serde(default = "backoff_reset_default")]
    pub backoff_reset_timeout: f64,

    /// Taint key marking a node as scheduled for removal ("draining").
    #[serde(default = "to_be_deleted_taint_key_default")]
    pub to_be_deleted_taint_key: String,

    /// Taint key marking a node as not yet ready to receive pods.
    #[serde(default = "not_ready_taint_key_default")]
    pub not_ready_taint_key: String,
}

fn max_total_unready_percentage_default() -> f64 {
    45.0
}
fn ok_total_unready_count_default() -> u64 {
    3
}
fn max_node_provision_time_default() -> f64 {
    15.0 * 60.0
}
fn max_node_startup_time_default() -> f64 {
    15.0 * 60.0
}
fn backoff_initial_default() -> f64 {
    5.0 * 60.0
}
fn backoff_max_default() -> f64 {
    30.0 * 60.0
}
fn backoff_reset_default() -> f64 {
    3.0 * 60.0 * 60.0
}
fn to_be_deleted_taint_key_default() -> String {
    "DeletionCandidateOfClusterAutoscaler".to_string()
}
fn not_ready_taint_key_default() -> String {
    "node.kubernetes.io/not-ready".to_string()
}

impl Default for ClusterStateRegistryConfig {
    fn default() -> Self {
        Self {
            max_total_unready_percentage: max_total_unready_percentage_default(),
            ok_total_unready_count: ok_total_unready_count_default(),
            max_node_provision_time: max_node_provision_time_default(),
            max_node_startup_time: max_node_startup_time_default(),
            incorrect_size_grace_period: None,
            backoff_initial: backoff_initial_default(),
            backoff_max: backoff_max_default(),
            backoff_reset_timeout: backoff_reset_default(),
            to_be_deleted_taint_key: to_be_deleted_taint_key_default(),
            not_ready_taint_key: not_ready_taint_key_default(),
        }
    }
}

impl ClusterStateRegistryConfig {
    /// Grace period before an `IncorrectNodeGroupSize` counts against group
    /// health; defaults to `max_node_provision_time` (see SPEC_FULL.md §C).
    pub fn incorrect_size_grace_period(&self) -> f64 {
        self.incorrect_size_grace_period
            .unwrap_or(self.max_node_provision_time)
    }

    /// Caught at construction time; an invalid config refuses to start the
    /// registry (error-handling design, spec §7).
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.max_total_unready_percentage) {
            return Err(CsrError::InvalidConfig(format!(
                "max_total_unready_percentage must be within [0, 100], got {}",
                self.max_total_unready_percentage
            )));
        }
        if self.max_node_provision_time <= 0.0 {
            return Err(CsrError::InvalidConfig(
                "max_node_provision_time must be positive".to_string(),
            ));
        }
        if self.max_node_startup_time <= 0.0 {
            return Err(CsrError::InvalidConfig(
                "max_node_startup_time must be positive".to_string(),
            ));
        }
        if self.backoff_initial <= 0.0 || self.backoff_max <= 0.0 {
            return Err(CsrError::InvalidConfig(
                "backoff_initial and backoff_max must be positive".to_string(),
            ));
        }
        if self.backoff_initial > self.backoff_max {
            return Err(CsrError::InvalidConfig(
                "backoff_initial must not exceed backoff_max".to_string(),
            ));
        }
        if self.backoff_reset_timeout <= 0.0 {
            return Err(CsrError::InvalidConfig(
                "backoff_reset_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ClusterStateRegistryConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_percentage_out_of_range() {
        let mut config = ClusterStateRegistryConfig::default();
        config.max_total_unready_percentage = 150.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_backoff_initial_above_max() {
        let mut config = ClusterStateRegistryConfig::default();
        config.backoff_initial = 60.0 * 60.0;
        config.backoff_max = 30.0 * 60.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn incorrect_size_grace_period_defaults_to_provision_time() {
        let config = ClusterStateRegistryConfig::default();
        assert_eq!(
            config.incorrect_size_grace_period(),
            config.max_node_provision_time
        );
    }
}
