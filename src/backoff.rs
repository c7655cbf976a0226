//! Per-node-group exponential backoff (spec §4.1).
//!
//! A node group that has just failed a scale-up must not be retried
//! immediately. Each call to `backoff` doubles the previous duration, capped
//! at `backoff_max`, unless the last backoff for that group is stale enough
//! (`backoff_reset_timeout`) that the schedule restarts from `backoff_initial`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::cloud_provider::GroupId;
use crate::config::ClusterStateRegistryConfig;

#[derive(Debug, Clone)]
struct BackoffEntry {
    duration_secs: f64,
    deadline: DateTime<Utc>,
    last_backoff_time: DateTime<Utc>,
}

/// Tracks the exponential backoff schedule for every node group that has
/// failed to scale up recently. Keyed by group identity; clearing is always
/// explicit (spec §4.1), never time-based beyond `is_backed_off`'s deadline
/// check.
#[derive(Debug, Default)]
pub struct BackoffTracker {
    entries: HashMap<GroupId, BackoffEntry>,
}

impl BackoffTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new backoff for `group` and returns the deadline until which
    /// the group is considered backed off.
    pub fn backoff(
        &mut self,
        group: &GroupId,
        now: DateTime<Utc>,
        config: &ClusterStateRegistryConfig,
    ) -> DateTime<Utc> {
        let duration_secs = match self.entries.get(group) {
            Some(entry)
                if (now - entry.last_backoff_time).num_milliseconds() as f64 / 1000.0
                    <= config.backoff_reset_timeout =>
            {
                (entry.duration_secs * 2.0).min(config.backoff_max)
            }
            _ => config.backoff_initial,
        };

        let deadline = now + chrono::Duration::milliseconds((duration_secs * 1000.0) as i64);
        self.entries.insert(
            group.clone(),
            BackoffEntry {
                duration_secs,
                deadline,
                last_backoff_time: now,
            },
        );
        deadline
    }

    /// Clears any backoff state for `group`, e.g. after a successful scale-up.
    pub fn remove_backoff(&mut self, group: &GroupId) {
        self.entries.remove(group);
    }

    pub fn is_backed_off(&self, group: &GroupId, now: DateTime<Utc>) -> bool {
        self.entries
            .get(group)
            .map(|entry| now < entry.deadline)
            .unwrap_or(false)
    }
}
