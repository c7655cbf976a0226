//! Scale-request ledger (spec §4.3): records outstanding scale-up/down
//! requests and ages them out, accumulating and expiring with failure per
//! group.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cloud_provider::GroupId;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub enum ScaleUpFailureReason {
    Timeout,
    ApiError,
    CloudProviderError,
    Quota,
    Other(String),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScaleUpFailure {
    pub group: GroupId,
    pub reason: ScaleUpFailureReason,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScaleUpRequest {
    pub group: GroupId,
    pub increase: i64,
    pub time: DateTime<Utc>,
    pub expected_add_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScaleDownRequest {
    pub group: GroupId,
    pub node_name: String,
    pub time: DateTime<Utc>,
    pub expected_delete_time: DateTime<Utc>,
}

/// What aging a single `UpdateNodes` cycle produced: groups whose scale-up
/// timed out (emitting a failure) and groups whose scale-up was satisfied
/// (deleted silently, but reported so the health evaluator can clear backoff).
#[derive(Debug, Default)]
pub struct AgingOutcome {
    pub failures: Vec<ScaleUpFailure>,
    pub satisfied_groups: Vec<GroupId>,
}

#[derive(Debug, Default)]
pub struct ScaleRequestLedger {
    scale_ups: HashMap<GroupId, ScaleUpRequest>,
    scale_downs: Vec<ScaleDownRequest>,
    failures: HashMap<GroupId, Vec<ScaleUpFailure>>,
}

impl ScaleRequestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// `RegisterOrUpdateScaleUp` (spec §4.3).
    pub fn register_or_update_scale_up(
        &mut self,
        group: GroupId,
        delta: i64,
        at: DateTime<Utc>,
        max_provision_time: f64,
    ) {
        match self.scale_ups.get_mut(&group) {
            None => {
                if delta > 0 {
                    self.scale_ups.insert(
                        group.clone(),
                        ScaleUpRequest {
                            group,
                            increase: delta,
                            time: at,
                            expected_add_time: at
                                + chrono::Duration::milliseconds(
                                    (max_provision_time * 1000.0) as i64,
                                ),
                        },
                    );
                }
                // delta <= 0 with no live request: nothing to do.
            }
            Some(existing) => {
                existing.increase += delta;
                if delta > 0 {
                    existing.time = at;
                    existing.expected_add_time = at
                        + chrono::Duration::milliseconds((max_provision_time * 1000.0) as i64);
                }
                // delta < 0: partial fulfillment, times are not advanced.
                if existing.increase <= 0 {
                    self.scale_ups.remove(&group);
                }
            }
        }
    }

    /// `RegisterScaleDown` (spec §4.3): appended unconditionally.
    pub fn register_scale_down(&mut self, req: ScaleDownRequest) {
        self.scale_downs.push(req);
    }

    /// `RegisterFailedScaleUp`: explicit failure registration (spec §4.8),
    /// independent of the aging pass.
    pub fn register_failed_scale_up(
        &mut self,
        group: GroupId,
        reason: ScaleUpFailureReason,
        time: DateTime<Utc>,
    ) {
        self.failures.entry(group.clone()).or_default().push(ScaleUpFailure {
            group,
            reason,
            time,
        });
    }

    pub fn has_live_scale_up(&self, group: &GroupId) -> bool {
        self.scale_ups.contains_key(group)
    }

    pub fn live_scale_up(&self, group: &GroupId) -> Option<&ScaleUpRequest> {
        self.scale_ups.get(group)
    }

    pub fn live_scale_up_groups(&self) -> impl Iterator<Item = &GroupId> {
        self.scale_ups.keys()
    }

    pub fn has_any_live_scale_up(&self) -> bool {
        !self.scale_ups.is_empty()
    }

    pub fn scale_downs(&self) -> &[ScaleDownRequest] {
        &self.scale_downs
    }

    /// `updateScaleRequests(now)` (spec §4.3). Must run *after* reconciliation
    /// within a single `UpdateNodes` so `new_ready_node_counts` reflects nodes
    /// the reconciler has just observed (spec §4.4 ordering note).
    ///
    /// `new_ready_node_counts` is, per group, the number of ready nodes
    /// created at or after that group's outstanding scale-up request's `time`
    /// — the registry's measure of "observed new ready nodes".
    pub fn age(
        &mut self,
        now: DateTime<Utc>,
        new_ready_node_counts: &HashMap<GroupId, u64>,
    ) -> AgingOutcome {
        self.scale_downs.retain(|r| r.expected_delete_time > now);

        let mut outcome = AgingOutcome::default();
        let expired: Vec<GroupId> = self
            .scale_ups
            .iter()
            .filter(|(_, req)| req.expected_add_time <= now)
            .map(|(group, _)| group.clone())
            .collect();

        for group in expired {
            let req = self.scale_ups.remove(&group).expect("just filtered present");
            let observed = new_ready_node_counts.get(&group).copied().unwrap_or(0) as i64;
            if observed >= req.increase {
                outcome.satisfied_groups.push(group);
            } else {
                let failure = ScaleUpFailure {
                    group: group.clone(),
                    reason: ScaleUpFailureReason::Timeout,
                    time: now,
                };
                self.failures
                    .entry(group.clone())
                    .or_default()
                    .push(failure.clone());
                outcome.failures.push(failure);
            }
        }

        outcome
    }

    pub fn scale_up_failures(&self) -> &HashMap<GroupId, Vec<ScaleUpFailure>> {
        &self.failures
    }

    pub fn clear_scale_up_failures(&mut self) {
        self.failures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> GroupId {
        GroupId::from("ng1")
    }

    #[test]
    fn cumulative_non_positive_delta_leaves_no_live_request() {
        let mut ledger = ScaleRequestLedger::new();
        let now = Utc::now();
        ledger.register_or_update_scale_up(group(), 4, now, 600.0);
        ledger.register_or_update_scale_up(group(), -1, now, 600.0);
        ledger.register_or_update_scale_up(group(), -3, now, 600.0);
        assert!(!ledger.has_live_scale_up(&group()));
    }

    #[test]
    fn negative_delta_does_not_advance_times() {
        let mut ledger = ScaleRequestLedger::new();
        let now = Utc::now();
        ledger.register_or_update_scale_up(group(), 4, now, 600.0);
        let later = now + chrono::Duration::seconds(100);
        ledger.register_or_update_scale_up(group(), -1, later, 600.0);

        let req = ledger.live_scale_up(&group()).unwrap();
        assert_eq!(req.increase, 3);
        assert_eq!(req.time, now);
        assert_eq!(req.expected_add_time, now + chrono::Duration::seconds(600));
    }

    #[test]
    fn positive_delta_advances_times() {
        let mut ledger = ScaleRequestLedger::new();
        let now = Utc::now();
        ledger.register_or_update_scale_up(group(), 2, now, 600.0);
        let later = now + chrono::Duration::seconds(100);
        ledger.register_or_update_scale_up(group(), 2, later, 600.0);

        let req = ledger.live_scale_up(&group()).unwrap();
        assert_eq!(req.increase, 4);
        assert_eq!(req.time, later);
        assert_eq!(
            req.expected_add_time,
            later + chrono::Duration::seconds(600)
        );
    }

    #[test]
    fn satisfied_request_ages_out_silently() {
        let mut ledger = ScaleRequestLedger::new();
        let now = Utc::now();
        ledger.register_or_update_scale_up(group(), 4, now, 60.0);

        let mut observed = HashMap::new();
        observed.insert(group(), 4);

        let after_expiry = now + chrono::Duration::seconds(61);
        let outcome = ledger.age(after_expiry, &observed);

        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.satisfied_groups, vec![group()]);
        assert!(ledger.scale_up_failures().is_empty());
    }

    #[test]
    fn unsatisfied_request_times_out_with_exactly_one_failure() {
        let mut ledger = ScaleRequestLedger::new();
        let now = Utc::now();
        ledger.register_or_update_scale_up(group(), 4, now, 60.0);

        let observed = HashMap::new(); // nothing observed
        let after_expiry = now + chrono::Duration::seconds(61);
        let outcome = ledger.age(after_expiry, &observed);

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].reason, ScaleUpFailureReason::Timeout);
        assert_eq!(ledger.scale_up_failures()[&group()].len(), 1);
        assert!(!ledger.has_live_scale_up(&group()));
    }

    #[test]
    fn scale_down_expires_after_expected_delete_time() {
        let mut ledger = ScaleRequestLedger::new();
        let now = Utc::now();
        ledger.register_scale_down(ScaleDownRequest {
            group: group(),
            node_name: "ng1_1".to_string(),
            time: now,
            expected_delete_time: now + chrono::Duration::seconds(30),
        });
        assert_eq!(ledger.scale_downs().len(), 1);

        ledger.age(now + chrono::Duration::seconds(31), &HashMap::new());
        assert!(ledger.scale_downs().is_empty());
    }
}
