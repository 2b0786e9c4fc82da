use crate::error::{Error, Result};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::api::{Api, Patch, PatchParams};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

pub const READY: &str = "Ready";
pub const ERROR: &str = "Error";

const MAX_CONFLICT_RETRIES: u32 = 5;

/// `Status∈{True,False,Unknown}` per spec.md §3, spelled the way
/// `k8s_openapi::Condition::status` expects it (a bare string).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    fn as_str(self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

/// Mirrors `apimeta.SetStatusCondition` from the Go source: finds the
/// condition of the same `type_` and overwrites it in place, bumping
/// `lastTransitionTime` only when `status` actually changes so observers
/// can tell a stale condition from a freshly re-affirmed one.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: ConditionStatus,
    reason: &str,
    message: impl Into<String>,
    observed_generation: i64,
) {
    let now = Time(chrono::Utc::now());
    let message = message.into();

    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        if existing.status != status.as_str() {
            existing.last_transition_time = now;
        }
        existing.status = status.as_str().to_owned();
        existing.reason = Some(reason.to_owned());
        existing.message = Some(message);
        existing.observed_generation = Some(observed_generation);
        return;
    }

    conditions.push(Condition {
        type_: type_.to_owned(),
        status: status.as_str().to_owned(),
        reason: Some(reason.to_owned()),
        message: Some(message),
        observed_generation: Some(observed_generation),
        last_transition_time: now,
    });
}

pub fn is_true(conditions: &[Condition], type_: &str) -> bool {
    conditions
        .iter()
        .any(|c| c.type_ == type_ && c.status == "True")
}

/// C3: fetch a fresh copy by key, overlay the caller-computed `.status`,
/// write it back, and retry on an optimistic-concurrency conflict under a
/// bounded default backoff. Ordering between conditions (e.g. `Ready`
/// before `Error`) is the caller's responsibility when building
/// `status_json` — this helper only owns the write-and-retry discipline.
pub async fn update_status<K>(api: &Api<K>, name: &str, status_json: serde_json::Value) -> Result<K>
where
    K: Resource + Clone + Debug + DeserializeOwned + Serialize,
    K::DynamicType: Default,
{
    let patch = Patch::Merge(serde_json::json!({ "status": status_json }));
    let pp = PatchParams::default();

    let mut attempt = 0;
    loop {
        match api.patch_status(name, &pp, &patch).await {
            Ok(obj) => return Ok(obj),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                attempt += 1;
                if attempt >= MAX_CONFLICT_RETRIES {
                    return Err(Error::StatusConflictRetriesExhausted(kube::Error::Api(ae)));
                }
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_condition_gets_transition_time() {
        let mut conditions = Vec::new();
        set_condition(&mut conditions, READY, ConditionStatus::True, "Reconciled", "ok", 1);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, "True");
        assert_eq!(conditions[0].reason.as_deref(), Some("Reconciled"));
    }

    #[test]
    fn repeated_same_status_keeps_transition_time() {
        let mut conditions = Vec::new();
        set_condition(&mut conditions, READY, ConditionStatus::True, "Reconciled", "ok", 1);
        let first_time = conditions[0].last_transition_time.clone();
        set_condition(&mut conditions, READY, ConditionStatus::True, "Reconciled", "ok", 1);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, first_time);
    }

    #[test]
    fn status_flip_bumps_transition_time() {
        let mut conditions = Vec::new();
        set_condition(&mut conditions, READY, ConditionStatus::Unknown, "Reconciling", "", 1);
        set_condition(
            &mut conditions,
            READY,
            ConditionStatus::False,
            "ClusterQuotaExceeded",
            "over quota",
            1,
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, "False");
    }

    #[test]
    fn ready_true_and_error_true_is_inconsistent_state() {
        // I2: callers must never leave both in this state. This test pins
        // the ordering rule from spec.md 4.3: Ready is written before
        // Error so a reader never observes Ready=True, Error=True.
        let mut conditions = Vec::new();
        set_condition(&mut conditions, READY, ConditionStatus::True, "Reconciled", "", 2);
        set_condition(&mut conditions, ERROR, ConditionStatus::False, "NoError", "", 2);
        assert!(is_true(&conditions, READY));
        assert!(!is_true(&conditions, ERROR));
    }
}
