use crate::error::Result;

use kube::api::{Api, Patch, PatchParams};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Appends `finalizer` to `current` if absent and patches it onto the
/// object named `name`. Returns the patched object and whether the
/// finalizer transitioned from absent to present (the Cluster reconciler
/// needs exactly this signal to decide whether to bump its metric, per
/// spec.md 4.6 and the "finalizer newly attached" open-question
/// resolution in spec.md 9).
pub async fn add<K>(
    api: &Api<K>,
    name: &str,
    current: &[String],
    finalizer: &str,
) -> Result<(K, bool)>
where
    K: Resource + Clone + Debug + DeserializeOwned + Serialize,
    K::DynamicType: Default,
{
    if current.iter().any(|f| f == finalizer) {
        let obj = api.get(name).await?;
        return Ok((obj, false));
    }

    let mut finalizers = current.to_vec();
    finalizers.push(finalizer.to_owned());
    let patch = Patch::Merge(serde_json::json!({
        "metadata": { "finalizers": finalizers }
    }));
    let obj = api.patch(name, &PatchParams::default(), &patch).await?;
    Ok((obj, true))
}

/// Removes `finalizer` from `current` and patches it onto the object
/// named `name`. A no-op (returns `false`) if the finalizer was already
/// absent, so callers can invoke this idempotently during repeated
/// delete-path reconciles (I5).
pub async fn remove<K>(
    api: &Api<K>,
    name: &str,
    current: &[String],
    finalizer: &str,
) -> Result<bool>
where
    K: Resource + Clone + Debug + DeserializeOwned + Serialize,
    K::DynamicType: Default,
{
    if !current.iter().any(|f| f == finalizer) {
        return Ok(false);
    }

    let finalizers: Vec<String> = current.iter().filter(|f| *f != finalizer).cloned().collect();
    let patch = Patch::Merge(serde_json::json!({
        "metadata": { "finalizers": finalizers }
    }));
    api.patch(name, &PatchParams::default(), &patch).await?;
    Ok(true)
}

pub fn contains(finalizers: &[String], finalizer: &str) -> bool {
    finalizers.iter().any(|f| f == finalizer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_checks_membership() {
        let finalizers = vec!["vulkan.io/cluster".to_owned()];
        assert!(contains(&finalizers, "vulkan.io/cluster"));
        assert!(!contains(&finalizers, "vulkan.io/project"));
    }
}
