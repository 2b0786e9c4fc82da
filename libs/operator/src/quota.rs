use crate::crd::application::Application;
use crate::crd::cluster::Cluster;
use crate::finalizer;

use kube::api::{Api, ListParams};
use kube::Resource;

/// Lists every Cluster whose `spec.orgRef` matches `org` and returns its
/// count. Best-effort: spec.md §9 explicitly allows two concurrent
/// reconciles to both observe `count < quota` and both proceed; only the
/// write (status condition) side is safety-critical.
pub async fn count_clusters_for_org(api: &Api<Cluster>, org: &str) -> kube::Result<i32> {
    let list = api.list(&ListParams::default()).await?;
    Ok(list
        .items
        .iter()
        .filter(|c| c.spec.org_ref == org)
        .count() as i32)
}

/// I3: `vulkan_cluster_current_total{org}` is defined as the number of
/// *finalizer-holding* Cluster objects, not every Cluster whose `orgRef`
/// matches — one stuck earlier in the pipeline (CredLookup/HealthProbe,
/// or permanently over quota) has never attached its finalizer and must
/// not be counted just because a sibling in the same org newly attaches
/// its own.
pub async fn count_finalizer_holding_clusters_for_org(
    api: &Api<Cluster>,
    org: &str,
    finalizer_name: &str,
) -> kube::Result<i32> {
    let list = api.list(&ListParams::default()).await?;
    Ok(list
        .items
        .iter()
        .filter(|c| {
            c.spec.org_ref == org
                && finalizer::contains(
                    c.meta().finalizers.as_deref().unwrap_or_default(),
                    finalizer_name,
                )
        })
        .count() as i32)
}

pub async fn count_applications_for_org(api: &Api<Application>, org: &str) -> kube::Result<i32> {
    let list = api.list(&ListParams::default()).await?;
    Ok(list
        .items
        .iter()
        .filter(|a| a.spec.org_ref == org)
        .count() as i32)
}

/// I1: the current object is already counted among `count`, so equality
/// is acceptable and only a strict excess marks it over-quota. This
/// avoids an existing member failing itself purely because it is being
/// recounted.
pub fn is_over_quota(count: i32, quota: i32) -> bool {
    count > quota
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_to_quota_is_not_over_quota() {
        assert!(!is_over_quota(2, 2));
    }

    #[test]
    fn strictly_exceeding_quota_is_over_quota() {
        assert!(is_over_quota(3, 2));
    }

    #[test]
    fn zero_quota_allows_nothing() {
        assert!(is_over_quota(1, 0));
        assert!(!is_over_quota(0, 0));
    }
}
