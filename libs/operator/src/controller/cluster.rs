use super::Context;
use crate::crd::cluster::Cluster;
use crate::error::{Error, Result};
use crate::finalizer;
use crate::quota;
use crate::refs;
use crate::status::{self, ConditionStatus};
use crate::telemetry;

use chrono::Utc;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::time::{timeout, Duration};
use tracing::*;

pub const CONTROLLER_NAME: &str = "cluster";
pub const FINALIZER: &str = "vulkan.io/cluster";

const HEALTH_PROBE_DEADLINE: StdDuration = StdDuration::from_secs(10);

#[instrument(skip(ctx, cluster), fields(trace_id))]
async fn reconcile(cluster: Arc<Cluster>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));
    let _timer = ctx.metrics.reconcile.count_and_measure(CONTROLLER_NAME, &trace_id);
    ctx.diagnostics.write().await.last_event = Utc::now();

    let name = cluster.name_any();
    let api: Api<Cluster> = Api::all(ctx.client.clone());
    let generation = cluster.meta().generation.unwrap_or_default();
    let org_ref = cluster.spec.org_ref.clone();

    if cluster.meta().deletion_timestamp.is_some() {
        return reconcile_delete(&cluster, &api, &ctx, &name, &org_ref).await;
    }

    // OrgLookup: orgRef is the Organization's orgID (spec.md 3), not its
    // object name, so resolution lists and filters rather than `Api::get`.
    // A transient `KubeError` from the underlying `list()` call must stay
    // transient rather than being relabeled `OrgNotFound`.
    let org = match refs::find_org_by_id(&ctx.client, &org_ref).await {
        Ok(org) => org,
        Err(e) => return terminal(&api, &name, generation, e, ConditionStatus::Unknown).await,
    };

    // QuotaCheck
    let count = match quota::count_clusters_for_org(&api, &org_ref).await {
        Ok(count) => count,
        Err(e) => return terminal(&api, &name, generation, Error::KubeError(e), ConditionStatus::Unknown).await,
    };
    let quota_limit = org.spec.quota.clusters;
    if quota::is_over_quota(count, quota_limit) {
        return terminal(
            &api,
            &name,
            generation,
            Error::ClusterQuotaExceeded {
                org: org_ref,
                quota: quota_limit,
                count,
            },
            ConditionStatus::False,
        )
        .await;
    }

    // CredLookup: attached clusters have no Secret to resolve, everything
    // else must have one named.
    if !cluster.spec.type_.is_attached() && cluster.spec.kubeconfig_secret_name.is_none() {
        let err = Error::SecretNotFound {
            namespace: cluster
                .spec
                .kubeconfig_secret_namespace
                .clone()
                .unwrap_or_default(),
            name: String::new(),
        };
        set_error(&api, &name, generation, &err, ConditionStatus::False).await?;
        return Ok(Action::requeue(Duration::from_secs(5 * 60)));
    }

    // CredLookup (continued): resolve the Secret into a usable client.
    let target_client = match ctx.targets.client_for(&cluster).await {
        Ok(c) => c,
        Err(e) => {
            set_error(&api, &name, generation, &e, ConditionStatus::False).await?;
            return Ok(Action::requeue(Duration::from_secs(5 * 60)));
        }
    };

    let ready_node_count = match probe_health(&target_client).await {
        Ok(count) => count,
        Err(e) => {
            set_error(&api, &name, generation, &e, ConditionStatus::False).await?;
            return Ok(Action::requeue(Duration::from_secs(2 * 60)));
        }
    };

    // AttachFinalizer + IncMetric(orgRef) -- only on the absent-to-present
    // transition (spec.md 9).
    let current_finalizers = cluster.meta().finalizers.clone().unwrap_or_default();
    let (_, newly_attached) =
        finalizer::add(&api, &name, &current_finalizers, FINALIZER).await?;
    if newly_attached {
        let live =
            quota::count_finalizer_holding_clusters_for_org(&api, &cluster.spec.org_ref, FINALIZER).await?;
        ctx.metrics.quota.set_cluster_count(&cluster.spec.org_ref, live as i64);
        ctx.metrics
            .quota
            .set_quota_usage(&cluster.spec.org_ref, "clusters", live as i64, quota_limit);
    }

    let mut conditions = cluster.status.as_ref().map(|s| s.conditions.clone()).unwrap_or_default();
    status::set_condition(&mut conditions, status::READY, ConditionStatus::True, "Reconciled", "", generation);
    status::set_condition(&mut conditions, status::ERROR, ConditionStatus::False, "NoError", "", generation);
    status::update_status(
        &api,
        &name,
        serde_json::json!({
            "conditions": conditions,
            "readyNodeCount": ready_node_count,
        }),
    )
    .await?;

    Ok(Action::requeue(Duration::from_secs(10 * 60)))
}

async fn reconcile_delete(
    cluster: &Cluster,
    api: &Api<Cluster>,
    ctx: &Arc<Context>,
    name: &str,
    org_ref: &str,
) -> Result<Action> {
    let current_finalizers = cluster.meta().finalizers.clone().unwrap_or_default();
    if !finalizer::contains(&current_finalizers, FINALIZER) {
        return Ok(Action::await_change());
    }

    finalizer::remove(api, name, &current_finalizers, FINALIZER).await?;
    let live = quota::count_clusters_for_org(api, org_ref).await?;
    ctx.metrics.quota.set_cluster_count(org_ref, live as i64);
    Ok(Action::await_change())
}

async fn terminal(
    api: &Api<Cluster>,
    name: &str,
    generation: i64,
    error: Error,
    ready: ConditionStatus,
) -> Result<Action> {
    set_error(api, name, generation, &error, ready).await?;
    Err(error)
}

async fn set_error(
    api: &Api<Cluster>,
    name: &str,
    generation: i64,
    error: &Error,
    ready: ConditionStatus,
) -> Result<()> {
    let current = api.get(name).await?;
    let mut conditions = current.status.map(|s| s.conditions).unwrap_or_default();
    // Ready is always written before Error (spec.md 4.3 ordering rule).
    status::set_condition(&mut conditions, status::READY, ready, error.reason(), error.to_string(), generation);
    status::set_condition(
        &mut conditions,
        status::ERROR,
        ConditionStatus::True,
        error.reason(),
        error.to_string(),
        generation,
    );
    status::update_status(api, name, serde_json::json!({ "conditions": conditions })).await?;
    Ok(())
}

async fn probe_health(target_client: &kube::Client) -> Result<i32> {
    let nodes: Api<Node> = Api::all(target_client.clone());
    let list = timeout(HEALTH_PROBE_DEADLINE, nodes.list(&ListParams::default()))
        .await
        .map_err(|_| Error::HealthCheckTimeout)?
        .map_err(Error::KubeError)?;

    if list.items.is_empty() {
        return Err(Error::HealthCheckFailed("no worker nodes found".to_owned()));
    }

    let ready_count = list
        .items
        .iter()
        .filter(|node| {
            node.status
                .as_ref()
                .and_then(|s| s.conditions.as_ref())
                .is_some_and(|conds| conds.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
        })
        .count();

    if ready_count != list.items.len() {
        return Err(Error::HealthCheckFailed(
            "at least one worker node is not ready".to_owned(),
        ));
    }

    Ok(ready_count as i32)
}

fn error_policy(cluster: Arc<Cluster>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!("cluster reconcile failed: {:?}", error);
    ctx.metrics.reconcile.set_failure(CONTROLLER_NAME, &cluster, error);
    Action::requeue(Duration::from_secs(5 * 60))
}

pub async fn run(ctx: Arc<Context>) {
    let clusters = Api::<Cluster>::all(ctx.client.clone());
    if let Err(e) = clusters.list(&ListParams::default().limit(1)).await {
        error!("Cluster CRD is not queryable; {e:?}. Is the CRD installed?");
        std::process::exit(1);
    }
    Controller::new(clusters, Config::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}
