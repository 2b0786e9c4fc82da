use super::Context;
use crate::crd::application::Application;
use crate::crd::cluster::Cluster;
use crate::crd::organization::Organization;
use crate::crd::project::Project;
use crate::error::{Error, Result};
use crate::status::{self, ConditionStatus};
use crate::telemetry;

use chrono::Utc;
use futures::StreamExt;
use kube::api::{Api, ListParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::ResourceExt;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::*;

pub const CONTROLLER_NAME: &str = "organization";

#[instrument(skip(ctx, org), fields(trace_id))]
async fn reconcile(org: Arc<Organization>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));
    let _timer = ctx.metrics.reconcile.count_and_measure(CONTROLLER_NAME, &trace_id);
    ctx.diagnostics.write().await.last_event = Utc::now();

    let name = org.name_any();
    let api: Api<Organization> = Api::all(ctx.client.clone());
    let generation = org.meta().generation.unwrap_or_default();

    // The org itself enforces no quota (spec.md 4.5); it only reports the
    // live child counts the child resources' own reconcilers maintain via
    // finalizer-gated metrics.
    let live = match live_child_counts(&ctx, &org.spec.org_id).await {
        Ok(live) => live,
        Err(e) => return terminal(&api, &name, generation, e, ConditionStatus::Unknown).await,
    };

    let mut conditions = org.status.as_ref().map(|s| s.conditions.clone()).unwrap_or_default();
    status::set_condition(
        &mut conditions,
        status::READY,
        ConditionStatus::True,
        "Reconciled",
        "organization is live",
        generation,
    );

    status::update_status(
        &api,
        &name,
        serde_json::json!({
            "conditions": conditions,
            "clustersLive": live.clusters,
            "projectsLive": live.projects,
            "applicationsLive": live.applications,
        }),
    )
    .await?;

    Ok(Action::requeue(Duration::from_secs(10 * 60)))
}

struct LiveCounts {
    clusters: i32,
    projects: i32,
    applications: i32,
}

async fn live_child_counts(ctx: &Arc<Context>, org_id: &str) -> Result<LiveCounts> {
    let clusters: Api<Cluster> = Api::all(ctx.client.clone());
    let projects: Api<Project> = Api::all(ctx.client.clone());
    let apps: Api<Application> = Api::all(ctx.client.clone());

    let clusters = clusters.list(&ListParams::default()).await.map_err(Error::KubeError)?;
    let projects = projects.list(&ListParams::default()).await.map_err(Error::KubeError)?;
    let apps = apps.list(&ListParams::default()).await.map_err(Error::KubeError)?;

    Ok(LiveCounts {
        clusters: clusters.items.iter().filter(|c| c.spec.org_ref == org_id).count() as i32,
        projects: projects.items.iter().filter(|p| p.spec.org_ref == org_id).count() as i32,
        applications: apps.items.iter().filter(|a| a.spec.org_ref == org_id).count() as i32,
    })
}

async fn terminal(
    api: &Api<Organization>,
    name: &str,
    generation: i64,
    error: Error,
    ready: ConditionStatus,
) -> Result<Action> {
    let current = api.get(name).await?;
    let mut conditions = current.status.map(|s| s.conditions).unwrap_or_default();
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
    Err(error)
}

fn error_policy(org: Arc<Organization>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!("organization reconcile failed: {:?}", error);
    ctx.metrics.reconcile.set_failure(CONTROLLER_NAME, &org, error);
    Action::requeue(Duration::from_secs(5 * 60))
}

pub async fn run(ctx: Arc<Context>) {
    let orgs = Api::<Organization>::all(ctx.client.clone());
    if let Err(e) = orgs.list(&ListParams::default().limit(1)).await {
        error!("Organization CRD is not queryable; {e:?}. Is the CRD installed?");
        std::process::exit(1);
    }
    Controller::new(orgs, Config::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}
