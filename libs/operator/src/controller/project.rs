use super::Context;
use crate::crd::project::Project;
use crate::crd::project_cluster_binding::ProjectClusterBinding;
use crate::error::{Error, Result};
use crate::finalizer;
use crate::status::{self, ConditionStatus};
use crate::telemetry;

use chrono::Utc;
use futures::StreamExt;
use kube::api::{Api, DeleteParams, ListParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::*;

pub const CONTROLLER_NAME: &str = "project";
pub const FINALIZER: &str = "vulkan.io/project";

#[instrument(skip(ctx, project), fields(trace_id))]
async fn reconcile(project: Arc<Project>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));
    let _timer = ctx.metrics.reconcile.count_and_measure(CONTROLLER_NAME, &trace_id);
    ctx.diagnostics.write().await.last_event = Utc::now();

    let name = project.name_any();
    let api: Api<Project> = Api::all(ctx.client.clone());
    let generation = project.meta().generation.unwrap_or_default();
    let current_finalizers = project.meta().finalizers.clone().unwrap_or_default();

    if project.meta().deletion_timestamp.is_some() {
        return reconcile_delete(&project, &api, &ctx, &name, generation, &current_finalizers).await;
    }

    let (_, newly_attached) = finalizer::add(&api, &name, &current_finalizers, FINALIZER).await?;
    if newly_attached {
        let count = match count_projects_for_org(&ctx, &project.spec.org_ref).await {
            Ok(count) => count,
            Err(e) => return terminal(&api, &name, generation, e, ConditionStatus::Unknown).await,
        };
        ctx.metrics.quota.set_project_count(&project.spec.org_ref, count as i64);
    }

    let mut conditions = project.status.as_ref().map(|s| s.conditions.clone()).unwrap_or_default();
    status::set_condition(&mut conditions, status::READY, ConditionStatus::True, "Reconciled", "", generation);
    status::update_status(&api, &name, serde_json::json!({ "conditions": conditions })).await?;

    Ok(Action::requeue(Duration::from_secs(10 * 60)))
}

async fn reconcile_delete(
    project: &Project,
    api: &Api<Project>,
    ctx: &Arc<Context>,
    name: &str,
    generation: i64,
    current_finalizers: &[String],
) -> Result<Action> {
    if !finalizer::contains(current_finalizers, FINALIZER) {
        return Ok(Action::await_change());
    }

    let project_id = project.spec.project_id.clone();
    let bindings: Api<ProjectClusterBinding> = Api::all(ctx.client.clone());
    let all = match bindings.list(&ListParams::default()).await {
        Ok(all) => all,
        Err(e) => return terminal(api, name, generation, Error::KubeError(e), ConditionStatus::Unknown).await,
    };
    let owned: Vec<_> = all
        .items
        .into_iter()
        .filter(|b| b.spec.project_ref == project_id)
        .collect();

    for binding in &owned {
        let binding_name = binding.name_any();
        if let Err(e) = bindings.delete(&binding_name, &DeleteParams::default()).await {
            let err = Error::ClusterBindingDeletionError(e);
            let current = api.get(name).await?;
            let mut conditions = current.status.map(|s| s.conditions).unwrap_or_default();
            status::set_condition(&mut conditions, status::READY, ConditionStatus::False, err.reason(), err.to_string(), generation);
            status::set_condition(&mut conditions, status::ERROR, ConditionStatus::True, err.reason(), err.to_string(), generation);
            status::update_status(api, name, serde_json::json!({ "conditions": conditions })).await?;
            return Err(err);
        }
    }

    finalizer::remove(api, name, current_finalizers, FINALIZER).await?;
    let count = count_projects_for_org(ctx, &project.spec.org_ref).await?;
    ctx.metrics.quota.set_project_count(&project.spec.org_ref, count as i64);
    Ok(Action::await_change())
}

async fn terminal(
    api: &Api<Project>,
    name: &str,
    generation: i64,
    error: Error,
    ready: ConditionStatus,
) -> Result<Action> {
    set_error(api, name, generation, &error, ready).await?;
    Err(error)
}

async fn set_error(
    api: &Api<Project>,
    name: &str,
    generation: i64,
    error: &Error,
    ready: ConditionStatus,
) -> Result<()> {
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
    Ok(())
}

async fn count_projects_for_org(ctx: &Arc<Context>, org: &str) -> Result<i32> {
    let api: Api<Project> = Api::all(ctx.client.clone());
    let list = api.list(&ListParams::default()).await.map_err(Error::KubeError)?;
    Ok(list.items.iter().filter(|p| p.spec.org_ref == org).count() as i32)
}

fn error_policy(project: Arc<Project>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!("project reconcile failed: {:?}", error);
    ctx.metrics.reconcile.set_failure(CONTROLLER_NAME, &project, error);
    Action::requeue(Duration::from_secs(5 * 60))
}

pub async fn run(ctx: Arc<Context>) {
    let projects = Api::<Project>::all(ctx.client.clone());
    if let Err(e) = projects.list(&ListParams::default().limit(1)).await {
        error!("Project CRD is not queryable; {e:?}. Is the CRD installed?");
        std::process::exit(1);
    }
    Controller::new(projects, Config::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}
