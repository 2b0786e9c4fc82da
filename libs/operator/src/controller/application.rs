use super::Context;
use crate::crd::application::{Application, BuildStrategy};
use crate::crd::pipeline_run::{Param, PipelineRef, PipelineRun, PipelineRunSpec, PipelineRunStatus};
use crate::error::{Error, Result};
use crate::quota;
use crate::refs;
use crate::status::{self, ConditionStatus};
use crate::telemetry;

use chrono::Utc;
use futures::StreamExt;
use kube::api::{Api, ListParams, ObjectMeta, PostParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::*;

pub const CONTROLLER_NAME: &str = "application";

#[instrument(skip(ctx, app), fields(trace_id))]
async fn reconcile(app: Arc<Application>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));
    let _timer = ctx.metrics.reconcile.count_and_measure(CONTROLLER_NAME, &trace_id);
    ctx.diagnostics.write().await.last_event = Utc::now();

    let name = app.name_any();
    let namespace = app.namespace().ok_or_else(|| {
        Error::UserInputError("Application resource must be namespaced".to_owned())
    })?;
    let api: Api<Application> = Api::namespaced(ctx.client.clone(), &namespace);
    let generation = app.meta().generation.unwrap_or_default();

    // Quota: count{Application: orgRef=O} <= Org(O).quota.apps (spec.md 3).
    // orgRef is the Organization's orgID, not its object name (spec.md 3).
    let org = match refs::find_org_by_id(&ctx.client, &app.spec.org_ref).await {
        Ok(org) => org,
        Err(e) => return terminal(&api, &name, generation, e, ConditionStatus::Unknown).await,
    };
    let all_apps: Api<Application> = Api::all(ctx.client.clone());
    let app_count = match quota::count_applications_for_org(&all_apps, &app.spec.org_ref).await {
        Ok(count) => count,
        Err(e) => return terminal(&api, &name, generation, Error::KubeError(e), ConditionStatus::Unknown).await,
    };
    ctx.metrics.quota.set_application_count(&app.spec.org_ref, app_count as i64);
    ctx.metrics
        .quota
        .set_quota_usage(&app.spec.org_ref, "apps", app_count as i64, org.spec.quota.apps);
    if quota::is_over_quota(app_count, org.spec.quota.apps) {
        let err = Error::ApplicationQuotaExceeded {
            org: app.spec.org_ref.clone(),
            quota: org.spec.quota.apps,
            count: app_count,
        };
        let mut conditions = app.status.as_ref().map(|s| s.conditions.clone()).unwrap_or_default();
        status::set_condition(&mut conditions, status::READY, ConditionStatus::False, err.reason(), err.to_string(), generation);
        status::set_condition(&mut conditions, status::ERROR, ConditionStatus::True, err.reason(), err.to_string(), generation);
        status::update_status(&api, &name, serde_json::json!({ "conditions": conditions })).await?;
        return Err(err);
    }

    let params = build_params(&app)?;

    let runs: Api<PipelineRun> = Api::namespaced(ctx.client.clone(), &namespace);
    let owned_runs = runs
        .list(&ListParams::default().labels(&format!("vulkan.io/application={name}")))
        .await
        .map_err(Error::KubeError)?;

    let needs_new_run = needs_new_run(&owned_runs.items, &params);

    let mut conditions = app.status.as_ref().map(|s| s.conditions.clone()).unwrap_or_default();

    if needs_new_run {
        let pipeline_ref = pipeline_ref_for(&app)?;
        let owner_ref = app.controller_owner_ref(&()).ok_or_else(|| {
            Error::UserInputError("Application is missing required metadata to own a PipelineRun".to_owned())
        })?;

        let mut labels = BTreeMap::new();
        labels.insert("vulkan.io/application".to_owned(), name.clone());

        let desired_run = PipelineRun {
            metadata: ObjectMeta {
                generate_name: Some(format!("{name}-build-")),
                namespace: Some(namespace.clone()),
                labels: Some(labels),
                owner_references: Some(vec![owner_ref]),
                ..Default::default()
            },
            spec: PipelineRunSpec {
                pipeline_ref: PipelineRef { name: pipeline_ref },
                params,
            },
            status: None,
        };

        let created = runs
            .create(&PostParams::default(), &desired_run)
            .await
            .map_err(Error::KubeError)?;

        status::set_condition(&mut conditions, status::READY, ConditionStatus::True, "PipelineRunLaunched", "", generation);
        status::update_status(
            &api,
            &name,
            serde_json::json!({
                "conditions": conditions,
                "latestPipelineRun": created.name_any(),
            }),
        )
        .await?;
    } else {
        status::set_condition(&mut conditions, status::READY, ConditionStatus::True, "Reconciled", "up to date", generation);
        status::update_status(&api, &name, serde_json::json!({ "conditions": conditions })).await?;
    }

    Ok(Action::requeue(Duration::from_secs(5 * 60)))
}

/// Builds the parameter set spec.md 4.9 specifies: the shared params
/// plus a strategy-specific addition. An unknown strategy is a terminal
/// error, not a requeue.
fn build_params(app: &Application) -> Result<Vec<Param>> {
    let name = app.name_any();
    let mut params = vec![
        Param { name: "repo-url".to_owned(), value: app.spec.repo_url.clone() },
        Param { name: "branch".to_owned(), value: app.spec.build.ref_.clone() },
        Param {
            name: "image-name".to_owned(),
            value: format!("{}/{}", app.spec.registry, name),
        },
        Param { name: "image-tag".to_owned(), value: app.spec.build.ref_.clone() },
        Param { name: "app-name".to_owned(), value: name.clone() },
        Param {
            name: "gitops-repo-url".to_owned(),
            value: app.spec.gitops_repo_url.clone(),
        },
        Param {
            name: "gitops-app-path".to_owned(),
            value: format!("apps/{name}"),
        },
    ];

    match app.spec.build.strategy {
        BuildStrategy::Dockerfile => {
            let path = app.spec.build.dockerfile.clone().unwrap_or_else(|| "./Dockerfile".to_owned());
            params.push(Param { name: "dockerfile-path".to_owned(), value: path });
        }
        BuildStrategy::Buildpack => {
            let builder = app
                .spec
                .build
                .builder_image
                .clone()
                .unwrap_or_else(|| "paketobuildpacks/builder:base".to_owned());
            params.push(Param { name: "builder-image".to_owned(), value: builder });
        }
    }

    Ok(params)
}

/// I7 / spec.md 4.9: a new run is needed iff no runs exist yet, or every
/// existing run has finished and the most-recent *successful* one's
/// parameters no longer match what we'd launch today. A run still in
/// flight always blocks a new launch, successful or not.
fn needs_new_run(runs: &[PipelineRun], desired_params: &[Param]) -> bool {
    if runs.is_empty() {
        return true;
    }
    if runs.iter().any(|r| !r.status.as_ref().is_some_and(|s| s.is_finished())) {
        return false;
    }

    let mut finished: Vec<&PipelineRun> = runs
        .iter()
        .filter(|r| r.status.as_ref().is_some_and(|s| s.is_finished()))
        .collect();
    finished.sort_by_key(|r| r.meta().creation_timestamp.clone());

    let latest_successful = finished
        .into_iter()
        .rev()
        .find(|r| r.status.as_ref().is_some_and(|s| s.is_succeeded()));

    match latest_successful {
        None => true,
        Some(run) => {
            let desired = PipelineRunStatus::params_map(desired_params);
            let actual = PipelineRunStatus::params_map(&run.spec.params);
            desired != actual
        }
    }
}

fn pipeline_ref_for(app: &Application) -> Result<String> {
    match app.spec.build.strategy {
        BuildStrategy::Dockerfile => Ok("app-build-dockerfile".to_owned()),
        BuildStrategy::Buildpack => Ok("app-build-buildpack".to_owned()),
    }
}

async fn terminal(
    api: &Api<Application>,
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

fn error_policy(app: Arc<Application>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!("application reconcile failed: {:?}", error);
    ctx.metrics.reconcile.set_failure(CONTROLLER_NAME, &app, error);
    Action::requeue(Duration::from_secs(5 * 60))
}

pub async fn run(ctx: Arc<Context>) {
    let apps = Api::<Application>::all(ctx.client.clone());
    if let Err(e) = apps.list(&ListParams::default().limit(1)).await {
        error!("Application CRD is not queryable; {e:?}. Is the CRD installed?");
        std::process::exit(1);
    }
    Controller::new(apps, Config::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::application::{ApplicationSpec, BuildSpec};

    fn app_with_strategy(strategy: BuildStrategy) -> Application {
        Application {
            metadata: ObjectMeta {
                name: Some("shop".to_owned()),
                namespace: Some("proj-ns-1".to_owned()),
                uid: Some("11111111-1111-1111-1111-111111111111".to_owned()),
                ..Default::default()
            },
            spec: ApplicationSpec {
                project_ref: "p1".to_owned(),
                org_ref: "o1".to_owned(),
                repo_url: "https://example.com/shop.git".to_owned(),
                build: BuildSpec {
                    strategy,
                    ref_: "main".to_owned(),
                    dockerfile: None,
                    builder_image: None,
                },
                env: vec![],
                autoscaling: None,
                registry: "registry.example.com/acme".to_owned(),
                gitops_repo_url: "https://example.com/gitops.git".to_owned(),
            },
            status: None,
        }
    }

    #[test]
    fn dockerfile_strategy_adds_dockerfile_path_param() {
        let app = app_with_strategy(BuildStrategy::Dockerfile);
        let params = build_params(&app).unwrap();
        assert!(params.iter().any(|p| p.name == "dockerfile-path" && p.value == "./Dockerfile"));
    }

    #[test]
    fn buildpack_strategy_adds_builder_image_param() {
        let app = app_with_strategy(BuildStrategy::Buildpack);
        let params = build_params(&app).unwrap();
        assert!(params
            .iter()
            .any(|p| p.name == "builder-image" && p.value == "paketobuildpacks/builder:base"));
    }

    #[test]
    fn image_name_combines_registry_and_app_name() {
        let app = app_with_strategy(BuildStrategy::Dockerfile);
        let params = build_params(&app).unwrap();
        let image_name = params.iter().find(|p| p.name == "image-name").unwrap();
        assert_eq!(image_name.value, "registry.example.com/acme/shop");
    }

    #[test]
    fn pipeline_ref_differs_by_strategy() {
        let dockerfile = pipeline_ref_for(&app_with_strategy(BuildStrategy::Dockerfile)).unwrap();
        let buildpack = pipeline_ref_for(&app_with_strategy(BuildStrategy::Buildpack)).unwrap();
        assert_ne!(dockerfile, buildpack);
    }
}
