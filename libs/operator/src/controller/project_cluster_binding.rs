use super::Context;
use crate::crd::project_cluster_binding::ProjectClusterBinding;
use crate::error::{Error, Result};
use crate::membership;
use crate::namespace;
use crate::refs;
use crate::status::{self, ConditionStatus};
use crate::telemetry;

use chrono::Utc;
use futures::StreamExt;
use kube::api::{Api, ListParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::*;

pub const CONTROLLER_NAME: &str = "projectclusterbinding";

#[instrument(skip(ctx, binding), fields(trace_id))]
async fn reconcile(binding: Arc<ProjectClusterBinding>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));
    let _timer = ctx.metrics.reconcile.count_and_measure(CONTROLLER_NAME, &trace_id);
    ctx.diagnostics.write().await.last_event = Utc::now();

    let name = binding.name_any();
    let api: Api<ProjectClusterBinding> = Api::all(ctx.client.clone());
    let generation = binding.meta().generation.unwrap_or_default();

    match run_steps(&binding, &ctx).await {
        Ok((namespace_name, bindings_count)) => {
            let mut conditions = binding.status.as_ref().map(|s| s.conditions.clone()).unwrap_or_default();
            status::set_condition(
                &mut conditions,
                status::READY,
                ConditionStatus::True,
                "Reconciled",
                format!("{bindings_count} role bindings projected"),
                generation,
            );
            status::set_condition(&mut conditions, status::ERROR, ConditionStatus::False, "NoError", "", generation);
            status::update_status(
                &api,
                &name,
                serde_json::json!({
                    "conditions": conditions,
                    "namespace": namespace_name,
                    "roleBindingsCount": bindings_count,
                }),
            )
            .await?;
            Ok(Action::requeue(Duration::from_secs(10 * 60)))
        }
        Err((error, terminal)) => {
            let current = api.get(&name).await?;
            let mut conditions = current.status.map(|s| s.conditions).unwrap_or_default();
            let ready = if terminal { ConditionStatus::False } else { ConditionStatus::Unknown };
            status::set_condition(&mut conditions, status::READY, ready, error.reason(), error.to_string(), generation);
            status::set_condition(&mut conditions, status::ERROR, ConditionStatus::True, error.reason(), error.to_string(), generation);
            status::update_status(&api, &name, serde_json::json!({ "conditions": conditions })).await?;
            if terminal {
                Err(error)
            } else {
                Ok(Action::requeue(Duration::from_secs(5 * 60)))
            }
        }
    }
}

/// Runs the nine-step choreography from spec.md 4.8, returning the
/// resolved namespace name and how many role bindings were projected on
/// success, or the error plus whether it should be treated as terminal
/// (not-found lookups) vs. transient (everything else).
async fn run_steps(
    binding: &ProjectClusterBinding,
    ctx: &Arc<Context>,
) -> std::result::Result<(String, usize), (Error, bool)> {
    // 1. Resolve references. projectRef/clusterRef are the projectID/
    // clusterID UUID strings (spec.md 4.7's cascade delete matches
    // projectRef against projectID the same way), not object names. Only
    // the not-found case is terminal; a transient `KubeError` surfacing
    // from the underlying `list()` call must requeue as `Unknown`
    // instead of being relabeled as a lookup failure (spec.md 4.8 step 1).
    let project = refs::find_project_by_id(&ctx.client, &binding.spec.project_ref)
        .await
        .map_err(|e| terminal_on_not_found(e))?;
    let cluster = refs::find_cluster_by_id(&ctx.client, &binding.spec.cluster_ref)
        .await
        .map_err(|e| terminal_on_not_found(e))?;

    // 2. Pick target client.
    let target = ctx
        .targets
        .client_for(&cluster)
        .await
        .map_err(|e| (e, false))?;

    // 3. Pick namespace name.
    let namespace_name = project
        .spec
        .project_namespace
        .clone()
        .unwrap_or_else(|| derive_namespace_name(&project.spec.org_ref, &project.name_any()));

    // 4. Ensure namespace, labelled.
    namespace::ensure_namespace(&target, &namespace_name, &project.spec.display_name)
        .await
        .map_err(|e| (Error::NamespaceCreationError(e), false))?;
    let mut labels = BTreeMap::new();
    labels.insert("vulkan.io/project".to_owned(), project.name_any());
    labels.insert("vulkan.io/projectID".to_owned(), project.spec.project_id.clone());
    labels.insert("vulkan.io/displayName".to_owned(), project.spec.display_name.clone());
    labels.insert("vulkan.io/org".to_owned(), project.spec.org_ref.clone());
    namespace::add_labels(&target, &namespace_name, &labels)
        .await
        .map_err(|e| (Error::NamespaceCreationError(e), false))?;

    // 5. Ensure quota.
    namespace::ensure_quota(&target, &namespace_name, &project.spec.resource_caps)
        .await
        .map_err(|e| (Error::QuotaCreationError(e), false))?;

    // 6. Ensure default-deny policy.
    namespace::ensure_default_deny(&target, &namespace_name)
        .await
        .map_err(|e| (Error::NetworkPolicyCreationError(e), false))?;

    // 7. Fetch members.
    let members = ctx
        .membership
        .members_of_project(&project.spec.project_id)
        .await
        .map_err(|e| (Error::ProjectMemberLookupError(e), false))?;

    // 8. Ensure role bindings for each mapped member; unknown roles are
    // skipped with a log event rather than failing the whole pass.
    let mut projected = 0usize;
    for member in &members {
        match membership::map_role_to_rbac(&member.role) {
            Some(rbac_role) => {
                namespace::ensure_role_binding(&target, &namespace_name, &member.email, rbac_role)
                    .await
                    .map_err(|e| (Error::RoleBindingCreationError(e), false))?;
                projected += 1;
            }
            None => {
                warn!(role = %member.role, email = %member.email, "skipping project member with unrecognized role");
            }
        }
    }

    Ok((namespace_name, projected))
}

/// `find_project_by_id`/`find_cluster_by_id` return `Error::ProjectNotFound`/
/// `Error::ClusterNotFound` only when the list came back empty of a match;
/// anything else (a transient `Error::KubeError` from the underlying
/// `list()` call) must stay transient rather than being collapsed into a
/// terminal not-found condition.
fn terminal_on_not_found(error: Error) -> (Error, bool) {
    let terminal = matches!(error, Error::ProjectNotFound(_) | Error::ClusterNotFound(_));
    (error, terminal)
}

fn derive_namespace_name(org: &str, project: &str) -> String {
    let mut hasher_input = String::with_capacity(org.len() + project.len() + 1);
    hasher_input.push_str(org);
    hasher_input.push('/');
    hasher_input.push_str(project);
    let digest = simple_stable_hash(&hasher_input);
    format!("proj-ns-{digest:x}")
}

/// FNV-1a: small, dependency-free, and stable across runs/process
/// restarts, which is what "derive a deterministic short name" (spec.md
/// 4.8 step 3) actually requires.
fn simple_stable_hash(input: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in input.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn error_policy(binding: Arc<ProjectClusterBinding>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!("project cluster binding reconcile failed: {:?}", error);
    ctx.metrics.reconcile.set_failure(CONTROLLER_NAME, &binding, error);
    Action::requeue(Duration::from_secs(5 * 60))
}

pub async fn run(ctx: Arc<Context>) {
    let bindings = Api::<ProjectClusterBinding>::all(ctx.client.clone());
    if let Err(e) = bindings.list(&ListParams::default().limit(1)).await {
        error!("ProjectClusterBinding CRD is not queryable; {e:?}. Is the CRD installed?");
        std::process::exit(1);
    }
    Controller::new(bindings, Config::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_name_is_deterministic_across_calls() {
        let a = derive_namespace_name("org1", "proj1");
        let b = derive_namespace_name("org1", "proj1");
        assert_eq!(a, b);
    }

    #[test]
    fn namespace_name_differs_for_different_projects() {
        let a = derive_namespace_name("org1", "proj1");
        let b = derive_namespace_name("org1", "proj2");
        assert_ne!(a, b);
    }

    #[test]
    fn namespace_name_carries_stable_prefix() {
        assert!(derive_namespace_name("org1", "proj1").starts_with("proj-ns-"));
    }
}
