use crate::crd::project::ResourceCaps;

use k8s_openapi::api::core::v1::{Namespace, ResourceQuota};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use std::collections::BTreeMap;

const FIELD_MANAGER: &str = "vulkan-operator";
const DISPLAY_NAME_LABEL: &str = "vulkan.io/displayName";

fn apply_params() -> PatchParams {
    PatchParams::apply(FIELD_MANAGER).force()
}

/// C4: creates `name` if absent; if present, server-side apply patches
/// the `vulkan.io/displayName` label to match (spec.md 4.4). Apply is
/// idempotent by construction, so concurrent callers tolerate each other
/// without an explicit already-exists check.
pub async fn ensure_namespace(client: &Client, name: &str, display_label: &str) -> kube::Result<Namespace> {
    let api: Api<Namespace> = Api::all(client.clone());
    let desired = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": name,
            "labels": { DISPLAY_NAME_LABEL: display_label },
        },
    });
    let ns = api
        .patch(name, &apply_params(), &Patch::Apply(desired))
        .await?;
    Ok(ns)
}

pub async fn add_labels(
    client: &Client,
    ns: &str,
    labels: &BTreeMap<String, String>,
) -> kube::Result<Namespace> {
    let api: Api<Namespace> = Api::all(client.clone());
    let desired = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": { "name": ns, "labels": labels },
    });
    let patched = api
        .patch(ns, &apply_params(), &Patch::Apply(desired))
        .await?;
    Ok(patched)
}

/// `EnsureQuota` (spec.md 4.4): hard limits `cpu=cores`,
/// `memory=<memoryGi>Gi`, `ephemeral-storage=<storageGi>Gi`.
pub async fn ensure_quota(client: &Client, ns: &str, caps: &ResourceCaps) -> kube::Result<ResourceQuota> {
    let api: Api<ResourceQuota> = Api::namespaced(client.clone(), ns);
    let desired = serde_json::json!({
        "apiVersion": "v1",
        "kind": "ResourceQuota",
        "metadata": { "name": "vulkan-project-quota", "namespace": ns },
        "spec": {
            "hard": {
                "cpu": caps.cores.to_string(),
                "memory": format!("{}Gi", caps.memory_gi),
                "ephemeral-storage": format!("{}Gi", caps.storage_gi),
            }
        }
    });
    let quota = api
        .patch("vulkan-project-quota", &apply_params(), &Patch::Apply(desired))
        .await?;
    Ok(quota)
}

/// `EnsureDefaultDeny`: a policy selecting all workloads in `ns` with
/// empty ingress/egress rules, named `vulkan-default-deny`.
pub async fn ensure_default_deny(client: &Client, ns: &str) -> kube::Result<NetworkPolicy> {
    let api: Api<NetworkPolicy> = Api::namespaced(client.clone(), ns);
    let desired = serde_json::json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "NetworkPolicy",
        "metadata": { "name": "vulkan-default-deny", "namespace": ns },
        "spec": {
            "podSelector": {},
            "policyTypes": ["Ingress", "Egress"],
        }
    });
    let policy = api
        .patch("vulkan-default-deny", &apply_params(), &Patch::Apply(desired))
        .await?;
    Ok(policy)
}

/// `role` must be one of the built-in cluster-scoped roles `admin`,
/// `edit`, `view`; the binding is namespaced so its grant is fenced to
/// `ns` even though the role it references is cluster-scoped.
pub async fn ensure_role_binding(
    client: &Client,
    ns: &str,
    subject: &str,
    role: &str,
) -> kube::Result<RoleBinding> {
    let name = format!("rb-{role}-{subject}");
    let api: Api<RoleBinding> = Api::namespaced(client.clone(), ns);
    let desired = serde_json::json!({
        "apiVersion": "rbac.authorization.k8s.io/v1",
        "kind": "RoleBinding",
        "metadata": { "name": name, "namespace": ns },
        "subjects": [{
            "kind": "User",
            "name": subject,
            "apiGroup": "rbac.authorization.k8s.io",
        }],
        "roleRef": {
            "kind": "ClusterRole",
            "name": role,
            "apiGroup": "rbac.authorization.k8s.io",
        }
    });
    let binding = api
        .patch(&name, &apply_params(), &Patch::Apply(desired))
        .await?;
    Ok(binding)
}

pub fn role_binding_name(role: &str, subject: &str) -> String {
    format!("rb-{role}-{subject}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_binding_name_matches_spec_convention() {
        assert_eq!(role_binding_name("admin", "a@x"), "rb-admin-a@x");
        assert_eq!(role_binding_name("edit", "b@x"), "rb-edit-b@x");
    }

    // Mocked-client tests following echo/mod.rs's ApiServerVerifier
    // pattern: a tower_test::mock pair stands in for the apiserver and
    // asserts on the request the server-side-apply call actually sends.
    mod mocked_apiserver {
        use super::*;
        use http::{Request, Response};
        use kube::client::Body;
        use serde_json::Value;

        fn test_client() -> (Client, tower_test::mock::Handle<Request<Body>, Response<Body>>) {
            let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
            (Client::new(mock_service, "default"), handle)
        }

        #[tokio::test]
        async fn ensure_namespace_sends_server_side_apply_patch() {
            let (client, mut handle) = test_client();
            let server = tokio::spawn(async move {
                let (request, send) = handle.next_request().await.expect("service not called");
                assert_eq!(request.method(), http::Method::PATCH);
                assert!(request
                    .uri()
                    .to_string()
                    .starts_with("/api/v1/namespaces/proj-ns-abc"));
                assert!(request
                    .uri()
                    .query()
                    .unwrap()
                    .contains("fieldManager=vulkan-operator"));
                let body = request.into_body().collect_bytes().await.unwrap();
                let patch: Value = serde_json::from_slice(&body).unwrap();
                assert_eq!(
                    patch["metadata"]["labels"]["vulkan.io/displayName"],
                    "widgets"
                );
                let ns = serde_json::json!({
                    "apiVersion": "v1",
                    "kind": "Namespace",
                    "metadata": { "name": "proj-ns-abc" },
                });
                send.send_response(
                    Response::builder()
                        .body(Body::from(serde_json::to_vec(&ns).unwrap()))
                        .unwrap(),
                );
            });

            let ns = ensure_namespace(&client, "proj-ns-abc", "widgets")
                .await
                .unwrap();
            assert_eq!(ns.metadata.name.as_deref(), Some("proj-ns-abc"));
            tokio::time::timeout(std::time::Duration::from_secs(1), server)
                .await
                .expect("timeout on mock apiserver")
                .unwrap();
        }

        #[tokio::test]
        async fn ensure_quota_encodes_caps_as_hard_limits() {
            let (client, mut handle) = test_client();
            let caps = ResourceCaps {
                cores: 4,
                memory_gi: 8,
                storage_gi: 20,
            };
            let server = tokio::spawn(async move {
                let (request, send) = handle.next_request().await.expect("service not called");
                assert_eq!(request.method(), http::Method::PATCH);
                let body = request.into_body().collect_bytes().await.unwrap();
                let patch: Value = serde_json::from_slice(&body).unwrap();
                assert_eq!(patch["spec"]["hard"]["cpu"], "4");
                assert_eq!(patch["spec"]["hard"]["memory"], "8Gi");
                assert_eq!(patch["spec"]["hard"]["ephemeral-storage"], "20Gi");
                let quota = serde_json::json!({
                    "apiVersion": "v1",
                    "kind": "ResourceQuota",
                    "metadata": { "name": "vulkan-project-quota", "namespace": "proj-ns-abc" },
                });
                send.send_response(
                    Response::builder()
                        .body(Body::from(serde_json::to_vec(&quota).unwrap()))
                        .unwrap(),
                );
            });

            ensure_quota(&client, "proj-ns-abc", &caps).await.unwrap();
            tokio::time::timeout(std::time::Duration::from_secs(1), server)
                .await
                .expect("timeout on mock apiserver")
                .unwrap();
        }
    }
}
