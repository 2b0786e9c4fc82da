use crate::crd::cluster::{Cluster, ClusterType};
use crate::error::{Error, Result};

use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::{Client, Config};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::sync::Mutex;
use vulkan_operator_k8s_util::client::new_target_client_with_metrics;

/// Conservative defaults for a remote target client (spec.md 4.1): the
/// operator has no local admission control over a cluster it does not
/// run in, so requests against it are throttled up front.
const TARGET_QPS: u64 = 200;
const TARGET_BURST: u64 = 400;

/// C1: produces an orchestrator API client bound to a Cluster resource.
/// `attached` clusters reuse the ambient client the controller itself
/// runs under; every other type resolves a kubeconfig Secret and
/// constructs a rate-limited client for it.
pub struct TargetClientFactory {
    ambient: Client,
    registry: Arc<Mutex<Registry>>,
}

impl TargetClientFactory {
    pub fn new(ambient: Client, registry: Arc<Mutex<Registry>>) -> Self {
        Self { ambient, registry }
    }

    pub async fn client_for(&self, cluster: &Cluster) -> Result<Client> {
        if cluster.spec.type_ == ClusterType::Attached {
            return Ok(self.ambient.clone());
        }

        let secret_name = cluster
            .spec
            .kubeconfig_secret_name
            .as_deref()
            .ok_or_else(|| Error::SecretNotFound {
                namespace: cluster
                    .spec
                    .kubeconfig_secret_namespace
                    .clone()
                    .unwrap_or_default(),
                name: String::new(),
            })?;
        let secret_namespace = cluster
            .spec
            .kubeconfig_secret_namespace
            .as_deref()
            .unwrap_or("default");

        let secrets: Api<Secret> = Api::namespaced(self.ambient.clone(), secret_namespace);
        let secret = secrets
            .get(secret_name)
            .await
            .map_err(|_| Error::SecretNotFound {
                namespace: secret_namespace.to_owned(),
                name: secret_name.to_owned(),
            })?;

        let kubeconfig_bytes = secret
            .data
            .as_ref()
            .and_then(|d| d.get("kubeconfig"))
            .map(|b| b.0.clone())
            .ok_or_else(|| Error::MalformedCredential {
                namespace: secret_namespace.to_owned(),
                name: secret_name.to_owned(),
            })?;

        let kubeconfig: kube::config::Kubeconfig = serde_yaml::from_slice(&kubeconfig_bytes)
            .map_err(|source| Error::CredentialParseError {
                namespace: secret_namespace.to_owned(),
                name: secret_name.to_owned(),
                source,
            })?;

        let config = Config::from_kubeconfig(&kubeconfig)
            .await
            .map_err(|_| Error::MalformedCredential {
                namespace: secret_namespace.to_owned(),
                name: secret_name.to_owned(),
            })?;

        let mut registry = self.registry.lock().await;
        let client =
            new_target_client_with_metrics(config, &mut registry, TARGET_QPS, TARGET_BURST)
                .await?;
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::cluster::ClusterSpec;
    use kube::core::ObjectMeta;

    fn cluster_of(type_: ClusterType) -> Cluster {
        Cluster {
            metadata: ObjectMeta {
                name: Some("c1".to_owned()),
                ..Default::default()
            },
            spec: ClusterSpec {
                org_ref: "org1".to_owned(),
                type_,
                region: None,
                kubeconfig_secret_name: None,
                kubeconfig_secret_namespace: None,
                display_name: "c1".to_owned(),
                cluster_id: "c1".to_owned(),
                node_pools: vec![],
            },
            status: None,
        }
    }

    #[test]
    fn attached_cluster_needs_no_secret_name() {
        let cluster = cluster_of(ClusterType::Attached);
        assert!(cluster.spec.kubeconfig_secret_name.is_none());
    }

    #[test]
    fn remote_cluster_without_secret_name_is_distinguishable() {
        let cluster = cluster_of(ClusterType::Eks);
        assert_ne!(cluster.spec.type_, ClusterType::Attached);
    }
}
