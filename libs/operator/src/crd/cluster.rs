use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClusterType {
    Attached,
    Eks,
    Aks,
    Gke,
}

impl Default for ClusterType {
    fn default() -> Self {
        Self::Attached
    }
}

impl ClusterType {
    pub fn is_attached(self) -> bool {
        matches!(self, ClusterType::Attached)
    }
}

/// A single declared node-pool entry. Kept as a schema field because
/// `spec.md` models it in the data model, but no reconciler currently
/// acts on it: cloud node-pool provisioning is out of scope (spec.md's
/// "Out of scope" list names the onboarding transaction and the
/// orchestrator API's wire format as external collaborators).
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodePool {
    pub name: String,
    pub instance_type: String,
    pub min_size: i32,
    pub max_size: i32,
}

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "vulkan.io",
    version = "v1",
    kind = "Cluster",
    plural = "clusters",
    derive = "PartialEq",
    status = "ClusterStatus",
    printcolumn = "{\"jsonPath\": \".status.conditions[?(@.type=='Ready')].status\", \"name\": \"READY\", \"type\": \"string\"}"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub org_ref: String,
    #[serde(rename = "type")]
    pub type_: ClusterType,
    pub region: Option<String>,
    pub kubeconfig_secret_name: Option<String>,
    pub kubeconfig_secret_namespace: Option<String>,
    pub display_name: String,
    #[serde(rename = "clusterID")]
    pub cluster_id: String,
    #[serde(default)]
    pub node_pools: Vec<NodePool>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub ready_node_count: i32,
}
