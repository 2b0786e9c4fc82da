use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "vulkan.io",
    version = "v1",
    kind = "ProjectClusterBinding",
    plural = "projectclusterbindings",
    derive = "PartialEq",
    status = "ProjectClusterBindingStatus",
    printcolumn = "{\"jsonPath\": \".status.conditions[?(@.type=='Ready')].status\", \"name\": \"READY\", \"type\": \"string\"}"
)]
#[serde(rename_all = "camelCase")]
pub struct ProjectClusterBindingSpec {
    pub project_ref: String,
    pub cluster_ref: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectClusterBindingStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub namespace: Option<String>,
    #[serde(default)]
    pub role_bindings_count: i32,
}
