use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCaps {
    pub cores: i32,
    pub memory_gi: i32,
    pub storage_gi: i32,
}

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "vulkan.io",
    version = "v1",
    kind = "Project",
    plural = "projects",
    derive = "PartialEq",
    status = "ProjectStatus",
    printcolumn = "{\"jsonPath\": \".status.conditions[?(@.type=='Ready')].status\", \"name\": \"READY\", \"type\": \"string\"}"
)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSpec {
    pub org_ref: String,
    #[serde(rename = "projectID")]
    pub project_id: String,
    pub display_name: String,
    pub resource_caps: ResourceCaps,
    /// If unset, the ProjectClusterBinding reconciler derives a
    /// deterministic `proj-ns-*` name (spec.md 4.8 step 3).
    pub project_namespace: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
