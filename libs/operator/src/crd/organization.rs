use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct OrgQuota {
    pub clusters: i32,
    pub apps: i32,
}

/// `orgID` duplicates the object name in most cases but is kept as its
/// own field because the relational store and the external API key
/// membership and onboarding records off this UUID, not the resource
/// name (spec.md §3).
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "vulkan.io",
    version = "v1",
    kind = "Organization",
    plural = "organizations",
    derive = "PartialEq",
    status = "OrganizationStatus",
    printcolumn = "{\"jsonPath\": \".status.conditions[?(@.type=='Ready')].status\", \"name\": \"READY\", \"type\": \"string\"}"
)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSpec {
    #[serde(rename = "orgID")]
    pub org_id: String,
    pub display_name: String,
    pub owner_email: String,
    pub quota: OrgQuota,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub clusters_live: i32,
    #[serde(default)]
    pub projects_live: i32,
    #[serde(default)]
    pub applications_live: i32,
}
