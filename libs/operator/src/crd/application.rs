use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BuildStrategy {
    Buildpack,
    Dockerfile,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    pub strategy: BuildStrategy,
    #[serde(rename = "ref")]
    pub ref_: String,
    pub dockerfile: Option<String>,
    pub builder_image: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Autoscaling {
    pub min_replicas: Option<i32>,
    pub max_replicas: Option<i32>,
}

#[derive(CustomResource, Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "vulkan.io",
    version = "v1",
    kind = "Application",
    plural = "applications",
    derive = "PartialEq",
    namespaced,
    status = "ApplicationStatus",
    printcolumn = "{\"jsonPath\": \".status.conditions[?(@.type=='Ready')].status\", \"name\": \"READY\", \"type\": \"string\"}"
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    pub project_ref: String,
    pub org_ref: String,
    pub repo_url: String,
    pub build: BuildSpec,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    pub autoscaling: Option<Autoscaling>,
    /// Registry + GitOps coordinates the pipeline-run parameter set
    /// needs (spec.md 4.9); not part of the distilled spec's field list
    /// but required to construct `image-name`/`gitops-*` parameters.
    pub registry: String,
    pub gitops_repo_url: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub latest_pipeline_run: Option<String>,
}
