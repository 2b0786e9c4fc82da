use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Minimal typed view of the pipeline engine's run kind (spec.md names
/// it an external collaborator referenced only by contract). The
/// reconciler only needs enough of its shape to build an owner
/// reference, set parameters, and read completion.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct Param {
    pub name: String,
    pub value: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct PipelineRef {
    pub name: String,
}

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "tekton.dev",
    version = "v1",
    kind = "PipelineRun",
    plural = "pipelineruns",
    derive = "PartialEq",
    namespaced,
    status = "PipelineRunStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunSpec {
    pub pipeline_ref: PipelineRef,
    #[serde(default)]
    pub params: Vec<Param>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub completion_time: Option<Time>,
}

impl PipelineRunStatus {
    pub fn is_finished(&self) -> bool {
        self.completion_time.is_some()
    }

    pub fn is_succeeded(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.type_ == "Succeeded" && c.status == "True")
    }

    pub fn params_map(params: &[Param]) -> std::collections::BTreeMap<String, String> {
        params
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }
}
