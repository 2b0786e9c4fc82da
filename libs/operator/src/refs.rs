//! Reference resolution for the UUID-keyed cross-entity references
//! spec.md §3 defines (`orgRef (orgID)`, and by the same convention
//! `projectRef`/`clusterRef` against `projectID`/`clusterID` — spec.md
//! 4.7 states the Project deletion cascade matches `projectRef` against
//! `projectID` "on the UUID string", not the object name). These are
//! business keys, not Kubernetes object names, so every lookup lists
//! the kind and filters on the ID field rather than calling `Api::get`.

use crate::crd::cluster::Cluster;
use crate::crd::organization::Organization;
use crate::crd::project::Project;
use crate::error::{Error, Result};

use kube::api::{Api, ListParams};
use kube::Client;

pub async fn find_org_by_id(client: &Client, org_id: &str) -> Result<Organization> {
    let api: Api<Organization> = Api::all(client.clone());
    let list = api.list(&ListParams::default()).await.map_err(Error::KubeError)?;
    list.items
        .into_iter()
        .find(|o| o.spec.org_id == org_id)
        .ok_or_else(|| Error::OrgNotFound(org_id.to_owned()))
}

pub async fn find_project_by_id(client: &Client, project_id: &str) -> Result<Project> {
    let api: Api<Project> = Api::all(client.clone());
    let list = api.list(&ListParams::default()).await.map_err(Error::KubeError)?;
    list.items
        .into_iter()
        .find(|p| p.spec.project_id == project_id)
        .ok_or_else(|| Error::ProjectNotFound(project_id.to_owned()))
}

pub async fn find_cluster_by_id(client: &Client, cluster_id: &str) -> Result<Cluster> {
    let api: Api<Cluster> = Api::all(client.clone());
    let list = api.list(&ListParams::default()).await.map_err(Error::KubeError)?;
    list.items
        .into_iter()
        .find(|c| c.spec.cluster_id == cluster_id)
        .ok_or_else(|| Error::ClusterNotFound(cluster_id.to_owned()))
}
