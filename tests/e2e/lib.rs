#[cfg(all(test, feature = "e2e-tests"))]
mod test {
    use std::time::Duration;

    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::ByteString;
    use kube::api::{Api, ObjectMeta, PostParams};
    use kube::client::Client;
    use kube::runtime::wait::{await_condition, Condition};
    use vulkan_operator::crd::cluster::{Cluster, ClusterSpec, ClusterType};
    use vulkan_operator::crd::organization::{Organization, OrganizationSpec, OrgQuota};
    use vulkan_operator::crd::project::{Project, ProjectSpec, ResourceCaps};
    use vulkan_operator::crd::project_cluster_binding::{
        ProjectClusterBinding, ProjectClusterBindingSpec,
    };

    fn cluster_ready(want: &'static str) -> impl Condition<Cluster> {
        move |obj: Option<&Cluster>| {
            obj.and_then(|c| c.status.as_ref())
                .map(|s| {
                    s.conditions
                        .iter()
                        .any(|c| c.type_ == "Ready" && c.status == want)
                })
                .unwrap_or(false)
        }
    }

    fn cluster_reason(want: &'static str) -> impl Condition<Cluster> {
        move |obj: Option<&Cluster>| {
            obj.and_then(|c| c.status.as_ref())
                .map(|s| {
                    s.conditions
                        .iter()
                        .any(|c| c.type_ == "Ready" && c.reason.as_deref() == Some(want))
                })
                .unwrap_or(false)
        }
    }

    fn project_gone() -> impl Condition<Project> {
        |obj: Option<&Project>| obj.is_none()
    }

    async fn wait_for<R, C>(api: Api<R>, name: &str, condition: C)
    where
        R: kube::Resource
            + Clone
            + std::fmt::Debug
            + for<'de> k8s_openapi::serde::Deserialize<'de>
            + 'static
            + Send,
        C: Condition<R>,
    {
        tokio::time::timeout(
            Duration::from_secs(30),
            await_condition(api, name, condition),
        )
        .await
        .expect("timed out waiting for condition")
        .expect("condition watch stream closed");
    }

    /// `orgRef` on Cluster/Project/Application is the Organization's
    /// `orgID` business key (spec.md §3), not its Kubernetes object name,
    /// so callers must thread the generated `org_id` through to every
    /// child spec rather than reusing the Organization's resource name.
    fn org_spec(org_id: &str, quota_clusters: i32) -> OrganizationSpec {
        OrganizationSpec {
            org_id: org_id.to_owned(),
            display_name: "Acme".to_owned(),
            owner_email: "owner@acme.test".to_owned(),
            quota: OrgQuota {
                clusters: quota_clusters,
                apps: 10,
            },
        }
    }

    /// Scenario 1 (spec.md §8): attached cluster with a valid credential
    /// secret reaches `Ready=True, Reason=Reconciled` on the first pass.
    #[tokio::test]
    async fn happy_cluster_reaches_ready() {
        let client = Client::try_default().await.unwrap();
        let orgs: Api<Organization> = Api::all(client.clone());
        let clusters: Api<Cluster> = Api::all(client.clone());
        let secrets: Api<Secret> = Api::namespaced(client.clone(), "default");

        let org_id = uuid::Uuid::new_v4().to_string();
        let org = Organization::new("o-happy", org_spec(&org_id, 2));
        orgs.create(&PostParams::default(), &org).await.unwrap();

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("cred1".to_owned()),
                namespace: Some("default".to_owned()),
                ..Default::default()
            },
            data: Some(std::collections::BTreeMap::from([(
                "kubeconfig".to_owned(),
                ByteString(b"apiVersion: v1\nkind: Config\n".to_vec()),
            )])),
            ..Default::default()
        };
        secrets.create(&PostParams::default(), &secret).await.unwrap();

        let cluster = Cluster::new(
            "c-happy",
            ClusterSpec {
                org_ref: org_id.clone(),
                type_: ClusterType::Attached,
                region: None,
                kubeconfig_secret_name: Some("cred1".to_owned()),
                kubeconfig_secret_namespace: Some("default".to_owned()),
                display_name: "happy".to_owned(),
                cluster_id: "c-happy".to_owned(),
                node_pools: vec![],
            },
        );
        clusters.create(&PostParams::default(), &cluster).await.unwrap();

        wait_for(clusters.clone(), "c-happy", cluster_ready("True")).await;
    }

    /// Scenario 2: a non-attached cluster referencing a kubeconfig Secret
    /// that does not exist never reaches `Ready`; it surfaces
    /// `KubeconfigSecretMissing` instead.
    #[tokio::test]
    async fn missing_credentials_blocks_readiness() {
        let client = Client::try_default().await.unwrap();
        let orgs: Api<Organization> = Api::all(client.clone());
        let clusters: Api<Cluster> = Api::all(client.clone());

        let org_id = uuid::Uuid::new_v4().to_string();
        let org = Organization::new("o-missing-cred", org_spec(&org_id, 2));
        orgs.create(&PostParams::default(), &org).await.unwrap();

        let cluster = Cluster::new(
            "c-missing-cred",
            ClusterSpec {
                org_ref: org_id.clone(),
                type_: ClusterType::Eks,
                region: Some("us-east-1".to_owned()),
                kubeconfig_secret_name: Some("missing".to_owned()),
                kubeconfig_secret_namespace: Some("default".to_owned()),
                display_name: "missing-cred".to_owned(),
                cluster_id: "c-missing-cred".to_owned(),
                node_pools: vec![],
            },
        );
        clusters.create(&PostParams::default(), &cluster).await.unwrap();

        wait_for(
            clusters.clone(),
            "c-missing-cred",
            cluster_reason("KubeconfigSecretMissing"),
        )
        .await;
    }

    /// Scenario 3: the second Cluster created against a quota of one sets
    /// `Error=True, Reason=ClusterQuotaExceeded`.
    #[tokio::test]
    async fn second_cluster_over_quota_of_one_is_rejected() {
        let client = Client::try_default().await.unwrap();
        let orgs: Api<Organization> = Api::all(client.clone());
        let clusters: Api<Cluster> = Api::all(client.clone());

        let org_id = uuid::Uuid::new_v4().to_string();
        let org = Organization::new("o-quota", org_spec(&org_id, 1));
        orgs.create(&PostParams::default(), &org).await.unwrap();

        let first = Cluster::new(
            "c-quota-1",
            ClusterSpec {
                org_ref: org_id.clone(),
                type_: ClusterType::Attached,
                region: None,
                kubeconfig_secret_name: None,
                kubeconfig_secret_namespace: None,
                display_name: "first".to_owned(),
                cluster_id: "c-quota-1".to_owned(),
                node_pools: vec![],
            },
        );
        clusters.create(&PostParams::default(), &first).await.unwrap();
        wait_for(clusters.clone(), "c-quota-1", cluster_ready("True")).await;

        let second = Cluster::new(
            "c-quota-2",
            ClusterSpec {
                org_ref: org_id.clone(),
                type_: ClusterType::Attached,
                region: None,
                kubeconfig_secret_name: None,
                kubeconfig_secret_namespace: None,
                display_name: "second".to_owned(),
                cluster_id: "c-quota-2".to_owned(),
                node_pools: vec![],
            },
        );
        clusters.create(&PostParams::default(), &second).await.unwrap();

        wait_for(
            clusters.clone(),
            "c-quota-2",
            cluster_reason("ClusterQuotaExceeded"),
        )
        .await;
    }

    /// Scenario 4: deleting a Project cascades removal of every
    /// ProjectClusterBinding referencing it before the Project's own
    /// finalizer is removed.
    #[tokio::test]
    async fn project_deletion_cascades_binding_removal() {
        let client = Client::try_default().await.unwrap();
        let orgs: Api<Organization> = Api::all(client.clone());
        let clusters: Api<Cluster> = Api::all(client.clone());
        let projects: Api<Project> = Api::all(client.clone());
        let bindings: Api<ProjectClusterBinding> = Api::all(client.clone());

        let org_id = uuid::Uuid::new_v4().to_string();
        let org = Organization::new("o-cascade", org_spec(&org_id, 2));
        orgs.create(&PostParams::default(), &org).await.unwrap();

        let cluster = Cluster::new(
            "c-cascade",
            ClusterSpec {
                org_ref: org_id.clone(),
                type_: ClusterType::Attached,
                region: None,
                kubeconfig_secret_name: None,
                kubeconfig_secret_namespace: None,
                display_name: "cascade".to_owned(),
                cluster_id: "c-cascade".to_owned(),
                node_pools: vec![],
            },
        );
        clusters.create(&PostParams::default(), &cluster).await.unwrap();
        wait_for(clusters.clone(), "c-cascade", cluster_ready("True")).await;

        let project = Project::new(
            "p-cascade",
            ProjectSpec {
                org_ref: org_id.clone(),
                project_id: "p1".to_owned(),
                display_name: "cascade project".to_owned(),
                resource_caps: ResourceCaps {
                    cores: 4,
                    memory_gi: 8,
                    storage_gi: 20,
                },
                project_namespace: None,
            },
        );
        projects.create(&PostParams::default(), &project).await.unwrap();

        let binding = ProjectClusterBinding::new(
            "b-cascade",
            ProjectClusterBindingSpec {
                project_ref: "p1".to_owned(),
                cluster_ref: "c-cascade".to_owned(),
            },
        );
        bindings.create(&PostParams::default(), &binding).await.unwrap();

        projects
            .delete("p-cascade", &Default::default())
            .await
            .unwrap();

        wait_for(projects.clone(), "p-cascade", project_gone()).await;

        let remaining = bindings.list(&Default::default()).await.unwrap();
        assert!(
            !remaining.items.iter().any(|b| b.spec.project_ref == "p1"),
            "binding referencing deleted project must be gone"
        );
    }
}
