pub mod application;
pub mod cluster;
pub mod organization;
pub mod project;
pub mod project_cluster_binding;

use crate::membership::MembershipRepository;
use crate::metrics::Metrics;
use crate::target::TargetClientFactory;

use chrono::{DateTime, Utc};
use kube::runtime::events::Reporter;
use kube::Client;
use prometheus_client::registry::Registry;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Context shared by every reconciler kind (C5-C9). Cloning is cheap:
/// every field is itself a cheaply-clonable handle.
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    pub metrics: Arc<Metrics>,
    pub targets: Arc<TargetClientFactory>,
    pub membership: MembershipRepository,
}

/// Diagnostics read by the web server's `/health` surface.
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    #[serde(deserialize_with = "from_ts")]
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: "vulkan-operator".into(),
        }
    }
}

fn from_ts<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(serde::Deserialize)]
    struct Wrapper(#[serde(with = "chrono::serde::ts_seconds")] DateTime<Utc>);
    let helper = Wrapper::deserialize(deserializer)?;
    Ok(helper.0)
}

/// State shared between every controller task and the web server.
#[derive(Clone)]
pub struct State {
    diagnostics: Arc<RwLock<Diagnostics>>,
    metrics: Arc<Metrics>,
    registry: Arc<Mutex<Registry>>,
    membership: MembershipRepository,
}

impl State {
    pub fn new(mut registry: Registry, membership: MembershipRepository) -> Self {
        let metrics = Metrics::register(&mut registry);
        Self {
            diagnostics: Arc::new(RwLock::new(Diagnostics::default())),
            metrics: Arc::new(metrics),
            registry: Arc::new(Mutex::new(registry)),
            membership,
        }
    }

    pub async fn metrics(&self) -> String {
        let mut buffer = String::new();
        let registry = self.registry.lock().await;
        prometheus_client::encoding::text::encode(&mut buffer, &registry).unwrap();
        buffer
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    pub fn to_context(&self, client: Client) -> Arc<Context> {
        Arc::new(Context {
            targets: Arc::new(TargetClientFactory::new(client.clone(), self.registry.clone())),
            client,
            metrics: self.metrics.clone(),
            diagnostics: self.diagnostics.clone(),
            membership: self.membership.clone(),
        })
    }
}
