use crate::metrics::MetricsLayer;
use crate::ratelimit::RateLimitLayer;

use hyper_util::rt::TokioExecutor;
use kube::Result;
use kube::{client::ConfigExt, Client, Config};
use prometheus_client::registry::Registry;
use std::time::Duration;
use tower::ServiceBuilder;

pub async fn new_client_with_metrics(config: Config, registry: &mut Registry) -> Result<Client> {
    let metrics_layer = MetricsLayer::new(registry);
    let https = config.rustls_https_connector()?;
    let service = ServiceBuilder::new()
        .layer(metrics_layer)
        .layer(config.base_uri_layer())
        .option_layer(config.auth_layer()?)
        .service(hyper_util::client::legacy::Client::builder(TokioExecutor::new()).build(https));

    Ok(Client::new(service, config.default_namespace))
}

/// Builds a client for a *target* cluster (one the operator does not run
/// in) with the same metrics instrumentation plus a conservative request
/// rate limit, since a misbehaving reconcile loop against a remote
/// apiserver has no local admission control to fall back on.
pub async fn new_target_client_with_metrics(
    config: Config,
    registry: &mut Registry,
    qps: u64,
    burst: u64,
) -> Result<Client> {
    let metrics_layer = MetricsLayer::new(registry);
    let rate_limit_layer = RateLimitLayer::new(burst, Duration::from_secs(burst / qps.max(1)));
    let https = config.rustls_https_connector()?;
    let service = ServiceBuilder::new()
        .layer(metrics_layer)
        .layer(rate_limit_layer)
        .layer(config.base_uri_layer())
        .option_layer(config.auth_layer()?)
        .service(hyper_util::client::legacy::Client::builder(TokioExecutor::new()).build(https));

    Ok(Client::new(service, config.default_namespace))
}
