use actix_web::{
    get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use vulkan_operator::controller::{self, State};
use vulkan_operator::membership::MembershipRepository;
use vulkan_operator::telemetry;
use vulkan_operator_k8s_util::client::new_client_with_metrics;

use clap::{crate_authors, crate_description, crate_version, Parser};
use kube::Config;
use prometheus_client::registry::Registry;
use sqlx::postgres::PgPoolOptions;

#[get("/metrics")]
async fn metrics(c: Data<State>, _req: HttpRequest) -> impl Responder {
    HttpResponse::Ok()
        .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
        .body(c.metrics().await)
}

#[get("/health")]
async fn health(c: Data<State>, _req: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json(c.diagnostics().await)
}

#[derive(Parser, Debug)]
#[command(
    name = "vulkan-operator",
    about = crate_description!(),
    version = crate_version!(),
    author = crate_authors!("\n"),
)]
struct Args {
    /// Listen on given port for the /health and /metrics HTTP surface.
    #[arg(short, long, default_value_t = 8080, env)]
    port: u32,

    /// Postgres connection URL backing the membership projection (C8).
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Selects in-pod (ServiceAccount) credentials over a developer
    /// workstation's kubeconfig for the ambient client.
    #[arg(long, default_value_t = false, env)]
    ambient_in_cluster: bool,

    /// Set logging filter directive for `tracing_subscriber::filter::EnvFilter`.
    /// Example: "info,kube=debug,vulkan_operator=debug"
    #[arg(long, default_value = "info", env)]
    log_filter: String,

    /// Set log format.
    #[arg(long, value_enum, default_value_t = telemetry::LogFormat::Text, env)]
    log_format: telemetry::LogFormat,

    /// URL for the OpenTelemetry tracing endpoint. If not provided,
    /// tracing is disabled.
    #[arg(short, long, env = "OPENTELEMETRY_ENDPOINT_URL")]
    tracing_url: Option<String>,

    /// Sampling ratio for tracing.
    #[arg(short, long, default_value_t = 0.1, env)]
    sample_ratio: f64,

    /// Federated-identity discovery URL. Consumed only by the external
    /// HTTP API; the core never validates a token itself, but the flag
    /// is accepted here so operators can run both processes from one
    /// config surface.
    #[arg(long, env = "OIDC_DISCOVERY_URL")]
    oidc_discovery_url: Option<String>,

    /// OIDC client id, passed through untouched.
    #[arg(long, env = "OIDC_CLIENT_ID")]
    oidc_client_id: Option<String>,

    /// OIDC client secret, passed through untouched.
    #[arg(long, env = "OIDC_CLIENT_SECRET")]
    oidc_client_secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();

    telemetry::init(
        &args.log_filter,
        args.log_format,
        args.tracing_url.as_deref(),
        args.sample_ratio,
    )
    .await?;

    if args.oidc_discovery_url.is_some() {
        tracing::debug!("OIDC discovery configured; consumed only by the external API surface");
    }

    let mut registry = Registry::with_prefix("vulkan");
    let config = if args.ambient_in_cluster {
        Config::incluster()?
    } else {
        Config::infer().await?
    };
    let client = new_client_with_metrics(config, &mut registry).await?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&args.database_url)
        .await?;
    let membership = MembershipRepository::new(pool);

    let state = State::new(registry, membership);
    let ctx = state.to_context(client);

    let reconcilers = tokio::spawn({
        let ctx = ctx.clone();
        async move {
            tokio::join!(
                controller::organization::run(ctx.clone()),
                controller::cluster::run(ctx.clone()),
                controller::project::run(ctx.clone()),
                controller::project_cluster_binding::run(ctx.clone()),
                controller::application::run(ctx),
            );
        }
    });

    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(health)
            .service(metrics)
    })
    .bind(format!("0.0.0.0:{}", args.port))?
    .shutdown_timeout(5);

    tokio::select! {
        res = reconcilers => { res?; }
        res = server.run() => { res?; }
    }
    Ok(())
}
