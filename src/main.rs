use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use clap::{Parser, Subcommand};
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use license_server::config::Config;
use license_server::db::{self, AppState};
use license_server::handlers;
use license_server::jobs;

#[derive(Parser, Debug)]
#[command(name = "license-server")]
#[command(version, about = "License issuance and activation monitoring server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Expire every overdue active license once and exit
    SweepExpired,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("license_server=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let pool = db::create_pool(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path))?;
    db::prepare(&pool)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, pool).await,
        Command::SweepExpired => {
            let expired = jobs::sweep_expired_once(&pool)?;
            println!("Expired {} licenses", expired);
            Ok(())
        }
    }
}

fn public_routes(config: &Config) -> anyhow::Result<Router<AppState>> {
    let governor_conf = GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .per_second(config.public_rate_limit_per_second)
        .burst_size(config.public_rate_limit_burst)
        .finish()
        .context("invalid public rate limit configuration")?;

    // Drop idle per-IP buckets so the limiter doesn't grow without bound
    let limiter = governor_conf.limiter().clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            limiter.retain_recent();
        }
    });

    Ok(handlers::public::router().layer(GovernorLayer::new(governor_conf)))
}

async fn serve(config: Config, pool: db::DbPool) -> anyhow::Result<()> {
    if config.admin_api_token.is_none() {
        tracing::warn!("ADMIN_API_TOKEN is not set, the admin API is unauthenticated");
    }

    let state = AppState {
        db: pool.clone(),
        engine: config.engine_settings(),
        license_keys: Arc::new(config.license_keys()?),
        admin_token: config.admin_api_token.as_deref().map(Arc::from),
    };

    if config.expiry_sweep_interval_secs > 0 {
        jobs::spawn_expiry_sweep(pool, Duration::from_secs(config.expiry_sweep_interval_secs));
    }

    let app = Router::new()
        .merge(public_routes(&config)?)
        .merge(handlers::admin::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("License server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
