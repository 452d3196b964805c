pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod entities;
pub mod services;
pub mod state;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_sessions::ExpiredDeletion;
use tower_sessions_sqlx_store::SqliteStore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
pub use config::Config;
use state::SharedState;

pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(handle)
    } else {
        None
    };

    init_tracing(&config)?;

    match &config.source {
        Some(path) => info!("Loaded config from: {}", path.display()),
        None => info!("No config file found, using defaults"),
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, prometheus_handle).await,
        Command::Seed {
            email,
            password,
            name,
        } => {
            let email = cli::value_or_prompt(email, "Email")?;
            let password = cli::value_or_prompt(password, "Password")?;
            seed(config, &email, &password, name).await
        }
    }
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let (plain_layer, json_layer) = if config.general.json_logs {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(plain_layer)
        .with(json_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let (layer, task) = tracing_loki::builder()
            .label("app", "homebase")?
            .build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    Ok(())
}

async fn serve(config: Config, prometheus_handle: Option<PrometheusHandle>) -> anyhow::Result<()> {
    info!("Homebase v{} starting...", env!("CARGO_PKG_VERSION"));

    let shared = Arc::new(SharedState::new(config).await?);
    let config = shared.config.clone();

    let session_store = SqliteStore::new(shared.store.sqlite_pool().clone());
    session_store
        .migrate()
        .await
        .context("Failed to migrate session store")?;

    let sweeper = tokio::spawn(sweep_expired_sessions(
        session_store.clone(),
        Duration::from_secs(config.session.cleanup_interval_seconds.max(1)),
    ));

    let app_state = api::create_app_state(shared, prometheus_handle);
    let app = api::router(app_state, session_store);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Web server running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Server stopped");

    Ok(())
}

async fn sweep_expired_sessions(store: SqliteStore, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        if let Err(e) = store.delete_expired().await {
            warn!(error = %e, "Failed to delete expired sessions");
        }
    }
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {}", e),
    }
}

async fn seed(
    config: Config,
    email: &str,
    password: &str,
    name: Option<String>,
) -> anyhow::Result<()> {
    let shared = SharedState::new(config).await?;

    let admin = shared
        .user_service
        .seed_admin(email.trim(), password, name)
        .await?;

    println!(
        "✓ Created administrator {} (id {}) with permissions: {}",
        admin.email,
        admin.id,
        admin.permissions.join(", ")
    );

    Ok(())
}
