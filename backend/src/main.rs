use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::{net::TcpListener, signal, task};
use tracing_subscriber::EnvFilter;

use pacto_backend::{
    config::AppConfig, db, default_jobs, routes, seed, state::AppState,
    sync::source::ScriptClient, SyncRunner,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "api",
        database_url = %config.database_url,
        pool_size = config.database_max_pool_size,
        environment = %config.environment,
        jobs_enabled = config.jobs_enabled,
        script_configured = config.script_url.is_some(),
        "loaded backend configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let setup_pool = pool.clone();
    task::spawn_blocking(move || -> anyhow::Result<()> {
        db::run_migrations(&setup_pool)?;
        let mut conn = setup_pool.get().context("failed to get seed connection")?;
        let inserted =
            seed::seed_organizations(&mut conn).context("failed to seed organizations")?;
        if inserted > 0 {
            tracing::info!(inserted, "seeded organizations");
        }
        Ok(())
    })
    .await
    .context("database setup task panicked")??;

    let source = Arc::new(ScriptClient::from_config(&config)?);
    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("invalid SERVER_HOST/PORT")?;
    let state = AppState::new(pool, config, source);

    let scheduler = if state.config.jobs_enabled {
        if state.config.script_url.is_none() {
            tracing::warn!("SCRIPT_URL is not set; sync jobs will fail until it is configured");
        }
        let runner = Arc::new(SyncRunner::new(
            Arc::new(state.clone()),
            default_jobs(&state),
        ));
        Some(runner.start().await?)
    } else {
        tracing::info!("sync jobs disabled");
        None
    };

    let app = routes::create_router(state);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(mut scheduler) = scheduler {
        if let Err(err) = scheduler.shutdown().await {
            tracing::warn!(error = %err, "failed to stop job scheduler");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("api received shutdown signal");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
