use std::{env, sync::Arc};

use anyhow::{anyhow, Context, Result};
use tokio::task;
use tracing_subscriber::EnvFilter;

use pacto_backend::{
    config::AppConfig,
    db::{self, SqlitePool},
    default_jobs, performance, seed,
    state::AppState,
    sync::source::ScriptClient,
    SyncRunner,
};

const USAGE: &str = "Usage: maintenance <seed | run-job <name> | recompute-scores>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("seed") => seed_organizations().await?,
        Some("run-job") => {
            let Some(name) = args.next() else {
                eprintln!("Missing job name\n{USAGE}");
                std::process::exit(1);
            };
            run_job(&name).await?;
        }
        Some("recompute-scores") => recompute_scores().await?,
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn prepare() -> Result<(AppConfig, SqlitePool)> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.database_url,
        pool_size = config.database_max_pool_size,
        "loaded backend configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let migrate_pool = pool.clone();
    task::spawn_blocking(move || db::run_migrations(&migrate_pool))
        .await
        .context("migration task panicked")??;
    Ok((config, pool))
}

async fn seed_organizations() -> Result<()> {
    let (_, pool) = prepare().await?;
    let inserted = task::spawn_blocking(move || -> Result<usize> {
        let mut conn = pool.get().context("failed to get database connection")?;
        seed::seed_organizations(&mut conn).context("failed to seed organizations")
    })
    .await
    .context("seed task panicked")??;

    println!("Seeded {inserted} organizations.");
    Ok(())
}

async fn run_job(name: &str) -> Result<()> {
    let (config, pool) = prepare().await?;
    let source = Arc::new(ScriptClient::from_config(&config)?);
    let state = AppState::new(pool, config, source);
    let runner = SyncRunner::new(Arc::new(state.clone()), default_jobs(&state));

    if !runner.job_names().iter().any(|job| *job == name) {
        return Err(anyhow!(
            "unknown job {name}; available: {}",
            runner.job_names().join(", ")
        ));
    }

    match runner.run_job(name).await? {
        Some(report) => println!(
            "{name}: processed {}, skipped {}, failed {}",
            report.processed, report.skipped, report.failed
        ),
        None => println!("{name} is already running."),
    }
    Ok(())
}

async fn recompute_scores() -> Result<()> {
    let (_, pool) = prepare().await?;
    let updated = task::spawn_blocking(move || -> Result<usize> {
        let mut conn = pool.get().context("failed to get database connection")?;
        performance::recompute_all_scores(&mut conn).context("failed to recompute scores")
    })
    .await
    .context("recompute task panicked")??;

    println!("Recomputed scores for {updated} municipalities.");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
