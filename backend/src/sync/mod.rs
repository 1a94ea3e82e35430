//! Scheduled jobs that reconcile the local store with the spreadsheet script.

use std::{collections::BTreeMap, sync::Arc};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::state::AppState;

pub mod autofetch;
pub mod desempenho;
pub mod eventos;
pub mod missoes;
pub mod municipios;
pub mod source;
pub mod upstream;

pub const JOB_FETCH_MUNICIPIOS: &str = "fetch_municipios";
pub const JOB_FETCH_EVENTOS: &str = "fetch_eventos";
pub const JOB_FETCH_MISSOES: &str = "fetch_missoes";
pub const JOB_FETCH_MISSAO_DESEMPENHO: &str = "fetch_missao_desempenho";
pub const JOB_AUTOFETCH: &str = "autofetch";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SyncReport {
    pub fn merge(&mut self, other: SyncReport) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

#[async_trait]
pub trait SyncJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cron expression with a leading seconds field.
    fn schedule(&self) -> &'static str;

    async fn run(&self, state: Arc<AppState>) -> Result<SyncReport>;
}

struct Registered {
    job: Arc<dyn SyncJob>,
    running: Mutex<()>,
}

/// Runs jobs by name, never two ticks of the same job at once.
pub struct SyncRunner {
    state: Arc<AppState>,
    jobs: BTreeMap<&'static str, Arc<Registered>>,
}

impl SyncRunner {
    pub fn new(state: Arc<AppState>, jobs: Vec<Arc<dyn SyncJob>>) -> Self {
        let jobs = jobs
            .into_iter()
            .map(|job| {
                (
                    job.name(),
                    Arc::new(Registered {
                        job,
                        running: Mutex::new(()),
                    }),
                )
            })
            .collect();
        Self { state, jobs }
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.keys().copied().collect()
    }

    /// Runs one tick. Returns `Ok(None)` when a previous tick is still running.
    pub async fn run_job(&self, name: &str) -> Result<Option<SyncReport>> {
        let registered = self
            .jobs
            .get(name)
            .ok_or_else(|| anyhow!("unknown job: {name}"))?;

        let Ok(_guard) = registered.running.try_lock() else {
            warn!(job = name, "previous run still in progress; skipping tick");
            return Ok(None);
        };

        info!(job = name, "sync job started");
        match registered.job.run(self.state.clone()).await {
            Ok(report) => {
                info!(
                    job = name,
                    processed = report.processed,
                    skipped = report.skipped,
                    failed = report.failed,
                    "sync job finished"
                );
                Ok(Some(report))
            }
            Err(err) => {
                error!(job = name, error = %err, "sync job failed");
                Err(err)
            }
        }
    }

    pub async fn start(self: Arc<Self>) -> Result<JobScheduler> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|err| anyhow!("failed to create job scheduler: {err}"))?;

        for (name, registered) in &self.jobs {
            let name: &'static str = *name;
            let runner = self.clone();
            let job = Job::new_async(registered.job.schedule(), move |_uuid, _lock| {
                let runner = runner.clone();
                Box::pin(async move {
                    // failures are already logged by run_job
                    let _ = runner.run_job(name).await;
                })
            })
            .map_err(|err| anyhow!("invalid schedule for job {name}: {err}"))?;

            scheduler
                .add(job)
                .await
                .map_err(|err| anyhow!("failed to register job {name}: {err}"))?;
        }

        scheduler
            .start()
            .await
            .map_err(|err| anyhow!("failed to start job scheduler: {err}"))?;

        info!(jobs = ?self.job_names(), "job scheduler started");
        Ok(scheduler)
    }
}

pub fn default_jobs(state: &AppState) -> Vec<Arc<dyn SyncJob>> {
    let mut jobs: Vec<Arc<dyn SyncJob>> = vec![
        Arc::new(municipios::FetchMunicipiosJob::new()),
        Arc::new(eventos::FetchEventosJob::new()),
        Arc::new(missoes::FetchMissoesJob::new()),
        Arc::new(desempenho::FetchMissaoDesempenhoJob::new(
            state.config.seeded_org_codes.clone(),
        )),
    ];
    if let Some(url) = state.config.autofetch_url.clone() {
        jobs.push(Arc::new(autofetch::AutofetchJob::new(url)));
    }
    jobs
}

#[cfg(test)]
mod tests {
    use super::SyncReport;

    #[test]
    fn merges_reports() {
        let mut total = SyncReport {
            processed: 2,
            skipped: 1,
            failed: 0,
        };
        total.merge(SyncReport {
            processed: 3,
            skipped: 0,
            failed: 1,
        });
        assert_eq!(
            total,
            SyncReport {
                processed: 5,
                skipped: 1,
                failed: 1
            }
        );
    }
}
