use std::{collections::HashSet, sync::Arc};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use diesel::dsl::max;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde_json::Value;
use tokio::task;
use tracing::{debug, error, warn};

use crate::{
    performance::upsert_desempenho,
    schema::{missoes, municipio_desempenhos},
    state::AppState,
    status::ValidationStatus,
};

use super::{
    upstream::{epoch, UpstreamDesempenho},
    SyncJob, SyncReport, JOB_FETCH_MISSAO_DESEMPENHO,
};

pub struct FetchMissaoDesempenhoJob {
    seeded_codes: HashSet<String>,
}

impl FetchMissaoDesempenhoJob {
    /// `seeded_codes` lists organizations whose records come from seeded data
    /// and must not be touched by the sync.
    pub fn new(seeded_codes: impl IntoIterator<Item = String>) -> Self {
        Self {
            seeded_codes: seeded_codes
                .into_iter()
                .map(|code| code.to_ascii_lowercase())
                .collect(),
        }
    }

    fn is_seeded(&self, cod_ibge: &str) -> bool {
        self.seeded_codes.contains(&cod_ibge.to_ascii_lowercase())
    }
}

#[async_trait]
impl SyncJob for FetchMissaoDesempenhoJob {
    fn name(&self) -> &'static str {
        JOB_FETCH_MISSAO_DESEMPENHO
    }

    fn schedule(&self) -> &'static str {
        "0 5 * * * *"
    }

    async fn run(&self, state: Arc<AppState>) -> Result<SyncReport> {
        let pool = state.pool.clone();
        let watermarks = task::spawn_blocking(move || -> Result<Vec<(String, NaiveDateTime)>> {
            let mut conn = pool.get()?;
            mission_watermarks(&mut conn)
        })
        .await
        .map_err(|err| anyhow!("desempenho watermark task panicked: {err}"))??;

        let mut report = SyncReport::default();

        for (missao_id, since) in watermarks {
            let records = match state.source.fetch_desempenhos(&missao_id, since).await {
                Ok(records) => records,
                Err(err) => {
                    error!(missao_id = %missao_id, error = %err, "failed to fetch desempenhos");
                    report.failed += 1;
                    continue;
                }
            };
            if records.is_empty() {
                continue;
            }

            let updates = self.decode(&missao_id, records, &mut report);
            let state = state.clone();
            let mission = missao_id.clone();
            match task::spawn_blocking(move || -> Result<SyncReport> {
                let mut conn = state.pool.get()?;
                Ok(store_desempenhos(&mut conn, &mission, updates))
            })
            .await
            {
                Ok(Ok(stored)) => report.merge(stored),
                Ok(Err(err)) => {
                    error!(missao_id = %missao_id, error = %err, "failed to store desempenhos");
                    report.failed += 1;
                }
                Err(join_err) => {
                    error!(missao_id = %missao_id, error = %join_err, "desempenho task panicked");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

/// A decoded upstream record ready to be written.
#[derive(Debug, Clone)]
struct PendingUpdate {
    cod_ibge: String,
    status: ValidationStatus,
    record: UpstreamDesempenho,
}

impl FetchMissaoDesempenhoJob {
    fn decode(
        &self,
        missao_id: &str,
        records: Vec<Value>,
        report: &mut SyncReport,
    ) -> Vec<PendingUpdate> {
        let mut updates = Vec::with_capacity(records.len());
        for raw in records {
            let record: UpstreamDesempenho = match serde_json::from_value(raw) {
                Ok(record) => record,
                Err(err) => {
                    warn!(missao_id, error = %err, "skipping malformed desempenho record");
                    report.failed += 1;
                    continue;
                }
            };

            if self.is_seeded(&record.cod_ibge) {
                debug!(cod_ibge = %record.cod_ibge, missao_id, "ignoring seeded organization");
                report.skipped += 1;
                continue;
            }

            if record
                .missao_id
                .as_deref()
                .is_some_and(|id| id != missao_id)
            {
                warn!(
                    missao_id,
                    received = ?record.missao_id,
                    "desempenho belongs to another mission; skipping"
                );
                report.skipped += 1;
                continue;
            }

            let status = match record.validation_status.parse::<ValidationStatus>() {
                Ok(status) => status,
                Err(err) => {
                    warn!(missao_id, cod_ibge = %record.cod_ibge, error = %err, "skipping desempenho");
                    report.failed += 1;
                    continue;
                }
            };

            updates.push(PendingUpdate {
                cod_ibge: record.cod_ibge.clone(),
                status,
                record,
            });
        }
        updates
    }
}

/// Every mission paired with the newest `updated_at` among its records, or the
/// epoch when it has none.
pub fn mission_watermarks(conn: &mut SqliteConnection) -> Result<Vec<(String, NaiveDateTime)>> {
    let ids: Vec<String> = missoes::table
        .select(missoes::id)
        .order(missoes::id.asc())
        .load(conn)?;

    let latest: Vec<(String, Option<NaiveDateTime>)> = municipio_desempenhos::table
        .group_by(municipio_desempenhos::missao_id)
        .select((
            municipio_desempenhos::missao_id,
            max(municipio_desempenhos::updated_at),
        ))
        .load(conn)?;

    Ok(ids
        .into_iter()
        .map(|id| {
            let since = latest
                .iter()
                .find(|(missao_id, _)| *missao_id == id)
                .and_then(|(_, at)| *at)
                .unwrap_or_else(epoch);
            (id, since)
        })
        .collect())
}

fn store_desempenhos(
    conn: &mut SqliteConnection,
    missao_id: &str,
    updates: Vec<PendingUpdate>,
) -> SyncReport {
    let mut report = SyncReport::default();
    let now = Utc::now().naive_utc();

    for update in updates {
        let updated_at = update.record.updated_at.unwrap_or(now);
        match upsert_desempenho(
            conn,
            &update.cod_ibge,
            missao_id,
            update.status,
            update.record.evidence,
            updated_at,
        ) {
            Ok(outcome) => {
                debug!(
                    cod_ibge = %update.cod_ibge,
                    missao_id,
                    created = outcome.created,
                    points = outcome.score.points,
                    badges = outcome.score.badges,
                    "desempenho stored"
                );
                report.processed += 1;
            }
            Err(err) => {
                error!(cod_ibge = %update.cod_ibge, missao_id, error = %err, "failed to store desempenho");
                report.failed += 1;
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn seeded_codes_are_case_insensitive() {
        let job = FetchMissaoDesempenhoJob::new(vec!["MPCE".to_string()]);
        assert!(job.is_seeded("mpce"));
        assert!(job.is_seeded("Mpce"));
        assert!(!job.is_seeded("2300101"));
    }

    #[test]
    fn decode_skips_seeded_and_invalid_records() {
        let job = FetchMissaoDesempenhoJob::new(vec!["mpce".to_string()]);
        let mut report = SyncReport::default();
        let updates = job.decode(
            "m1",
            vec![
                json!({"codIbge": "mpce", "validation_status": "VALID"}),
                json!({"codIbge": "2300101", "validation_status": "VALID"}),
                json!({"codIbge": "2300200", "validation_status": "DONE"}),
                json!({"codIbge": "2300309", "missaoId": "m2", "validation_status": "VALID"}),
                json!({"nome": "sem código"}),
            ],
            &mut report,
        );

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].cod_ibge, "2300101");
        assert_eq!(updates[0].status, ValidationStatus::Valid);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.failed, 2);
    }
}
