use std::{collections::HashSet, sync::Arc};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use diesel::dsl::max;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde_json::Value;
use tokio::task;
use tracing::warn;

use crate::{
    models::NewEvento,
    schema::{eventos, municipios},
    state::AppState,
};

use super::{
    upstream::{epoch, UpstreamEvento},
    SyncJob, SyncReport, JOB_FETCH_EVENTOS,
};

pub struct FetchEventosJob;

impl FetchEventosJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FetchEventosJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncJob for FetchEventosJob {
    fn name(&self) -> &'static str {
        JOB_FETCH_EVENTOS
    }

    fn schedule(&self) -> &'static str {
        "0 * * * * *"
    }

    async fn run(&self, state: Arc<AppState>) -> Result<SyncReport> {
        let pool = state.pool.clone();
        let watermark = task::spawn_blocking(move || -> Result<Option<NaiveDateTime>> {
            let mut conn = pool.get()?;
            latest_event_at(&mut conn)
        })
        .await
        .map_err(|err| anyhow!("eventos watermark task panicked: {err}"))??;

        let records = state
            .source
            .fetch_eventos(watermark.unwrap_or_else(epoch))
            .await?;

        task::spawn_blocking(move || -> Result<SyncReport> {
            let mut conn = state.pool.get()?;
            store_eventos(&mut conn, records, watermark)
        })
        .await
        .map_err(|err| anyhow!("eventos task panicked: {err}"))?
    }
}

pub fn latest_event_at(conn: &mut SqliteConnection) -> Result<Option<NaiveDateTime>> {
    Ok(eventos::table
        .select(max(eventos::data_alteracao))
        .first(conn)?)
}

/// Appends events strictly newer than the watermark.
fn store_eventos(
    conn: &mut SqliteConnection,
    records: Vec<Value>,
    watermark: Option<NaiveDateTime>,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    if records.is_empty() {
        return Ok(report);
    }

    let known: HashSet<String> = municipios::table
        .select(municipios::cod_ibge)
        .load::<String>(conn)?
        .into_iter()
        .collect();

    for raw in records {
        let record: UpstreamEvento = match serde_json::from_value(raw) {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "skipping malformed evento record");
                report.failed += 1;
                continue;
            }
        };

        let Some(data_alteracao) = record.data_alteracao else {
            warn!(event = %record.event, "skipping evento without data_alteracao");
            report.failed += 1;
            continue;
        };

        if watermark.is_some_and(|mark| data_alteracao <= mark) {
            report.skipped += 1;
            continue;
        }

        let cod_ibge = match record.cod_ibge {
            Some(code) if known.contains(&code) => Some(code),
            Some(code) => {
                warn!(cod_ibge = %code, "evento references unknown municipio; storing without it");
                None
            }
            None => None,
        };

        diesel::insert_into(eventos::table)
            .values(NewEvento {
                data_alteracao,
                event: record.event,
                description: record.description,
                cod_ibge,
            })
            .execute(conn)?;
        report.processed += 1;
    }

    Ok(report)
}
