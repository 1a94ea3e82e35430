use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde_json::Value;
use tokio::task;
use tracing::{error, warn};

use crate::{
    models::{Missao, NewMissao},
    performance::recompute_all_scores,
    schema::missoes,
    state::AppState,
};

use super::{upstream::UpstreamMissao, SyncJob, SyncReport, JOB_FETCH_MISSOES};

pub struct FetchMissoesJob;

impl FetchMissoesJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FetchMissoesJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncJob for FetchMissoesJob {
    fn name(&self) -> &'static str {
        JOB_FETCH_MISSOES
    }

    fn schedule(&self) -> &'static str {
        "0 0 * * * *"
    }

    async fn run(&self, state: Arc<AppState>) -> Result<SyncReport> {
        let records = state.source.fetch_missoes().await?;

        task::spawn_blocking(move || -> Result<SyncReport> {
            let mut conn = state.pool.get()?;
            Ok(store_missoes(&mut conn, records))
        })
        .await
        .map_err(|err| anyhow!("missoes task panicked: {err}"))?
    }
}

fn store_missoes(conn: &mut SqliteConnection, records: Vec<Value>) -> SyncReport {
    let mut report = SyncReport::default();
    let mut rewards_changed = false;

    for raw in records {
        let record: UpstreamMissao = match serde_json::from_value(raw) {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "skipping malformed missao record");
                report.failed += 1;
                continue;
            }
        };

        let id = record.id.clone();
        match upsert_missao(conn, record) {
            Ok(changed) => {
                rewards_changed |= changed;
                report.processed += 1;
            }
            Err(err) => {
                error!(missao_id = %id, error = %err, "failed to store missao");
                report.failed += 1;
            }
        }
    }

    if rewards_changed {
        if let Err(err) = recompute_all_scores(conn) {
            error!(error = %err, "failed to recompute scores after reward change");
        }
    }

    report
}

/// Updates the mission when the id is known, inserts it otherwise. Returns
/// whether an existing mission changed its reward.
fn upsert_missao(conn: &mut SqliteConnection, record: UpstreamMissao) -> QueryResult<bool> {
    let existing = missoes::table
        .find(&record.id)
        .first::<Missao>(conn)
        .optional()?;

    if let Some(existing) = existing {
        diesel::update(missoes::table.find(&record.id))
            .set((
                missoes::categoria.eq(&record.categoria),
                missoes::descricao_da_categoria.eq(&record.descricao_da_categoria),
                missoes::emblema_da_categoria.eq(&record.emblema_da_categoria),
                missoes::descricao_da_missao.eq(&record.descricao_da_missao),
                missoes::qnt_pontos.eq(record.qnt_pontos),
                missoes::link_formulario.eq(&record.link_formulario),
                missoes::evidencias.eq(record.evidencias.encode()),
            ))
            .execute(conn)?;
        Ok(existing.qnt_pontos != record.qnt_pontos)
    } else {
        diesel::insert_into(missoes::table)
            .values(NewMissao {
                id: record.id,
                categoria: record.categoria,
                descricao_da_categoria: record.descricao_da_categoria,
                emblema_da_categoria: record.emblema_da_categoria,
                descricao_da_missao: record.descricao_da_missao,
                qnt_pontos: record.qnt_pontos,
                link_formulario: record.link_formulario,
                evidencias: record.evidencias,
            })
            .execute(conn)?;
        Ok(false)
    }
}
