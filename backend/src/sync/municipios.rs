use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel::upsert::excluded;
use serde_json::Value;
use tokio::task;
use tracing::warn;

use crate::{
    models::NewMunicipio,
    schema::municipios,
    state::AppState,
    status::STATUS_NAO_PARTICIPANTE,
    utils::json::JsonBlob,
};

use super::{upstream::UpstreamMunicipio, SyncJob, SyncReport, JOB_FETCH_MUNICIPIOS};

pub struct FetchMunicipiosJob;

impl FetchMunicipiosJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FetchMunicipiosJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncJob for FetchMunicipiosJob {
    fn name(&self) -> &'static str {
        JOB_FETCH_MUNICIPIOS
    }

    fn schedule(&self) -> &'static str {
        "0 */5 * * * *"
    }

    async fn run(&self, state: Arc<AppState>) -> Result<SyncReport> {
        let records = state.source.fetch_municipios().await?;

        task::spawn_blocking(move || -> Result<SyncReport> {
            let mut conn = state.pool.get()?;
            store_municipios(&mut conn, records)
        })
        .await
        .map_err(|err| anyhow!("municipios task panicked: {err}"))?
    }
}

/// Replaces the upstream-owned columns of every record. `points` and `badges`
/// are derived locally and keep their values.
fn store_municipios(conn: &mut SqliteConnection, records: Vec<Value>) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    for raw in records {
        let record: UpstreamMunicipio = match serde_json::from_value(raw.clone()) {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "skipping malformed municipio record");
                report.failed += 1;
                continue;
            }
        };

        let row = NewMunicipio {
            cod_ibge: record.cod_ibge,
            nome: record.nome,
            status: record
                .status
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| STATUS_NAO_PARTICIPANTE.to_string()),
            data_alteracao: record.data_alteracao,
            imagem_avatar: record.imagem_avatar,
            json: JsonBlob(Some(raw)),
            orgao: record.orgao,
        };

        diesel::insert_into(municipios::table)
            .values(row)
            .on_conflict(municipios::cod_ibge)
            .do_update()
            .set((
                municipios::nome.eq(excluded(municipios::nome)),
                municipios::status.eq(excluded(municipios::status)),
                municipios::data_alteracao.eq(excluded(municipios::data_alteracao)),
                municipios::imagem_avatar.eq(excluded(municipios::imagem_avatar)),
                municipios::json.eq(excluded(municipios::json)),
                municipios::orgao.eq(excluded(municipios::orgao)),
            ))
            .execute(conn)?;
        report.processed += 1;
    }

    Ok(report)
}
