//! Read-only dashboard summaries over municipalities, missions and their
//! performance records.
//!
//! The aggregation functions are pure and work on rows already loaded; the
//! `load_*` functions fetch those rows and never write.

use std::collections::{BTreeMap, HashMap, HashSet};

use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{Desempenho, Missao, Municipio};
use crate::schema::{missoes, municipio_desempenhos, municipios};
use crate::status::{Level, ValidationStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MunicipioRef {
    pub cod_ibge: String,
    pub nome: String,
    pub status: String,
    pub imagem_avatar: Option<String>,
    pub orgao: bool,
    pub points: i32,
    pub badges: i32,
}

impl From<&Municipio> for MunicipioRef {
    fn from(m: &Municipio) -> Self {
        Self {
            cod_ibge: m.cod_ibge.clone(),
            nome: m.nome.clone(),
            status: m.status.clone(),
            imagem_avatar: m.imagem_avatar.clone(),
            orgao: m.orgao,
            points: m.points,
            badges: m.badges,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub valid: i64,
    pub pending: i64,
    pub started: i64,
}

impl StatusCounts {
    fn record(&mut self, status: ValidationStatus) {
        match status {
            ValidationStatus::Valid => self.valid += 1,
            ValidationStatus::Pending => self.pending += 1,
            ValidationStatus::Started => self.started += 1,
        }
    }

    pub fn total(&self) -> i64 {
        self.valid + self.pending + self.started
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionSummary {
    pub missao_id: String,
    pub categoria: String,
    pub descricao_da_missao: String,
    pub qnt_pontos: i32,
    pub counts: StatusCounts,
    pub total_municipios: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionInfo {
    pub id: String,
    pub categoria: String,
    pub descricao_da_categoria: String,
    pub descricao_da_missao: String,
    pub qnt_pontos: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionDetail {
    pub missao: MissionInfo,
    pub completed: Vec<MunicipioRef>,
    pub started: Vec<MunicipioRef>,
    pub pending: Vec<MunicipioRef>,
    pub total_municipios: i64,
}

/// Where a performance record sits in the per-mission breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Completed,
    Started,
    Pending,
}

impl Progress {
    /// PENDING records that already carry evidence count as started.
    pub fn of(desempenho: &Desempenho) -> Self {
        match desempenho.validation_status {
            ValidationStatus::Valid => Self::Completed,
            ValidationStatus::Started => Self::Started,
            ValidationStatus::Pending if !desempenho.evidence.is_empty() => Self::Started,
            ValidationStatus::Pending => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MunicipioTally {
    pub cod_ibge: String,
    pub nome: String,
    pub status: String,
    pub orgao: bool,
    pub imagem_avatar: Option<String>,
    pub points: i32,
    pub badges: i32,
    pub counts: StatusCounts,
    pub level: Level,
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelBucket {
    pub level: Level,
    pub min_points: Option<i32>,
    pub max_points: Option<i32>,
    pub count: usize,
    pub municipios: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapPanorama {
    pub municipios: Vec<MunicipioTally>,
    pub total_valid: i64,
    pub total_records: i64,
    pub percentage_finished: f64,
    pub levels: Vec<LevelBucket>,
}

pub fn summarize_missions(
    missoes: &[Missao],
    desempenhos: &[Desempenho],
    total_municipios: i64,
) -> Vec<MissionSummary> {
    let mut counts: HashMap<&str, StatusCounts> = HashMap::new();
    for d in desempenhos {
        counts
            .entry(d.missao_id.as_str())
            .or_default()
            .record(d.validation_status);
    }

    missoes
        .iter()
        .map(|missao| MissionSummary {
            missao_id: missao.id.clone(),
            categoria: missao.categoria.clone(),
            descricao_da_missao: missao.descricao_da_missao.clone(),
            qnt_pontos: missao.qnt_pontos,
            counts: counts.get(missao.id.as_str()).cloned().unwrap_or_default(),
            total_municipios,
        })
        .collect()
}

pub fn detail_mission(
    missao: &Missao,
    desempenhos: &[Desempenho],
    municipios: &[Municipio],
    total_municipios: i64,
) -> MissionDetail {
    let by_code: HashMap<&str, &Municipio> = municipios
        .iter()
        .map(|m| (m.cod_ibge.as_str(), m))
        .collect();

    let mut completed = Vec::new();
    let mut started = Vec::new();
    let mut pending = Vec::new();

    for d in desempenhos.iter().filter(|d| d.missao_id == missao.id) {
        let Some(owner) = by_code.get(d.cod_ibge.as_str()) else {
            continue;
        };
        let bucket = match Progress::of(d) {
            Progress::Completed => &mut completed,
            Progress::Started => &mut started,
            Progress::Pending => &mut pending,
        };
        bucket.push(MunicipioRef::from(*owner));
    }

    MissionDetail {
        missao: MissionInfo {
            id: missao.id.clone(),
            categoria: missao.categoria.clone(),
            descricao_da_categoria: missao.descricao_da_categoria.clone(),
            descricao_da_missao: missao.descricao_da_missao.clone(),
            qnt_pontos: missao.qnt_pontos,
        },
        completed,
        started,
        pending,
        total_municipios,
    }
}

/// Per-municipality tally. Points come from the VALID records, not from the
/// stored `points` column.
pub fn tally_municipio(
    municipio: &Municipio,
    desempenhos: &[&Desempenho],
    pontos_por_missao: &HashMap<&str, i32>,
) -> MunicipioTally {
    let mut counts = StatusCounts::default();
    let mut points = 0;
    let mut valid_missions = HashSet::new();

    for d in desempenhos {
        counts.record(d.validation_status);
        if d.validation_status == ValidationStatus::Valid {
            points += pontos_por_missao
                .get(d.missao_id.as_str())
                .copied()
                .unwrap_or(0);
            valid_missions.insert(d.missao_id.as_str());
        }
    }

    MunicipioTally {
        cod_ibge: municipio.cod_ibge.clone(),
        nome: municipio.nome.clone(),
        status: municipio.status.clone(),
        orgao: municipio.orgao,
        imagem_avatar: municipio.imagem_avatar.clone(),
        points,
        badges: valid_missions.len() as i32,
        counts,
        level: Level::derive(&municipio.status, points),
    }
}

pub fn build_map_panorama(
    municipios: &[Municipio],
    missoes: &[Missao],
    desempenhos: &[Desempenho],
) -> MapPanorama {
    let pontos_por_missao: HashMap<&str, i32> = missoes
        .iter()
        .map(|m| (m.id.as_str(), m.qnt_pontos))
        .collect();

    let mut by_owner: HashMap<&str, Vec<&Desempenho>> = HashMap::new();
    for d in desempenhos {
        by_owner.entry(d.cod_ibge.as_str()).or_default().push(d);
    }

    let tallies: Vec<MunicipioTally> = municipios
        .iter()
        .map(|m| {
            let records = by_owner
                .get(m.cod_ibge.as_str())
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            tally_municipio(m, records, &pontos_por_missao)
        })
        .collect();

    // Ratio over every record of every municipality, without per-municipality
    // normalization.
    let total_valid: i64 = tallies.iter().map(|t| t.counts.valid).sum();
    let total_records: i64 = tallies.iter().map(|t| t.counts.total()).sum();
    let percentage_finished = if total_records == 0 {
        0.0
    } else {
        total_valid as f64 / total_records as f64 * 100.0
    };

    let levels = level_distribution(&tallies);

    MapPanorama {
        municipios: tallies,
        total_valid,
        total_records,
        percentage_finished,
        levels,
    }
}

/// Buckets NP, 0 and 1..=N where N is the highest level any participant holds.
pub fn level_distribution(tallies: &[MunicipioTally]) -> Vec<LevelBucket> {
    let max_rank = tallies
        .iter()
        .filter_map(|t| match t.level {
            Level::Rank(k) => Some(k),
            Level::NonParticipant => None,
        })
        .max()
        .unwrap_or(0);

    let mut members: BTreeMap<Level, Vec<String>> = BTreeMap::new();
    members.insert(Level::NonParticipant, Vec::new());
    for k in 0..=max_rank {
        members.insert(Level::Rank(k), Vec::new());
    }
    for t in tallies {
        members
            .entry(t.level)
            .or_default()
            .push(t.cod_ibge.clone());
    }

    members
        .into_iter()
        .map(|(level, municipios)| {
            let range = level.point_range();
            LevelBucket {
                level,
                min_points: range.map(|(min, _)| min),
                max_points: range.map(|(_, max)| max),
                count: municipios.len(),
                municipios,
            }
        })
        .collect()
}

fn count_municipios(conn: &mut SqliteConnection) -> ServiceResult<i64> {
    Ok(municipios::table.select(count_star()).first(conn)?)
}

pub fn load_mission_panorama(conn: &mut SqliteConnection) -> ServiceResult<Vec<MissionSummary>> {
    let missoes: Vec<Missao> = missoes::table.order(missoes::id.asc()).load(conn)?;
    let desempenhos: Vec<Desempenho> = municipio_desempenhos::table.load(conn)?;
    let total = count_municipios(conn)?;
    Ok(summarize_missions(&missoes, &desempenhos, total))
}

pub fn load_mission_detail(
    conn: &mut SqliteConnection,
    missao_id: &str,
) -> ServiceResult<MissionDetail> {
    let missao: Missao = missoes::table
        .find(missao_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| ServiceError::not_found(format!("Missão {missao_id} não encontrada")))?;

    let desempenhos: Vec<Desempenho> = municipio_desempenhos::table
        .filter(municipio_desempenhos::missao_id.eq(missao_id))
        .order(municipio_desempenhos::id.asc())
        .load(conn)?;

    let codes: Vec<&str> = desempenhos.iter().map(|d| d.cod_ibge.as_str()).collect();
    let owners: Vec<Municipio> = municipios::table
        .filter(municipios::cod_ibge.eq_any(codes))
        .load(conn)?;

    let total = count_municipios(conn)?;
    Ok(detail_mission(&missao, &desempenhos, &owners, total))
}

pub fn load_map_panorama(conn: &mut SqliteConnection) -> ServiceResult<MapPanorama> {
    let municipios: Vec<Municipio> = municipios::table.order(municipios::nome.asc()).load(conn)?;
    let missoes: Vec<Missao> = missoes::table.load(conn)?;
    let desempenhos: Vec<Desempenho> = municipio_desempenhos::table.load(conn)?;
    Ok(build_map_panorama(&municipios, &missoes, &desempenhos))
}

pub fn load_municipio_tally(
    conn: &mut SqliteConnection,
    cod_ibge: &str,
) -> ServiceResult<MunicipioTally> {
    let municipio: Municipio = municipios::table
        .find(cod_ibge)
        .first(conn)
        .optional()?
        .ok_or_else(|| ServiceError::not_found(format!("Município {cod_ibge} não encontrado")))?;

    let desempenhos: Vec<Desempenho> = municipio_desempenhos::table
        .filter(municipio_desempenhos::cod_ibge.eq(cod_ibge))
        .load(conn)?;
    let missoes: Vec<Missao> = missoes::table.load(conn)?;
    let pontos_por_missao: HashMap<&str, i32> = missoes
        .iter()
        .map(|m| (m.id.as_str(), m.qnt_pontos))
        .collect();

    let records: Vec<&Desempenho> = desempenhos.iter().collect();
    Ok(tally_municipio(&municipio, &records, &pontos_por_missao))
}
