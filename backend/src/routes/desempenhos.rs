use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::{Desempenho, NewDesempenho};
use crate::performance::{
    delete_desempenho as remove_desempenho, insert_desempenho, update_desempenho as apply_changes,
    DesempenhoChanges, Score,
};
use crate::response::ApiResponse;
use crate::routes::{missoes::find_missao, municipios::find_municipio};
use crate::schema::municipio_desempenhos;
use crate::state::AppState;
use crate::status::ValidationStatus;
use crate::sync::upstream::timestamp;
use crate::utils::json::JsonList;

#[derive(Debug, Serialize)]
pub struct DesempenhoDto {
    pub id: i32,
    #[serde(rename = "codIbge")]
    pub cod_ibge: String,
    #[serde(rename = "missaoId")]
    pub missao_id: String,
    pub validation_status: ValidationStatus,
    pub updated_at: NaiveDateTime,
    pub evidence: JsonList,
}

impl From<Desempenho> for DesempenhoDto {
    fn from(d: Desempenho) -> Self {
        Self {
            id: d.id,
            cod_ibge: d.cod_ibge,
            missao_id: d.missao_id,
            validation_status: d.validation_status,
            updated_at: d.updated_at,
            evidence: d.evidence,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DesempenhoWithScore {
    #[serde(flatten)]
    pub desempenho: DesempenhoDto,
    pub score: Score,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListDesempenhosQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDesempenhoRequest {
    #[serde(rename = "codIbge", alias = "cod_ibge")]
    pub cod_ibge: String,
    #[serde(rename = "missaoId", alias = "missao_id")]
    pub missao_id: String,
    #[serde(alias = "validationStatus", alias = "status", default)]
    pub validation_status: Option<String>,
    #[serde(default)]
    pub evidence: JsonList,
    #[serde(alias = "updatedAt", default, deserialize_with = "timestamp")]
    pub updated_at: Option<NaiveDateTime>,
}

/// `PUT` replaces status and evidence; ownership fields are optional.
#[derive(Debug, Deserialize)]
pub struct ReplaceDesempenhoRequest {
    #[serde(rename = "codIbge", alias = "cod_ibge", default)]
    pub cod_ibge: Option<String>,
    #[serde(rename = "missaoId", alias = "missao_id", default)]
    pub missao_id: Option<String>,
    #[serde(alias = "validationStatus", alias = "status")]
    pub validation_status: String,
    #[serde(default)]
    pub evidence: JsonList,
}

/// `PATCH` touches only what is present.
#[derive(Debug, Default, Deserialize)]
pub struct PatchDesempenhoRequest {
    #[serde(rename = "codIbge", alias = "cod_ibge", default)]
    pub cod_ibge: Option<String>,
    #[serde(rename = "missaoId", alias = "missao_id", default)]
    pub missao_id: Option<String>,
    #[serde(alias = "validationStatus", alias = "status", default)]
    pub validation_status: Option<String>,
    #[serde(default)]
    pub evidence: Option<JsonList>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    #[serde(alias = "validationStatus", alias = "status")]
    pub validation_status: String,
}

#[derive(Debug, Deserialize)]
pub struct EvidenceRequest {
    pub evidence: JsonList,
}

pub async fn list_desempenhos(
    State(state): State<AppState>,
    Query(query): Query<ListDesempenhosQuery>,
) -> AppResult<Json<ApiResponse<Vec<DesempenhoDto>>>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ValidationStatus>)
        .transpose()?;

    let mut conn = state.db()?;
    let mut statement = municipio_desempenhos::table.into_boxed();
    if let Some(status) = status {
        statement = statement.filter(municipio_desempenhos::validation_status.eq(status.as_str()));
    }
    let rows: Vec<Desempenho> = statement
        .order(municipio_desempenhos::id.asc())
        .load(&mut conn)?;
    Ok(ApiResponse::success(to_dtos(rows)))
}

pub async fn list_by_municipio(
    State(state): State<AppState>,
    Path(cod_ibge): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<DesempenhoDto>>>> {
    let mut conn = state.db()?;
    find_municipio(&mut conn, &cod_ibge)?;

    let rows: Vec<Desempenho> = municipio_desempenhos::table
        .filter(municipio_desempenhos::cod_ibge.eq(&cod_ibge))
        .order(municipio_desempenhos::missao_id.asc())
        .load(&mut conn)?;
    Ok(ApiResponse::success(to_dtos(rows)))
}

pub async fn list_by_missao(
    State(state): State<AppState>,
    Path(missao_id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<DesempenhoDto>>>> {
    let mut conn = state.db()?;
    find_missao(&mut conn, &missao_id)?;

    let rows: Vec<Desempenho> = municipio_desempenhos::table
        .filter(municipio_desempenhos::missao_id.eq(&missao_id))
        .order(municipio_desempenhos::cod_ibge.asc())
        .load(&mut conn)?;
    Ok(ApiResponse::success(to_dtos(rows)))
}

pub async fn get_desempenho(
    State(state): State<AppState>,
    Path(desempenho_id): Path<i32>,
) -> AppResult<Json<ApiResponse<DesempenhoDto>>> {
    let mut conn = state.db()?;
    let desempenho: Desempenho = municipio_desempenhos::table
        .find(desempenho_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| not_found(desempenho_id))?;
    Ok(ApiResponse::success(desempenho.into()))
}

pub async fn create_desempenho(
    State(state): State<AppState>,
    Json(payload): Json<CreateDesempenhoRequest>,
) -> AppResult<impl IntoResponse> {
    let cod_ibge = required(&payload.cod_ibge, "codIbge")?;
    let missao_id = required(&payload.missao_id, "missaoId")?;
    let status = match payload.validation_status.as_deref() {
        Some(raw) => raw.parse::<ValidationStatus>()?,
        None => ValidationStatus::Pending,
    };

    let mut conn = state.db()?;
    find_municipio(&mut conn, &cod_ibge)?;
    find_missao(&mut conn, &missao_id)?;

    let row = NewDesempenho {
        cod_ibge,
        missao_id,
        validation_status: status,
        updated_at: payload
            .updated_at
            .unwrap_or_else(|| Utc::now().naive_utc()),
        evidence: payload.evidence,
    };

    let (desempenho, score) = insert_desempenho(&mut conn, row)?;
    tracing::info!(
        id = desempenho.id,
        cod_ibge = %desempenho.cod_ibge,
        missao_id = %desempenho.missao_id,
        status = %desempenho.validation_status,
        "desempenho created"
    );

    Ok(ApiResponse::created(DesempenhoWithScore {
        desempenho: desempenho.into(),
        score,
    }))
}

pub async fn replace_desempenho(
    State(state): State<AppState>,
    Path(desempenho_id): Path<i32>,
    Json(payload): Json<ReplaceDesempenhoRequest>,
) -> AppResult<Json<ApiResponse<DesempenhoDto>>> {
    let changes = DesempenhoChanges {
        cod_ibge: optional(payload.cod_ibge, "codIbge")?,
        missao_id: optional(payload.missao_id, "missaoId")?,
        validation_status: Some(payload.validation_status.parse::<ValidationStatus>()?),
        evidence: Some(payload.evidence),
    };
    write_changes(&state, desempenho_id, changes).await
}

pub async fn patch_desempenho(
    State(state): State<AppState>,
    Path(desempenho_id): Path<i32>,
    Json(payload): Json<PatchDesempenhoRequest>,
) -> AppResult<Json<ApiResponse<DesempenhoDto>>> {
    let changes = DesempenhoChanges {
        cod_ibge: optional(payload.cod_ibge, "codIbge")?,
        missao_id: optional(payload.missao_id, "missaoId")?,
        validation_status: payload
            .validation_status
            .as_deref()
            .map(str::parse::<ValidationStatus>)
            .transpose()?,
        evidence: payload.evidence,
    };
    write_changes(&state, desempenho_id, changes).await
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(desempenho_id): Path<i32>,
    Json(payload): Json<StatusRequest>,
) -> AppResult<Json<ApiResponse<DesempenhoDto>>> {
    let changes = DesempenhoChanges {
        validation_status: Some(payload.validation_status.parse::<ValidationStatus>()?),
        ..DesempenhoChanges::default()
    };
    write_changes(&state, desempenho_id, changes).await
}

pub async fn update_evidence(
    State(state): State<AppState>,
    Path(desempenho_id): Path<i32>,
    Json(payload): Json<EvidenceRequest>,
) -> AppResult<Json<ApiResponse<DesempenhoDto>>> {
    let changes = DesempenhoChanges {
        evidence: Some(payload.evidence),
        ..DesempenhoChanges::default()
    };
    write_changes(&state, desempenho_id, changes).await
}

pub async fn delete_desempenho(
    State(state): State<AppState>,
    Path(desempenho_id): Path<i32>,
) -> AppResult<Json<ApiResponse<Score>>> {
    let mut conn = state.db()?;
    let score = remove_desempenho(&mut conn, desempenho_id)?;
    tracing::info!(id = desempenho_id, "desempenho deleted");
    Ok(ApiResponse::success(score))
}

async fn write_changes(
    state: &AppState,
    desempenho_id: i32,
    changes: DesempenhoChanges,
) -> AppResult<Json<ApiResponse<DesempenhoDto>>> {
    let mut conn = state.db()?;
    if let Some(code) = changes.cod_ibge.as_deref() {
        find_municipio(&mut conn, code)?;
    }
    if let Some(id) = changes.missao_id.as_deref() {
        find_missao(&mut conn, id)?;
    }

    let desempenho = apply_changes(&mut conn, desempenho_id, changes, Utc::now().naive_utc())?;
    Ok(ApiResponse::success(desempenho.into()))
}

fn to_dtos(rows: Vec<Desempenho>) -> Vec<DesempenhoDto> {
    rows.into_iter().map(DesempenhoDto::from).collect()
}

fn required(value: &str, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request(format!("{field} é obrigatório")));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<String>, field: &str) -> AppResult<Option<String>> {
    value.map(|value| required(&value, field)).transpose()
}

fn not_found(desempenho_id: i32) -> AppError {
    AppError::not_found(format!("Desempenho {desempenho_id} não encontrado"))
}
