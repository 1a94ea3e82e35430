use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::models::{Municipio, NewMunicipio};
use crate::response::ApiResponse;
use crate::schema::municipios;
use crate::state::AppState;
use crate::sync::upstream::timestamp;
use crate::status::{Level, STATUS_NAO_PARTICIPANTE, STATUS_PARTICIPANTE};
use crate::utils::json::JsonBlob;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MunicipioDto {
    pub cod_ibge: String,
    pub nome: String,
    pub status: String,
    pub data_alteracao: Option<NaiveDateTime>,
    pub imagem_avatar: Option<String>,
    pub badges: i32,
    pub points: i32,
    pub json: JsonBlob,
    pub orgao: bool,
    pub level: Level,
}

impl From<Municipio> for MunicipioDto {
    fn from(m: Municipio) -> Self {
        let level = Level::derive(&m.status, m.points);
        Self {
            cod_ibge: m.cod_ibge,
            nome: m.nome,
            status: m.status,
            data_alteracao: m.data_alteracao,
            imagem_avatar: m.imagem_avatar,
            badges: m.badges,
            points: m.points,
            json: m.json,
            orgao: m.orgao,
            level,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListMunicipiosQuery {
    pub orgao: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMunicipioRequest {
    #[serde(rename = "codIbge", alias = "cod_ibge")]
    pub cod_ibge: String,
    pub nome: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(
        rename = "dataAlteracao",
        alias = "data_alteracao",
        default,
        deserialize_with = "timestamp"
    )]
    pub data_alteracao: Option<NaiveDateTime>,
    #[serde(rename = "imagemAvatar", alias = "imagem_avatar", default)]
    pub imagem_avatar: Option<String>,
    #[serde(default)]
    pub orgao: bool,
    #[serde(default)]
    pub json: Option<Value>,
}

pub async fn list_municipios(
    State(state): State<AppState>,
    Query(query): Query<ListMunicipiosQuery>,
) -> AppResult<Json<ApiResponse<Vec<MunicipioDto>>>> {
    let mut conn = state.db()?;

    let mut statement = municipios::table.into_boxed();
    if let Some(orgao) = query.orgao {
        statement = statement.filter(municipios::orgao.eq(orgao));
    }
    let rows: Vec<Municipio> = statement.order(municipios::nome.asc()).load(&mut conn)?;

    Ok(ApiResponse::success(
        rows.into_iter().map(MunicipioDto::from).collect(),
    ))
}

pub async fn get_municipio(
    State(state): State<AppState>,
    Path(cod_ibge): Path<String>,
) -> AppResult<Json<ApiResponse<MunicipioDto>>> {
    let mut conn = state.db()?;
    let municipio = find_municipio(&mut conn, &cod_ibge)?;
    Ok(ApiResponse::success(municipio.into()))
}

pub async fn create_municipio(
    State(state): State<AppState>,
    Json(payload): Json<CreateMunicipioRequest>,
) -> AppResult<impl IntoResponse> {
    let cod_ibge = payload.cod_ibge.trim();
    if cod_ibge.is_empty() {
        return Err(AppError::bad_request("codIbge é obrigatório"));
    }
    let nome = payload.nome.trim();
    if nome.is_empty() {
        return Err(AppError::bad_request("nome é obrigatório"));
    }

    let status = match payload.status.as_deref().map(str::trim) {
        None | Some("") => STATUS_NAO_PARTICIPANTE.to_string(),
        Some(status) if status == STATUS_PARTICIPANTE || status == STATUS_NAO_PARTICIPANTE => {
            status.to_string()
        }
        Some(other) => return Err(AppError::bad_request(format!("status inválido: {other}"))),
    };

    let mut conn = state.db()?;
    let row = NewMunicipio {
        cod_ibge: cod_ibge.to_string(),
        nome: nome.to_string(),
        status,
        data_alteracao: payload.data_alteracao,
        imagem_avatar: payload.imagem_avatar,
        json: JsonBlob(payload.json),
        orgao: payload.orgao,
    };

    let municipio: Municipio = diesel::insert_into(municipios::table)
        .values(row)
        .get_result(&mut conn)?;

    tracing::info!(cod_ibge = %municipio.cod_ibge, "municipio created");
    Ok(ApiResponse::created(MunicipioDto::from(municipio)))
}

pub(crate) fn find_municipio(conn: &mut SqliteConnection, cod_ibge: &str) -> AppResult<Municipio> {
    municipios::table
        .find(cod_ibge)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found(format!("Município {cod_ibge} não encontrado")))
}
