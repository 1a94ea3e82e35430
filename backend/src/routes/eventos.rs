use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::models::{Evento, NewEvento};
use crate::response::ApiResponse;
use crate::routes::municipios::find_municipio;
use crate::schema::eventos;
use crate::state::AppState;
use crate::sync::upstream::timestamp;
use crate::utils::json::{classify_nullable, NullableValue};

#[derive(Debug, Serialize)]
pub struct EventoDto {
    pub id: i32,
    pub data_alteracao: NaiveDateTime,
    pub event: String,
    pub description: Option<String>,
    #[serde(rename = "codIbge")]
    pub cod_ibge: Option<String>,
}

impl From<Evento> for EventoDto {
    fn from(e: Evento) -> Self {
        Self {
            id: e.id,
            data_alteracao: e.data_alteracao,
            event: e.event,
            description: e.description,
            cod_ibge: e.cod_ibge,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListEventosQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventoRequest {
    #[serde(alias = "dataAlteracao", default, deserialize_with = "timestamp")]
    pub data_alteracao: Option<NaiveDateTime>,
    pub event: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "codIbge", alias = "cod_ibge", default)]
    pub cod_ibge: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UpdateEventoFields {
    #[serde(alias = "dataAlteracao", default, deserialize_with = "timestamp")]
    data_alteracao: Option<NaiveDateTime>,
    event: Option<String>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = eventos)]
struct UpdateEventoChangeset {
    data_alteracao: Option<NaiveDateTime>,
    event: Option<String>,
    description: Option<Option<String>>,
    cod_ibge: Option<Option<String>>,
}

/// Newest first. Every row unless `limit` is given.
pub async fn list_eventos(
    State(state): State<AppState>,
    Query(query): Query<ListEventosQuery>,
) -> AppResult<Json<ApiResponse<Vec<EventoDto>>>> {
    let mut statement = eventos::table
        .order((eventos::data_alteracao.desc(), eventos::id.desc()))
        .into_boxed();
    if let Some(limit) = query.limit {
        if limit <= 0 {
            return Err(AppError::bad_request("limit deve ser positivo"));
        }
        statement = statement.limit(limit);
    }

    let mut conn = state.db()?;
    let rows: Vec<Evento> = statement.load(&mut conn)?;
    Ok(ApiResponse::success(
        rows.into_iter().map(EventoDto::from).collect(),
    ))
}

pub async fn list_eventos_by_municipio(
    State(state): State<AppState>,
    Path(cod_ibge): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<EventoDto>>>> {
    let mut conn = state.db()?;
    find_municipio(&mut conn, &cod_ibge)?;

    let rows: Vec<Evento> = eventos::table
        .filter(eventos::cod_ibge.eq(&cod_ibge))
        .order((eventos::data_alteracao.desc(), eventos::id.desc()))
        .load(&mut conn)?;
    Ok(ApiResponse::success(
        rows.into_iter().map(EventoDto::from).collect(),
    ))
}

pub async fn get_evento(
    State(state): State<AppState>,
    Path(evento_id): Path<i32>,
) -> AppResult<Json<ApiResponse<EventoDto>>> {
    let mut conn = state.db()?;
    let evento = find_evento(&mut conn, evento_id)?;
    Ok(ApiResponse::success(evento.into()))
}

pub async fn create_evento(
    State(state): State<AppState>,
    Json(payload): Json<CreateEventoRequest>,
) -> AppResult<impl IntoResponse> {
    let event = payload.event.trim();
    if event.is_empty() {
        return Err(AppError::bad_request("event é obrigatório"));
    }

    let mut conn = state.db()?;
    let cod_ibge = payload
        .cod_ibge
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty());
    if let Some(code) = cod_ibge.as_deref() {
        find_municipio(&mut conn, code)?;
    }

    let row = NewEvento {
        data_alteracao: payload
            .data_alteracao
            .unwrap_or_else(|| Utc::now().naive_utc()),
        event: event.to_string(),
        description: payload.description,
        cod_ibge,
    };

    let evento: Evento = diesel::insert_into(eventos::table)
        .values(row)
        .get_result(&mut conn)?;
    Ok(ApiResponse::created(EventoDto::from(evento)))
}

pub async fn update_evento(
    State(state): State<AppState>,
    Path(evento_id): Path<i32>,
    Json(body): Json<Value>,
) -> AppResult<Json<ApiResponse<EventoDto>>> {
    if !body.is_object() {
        return Err(AppError::bad_request("corpo da requisição deve ser um objeto"));
    }
    let description_class =
        classify_nullable(body.get("description")).map_err(AppError::bad_request)?;
    let cod_class = classify_nullable(body.get("codIbge").or(body.get("cod_ibge")))
        .map_err(AppError::bad_request)?;
    let fields: UpdateEventoFields = serde_json::from_value(body)?;

    let mut conn = state.db()?;
    let existing = find_evento(&mut conn, evento_id)?;

    if fields
        .event
        .as_deref()
        .is_some_and(|event| event.trim().is_empty())
    {
        return Err(AppError::bad_request("event não pode ser vazio"));
    }

    let cod_ibge = match cod_class {
        NullableValue::Omitted => None,
        NullableValue::Null => Some(None),
        NullableValue::String(code) if code.trim().is_empty() => Some(None),
        NullableValue::String(code) => {
            let code = code.trim().to_string();
            find_municipio(&mut conn, &code)?;
            Some(Some(code))
        }
    };

    let changeset = UpdateEventoChangeset {
        data_alteracao: fields.data_alteracao,
        event: fields.event.map(|event| event.trim().to_string()),
        description: match description_class {
            NullableValue::Omitted => None,
            NullableValue::Null => Some(None),
            NullableValue::String(text) => Some(Some(text)),
        },
        cod_ibge,
    };

    if changeset.data_alteracao.is_none()
        && changeset.event.is_none()
        && changeset.description.is_none()
        && changeset.cod_ibge.is_none()
    {
        return Ok(ApiResponse::success(existing.into()));
    }

    let evento: Evento = diesel::update(eventos::table.find(evento_id))
        .set(&changeset)
        .get_result(&mut conn)?;
    Ok(ApiResponse::success(evento.into()))
}

pub async fn delete_evento(
    State(state): State<AppState>,
    Path(evento_id): Path<i32>,
) -> AppResult<Json<ApiResponse<()>>> {
    let mut conn = state.db()?;
    let deleted = diesel::delete(eventos::table.find(evento_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found(format!(
            "Evento {evento_id} não encontrado"
        )));
    }
    Ok(ApiResponse::message(format!("Evento {evento_id} removido")))
}

fn find_evento(conn: &mut SqliteConnection, evento_id: i32) -> AppResult<Evento> {
    eventos::table
        .find(evento_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found(format!("Evento {evento_id} não encontrado")))
}
