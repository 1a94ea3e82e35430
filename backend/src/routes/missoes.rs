use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult, ServiceError};
use crate::models::{Missao, NewMissao};
use crate::performance::{recompute_all_scores, recompute_score};
use crate::response::ApiResponse;
use crate::schema::{missoes, municipio_desempenhos};
use crate::state::AppState;
use crate::utils::json::{classify_nullable, JsonList, NullableValue};

#[derive(Debug, Serialize)]
pub struct MissaoDto {
    pub id: String,
    pub categoria: String,
    pub descricao_da_categoria: String,
    pub emblema_da_categoria: String,
    pub descricao_da_missao: String,
    pub qnt_pontos: i32,
    pub link_formulario: Option<String>,
    pub evidencias: JsonList,
}

impl From<Missao> for MissaoDto {
    fn from(m: Missao) -> Self {
        Self {
            id: m.id,
            categoria: m.categoria,
            descricao_da_categoria: m.descricao_da_categoria,
            emblema_da_categoria: m.emblema_da_categoria,
            descricao_da_missao: m.descricao_da_missao,
            qnt_pontos: m.qnt_pontos,
            link_formulario: m.link_formulario,
            evidencias: m.evidencias,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMissaoRequest {
    pub id: String,
    pub categoria: String,
    #[serde(default, alias = "descricaoDaCategoria")]
    pub descricao_da_categoria: String,
    #[serde(default, alias = "emblemaDaCategoria")]
    pub emblema_da_categoria: String,
    #[serde(alias = "descricaoDaMissao")]
    pub descricao_da_missao: String,
    #[serde(alias = "qntPontos")]
    pub qnt_pontos: i32,
    #[serde(default, alias = "linkFormulario")]
    pub link_formulario: Option<String>,
    #[serde(default)]
    pub evidencias: JsonList,
}

/// Fields of `PUT /missoes/:id` other than `link_formulario`, which is read
/// separately so an explicit `null` can clear it.
#[derive(Debug, Default, Deserialize)]
struct UpdateMissaoFields {
    categoria: Option<String>,
    #[serde(alias = "descricaoDaCategoria")]
    descricao_da_categoria: Option<String>,
    #[serde(alias = "emblemaDaCategoria")]
    emblema_da_categoria: Option<String>,
    #[serde(alias = "descricaoDaMissao")]
    descricao_da_missao: Option<String>,
    #[serde(alias = "qntPontos")]
    qnt_pontos: Option<i32>,
    evidencias: Option<JsonList>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = missoes)]
struct UpdateMissaoChangeset {
    categoria: Option<String>,
    descricao_da_categoria: Option<String>,
    emblema_da_categoria: Option<String>,
    descricao_da_missao: Option<String>,
    qnt_pontos: Option<i32>,
    link_formulario: Option<Option<String>>,
    evidencias: Option<String>,
}

impl UpdateMissaoChangeset {
    fn is_empty(&self) -> bool {
        self.categoria.is_none()
            && self.descricao_da_categoria.is_none()
            && self.emblema_da_categoria.is_none()
            && self.descricao_da_missao.is_none()
            && self.qnt_pontos.is_none()
            && self.link_formulario.is_none()
            && self.evidencias.is_none()
    }
}

pub async fn list_missoes(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<MissaoDto>>>> {
    let mut conn = state.db()?;
    let rows: Vec<Missao> = missoes::table.order(missoes::id.asc()).load(&mut conn)?;
    Ok(ApiResponse::success(
        rows.into_iter().map(MissaoDto::from).collect(),
    ))
}

pub async fn get_missao(
    State(state): State<AppState>,
    Path(missao_id): Path<String>,
) -> AppResult<Json<ApiResponse<MissaoDto>>> {
    let mut conn = state.db()?;
    let missao = find_missao(&mut conn, &missao_id)?;
    Ok(ApiResponse::success(missao.into()))
}

pub async fn create_missao(
    State(state): State<AppState>,
    Json(payload): Json<CreateMissaoRequest>,
) -> AppResult<impl IntoResponse> {
    let id = payload.id.trim();
    if id.is_empty() {
        return Err(AppError::bad_request("id é obrigatório"));
    }
    if payload.categoria.trim().is_empty() {
        return Err(AppError::bad_request("categoria é obrigatória"));
    }
    if payload.qnt_pontos < 0 {
        return Err(AppError::bad_request("qnt_pontos não pode ser negativo"));
    }

    let mut conn = state.db()?;
    let row = NewMissao {
        id: id.to_string(),
        categoria: payload.categoria.trim().to_string(),
        descricao_da_categoria: payload.descricao_da_categoria,
        emblema_da_categoria: payload.emblema_da_categoria,
        descricao_da_missao: payload.descricao_da_missao,
        qnt_pontos: payload.qnt_pontos,
        link_formulario: payload
            .link_formulario
            .filter(|link| !link.trim().is_empty()),
        evidencias: payload.evidencias,
    };

    let missao: Missao = diesel::insert_into(missoes::table)
        .values(row)
        .get_result(&mut conn)?;

    tracing::info!(missao_id = %missao.id, "missao created");
    Ok(ApiResponse::created(MissaoDto::from(missao)))
}

pub async fn update_missao(
    State(state): State<AppState>,
    Path(missao_id): Path<String>,
    Json(body): Json<Value>,
) -> AppResult<Json<ApiResponse<MissaoDto>>> {
    if !body.is_object() {
        return Err(AppError::bad_request("corpo da requisição deve ser um objeto"));
    }
    let link_class = classify_nullable(body.get("link_formulario").or(body.get("linkFormulario")))
        .map_err(AppError::bad_request)?;
    let fields: UpdateMissaoFields = serde_json::from_value(body)?;

    if fields.qnt_pontos.is_some_and(|pontos| pontos < 0) {
        return Err(AppError::bad_request("qnt_pontos não pode ser negativo"));
    }

    let mut conn = state.db()?;
    let existing = find_missao(&mut conn, &missao_id)?;

    let changeset = UpdateMissaoChangeset {
        categoria: fields.categoria,
        descricao_da_categoria: fields.descricao_da_categoria,
        emblema_da_categoria: fields.emblema_da_categoria,
        descricao_da_missao: fields.descricao_da_missao,
        qnt_pontos: fields.qnt_pontos,
        link_formulario: match link_class {
            NullableValue::Omitted => None,
            NullableValue::Null => Some(None),
            NullableValue::String(link) if link.trim().is_empty() => Some(None),
            NullableValue::String(link) => Some(Some(link.trim().to_string())),
        },
        evidencias: fields.evidencias.map(String::from),
    };

    if changeset.is_empty() {
        return Ok(ApiResponse::success(existing.into()));
    }

    let reward_changed = changeset
        .qnt_pontos
        .is_some_and(|pontos| pontos != existing.qnt_pontos);

    let missao = conn.transaction::<_, ServiceError, _>(|conn| {
        let missao: Missao = diesel::update(missoes::table.find(&missao_id))
            .set(&changeset)
            .get_result(conn)?;
        if reward_changed {
            recompute_all_scores(conn)?;
        }
        Ok(missao)
    })?;

    Ok(ApiResponse::success(missao.into()))
}

/// Deleting a mission cascades to its performance records, so every affected
/// municipality gets its score recomputed.
pub async fn delete_missao(
    State(state): State<AppState>,
    Path(missao_id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    let mut conn = state.db()?;
    find_missao(&mut conn, &missao_id)?;

    conn.transaction::<_, ServiceError, _>(|conn| {
        let affected: Vec<String> = municipio_desempenhos::table
            .filter(municipio_desempenhos::missao_id.eq(&missao_id))
            .select(municipio_desempenhos::cod_ibge)
            .distinct()
            .load(conn)?;

        diesel::delete(missoes::table.find(&missao_id)).execute(conn)?;

        for cod_ibge in &affected {
            recompute_score(conn, cod_ibge)?;
        }
        Ok(())
    })?;

    tracing::info!(missao_id = %missao_id, "missao deleted");
    Ok(ApiResponse::message(format!("Missão {missao_id} removida")))
}

pub(crate) fn find_missao(conn: &mut SqliteConnection, missao_id: &str) -> AppResult<Missao> {
    missoes::table
        .find(missao_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found(format!("Missão {missao_id} não encontrada")))
}
