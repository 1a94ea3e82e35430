use axum::{
    extract::{Path, State},
    Json,
};

use crate::dashboard::{
    load_map_panorama, load_mission_detail, load_mission_panorama, load_municipio_tally,
    MapPanorama, MissionDetail, MissionSummary, MunicipioTally,
};
use crate::error::AppResult;
use crate::response::ApiResponse;
use crate::state::AppState;

pub async fn mission_panorama(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<Vec<MissionSummary>>>> {
    let mut conn = state.db()?;
    Ok(ApiResponse::success(load_mission_panorama(&mut conn)?))
}

pub async fn mission_panorama_by_id(
    State(state): State<AppState>,
    Path(missao_id): Path<String>,
) -> AppResult<Json<ApiResponse<MissionDetail>>> {
    let mut conn = state.db()?;
    Ok(ApiResponse::success(load_mission_detail(
        &mut conn, &missao_id,
    )?))
}

pub async fn map_panorama(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<MapPanorama>>> {
    let mut conn = state.db()?;
    Ok(ApiResponse::success(load_map_panorama(&mut conn)?))
}

pub async fn map_panorama_by_ibge(
    State(state): State<AppState>,
    Path(cod_ibge): Path<String>,
) -> AppResult<Json<ApiResponse<MunicipioTally>>> {
    let mut conn = state.db()?;
    Ok(ApiResponse::success(load_municipio_tally(
        &mut conn, &cod_ibge,
    )?))
}
