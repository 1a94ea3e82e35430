use axum::http::HeaderValue;
use axum::{
    routing::{get, patch},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod dashboard;
pub mod desempenhos;
pub mod eventos;
pub mod health;
pub mod missoes;
pub mod municipios;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());

    let municipios_routes = Router::new()
        .route(
            "/",
            get(municipios::list_municipios).post(municipios::create_municipio),
        )
        .route("/:ibge", get(municipios::get_municipio));

    let missoes_routes = Router::new()
        .route("/", get(missoes::list_missoes).post(missoes::create_missao))
        .route(
            "/:id",
            get(missoes::get_missao)
                .put(missoes::update_missao)
                .delete(missoes::delete_missao),
        );

    let eventos_routes = Router::new()
        .route("/", get(eventos::list_eventos).post(eventos::create_evento))
        .route(
            "/:id",
            get(eventos::get_evento)
                .put(eventos::update_evento)
                .delete(eventos::delete_evento),
        )
        .route("/municipio/:cod_ibge", get(eventos::list_eventos_by_municipio));

    let desempenhos_routes = Router::new()
        .route(
            "/",
            get(desempenhos::list_desempenhos).post(desempenhos::create_desempenho),
        )
        .route(
            "/:id",
            get(desempenhos::get_desempenho)
                .put(desempenhos::replace_desempenho)
                .patch(desempenhos::patch_desempenho)
                .delete(desempenhos::delete_desempenho),
        )
        .route("/:id/status", patch(desempenhos::update_status))
        .route("/:id/evidence", patch(desempenhos::update_evidence))
        .route("/municipio/:cod_ibge", get(desempenhos::list_by_municipio))
        .route("/missao/:missao_id", get(desempenhos::list_by_missao));

    let dashboard_routes = Router::new()
        .route("/mission-panorama", get(dashboard::mission_panorama))
        .route(
            "/mission-panorama/:missao_id",
            get(dashboard::mission_panorama_by_id),
        )
        .route("/map-panorama", get(dashboard::map_panorama))
        .route("/map-panorama/:cod_ibge", get(dashboard::map_panorama_by_ibge));

    Router::new()
        .nest("/api/municipios", municipios_routes)
        .nest("/api/missoes", missoes_routes)
        .nest("/api/eventos", eventos_routes)
        .nest("/api/desempenhos", desempenhos_routes)
        .nest("/api/dashboard", dashboard_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(allowed: Option<&str>) -> CorsLayer {
    let Some(origins) = allowed else {
        return CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true);
    };

    let headers: Vec<HeaderValue> = origins
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .filter_map(|value| match value.parse::<HeaderValue>() {
            Ok(header) => Some(header),
            Err(err) => {
                tracing::warn!(origin = value, error = %err, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(headers))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
