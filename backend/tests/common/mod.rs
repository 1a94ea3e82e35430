use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use chrono::{Duration, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use http_body_util::BodyExt;
use pacto_backend::config::AppConfig;
use pacto_backend::db;
use pacto_backend::models::{Municipio, NewDesempenho, NewEvento, NewMissao, NewMunicipio};
use pacto_backend::routes;
use pacto_backend::schema::{eventos, missoes, municipio_desempenhos, municipios};
use pacto_backend::seed;
use pacto_backend::state::AppState;
use pacto_backend::status::ValidationStatus;
use pacto_backend::sync::source::ScriptSource;
use pacto_backend::sync::upstream::parse_timestamp;
use pacto_backend::utils::json::{JsonBlob, JsonList};
use pacto_backend::{default_jobs, SyncReport, SyncRunner};
use serde::Serialize;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tower::util::ServiceExt;

/// In-memory stand-in for the spreadsheet script.
#[derive(Default)]
pub struct FakeSource {
    municipios: Mutex<Vec<Value>>,
    missoes: Mutex<Vec<Value>>,
    eventos: Mutex<Vec<Value>>,
    desempenhos: Mutex<HashMap<String, Vec<Value>>>,
    failing_missions: Mutex<HashSet<String>>,
    eventos_requests: Mutex<Vec<NaiveDateTime>>,
    desempenho_requests: Mutex<Vec<(String, NaiveDateTime)>>,
    ping_status: Mutex<Option<u16>>,
    pinged: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl FakeSource {
    pub async fn set_municipios(&self, records: Vec<Value>) {
        *self.municipios.lock().await = records;
    }

    pub async fn set_missoes(&self, records: Vec<Value>) {
        *self.missoes.lock().await = records;
    }

    pub async fn set_eventos(&self, records: Vec<Value>) {
        *self.eventos.lock().await = records;
    }

    pub async fn set_desempenhos(&self, missao_id: &str, records: Vec<Value>) {
        self.desempenhos
            .lock()
            .await
            .insert(missao_id.to_string(), records);
    }

    pub async fn fail_mission(&self, missao_id: &str) {
        self.failing_missions
            .lock()
            .await
            .insert(missao_id.to_string());
    }

    pub async fn set_ping_status(&self, status: u16) {
        *self.ping_status.lock().await = Some(status);
    }

    pub async fn pinged(&self) -> Vec<String> {
        self.pinged.lock().await.clone()
    }

    pub async fn eventos_requests(&self) -> Vec<NaiveDateTime> {
        self.eventos_requests.lock().await.clone()
    }

    pub async fn desempenho_requests(&self) -> Vec<(String, NaiveDateTime)> {
        self.desempenho_requests.lock().await.clone()
    }
}

#[async_trait]
impl ScriptSource for FakeSource {
    async fn fetch_municipios(&self) -> Result<Vec<Value>> {
        Ok(self.municipios.lock().await.clone())
    }

    async fn fetch_missoes(&self) -> Result<Vec<Value>> {
        Ok(self.missoes.lock().await.clone())
    }

    /// Returns every stored event, like an upstream that ignores `date`.
    async fn fetch_eventos(&self, since: NaiveDateTime) -> Result<Vec<Value>> {
        self.eventos_requests.lock().await.push(since);
        Ok(self.eventos.lock().await.clone())
    }

    async fn fetch_desempenhos(
        &self,
        missao_id: &str,
        since: NaiveDateTime,
    ) -> Result<Vec<Value>> {
        self.desempenho_requests
            .lock()
            .await
            .push((missao_id.to_string(), since));
        if self.failing_missions.lock().await.contains(missao_id) {
            bail!("upstream unavailable for mission {missao_id}");
        }
        let records = self
            .desempenhos
            .lock()
            .await
            .get(missao_id)
            .cloned()
            .unwrap_or_default();
        Ok(records
            .into_iter()
            .filter(|record| {
                record
                    .get("updated_at")
                    .and_then(Value::as_str)
                    .and_then(parse_timestamp)
                    .map_or(true, |at| at > since)
            })
            .collect())
    }

    async fn ping(&self, url: &str) -> Result<u16> {
        self.pinged.lock().await.push(url.to_string());
        Ok(self.ping_status.lock().await.unwrap_or(200))
    }
}

pub struct TestApp {
    pub state: AppState,
    pub source: Arc<FakeSource>,
    router: Router,
    _dir: TempDir,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("failed to create temp dir")?;
        let database_url = dir
            .path()
            .join("pacto-test.sqlite")
            .to_str()
            .ok_or_else(|| anyhow!("temp path is not valid UTF-8"))?
            .to_string();

        let config = AppConfig {
            database_url,
            database_max_pool_size: 2,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            environment: "test".to_string(),
            cors_allowed_origin: None,
            script_url: Some("https://script.test/exec".to_string()),
            autofetch_url: None,
            fetch_missao_desempenho_url: None,
            jobs_enabled: false,
            seeded_org_codes: vec!["mpce".to_string()],
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        let setup_pool = pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            db::run_migrations(&setup_pool)?;
            let mut conn = setup_pool
                .get()
                .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
            seed::seed_organizations(&mut conn).context("failed to seed organizations")?;
            Ok(())
        })
        .await
        .context("database setup panicked")??;

        let source = Arc::new(FakeSource::default());
        let source_for_state: Arc<dyn ScriptSource> = source.clone();
        let state = AppState::new(pool, config, source_for_state);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            source,
            router,
            _dir: dir,
        })
    }

    pub fn runner(&self) -> SyncRunner {
        SyncRunner::new(Arc::new(self.state.clone()), default_jobs(&self.state))
    }

    pub async fn run_job(&self, name: &str) -> Result<SyncReport> {
        self.runner()
            .run_job(name)
            .await?
            .ok_or_else(|| anyhow!("job {name} was skipped"))
    }

    pub async fn get(&self, path: &str) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())?;
        self.send(request).await
    }

    pub async fn delete(&self, path: &str) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::DELETE)
            .uri(path)
            .body(Body::empty())?;
        self.send(request).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload).await
    }

    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PUT, path, payload).await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PATCH, path, payload).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body))?;
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn insert_municipio(&self, cod_ibge: &str, nome: &str, status: &str) -> Result<()> {
        let row = NewMunicipio {
            cod_ibge: cod_ibge.to_string(),
            nome: nome.to_string(),
            status: status.to_string(),
            data_alteracao: None,
            imagem_avatar: None,
            json: JsonBlob::default(),
            orgao: false,
        };
        self.with_conn(move |conn| {
            diesel::insert_into(municipios::table)
                .values(row)
                .execute(conn)
                .context("failed to insert municipio")?;
            Ok(())
        })
        .await
    }

    pub async fn insert_missao(&self, id: &str, qnt_pontos: i32) -> Result<()> {
        let row = NewMissao {
            id: id.to_string(),
            categoria: "Governança".to_string(),
            descricao_da_categoria: String::new(),
            emblema_da_categoria: String::new(),
            descricao_da_missao: format!("Missão {id}"),
            qnt_pontos,
            link_formulario: None,
            evidencias: JsonList::default(),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(missoes::table)
                .values(row)
                .execute(conn)
                .context("failed to insert missao")?;
            Ok(())
        })
        .await
    }

    /// Inserts a record directly, without touching the owner's score.
    pub async fn insert_desempenho(
        &self,
        cod_ibge: &str,
        missao_id: &str,
        status: ValidationStatus,
        evidence: Vec<Value>,
    ) -> Result<i32> {
        let row = NewDesempenho {
            cod_ibge: cod_ibge.to_string(),
            missao_id: missao_id.to_string(),
            validation_status: status,
            updated_at: Utc::now().naive_utc(),
            evidence: JsonList(evidence),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(municipio_desempenhos::table)
                .values(row)
                .returning(municipio_desempenhos::id)
                .get_result(conn)
                .context("failed to insert desempenho")
        })
        .await
    }

    /// Inserts `count` events one minute apart, oldest first.
    pub async fn insert_eventos(&self, count: usize) -> Result<()> {
        let start = Utc::now().naive_utc() - Duration::days(1);
        let rows: Vec<NewEvento> = (0..count)
            .map(|index| NewEvento {
                data_alteracao: start + Duration::minutes(index as i64),
                event: format!("evento-{index}"),
                description: None,
                cod_ibge: None,
            })
            .collect();
        self.with_conn(move |conn| {
            diesel::insert_into(eventos::table)
                .values(&rows)
                .execute(conn)
                .context("failed to insert eventos")?;
            Ok(())
        })
        .await
    }

    pub async fn municipio(&self, cod_ibge: &str) -> Result<Municipio> {
        let cod_ibge = cod_ibge.to_string();
        self.with_conn(move |conn| {
            municipios::table
                .find(&cod_ibge)
                .first(conn)
                .with_context(|| format!("municipio {cod_ibge} missing"))
        })
        .await
    }

    pub async fn count_eventos(&self) -> Result<i64> {
        self.with_conn(|conn| {
            eventos::table
                .count()
                .get_result(conn)
                .context("failed to count eventos")
        })
        .await
    }

    pub async fn count_municipios(&self) -> Result<i64> {
        self.with_conn(|conn| {
            municipios::table
                .count()
                .get_result(conn)
                .context("failed to count municipios")
        })
        .await
    }

    pub async fn count_desempenhos(&self) -> Result<i64> {
        self.with_conn(|conn| {
            municipio_desempenhos::table
                .count()
                .get_result(conn)
                .context("failed to count desempenhos")
        })
        .await
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

#[allow(dead_code)]
pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

/// Reads a `{ "status": ..., "data": ... }` envelope and returns `data`.
#[allow(dead_code)]
pub async fn response_data(response: hyper::Response<Body>) -> Result<Value> {
    let body = body_to_vec(response.into_body()).await?;
    let envelope: Value = serde_json::from_slice(&body)?;
    envelope
        .get("data")
        .cloned()
        .ok_or_else(|| anyhow!("response without data: {envelope}"))
}
