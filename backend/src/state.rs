use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::{SqlitePool, SqlitePooledConnection},
    error::{AppError, AppResult},
    sync::source::ScriptSource,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<AppConfig>,
    pub source: Arc<dyn ScriptSource>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: AppConfig, source: Arc<dyn ScriptSource>) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            source,
        }
    }

    pub fn db(&self) -> AppResult<SqlitePooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }
}
