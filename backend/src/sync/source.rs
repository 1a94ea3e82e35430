use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::AppConfig;

use super::upstream::{format_watermark, Envelope};

pub const REQUEST_MUNICIPIOS: &str = "municipios";
pub const REQUEST_MISSOES: &str = "missoes";
pub const REQUEST_EVENTOS: &str = "eventos";
pub const REQUEST_DESEMPENHO: &str = "desempenho";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The spreadsheet-backed script the jobs poll.
///
/// Every method returns the raw `data` items of the response envelope; the
/// jobs decode them into typed records one at a time.
#[async_trait]
pub trait ScriptSource: Send + Sync + 'static {
    async fn fetch_municipios(&self) -> Result<Vec<Value>>;

    async fn fetch_missoes(&self) -> Result<Vec<Value>>;

    async fn fetch_eventos(&self, since: NaiveDateTime) -> Result<Vec<Value>>;

    async fn fetch_desempenhos(&self, missao_id: &str, since: NaiveDateTime)
        -> Result<Vec<Value>>;

    /// Plain GET, returning the HTTP status code.
    async fn ping(&self, url: &str) -> Result<u16>;
}

pub struct ScriptClient {
    http: Client,
    script_url: Option<String>,
    desempenho_url: Option<String>,
}

impl ScriptClient {
    pub fn new(script_url: Option<String>, desempenho_url: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            script_url,
            desempenho_url,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            config.script_url.clone(),
            config.desempenho_url().map(str::to_string),
        )
    }

    async fn request(&self, base: Option<&str>, query: &[(&str, String)]) -> Result<Vec<Value>> {
        let base = base.ok_or_else(|| anyhow!("SCRIPT_URL is not configured"))?;
        debug!(url = %base, ?query, "requesting upstream script");

        let response = self
            .http
            .get(base)
            .query(query)
            .send()
            .await
            .context("upstream request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("upstream returned status {status}");
        }

        let envelope: Envelope = response
            .json()
            .await
            .context("upstream returned an invalid payload")?;
        if envelope.is_error() {
            bail!(
                "upstream reported an error: {}",
                envelope.message.as_deref().unwrap_or("no message")
            );
        }
        Ok(envelope.data.unwrap_or_default())
    }
}

#[async_trait]
impl ScriptSource for ScriptClient {
    async fn fetch_municipios(&self) -> Result<Vec<Value>> {
        self.request(
            self.script_url.as_deref(),
            &[("request", REQUEST_MUNICIPIOS.to_string())],
        )
        .await
    }

    async fn fetch_missoes(&self) -> Result<Vec<Value>> {
        self.request(
            self.script_url.as_deref(),
            &[("request", REQUEST_MISSOES.to_string())],
        )
        .await
    }

    async fn fetch_eventos(&self, since: NaiveDateTime) -> Result<Vec<Value>> {
        self.request(
            self.script_url.as_deref(),
            &[
                ("request", REQUEST_EVENTOS.to_string()),
                ("date", format_watermark(since)),
            ],
        )
        .await
    }

    async fn fetch_desempenhos(
        &self,
        missao_id: &str,
        since: NaiveDateTime,
    ) -> Result<Vec<Value>> {
        self.request(
            self.desempenho_url.as_deref(),
            &[
                ("request", REQUEST_DESEMPENHO.to_string()),
                ("missao", missao_id.to_string()),
                ("date", format_watermark(since)),
            ],
        )
        .await
    }

    async fn ping(&self, url: &str) -> Result<u16> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;
        Ok(response.status().as_u16())
    }
}
