use std::env;

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;
use crate::seed::DEFAULT_SEEDED_ORG_CODES;

pub const DEFAULT_DATABASE_URL: &str = "municipios.sqlite";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,
    pub cors_allowed_origin: Option<String>,
    pub script_url: Option<String>,
    pub autofetch_url: Option<String>,
    pub fetch_missao_desempenho_url: Option<String>,
    pub jobs_enabled: bool,
    pub seeded_org_codes: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;
        let environment = env::var("NODE_ENV").unwrap_or_else(|_| "development".to_string());
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let script_url = optional_url("SCRIPT_URL")?;
        let autofetch_url = optional_url("AUTOFETCH_URL")?;
        let fetch_missao_desempenho_url = optional_url("FETCH_MISSAO_DESEMPENHO_URL")?;
        let jobs_enabled = env::var("JOBS_ENABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(environment != "test");
        let seeded_org_codes = env::var("SEEDED_ORG_CODES")
            .map(|raw| parse_code_list(&raw))
            .unwrap_or_else(|_| {
                DEFAULT_SEEDED_ORG_CODES
                    .iter()
                    .map(|code| code.to_string())
                    .collect()
            });

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            environment,
            cors_allowed_origin,
            script_url,
            autofetch_url,
            fetch_missao_desempenho_url,
            jobs_enabled,
            seeded_org_codes,
        })
    }

    /// Endpoint for per-mission performance requests.
    pub fn desempenho_url(&self) -> Option<&str> {
        self.fetch_missao_desempenho_url
            .as_deref()
            .or(self.script_url.as_deref())
    }
}

fn optional_url(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            let parsed =
                Url::parse(raw.trim()).with_context(|| format!("{key} must be a valid URL"))?;
            Ok(Some(parsed.to_string()))
        }
        _ => Ok(None),
    }
}

fn parse_code_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|code| code.trim().to_ascii_lowercase())
        .filter(|code| !code.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            database_url: ":memory:".to_string(),
            database_max_pool_size: 1,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            environment: "test".to_string(),
            cors_allowed_origin: None,
            script_url: Some("https://script.example/exec".to_string()),
            autofetch_url: None,
            fetch_missao_desempenho_url: None,
            jobs_enabled: false,
            seeded_org_codes: vec![],
        }
    }

    #[test]
    fn parses_code_lists() {
        assert_eq!(parse_code_list(" MPCE, tce ,,"), vec!["mpce", "tce"]);
        assert!(parse_code_list("").is_empty());
    }

    #[test]
    fn desempenho_url_falls_back_to_script_url() {
        let mut cfg = config();
        assert_eq!(cfg.desempenho_url(), Some("https://script.example/exec"));

        cfg.fetch_missao_desempenho_url = Some("https://other.example/exec".to_string());
        assert_eq!(cfg.desempenho_url(), Some("https://other.example/exec"));

        cfg.fetch_missao_desempenho_url = None;
        cfg.script_url = None;
        assert_eq!(cfg.desempenho_url(), None);
    }
}
