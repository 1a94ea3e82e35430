//! Records as served by the spreadsheet script.
//!
//! Spreadsheet exports are loose: numeric codes arrive as numbers, booleans as
//! "Sim"/"TRUE", timestamps in several formats and field names in either
//! camelCase or snake_case. Everything is normalized here so the jobs only see
//! typed values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::utils::json::JsonList;

#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Option<Vec<Value>>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Envelope {
    pub fn is_error(&self) -> bool {
        self.status
            .as_deref()
            .map(|status| status.eq_ignore_ascii_case("error"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamMunicipio {
    #[serde(rename = "codIbge", alias = "cod_ibge", deserialize_with = "code")]
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
    #[serde(default, deserialize_with = "flag")]
    pub orgao: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamMissao {
    #[serde(deserialize_with = "code")]
    pub id: String,
    pub categoria: String,
    #[serde(default, alias = "descricaoDaCategoria")]
    pub descricao_da_categoria: String,
    #[serde(default, alias = "emblemaDaCategoria")]
    pub emblema_da_categoria: String,
    #[serde(alias = "descricaoDaMissao")]
    pub descricao_da_missao: String,
    #[serde(alias = "qntPontos", deserialize_with = "integer")]
    pub qnt_pontos: i32,
    #[serde(default, alias = "linkFormulario", deserialize_with = "non_empty")]
    pub link_formulario: Option<String>,
    #[serde(default)]
    pub evidencias: JsonList,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamDesempenho {
    #[serde(rename = "codIbge", alias = "cod_ibge", deserialize_with = "code")]
    pub cod_ibge: String,
    #[serde(
        rename = "missaoId",
        alias = "missao_id",
        default,
        deserialize_with = "optional_code"
    )]
    pub missao_id: Option<String>,
    #[serde(alias = "validationStatus", alias = "status")]
    pub validation_status: String,
    #[serde(alias = "updatedAt", default, deserialize_with = "timestamp")]
    pub updated_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub evidence: JsonList,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamEvento {
    #[serde(alias = "dataAlteracao", default, deserialize_with = "timestamp")]
    pub data_alteracao: Option<NaiveDateTime>,
    pub event: String,
    #[serde(default, deserialize_with = "optional_code")]
    pub description: Option<String>,
    #[serde(alias = "codIbge", default, deserialize_with = "optional_code")]
    pub cod_ibge: Option<String>,
}

/// Watermark as sent in the `date` query parameter.
pub fn format_watermark(at: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(at, Utc).to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 1970-01-01T00:00:00, the watermark when nothing has been stored yet.
pub fn epoch() -> NaiveDateTime {
    NaiveDateTime::default()
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_utc());
    }
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
    ];
    for format in FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }
    for format in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    optional_code(deserializer)?.ok_or_else(|| serde::de::Error::custom("missing code"))
}

fn optional_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn non_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| serde::de::Error::custom(format!("invalid integer {n}"))),
        Value::String(s) if s.trim().is_empty() => Ok(0),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid integer {s:?}"))),
        Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!("invalid integer {other}"))),
    }
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_i64().map(|v| v != 0).unwrap_or(false),
        Some(Value::String(s)) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "sim" | "1" | "s" | "yes"
        ),
        _ => false,
    })
}

/// Lenient timestamp field: any format accepted by [`parse_timestamp`] or epoch
/// milliseconds. Unreadable values become `None`.
pub fn timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<NaiveDateTime>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => parse_timestamp(&s),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.naive_utc()),
        _ => None,
    })
}
