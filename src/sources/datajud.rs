// src/sources/datajud.rs

//! DataJud public search API adapter.
//!
//! One search request per case, against the court partition derived from
//! the identifier (`api_publica_tjsp`, `api_publica_trf3`, ...). Each
//! movement of the matching process becomes one normalized record.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use crate::error::{AppError, Result, SourceError};
use crate::models::{Config, NormalizedRecord, SourceTag};
use crate::services::CaseNumber;
use crate::sources::SourceAdapter;
use crate::utils::http::{RetryPolicy, create_async_client, send_with_retry};
use crate::utils::normalize_whitespace;

/// Prefix every partition name carries.
pub const INDEX_PREFIX: &str = "api_publica_";

/// Upper bound of processes returned per search.
const SEARCH_SIZE: usize = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: Process,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Process {
    #[serde(default)]
    numero_processo: String,
    #[serde(default)]
    tribunal: Option<String>,
    #[serde(default)]
    classe: Option<Named>,
    #[serde(default)]
    orgao_julgador: Option<Named>,
    #[serde(default)]
    movimentos: Vec<Movement>,
}

#[derive(Debug, Deserialize)]
struct Named {
    #[serde(default)]
    nome: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Movement {
    #[serde(default)]
    codigo: Option<i64>,
    #[serde(default)]
    nome: String,
    #[serde(default)]
    data_hora: String,
    #[serde(default)]
    complementos_tabelados: Vec<Complement>,
}

#[derive(Debug, Deserialize)]
struct Complement {
    #[serde(default)]
    nome: String,
    #[serde(default)]
    descricao: String,
}

/// Adapter for per-case movement lookups.
pub struct DatajudAdapter {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl DatajudAdapter {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: create_async_client(&config.sync, config.sync.lookup_timeout_secs)?,
            base_url: config.sources.datajud.base_url.clone(),
            api_key: config.sources.datajud.api_key.clone(),
            retry: RetryPolicy::from_config(&config.sync),
        })
    }

    /// Search endpoint of a partition.
    ///
    /// Rejects partition names the API does not know.
    pub fn endpoint(&self, index: &str) -> Result<Url> {
        let court = index.strip_prefix(INDEX_PREFIX).unwrap_or_default();
        let well_formed = !court.is_empty()
            && court
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !well_formed {
            return Err(AppError::UnknownSourceIndex(index.to_string()));
        }
        let url = Url::parse(&format!(
            "{}/{}/_search",
            self.base_url.trim_end_matches('/'),
            index
        ))?;
        Ok(url)
    }

    fn query(case: &CaseNumber) -> Value {
        json!({
            "size": SEARCH_SIZE,
            "query": { "match": { "numeroProcesso": case.digits() } }
        })
    }
}

#[async_trait]
impl SourceAdapter for DatajudAdapter {
    fn tag(&self) -> SourceTag {
        SourceTag::Datajud
    }

    async fn fetch_movements(
        &self,
        case: &CaseNumber,
        index: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<NormalizedRecord>> {
        let url = self.endpoint(index)?;
        if self.api_key.is_empty() {
            return Err(AppError::config(
                "DataJud API key is not set (sources.datajud.api_key)",
            ));
        }

        let body = Self::query(case);
        log::debug!("Searching {} for {}", url, case);
        let response = send_with_retry(self.retry, || {
            self.client
                .post(url.clone())
                .header(header::AUTHORIZATION, format!("APIKey {}", self.api_key))
                .json(&body)
        })
        .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::UnknownSourceIndex(index.to_string()));
        }

        let payload: SearchResponse = response
            .json()
            .await
            .map_err(|e| SourceError::malformed(format!("search response: {e}")))?;

        let records = records_from_response(payload, case, since);
        log::info!("DataJud returned {} movement(s) for {}", records.len(), case);
        Ok(records)
    }
}

/// Movement timestamps come as RFC 3339 or as compact `YYYYMMDDhhmmss`.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y%m%d%H%M%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn movement_text(movement: &Movement) -> String {
    let mut parts = vec![movement.nome.clone()];
    for c in &movement.complementos_tabelados {
        match (c.nome.is_empty(), c.descricao.is_empty()) {
            (false, false) => parts.push(format!("{}: {}", c.descricao, c.nome)),
            (false, true) => parts.push(c.nome.clone()),
            (true, false) => parts.push(c.descricao.clone()),
            (true, true) => {}
        }
    }
    normalize_whitespace(&parts.join(" - "))
}

fn records_from_response(
    payload: SearchResponse,
    case: &CaseNumber,
    since: Option<DateTime<Utc>>,
) -> Vec<NormalizedRecord> {
    let mut records = Vec::new();

    for hit in payload.hits.hits {
        let process = hit.source;
        if !process.numero_processo.is_empty() && process.numero_processo != case.digits() {
            log::debug!("Ignoring unrelated process {}", process.numero_processo);
            continue;
        }

        for movement in &process.movimentos {
            let Some(happened_at) = parse_timestamp(&movement.data_hora) else {
                log::warn!(
                    "Skipping movement of {} with unreadable date '{}'",
                    case,
                    movement.data_hora
                );
                continue;
            };
            if since.is_some_and(|cursor| happened_at <= cursor) {
                continue;
            }

            let code = movement
                .codigo
                .map(|c| c.to_string())
                .unwrap_or_else(|| "0".into());

            let mut metadata = BTreeMap::new();
            metadata.insert("movement_code".into(), json!(movement.codigo));
            metadata.insert("occurred_at".into(), json!(happened_at.to_rfc3339()));
            if let Some(tribunal) = &process.tribunal {
                metadata.insert("court".into(), json!(tribunal));
            }
            if let Some(classe) = &process.classe {
                metadata.insert("class".into(), json!(classe.nome));
            }
            if let Some(orgao) = &process.orgao_julgador {
                metadata.insert("court_unit".into(), json!(orgao.nome));
            }

            let mut record = NormalizedRecord::new(
                SourceTag::Datajud,
                format!("{}:{}:{}", case.digits(), code, happened_at.timestamp()),
                movement_text(movement),
                happened_at.date_naive(),
            )
            .with_case_number(case.formatted());
            record.metadata = metadata;
            records.push(record);
        }
    }

    records.sort_by(|a, b| {
        a.published_on
            .cmp(&b.published_on)
            .then_with(|| a.source_id.cmp(&b.source_id))
    });
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    const SAMPLE: &str = r#"{
        "hits": {
            "hits": [{
                "_id": "TJSP_G1_00012347120248260100",
                "_source": {
                    "numeroProcesso": "00012347120248260100",
                    "tribunal": "TJSP",
                    "classe": { "codigo": 7, "nome": "Procedimento Comum Cível" },
                    "orgaoJulgador": { "nome": "1ª Vara Cível" },
                    "movimentos": [
                        {
                            "codigo": 26,
                            "nome": "Distribuição",
                            "dataHora": "2024-02-10T09:00:00.000Z",
                            "complementosTabelados": [
                                { "codigo": 2, "nome": "sorteio", "descricao": "tipo_de_distribuicao" }
                            ]
                        },
                        {
                            "codigo": 12164,
                            "nome": "Outras Decisões",
                            "dataHora": "20240301143000"
                        },
                        {
                            "codigo": 85,
                            "nome": "Petição",
                            "dataHora": "not a date"
                        }
                    ]
                }
            }]
        }
    }"#;

    fn adapter() -> DatajudAdapter {
        let mut config = Config::default();
        config.sources.datajud.api_key = "test-key".into();
        DatajudAdapter::new(&config).unwrap()
    }

    fn case() -> CaseNumber {
        CaseNumber::parse("0001234-71.2024.8.26.0100").unwrap()
    }

    #[test]
    fn test_endpoint() {
        let url = adapter().endpoint("api_publica_tjsp").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api-publica.datajud.cnj.jus.br/api_publica_tjsp/_search"
        );
        assert!(adapter().endpoint("api_publica_tre-sp").is_ok());
    }

    #[test]
    fn test_unknown_index_is_rejected() {
        for bad in ["", "tjsp", "api_publica_", "api_publica_TJSP", "api_publica_tjsp/../x"] {
            assert!(matches!(
                adapter().endpoint(bad),
                Err(AppError::UnknownSourceIndex(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_fetch_rejects_index_before_network() {
        let result = adapter().fetch_movements(&case(), "unknown", None).await;
        assert!(matches!(result, Err(AppError::UnknownSourceIndex(_))));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let adapter = DatajudAdapter::new(&Config::default()).unwrap();
        let result = adapter
            .fetch_movements(&case(), "api_publica_tjsp", None)
            .await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_records_from_response() {
        let payload: SearchResponse = serde_json::from_str(SAMPLE).unwrap();
        let records = records_from_response(payload, &case(), None);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].raw_text, "Distribuição - tipo_de_distribuicao: sorteio");
        assert_eq!(records[0].published_on, NaiveDate::from_ymd_opt(2024, 2, 10).unwrap());
        assert_eq!(records[1].raw_text, "Outras Decisões");
        assert_eq!(
            records[1].case_number.as_deref(),
            Some("0001234-71.2024.8.26.0100")
        );
        assert_eq!(records[1].metadata["court"], json!("TJSP"));
        assert!(records.iter().all(|r| r.source == SourceTag::Datajud));
    }

    #[test]
    fn test_since_filters_old_movements() {
        let payload: SearchResponse = serde_json::from_str(SAMPLE).unwrap();
        let since = Utc.with_ymd_and_hms(2024, 2, 20, 0, 0, 0).unwrap();
        let records = records_from_response(payload, &case(), Some(since));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].raw_text, "Outras Decisões");
    }

    #[test]
    fn test_source_ids_are_stable() {
        let first: SearchResponse = serde_json::from_str(SAMPLE).unwrap();
        let second: SearchResponse = serde_json::from_str(SAMPLE).unwrap();
        let a = records_from_response(first, &case(), None);
        let b = records_from_response(second, &case(), None);
        assert_eq!(
            a.iter().map(|r| r.content_hash()).collect::<Vec<_>>(),
            b.iter().map(|r| r.content_hash()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        assert_eq!(parse_timestamp("20240301143000"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T14:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T14:30:00.000"), Some(expected));
        assert!(parse_timestamp("ontem").is_none());
    }
}
