// src/sources/djen.rs

//! DJEN (national electronic gazette) daily bundle adapter.
//!
//! The gazette is published once a day as a zip archive of JSON files,
//! each holding a list of communications. Bodies are HTML and get
//! flattened to plain text here.

use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use scraper::Html;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::error::{Result, SourceError};
use crate::models::{Config, NormalizedRecord, SourceTag};
use crate::services::identifier;
use crate::sources::SourceAdapter;
use crate::utils::http::{RetryPolicy, create_async_client, send_with_retry};
use crate::utils::normalize_whitespace;

/// One communication as published in the bundle.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Communication {
    #[serde(default)]
    id: serde_json::Value,

    #[serde(default, alias = "data_disponibilizacao")]
    data_disponibilizacao: Option<String>,

    #[serde(default, alias = "numero_processo")]
    numero_processo: Option<String>,

    #[serde(default, alias = "numeroprocessocommascara")]
    numero_processo_com_mascara: Option<String>,

    #[serde(default)]
    sigla_tribunal: Option<String>,

    #[serde(default)]
    tipo_comunicacao: Option<String>,

    #[serde(default)]
    nome_orgao: Option<String>,

    #[serde(default)]
    texto: String,

    #[serde(default)]
    link: Option<String>,
}

/// Files are either a bare list or an object wrapping `items`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BundleFile {
    List(Vec<Communication>),
    Wrapped { items: Vec<Communication> },
}

/// Adapter for the daily gazette bundle.
pub struct DjenAdapter {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl DjenAdapter {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: create_async_client(&config.sync, config.sync.bundle_timeout_secs)?,
            base_url: config.sources.djen.base_url.clone(),
            retry: RetryPolicy::from_config(&config.sync),
        })
    }

    /// Download URL of the bundle for a date.
    pub fn bundle_url(&self, date: NaiveDate) -> Result<Url> {
        let url = Url::parse(&format!(
            "{}/caderno/{}/download",
            self.base_url.trim_end_matches('/'),
            date.format("%Y-%m-%d")
        ))?;
        Ok(url)
    }
}

#[async_trait]
impl SourceAdapter for DjenAdapter {
    fn tag(&self) -> SourceTag {
        SourceTag::Djen
    }

    async fn fetch_daily_bundle(&self, date: NaiveDate) -> Result<Option<Vec<u8>>> {
        let url = self.bundle_url(date)?;
        log::info!("Downloading gazette bundle {}", url);

        let response = send_with_retry(self.retry, || self.client.get(url.clone())).await?;
        if response.status() == StatusCode::NOT_FOUND {
            log::info!("No gazette bundle published for {}", date);
            return Ok(None);
        }

        let bytes = response.bytes().await.map_err(SourceError::Transport)?;
        log::info!("Downloaded {} bytes for {}", bytes.len(), date);
        Ok(Some(bytes.to_vec()))
    }

    fn parse_bundle(
        &self,
        bytes: &[u8],
        identifiers: &HashSet<String>,
    ) -> Result<Vec<NormalizedRecord>> {
        Ok(parse_archive(bytes, identifiers)?)
    }
}

/// Plain text of an HTML fragment.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: Vec<&str> = fragment.root_element().text().collect();
    normalize_whitespace(&text.join(" "))
}

fn parse_archive(
    bytes: &[u8],
    identifiers: &HashSet<String>,
) -> std::result::Result<Vec<NormalizedRecord>, SourceError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() || !file.name().to_lowercase().ends_with(".json") {
            continue;
        }
        let name = file.name().to_string();

        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|e| SourceError::malformed(format!("{name}: {e}")))?;

        let communications = match serde_json::from_slice::<BundleFile>(&content)
            .map_err(|e| SourceError::malformed(format!("{name}: {e}")))?
        {
            BundleFile::List(items) | BundleFile::Wrapped { items } => items,
        };

        for communication in communications {
            match to_record(communication, identifiers) {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }
    }

    log::debug!(
        "Bundle holds {} tracked communication(s), {} skipped",
        records.len(),
        skipped
    );
    Ok(records)
}

fn to_record(item: Communication, identifiers: &HashSet<String>) -> Option<NormalizedRecord> {
    let digits = item
        .numero_processo
        .as_deref()
        .or(item.numero_processo_com_mascara.as_deref())
        .map(identifier::normalize)
        .unwrap_or_default();
    if !identifiers.contains(&digits) {
        return None;
    }

    let source_id = match &item.id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let published_on = item
        .data_disponibilizacao
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d.get(..10).unwrap_or(d), "%Y-%m-%d").ok());
    let Some(published_on) = published_on else {
        log::warn!("Communication {} has no readable date; skipped", source_id);
        return None;
    };

    let mut metadata = BTreeMap::new();
    for (key, value) in [
        ("court", &item.sigla_tribunal),
        ("communication_type", &item.tipo_comunicacao),
        ("court_unit", &item.nome_orgao),
        ("link", &item.link),
    ] {
        if let Some(value) = value {
            metadata.insert(key.to_string(), json!(value));
        }
    }

    let mut record = NormalizedRecord::new(
        SourceTag::Djen,
        source_id,
        html_to_text(&item.texto),
        published_on,
    )
    .with_case_number(identifier::format(&digits));
    record.metadata = metadata;
    Some(record)
}
