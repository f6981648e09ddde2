//! Normalized record produced by source adapters.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// Upstream source a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    /// Public case-metadata search API (per-case movements)
    Datajud,
    /// National electronic gazette (daily bundles)
    Djen,
    /// Entered by hand or imported from a file
    Manual,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Datajud => "datajud",
            SourceTag::Djen => "djen",
            SourceTag::Manual => "manual",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceTag {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "datajud" => Ok(SourceTag::Datajud),
            "djen" => Ok(SourceTag::Djen),
            "manual" => Ok(SourceTag::Manual),
            other => Err(AppError::validation(format!("unknown source '{other}'"))),
        }
    }
}

/// The common shape every adapter produces before data enters the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedRecord {
    pub source: SourceTag,

    /// Identifier native to the source (communication id, movement key, ...)
    pub source_id: String,

    pub raw_text: String,

    pub published_on: NaiveDate,

    /// Case identifier supplied explicitly by the source, if any
    #[serde(default)]
    pub case_number: Option<String>,

    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl NormalizedRecord {
    pub fn new(
        source: SourceTag,
        source_id: impl Into<String>,
        raw_text: impl Into<String>,
        published_on: NaiveDate,
    ) -> Self {
        Self {
            source,
            source_id: source_id.into(),
            raw_text: raw_text.into(),
            published_on,
            case_number: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_case_number(mut self, case_number: impl Into<String>) -> Self {
        self.case_number = Some(case_number.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Deterministic fingerprint of the identifying fields.
    ///
    /// Metadata and the explicit case number do not take part in the hash.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.source.as_str(),
            self.source_id.as_str(),
            self.raw_text.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0x1f]);
        }
        hasher.update(self.published_on.format("%Y-%m-%d").to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NormalizedRecord {
        NormalizedRecord::new(
            SourceTag::Manual,
            "manual-1",
            "Sentença proferida",
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        )
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = sample();
        let b = sample().with_metadata("tribunal", serde_json::json!("TJSP"));
        assert_eq!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 64);
    }

    #[test]
    fn test_content_hash_changes_with_fields() {
        let base = sample();
        let mut other = sample();
        other.source_id = "manual-2".into();
        assert_ne!(base.content_hash(), other.content_hash());

        let mut other = sample();
        other.published_on = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_ne!(base.content_hash(), other.content_hash());
    }

    #[test]
    fn test_field_boundaries_do_not_collide() {
        let a = NormalizedRecord::new(SourceTag::Manual, "ab", "c", sample().published_on);
        let b = NormalizedRecord::new(SourceTag::Manual, "a", "bc", sample().published_on);
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_source_tag_parse() {
        assert_eq!("DJEN".parse::<SourceTag>().unwrap(), SourceTag::Djen);
        assert!("pje".parse::<SourceTag>().is_err());
    }
}
