//! Application configuration structures.

use std::fs;
use std::path::Path;

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{DeadlineRule, MonitorFilter};

/// Environment variable overriding the DataJud API key.
pub const DATAJUD_API_KEY_ENV: &str = "DATAJUD_API_KEY";

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and sync behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Upstream endpoints
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Event keyword table
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Business-day calendar
    #[serde(default)]
    pub deadlines: DeadlineConfig,

    /// Deadline rules, for every tenant or a single one
    #[serde(default = "defaults::default_rules")]
    pub rules: Vec<DeadlineRule>,

    /// Monitor filters
    #[serde(default)]
    pub filters: Vec<MonitorFilter>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            let mut config = Self::default();
            config.apply_env();
            config
        })
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(DATAJUD_API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.sources.datajud.api_key = key;
            }
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.sync.user_agent.trim().is_empty() {
            return Err(AppError::validation("sync.user_agent is empty"));
        }
        if self.sync.lookup_timeout_secs == 0 {
            return Err(AppError::validation("sync.lookup_timeout_secs must be > 0"));
        }
        if self.sync.bundle_timeout_secs == 0 {
            return Err(AppError::validation("sync.bundle_timeout_secs must be > 0"));
        }
        if self.sync.max_concurrent == 0 {
            return Err(AppError::validation("sync.max_concurrent must be > 0"));
        }
        if self.classifier.groups.is_empty() {
            return Err(AppError::validation("No classifier keyword groups defined"));
        }
        if let Some(group) = self.classifier.groups.iter().find(|g| g.keywords.is_empty()) {
            return Err(AppError::validation(format!(
                "classifier group '{}' has no keywords",
                group.event_type
            )));
        }
        let mut rule_ids = std::collections::HashSet::new();
        for rule in &self.rules {
            if !rule_ids.insert(rule.id.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate rule id '{}'",
                    rule.id
                )));
            }
            if rule.event_type.trim().is_empty() {
                return Err(AppError::validation(format!(
                    "rule '{}' has an empty event_type",
                    rule.id
                )));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            sources: SourcesConfig::default(),
            classifier: ClassifierConfig::default(),
            deadlines: DeadlineConfig::default(),
            rules: defaults::default_rules(),
            filters: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// HTTP client and sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Timeout for point lookups (per-case movements)
    #[serde(default = "defaults::lookup_timeout")]
    pub lookup_timeout_secs: u64,

    /// Longer timeout for daily bundle downloads
    #[serde(default = "defaults::bundle_timeout")]
    pub bundle_timeout_secs: u64,

    /// Retries on transient upstream failures (5xx, 429)
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// First backoff delay, doubled on each retry
    #[serde(default = "defaults::retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Maximum concurrent per-case syncs
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// How far before the stored cursor a per-case pull starts again.
    /// Covers movements the upstream indexes late.
    #[serde(default = "defaults::cursor_overlap")]
    pub cursor_overlap_hours: u32,
}

impl SyncConfig {
    pub fn cursor_overlap(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.cursor_overlap_hours))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            lookup_timeout_secs: defaults::lookup_timeout(),
            bundle_timeout_secs: defaults::bundle_timeout(),
            max_retries: defaults::max_retries(),
            retry_base_delay_ms: defaults::retry_base_delay(),
            max_concurrent: defaults::max_concurrent(),
            cursor_overlap_hours: defaults::cursor_overlap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub datajud: DatajudConfig,

    #[serde(default)]
    pub djen: DjenConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatajudConfig {
    #[serde(default = "defaults::datajud_url")]
    pub base_url: String,

    /// Public API key, sent as `Authorization: APIKey <key>`
    #[serde(default)]
    pub api_key: String,
}

impl Default for DatajudConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::datajud_url(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DjenConfig {
    #[serde(default = "defaults::djen_url")]
    pub base_url: String,
}

impl Default for DjenConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::djen_url(),
        }
    }
}

/// Ordered keyword table. The first group with a hit wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "defaults::keyword_groups")]
    pub groups: Vec<KeywordGroup>,

    /// Tag used when no group matches
    #[serde(default = "defaults::fallback_event")]
    pub fallback: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            groups: defaults::keyword_groups(),
            fallback: defaults::fallback_event(),
        }
    }
}

/// Keywords that identify one event type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordGroup {
    pub event_type: String,
    pub keywords: Vec<String>,
}

/// Business-day calendar settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeadlineConfig {
    /// Dates skipped by business-day counting, on top of weekends
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use super::KeywordGroup;
    use crate::models::{DeadlineRule, Urgency};

    // Sync defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; judsync/0.1)".into()
    }
    pub fn lookup_timeout() -> u64 {
        30
    }
    pub fn bundle_timeout() -> u64 {
        300
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn retry_base_delay() -> u64 {
        500
    }
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn cursor_overlap() -> u32 {
        48
    }

    // Source defaults
    pub fn datajud_url() -> String {
        "https://api-publica.datajud.cnj.jus.br".into()
    }
    pub fn djen_url() -> String {
        "https://comunicaapi.pje.jus.br/api/v1".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }

    pub fn fallback_event() -> String {
        "movimentacao".into()
    }

    fn group(event_type: &str, keywords: &[&str]) -> KeywordGroup {
        KeywordGroup {
            event_type: event_type.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    // Classifier defaults, most specific first
    pub fn keyword_groups() -> Vec<KeywordGroup> {
        vec![
            group("citacao", &["citação", "cite-se", "citem-se", "fica citad"]),
            group(
                "intimacao",
                &["intimação", "intime-se", "intimem-se", "fica intimad", "intimado"],
            ),
            group(
                "sentenca",
                &[
                    "sentença",
                    "julgo procedente",
                    "julgo improcedente",
                    "julgo parcialmente",
                    "julgo extint",
                ],
            ),
            group("acordao", &["acórdão", "acordam os"]),
            group(
                "audiencia",
                &["audiência", "designo o dia", "sessão de conciliação"],
            ),
            group("penhora", &["penhora", "bloqueio de valores", "sisbajud"]),
            group(
                "decisao",
                &["decisão", "defiro", "indefiro", "tutela de urgência"],
            ),
            group("despacho", &["despacho", "ato ordinatório", "vista às partes"]),
            group("pauta", &["incluído em pauta", "pauta de julgamento"]),
            group("transito_julgado", &["trânsito em julgado", "transitou em julgado"]),
        ]
    }

    fn rule(id: &str, event_type: &str, days: u32, urgency: Urgency) -> DeadlineRule {
        DeadlineRule {
            id: id.to_string(),
            org_id: None,
            event_type: event_type.to_string(),
            days,
            business_days: true,
            auto_create: true,
            default_urgency: urgency,
            priority: 0,
            active: true,
            title: None,
        }
    }

    // Common procedural deadlines in business days
    pub fn default_rules() -> Vec<DeadlineRule> {
        vec![
            rule("default-citacao", "citacao", 15, Urgency::Urgent),
            rule("default-intimacao", "intimacao", 5, Urgency::Urgent),
            rule("default-sentenca", "sentenca", 15, Urgency::Normal),
            rule("default-acordao", "acordao", 15, Urgency::Normal),
            rule("default-decisao", "decisao", 15, Urgency::Normal),
            rule("default-penhora", "penhora", 5, Urgency::Critical),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.sync.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.sync.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn cursor_overlap_defaults_to_two_days() {
        let config = Config::default();
        assert_eq!(config.sync.cursor_overlap(), TimeDelta::days(2));
    }

    #[test]
    fn validate_rejects_duplicate_rule_ids() {
        let mut config = Config::default();
        let dup = config.rules[0].clone();
        config.rules.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [sync]
            max_concurrent = 8

            [deadlines]
            holidays = ["2024-03-29"]

            [[filters]]
            id = "oab"
            kind = "registration"
            value = "SP123456"
            "#,
        )
        .unwrap();
        assert_eq!(config.sync.max_concurrent, 8);
        assert_eq!(config.sync.lookup_timeout_secs, 30);
        assert_eq!(config.deadlines.holidays.len(), 1);
        assert_eq!(config.filters.len(), 1);
        assert!(!config.rules.is_empty());
        assert_eq!(config.classifier.fallback, "movimentacao");
    }

    #[test]
    fn explicit_rules_replace_defaults() {
        let config: Config = toml::from_str(
            r#"
            [[rules]]
            id = "only"
            event_type = "sentenca"
            days = 15
            "#,
        )
        .unwrap();
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].id, "only");
    }
}
