//! Deadline rules and monitor filters configured per tenant.

use serde::{Deserialize, Serialize};

use crate::models::Urgency;

/// How a deadline is derived for one event type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadlineRule {
    /// Stable identifier; secondary key when priorities tie
    pub id: String,

    /// Owning organization; `None` applies to every tenant
    #[serde(default)]
    pub org_id: Option<String>,

    pub event_type: String,

    /// Number of days granted
    pub days: u32,

    /// Count only business days instead of calendar days
    #[serde(default)]
    pub business_days: bool,

    /// Create the deadline without human confirmation
    #[serde(default = "default_true")]
    pub auto_create: bool,

    #[serde(default)]
    pub default_urgency: Urgency,

    /// Higher wins when several rules match one event type
    #[serde(default)]
    pub priority: i32,

    #[serde(default = "default_true")]
    pub active: bool,

    /// Deadline title; defaults to "Prazo: {event_type}"
    #[serde(default)]
    pub title: Option<String>,
}

fn default_true() -> bool {
    true
}

impl DeadlineRule {
    /// Whether the rule is usable for the given organization.
    pub fn applies_to(&self, org_id: &str) -> bool {
        self.active && self.org_id.as_deref().is_none_or(|org| org == org_id)
    }

    pub fn deadline_title(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| format!("Prazo: {}", self.event_type))
    }
}

/// What a monitor filter matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Exact case identifier, compared against extracted identifiers only
    CaseNumber,
    /// Bar or tax registration, compared against the digits of the text
    Registration,
    /// Free keyword, substring search
    Keyword,
}

/// A tenant-defined watch on incoming publications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorFilter {
    pub id: String,

    #[serde(default)]
    pub org_id: Option<String>,

    pub kind: FilterKind,
    pub value: String,

    #[serde(default)]
    pub case_sensitive: bool,
}

impl MonitorFilter {
    pub fn applies_to(&self, org_id: &str) -> bool {
        self.org_id.as_deref().is_none_or(|org| org == org_id)
    }
}
