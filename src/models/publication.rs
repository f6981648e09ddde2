//! Persisted pipeline records: publications, events and deadlines.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::SourceTag;

/// An immutable, deduplicated publication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Publication {
    pub id: String,
    pub org_id: String,

    /// Dedup key, unique per organization
    pub content_hash: String,

    pub source: SourceTag,
    pub source_id: String,
    pub raw_text: String,
    pub published_on: NaiveDate,

    /// Main case identifier, formatted
    pub case_number: Option<String>,

    /// Matched tracked case
    pub case_id: Option<String>,

    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,
}

/// Workflow status of a judicial event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    New,
    Assigned,
    InProgress,
    Resolved,
    Archived,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::New => "new",
            EventStatus::Assigned => "assigned",
            EventStatus::InProgress => "in_progress",
            EventStatus::Resolved => "resolved",
            EventStatus::Archived => "archived",
        }
    }

    /// The single status a workflow step may move to, archiving aside.
    pub fn successor(&self) -> Option<EventStatus> {
        match self {
            EventStatus::New => Some(EventStatus::Assigned),
            EventStatus::Assigned => Some(EventStatus::InProgress),
            EventStatus::InProgress => Some(EventStatus::Resolved),
            EventStatus::Resolved => Some(EventStatus::Archived),
            EventStatus::Archived => None,
        }
    }

    /// Statuses still requiring attention.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            EventStatus::New | EventStatus::Assigned | EventStatus::InProgress
        )
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse time-pressure tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Critical,
    Urgent,
    #[default]
    Normal,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Critical => "critical",
            Urgency::Urgent => "urgent",
            Urgency::Normal => "normal",
        }
    }

    /// Deadline priority a rule with this default urgency produces.
    pub fn deadline_priority(&self) -> DeadlinePriority {
        match self {
            Urgency::Critical => DeadlinePriority::Urgent,
            Urgency::Urgent => DeadlinePriority::High,
            Urgency::Normal => DeadlinePriority::Medium,
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpretation of a publication, moved through a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JudicialEvent {
    pub id: String,
    pub org_id: String,
    pub publication_id: String,
    pub case_id: Option<String>,
    pub event_type: String,
    pub status: EventStatus,
    pub urgency: Urgency,
    pub deadline_id: Option<String>,
    pub assignee_id: Option<String>,

    /// First monitor filter the publication matched
    #[serde(default)]
    pub matched_filter_id: Option<String>,

    /// Identifiers found in the publication text, main first
    #[serde(default)]
    pub identifiers: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JudicialEvent {
    /// Assign the event to a user. A new event becomes assigned.
    pub fn assign(&mut self, user_id: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        if !self.status.is_open() {
            return Err(AppError::InvalidTransition {
                from: self.status.to_string(),
                to: EventStatus::Assigned.to_string(),
            });
        }
        self.assignee_id = Some(user_id.into());
        if self.status == EventStatus::New {
            self.status = EventStatus::Assigned;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Move the event one step forward in its workflow.
    ///
    /// Steps follow new, assigned, in_progress, resolved, archived without
    /// skipping; archiving is allowed from any other status. Assigned and
    /// the working states need an assignee.
    pub fn transition_to(&mut self, next: EventStatus, now: DateTime<Utc>) -> Result<()> {
        let step = self.status.successor() == Some(next)
            || (next == EventStatus::Archived && self.status != EventStatus::Archived);
        let staffed = self.assignee_id.is_some()
            || !matches!(next, EventStatus::Assigned | EventStatus::InProgress);
        if !step || !staffed {
            return Err(AppError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

/// Deadline priority as understood by the case-management side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadlinePriority {
    Low,
    Medium,
    High,
    Urgent,
}

/// A statutory deadline derived from an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deadline {
    pub id: String,
    pub org_id: String,
    pub case_id: Option<String>,

    /// Originating event
    pub event_id: String,

    /// Rule the due date was computed from
    pub rule_id: String,

    pub title: String,
    pub due_on: NaiveDate,
    pub priority: DeadlinePriority,
    pub assignee_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
