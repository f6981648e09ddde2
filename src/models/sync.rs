//! Sync cursors and run audit records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SourceTag;

/// Per-case pull cursor, owned by the case's sync unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncCursor {
    /// Source partition to query, detected from the identifier once
    pub jurisdiction_index: Option<String>,

    /// Start time of the last completed sync
    pub last_synced_at: Option<DateTime<Utc>>,

    pub initial_sync_done: bool,
}

/// Terminal (or in-flight) state of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Running,
    Success,
    Partial,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Running => "running",
            SyncStatus::Success => "success",
            SyncStatus::Partial => "partial",
            SyncStatus::Failed => "failed",
        }
    }
}

/// Identity of a sync unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunKey {
    pub org_id: String,
    pub source: SourceTag,
    pub run_date: NaiveDate,

    /// Set for per-case pulls, empty for daily batches
    pub case_id: Option<String>,
}

/// Audit row for one sync attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncRun {
    pub id: String,
    pub key: RunKey,
    pub status: SyncStatus,
    pub found: usize,
    pub imported: usize,
    pub duplicates: usize,
    pub errors: usize,

    #[serde(default)]
    pub error_log: Vec<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncRun {
    pub fn start(key: RunKey, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key,
            status: SyncStatus::Running,
            found: 0,
            imported: 0,
            duplicates: 0,
            errors: 0,
            error_log: Vec::new(),
            started_at: now,
            finished_at: None,
        }
    }

    /// Record a per-record failure without stopping the run.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors += 1;
        self.error_log.push(message.into());
    }

    /// Close the run after every record was attempted.
    ///
    /// No errors is a success; errors alongside imports is partial;
    /// errors with nothing imported is a failure.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = if self.errors == 0 {
            SyncStatus::Success
        } else if self.imported > 0 {
            SyncStatus::Partial
        } else {
            SyncStatus::Failed
        };
        self.finished_at = Some(now);
    }

    /// Close the run after a fetch-level failure.
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.error_log.push(message.into());
        self.status = SyncStatus::Failed;
        self.finished_at = Some(now);
    }
}
