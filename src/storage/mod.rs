//! Persistence seams consumed by the pipeline.
//!
//! The pipeline never talks to a database directly. It goes through four
//! collaborator traits, resolved once by the composing layer:
//!
//! - [`PublicationStore`]: publications, events and deadlines
//! - [`SyncStateStore`]: per-case cursors and sync run audit rows
//! - [`CaseDirectory`]: tracked cases, exact identifier lookup
//! - [`RuleSource`]: deadline rules and monitor filters per tenant
//!
//! Two backends implement all of them:
//!
//! ```text
//! MemoryStore    in-process, used by tests and one-shot imports
//! LocalStorage   {root}/state.json snapshot + cases.json, atomic writes
//! ```

pub mod local;
pub mod memory;
mod state;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Deadline, DeadlineRule, JudicialEvent, MonitorFilter, Publication, RunKey, SyncCursor,
    SyncRun, TenantScope, TrackedCase,
};

// Re-export for convenience
pub use local::LocalStorage;
pub use memory::MemoryStore;

/// Outcome of a create-if-absent write.
#[derive(Debug, Clone, PartialEq)]
pub enum Insert<T> {
    /// The row was written by this call
    Created(T),
    /// A row with the same key already existed; nothing was written
    AlreadyExists(T),
}

impl<T> Insert<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Insert::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Insert::Created(v) | Insert::AlreadyExists(v) => v,
        }
    }
}

/// Everything one new publication produces, committed together.
#[derive(Debug, Clone)]
pub struct IngestBundle {
    pub publication: Publication,
    pub event: JudicialEvent,
    pub deadline: Option<Deadline>,
}

/// Publications, events and deadlines.
#[async_trait]
pub trait PublicationStore: Send + Sync {
    /// Publication with this content hash in the organization, if any.
    async fn find_by_hash(&self, org_id: &str, content_hash: &str) -> Result<Option<Publication>>;

    /// The event interpreting a publication.
    async fn event_for_publication(&self, publication_id: &str)
    -> Result<Option<JudicialEvent>>;

    /// Atomically write a publication with its event and deadline.
    ///
    /// If the organization already holds a publication with the same
    /// content hash, nothing is written and the existing row is returned.
    async fn commit_ingest(&self, bundle: IngestBundle) -> Result<Insert<Publication>>;

    async fn list_events(&self, org_id: &str) -> Result<Vec<JudicialEvent>>;

    async fn get_event(&self, event_id: &str) -> Result<Option<JudicialEvent>>;

    /// Persist workflow changes to an existing event.
    async fn save_event(&self, event: &JudicialEvent) -> Result<()>;

    async fn get_deadline(&self, deadline_id: &str) -> Result<Option<Deadline>>;

    /// Create or replace a deadline.
    async fn save_deadline(&self, deadline: &Deadline) -> Result<()>;
}

/// Per-case cursors and sync run audit rows.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// Cursor for a case; a default cursor if the case never synced.
    async fn load_cursor(&self, case_id: &str) -> Result<SyncCursor>;

    async fn save_cursor(&self, case_id: &str, cursor: &SyncCursor) -> Result<()>;

    /// Most recent successful run for a key.
    async fn last_successful_run(&self, key: &RunKey) -> Result<Option<SyncRun>>;

    /// Insert or update a run.
    async fn record_run(&self, run: &SyncRun) -> Result<()>;

    async fn list_runs(&self, org_id: &str) -> Result<Vec<SyncRun>>;

    /// Start a batch: a backend may hold back durable writes, including
    /// those made through its other traits, until the batch ends.
    /// Batches nest.
    async fn begin_batch(&self) {}

    /// End a batch, flushing what it held back once no batch is open.
    async fn end_batch(&self) -> Result<()> {
        Ok(())
    }
}

/// Tracked cases of the case-management side.
#[async_trait]
pub trait CaseDirectory: Send + Sync {
    /// Cases in scope whose identifier digits equal `digits`.
    async fn find_by_identifier(&self, scope: &TenantScope, digits: &str)
    -> Result<Vec<TrackedCase>>;

    async fn get_case(&self, scope: &TenantScope, case_id: &str) -> Result<Option<TrackedCase>>;

    /// Cases in scope with monitoring enabled.
    async fn monitored_cases(&self, scope: &TenantScope) -> Result<Vec<TrackedCase>>;
}

/// Tenant rule configuration.
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn active_rules(&self, scope: &TenantScope) -> Result<Vec<DeadlineRule>>;

    async fn monitor_filters(&self, scope: &TenantScope) -> Result<Vec<MonitorFilter>>;
}
