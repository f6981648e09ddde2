//! In-process storage backend.
//!
//! Holds everything behind a mutex; the duplicate check and the insert in
//! `commit_ingest` happen under one lock, so concurrent ingestion of the
//! same record converges to one row.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{
    Deadline, DeadlineRule, JudicialEvent, MonitorFilter, Publication, RunKey, SyncCursor,
    SyncRun, TenantScope, TrackedCase,
};
use crate::storage::state::{Catalog, StoreState};
use crate::storage::{
    CaseDirectory, IngestBundle, Insert, PublicationStore, RuleSource, SyncStateStore,
};

/// In-memory backend implementing every storage trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    catalog: Catalog,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cases(mut self, cases: Vec<TrackedCase>) -> Self {
        self.catalog.cases = cases;
        self
    }

    pub fn with_rules(mut self, rules: Vec<DeadlineRule>) -> Self {
        self.catalog.rules = rules;
        self
    }

    pub fn with_filters(mut self, filters: Vec<MonitorFilter>) -> Self {
        self.catalog.filters = filters;
        self
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|e| AppError::storage(format!("memory store lock poisoned: {e}")))
    }

    pub fn publication_count(&self) -> usize {
        self.state().map(|s| s.publication_count()).unwrap_or(0)
    }

    pub fn event_count(&self) -> usize {
        self.state().map(|s| s.event_count()).unwrap_or(0)
    }

    pub fn deadline_count(&self) -> usize {
        self.state().map(|s| s.deadline_count()).unwrap_or(0)
    }
}

#[async_trait]
impl PublicationStore for MemoryStore {
    async fn find_by_hash(&self, org_id: &str, content_hash: &str) -> Result<Option<Publication>> {
        Ok(self.state()?.find_by_hash(org_id, content_hash))
    }

    async fn event_for_publication(
        &self,
        publication_id: &str,
    ) -> Result<Option<JudicialEvent>> {
        Ok(self.state()?.event_for_publication(publication_id))
    }

    async fn commit_ingest(&self, bundle: IngestBundle) -> Result<Insert<Publication>> {
        Ok(self.state()?.commit_ingest(bundle))
    }

    async fn list_events(&self, org_id: &str) -> Result<Vec<JudicialEvent>> {
        Ok(self.state()?.list_events(org_id))
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<JudicialEvent>> {
        Ok(self.state()?.get_event(event_id))
    }

    async fn save_event(&self, event: &JudicialEvent) -> Result<()> {
        self.state()?.save_event(event)
    }

    async fn get_deadline(&self, deadline_id: &str) -> Result<Option<Deadline>> {
        Ok(self.state()?.get_deadline(deadline_id))
    }

    async fn save_deadline(&self, deadline: &Deadline) -> Result<()> {
        self.state()?.save_deadline(deadline);
        Ok(())
    }
}

#[async_trait]
impl SyncStateStore for MemoryStore {
    async fn load_cursor(&self, case_id: &str) -> Result<SyncCursor> {
        Ok(self.state()?.load_cursor(case_id))
    }

    async fn save_cursor(&self, case_id: &str, cursor: &SyncCursor) -> Result<()> {
        self.state()?.save_cursor(case_id, cursor);
        Ok(())
    }

    async fn last_successful_run(&self, key: &RunKey) -> Result<Option<SyncRun>> {
        Ok(self.state()?.last_successful_run(key))
    }

    async fn record_run(&self, run: &SyncRun) -> Result<()> {
        self.state()?.record_run(run);
        Ok(())
    }

    async fn list_runs(&self, org_id: &str) -> Result<Vec<SyncRun>> {
        Ok(self.state()?.list_runs(org_id))
    }
}

#[async_trait]
impl CaseDirectory for MemoryStore {
    async fn find_by_identifier(
        &self,
        scope: &TenantScope,
        digits: &str,
    ) -> Result<Vec<TrackedCase>> {
        Ok(self.catalog.find_by_identifier(scope, digits))
    }

    async fn get_case(&self, scope: &TenantScope, case_id: &str) -> Result<Option<TrackedCase>> {
        Ok(self.catalog.get_case(scope, case_id))
    }

    async fn monitored_cases(&self, scope: &TenantScope) -> Result<Vec<TrackedCase>> {
        Ok(self.catalog.monitored_cases(scope))
    }
}

#[async_trait]
impl RuleSource for MemoryStore {
    async fn active_rules(&self, scope: &TenantScope) -> Result<Vec<DeadlineRule>> {
        Ok(self.catalog.active_rules(scope))
    }

    async fn monitor_filters(&self, scope: &TenantScope) -> Result<Vec<MonitorFilter>> {
        Ok(self.catalog.monitor_filters(scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    use crate::models::{EventStatus, SourceTag, SyncStatus, Urgency};

    fn bundle(org: &str, hash: &str, id: &str) -> IngestBundle {
        let now = Utc::now();
        IngestBundle {
            publication: Publication {
                id: id.into(),
                org_id: org.into(),
                content_hash: hash.into(),
                source: SourceTag::Manual,
                source_id: "s".into(),
                raw_text: "text".into(),
                published_on: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                case_number: None,
                case_id: None,
                metadata: Default::default(),
                created_at: now,
            },
            event: JudicialEvent {
                id: format!("ev-{id}"),
                org_id: org.into(),
                publication_id: id.into(),
                case_id: None,
                event_type: "movimentacao".into(),
                status: EventStatus::New,
                urgency: Urgency::Normal,
                deadline_id: None,
                assignee_id: None,
                matched_filter_id: None,
                identifiers: vec![],
                created_at: now,
                updated_at: now,
            },
            deadline: None,
        }
    }

    #[tokio::test]
    async fn test_commit_is_create_if_absent() {
        let store = MemoryStore::new();
        let first = store.commit_ingest(bundle("org", "h1", "p1")).await.unwrap();
        assert!(first.is_created());

        let second = store.commit_ingest(bundle("org", "h1", "p2")).await.unwrap();
        assert!(!second.is_created());
        assert_eq!(second.into_inner().id, "p1");
        assert_eq!(store.publication_count(), 1);
        assert_eq!(store.event_count(), 1);
    }

    #[tokio::test]
    async fn test_hash_is_scoped_per_org() {
        let store = MemoryStore::new();
        store.commit_ingest(bundle("org-a", "h1", "p1")).await.unwrap();
        let other = store.commit_ingest(bundle("org-b", "h1", "p2")).await.unwrap();
        assert!(other.is_created());
        assert!(store.find_by_hash("org-b", "h1").await.unwrap().is_some());
        assert!(store.find_by_hash("org-c", "h1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_unknown_event_fails() {
        let store = MemoryStore::new();
        let b = bundle("org", "h1", "p1");
        assert!(store.save_event(&b.event).await.is_err());
    }

    #[tokio::test]
    async fn test_last_successful_run() {
        let store = MemoryStore::new();
        let key = RunKey {
            org_id: "org".into(),
            source: SourceTag::Djen,
            run_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            case_id: None,
        };

        let mut failed = SyncRun::start(key.clone(), Utc::now());
        failed.fail("upstream: 502", Utc::now());
        store.record_run(&failed).await.unwrap();
        assert!(store.last_successful_run(&key).await.unwrap().is_none());

        let mut ok = SyncRun::start(key.clone(), Utc::now());
        ok.complete(Utc::now());
        store.record_run(&ok).await.unwrap();
        let found = store.last_successful_run(&key).await.unwrap().unwrap();
        assert_eq!(found.id, ok.id);
        assert_eq!(found.status, SyncStatus::Success);
        assert_eq!(store.list_runs("org").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cursor_defaults() {
        let store = MemoryStore::new();
        let cursor = store.load_cursor("case-1").await.unwrap();
        assert!(!cursor.initial_sync_done);
        assert!(cursor.jurisdiction_index.is_none());
    }
}
