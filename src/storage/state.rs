//! Backend-independent bookkeeping shared by the storage implementations.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{
    Deadline, DeadlineRule, JudicialEvent, MonitorFilter, Publication, RunKey, SyncCursor,
    SyncRun, SyncStatus, TenantScope, TrackedCase,
};
use crate::storage::{IngestBundle, Insert};

/// Mutable pipeline state, serialized as one snapshot.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct StoreState {
    #[serde(default)]
    publications: BTreeMap<String, Publication>,
    #[serde(default)]
    events: BTreeMap<String, JudicialEvent>,
    #[serde(default)]
    deadlines: BTreeMap<String, Deadline>,
    #[serde(default)]
    cursors: BTreeMap<String, SyncCursor>,
    #[serde(default)]
    runs: Vec<SyncRun>,

    /// (org, content hash) -> publication id
    #[serde(skip)]
    by_hash: HashMap<(String, String), String>,
    /// publication id -> event id
    #[serde(skip)]
    by_publication: HashMap<String, String>,
}

impl StoreState {
    /// Rebuild lookup indexes after deserializing a snapshot.
    pub(crate) fn reindex(&mut self) {
        self.by_hash = self
            .publications
            .values()
            .map(|p| ((p.org_id.clone(), p.content_hash.clone()), p.id.clone()))
            .collect();
        self.by_publication = self
            .events
            .values()
            .map(|e| (e.publication_id.clone(), e.id.clone()))
            .collect();
    }

    pub(crate) fn publication_count(&self) -> usize {
        self.publications.len()
    }

    pub(crate) fn event_count(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn deadline_count(&self) -> usize {
        self.deadlines.len()
    }

    pub(crate) fn find_by_hash(&self, org_id: &str, content_hash: &str) -> Option<Publication> {
        self.by_hash
            .get(&(org_id.to_string(), content_hash.to_string()))
            .and_then(|id| self.publications.get(id))
            .cloned()
    }

    pub(crate) fn event_for_publication(&self, publication_id: &str) -> Option<JudicialEvent> {
        self.by_publication
            .get(publication_id)
            .and_then(|id| self.events.get(id))
            .cloned()
    }

    pub(crate) fn commit_ingest(&mut self, bundle: IngestBundle) -> Insert<Publication> {
        let IngestBundle {
            publication,
            event,
            deadline,
        } = bundle;

        if let Some(existing) = self.find_by_hash(&publication.org_id, &publication.content_hash) {
            return Insert::AlreadyExists(existing);
        }

        self.by_hash.insert(
            (publication.org_id.clone(), publication.content_hash.clone()),
            publication.id.clone(),
        );
        self.by_publication
            .insert(publication.id.clone(), event.id.clone());
        if let Some(deadline) = deadline {
            self.deadlines.insert(deadline.id.clone(), deadline);
        }
        self.events.insert(event.id.clone(), event);
        self.publications
            .insert(publication.id.clone(), publication.clone());

        Insert::Created(publication)
    }

    pub(crate) fn list_events(&self, org_id: &str) -> Vec<JudicialEvent> {
        let mut events: Vec<JudicialEvent> = self
            .events
            .values()
            .filter(|e| e.org_id == org_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        events
    }

    pub(crate) fn get_event(&self, event_id: &str) -> Option<JudicialEvent> {
        self.events.get(event_id).cloned()
    }

    pub(crate) fn save_event(&mut self, event: &JudicialEvent) -> Result<()> {
        match self.events.get_mut(&event.id) {
            Some(slot) => {
                *slot = event.clone();
                Ok(())
            }
            None => Err(AppError::not_found("event", &event.id)),
        }
    }

    pub(crate) fn get_deadline(&self, deadline_id: &str) -> Option<Deadline> {
        self.deadlines.get(deadline_id).cloned()
    }

    pub(crate) fn save_deadline(&mut self, deadline: &Deadline) {
        self.deadlines.insert(deadline.id.clone(), deadline.clone());
    }

    pub(crate) fn load_cursor(&self, case_id: &str) -> SyncCursor {
        self.cursors.get(case_id).cloned().unwrap_or_default()
    }

    pub(crate) fn save_cursor(&mut self, case_id: &str, cursor: &SyncCursor) {
        self.cursors.insert(case_id.to_string(), cursor.clone());
    }

    pub(crate) fn last_successful_run(&self, key: &RunKey) -> Option<SyncRun> {
        self.runs
            .iter()
            .filter(|r| &r.key == key && r.status == SyncStatus::Success)
            .max_by_key(|r| r.finished_at)
            .cloned()
    }

    pub(crate) fn record_run(&mut self, run: &SyncRun) {
        match self.runs.iter_mut().find(|r| r.id == run.id) {
            Some(slot) => *slot = run.clone(),
            None => self.runs.push(run.clone()),
        }
    }

    pub(crate) fn list_runs(&self, org_id: &str) -> Vec<SyncRun> {
        self.runs
            .iter()
            .filter(|r| r.key.org_id == org_id)
            .cloned()
            .collect()
    }
}

/// Read-only case and rule configuration.
#[derive(Debug, Default, Clone)]
pub(crate) struct Catalog {
    pub(crate) cases: Vec<TrackedCase>,
    pub(crate) rules: Vec<DeadlineRule>,
    pub(crate) filters: Vec<MonitorFilter>,
}

impl Catalog {
    pub(crate) fn find_by_identifier(&self, scope: &TenantScope, digits: &str) -> Vec<TrackedCase> {
        self.cases
            .iter()
            .filter(|c| scope.contains(c) && c.identifier_digits() == digits)
            .cloned()
            .collect()
    }

    pub(crate) fn get_case(&self, scope: &TenantScope, case_id: &str) -> Option<TrackedCase> {
        self.cases
            .iter()
            .find(|c| scope.contains(c) && c.id == case_id)
            .cloned()
    }

    pub(crate) fn monitored_cases(&self, scope: &TenantScope) -> Vec<TrackedCase> {
        self.cases
            .iter()
            .filter(|c| scope.contains(c) && c.monitoring_enabled)
            .cloned()
            .collect()
    }

    pub(crate) fn active_rules(&self, scope: &TenantScope) -> Vec<DeadlineRule> {
        self.rules
            .iter()
            .filter(|r| r.applies_to(&scope.org_id))
            .cloned()
            .collect()
    }

    pub(crate) fn monitor_filters(&self, scope: &TenantScope) -> Vec<MonitorFilter> {
        self.filters
            .iter()
            .filter(|f| f.applies_to(&scope.org_id))
            .cloned()
            .collect()
    }
}
