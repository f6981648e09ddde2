//! Local filesystem storage implementation.
//!
//! Keeps the whole pipeline state in one JSON snapshot, rewritten
//! atomically after every mutation, or once per batch while a batch is
//! open. Meant for single-node deployments and
//! development; the tracked cases come from a JSON file maintained by the
//! case-management side, the rules and filters from the configuration.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── config.toml           # Pipeline configuration
//! ├── cases.json            # Tracked cases (read-only here)
//! └── state.json            # Publications, events, deadlines, cursors, runs
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{
    Deadline, DeadlineRule, JudicialEvent, MonitorFilter, Publication, RunKey, SyncCursor,
    SyncRun, TenantScope, TrackedCase,
};
use crate::storage::state::{Catalog, StoreState};
use crate::storage::{
    CaseDirectory, IngestBundle, Insert, PublicationStore, RuleSource, SyncStateStore,
};

pub const STATE_FILE: &str = "state.json";
pub const CASES_FILE: &str = "cases.json";

/// Local filesystem storage backend.
pub struct LocalStorage {
    root_dir: PathBuf,
    state: Mutex<StoreState>,
    catalog: Catalog,
    open_batches: AtomicUsize,
    dirty: AtomicBool,
}

impl LocalStorage {
    /// Open the storage rooted at the given directory, loading any snapshot.
    pub async fn open(
        root_dir: impl Into<PathBuf>,
        rules: Vec<DeadlineRule>,
        filters: Vec<MonitorFilter>,
    ) -> Result<Self> {
        let root_dir = root_dir.into();
        let mut storage = Self {
            root_dir,
            state: Mutex::new(StoreState::default()),
            catalog: Catalog {
                cases: Vec::new(),
                rules,
                filters,
            },
            open_batches: AtomicUsize::new(0),
            dirty: AtomicBool::new(false),
        };

        let mut state: StoreState = storage.read_json(STATE_FILE).await?.unwrap_or_default();
        state.reindex();
        storage.state = Mutex::new(state);

        storage.catalog.cases = match storage.read_json(CASES_FILE).await? {
            Some(cases) => cases,
            None => {
                log::warn!("No {} found in {}", CASES_FILE, storage.root_dir.display());
                Vec::new()
            }
        };

        Ok(storage)
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn cases(&self) -> &[TrackedCase] {
        &self.catalog.cases
    }

    /// Counts of publications, events and deadlines held.
    pub async fn counts(&self) -> (usize, usize, usize) {
        let state = self.state.lock().await;
        (
            state.publication_count(),
            state.event_count(),
            state.deadline_count(),
        )
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Apply a change to a copy of the state, persist it, then publish it.
    ///
    /// A failed write leaves both the file and the in-memory state untouched.
    /// Inside a batch the change lands in memory and the write waits for
    /// [`SyncStateStore::end_batch`].
    async fn mutate<T>(&self, change: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock().await;
        if self.open_batches.load(Ordering::SeqCst) > 0 {
            let out = change(&mut state)?;
            self.dirty.store(true, Ordering::SeqCst);
            return Ok(out);
        }
        let mut next = state.clone();
        let out = change(&mut next)?;
        self.write_json(STATE_FILE, &next).await?;
        *state = next;
        Ok(out)
    }
}

#[async_trait]
impl PublicationStore for LocalStorage {
    async fn find_by_hash(&self, org_id: &str, content_hash: &str) -> Result<Option<Publication>> {
        Ok(self.state.lock().await.find_by_hash(org_id, content_hash))
    }

    async fn event_for_publication(
        &self,
        publication_id: &str,
    ) -> Result<Option<JudicialEvent>> {
        Ok(self.state.lock().await.event_for_publication(publication_id))
    }

    async fn commit_ingest(&self, bundle: IngestBundle) -> Result<Insert<Publication>> {
        {
            let state = self.state.lock().await;
            let publication = &bundle.publication;
            if let Some(existing) =
                state.find_by_hash(&publication.org_id, &publication.content_hash)
            {
                return Ok(Insert::AlreadyExists(existing));
            }
        }
        self.mutate(|state| Ok(state.commit_ingest(bundle))).await
    }

    async fn list_events(&self, org_id: &str) -> Result<Vec<JudicialEvent>> {
        Ok(self.state.lock().await.list_events(org_id))
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<JudicialEvent>> {
        Ok(self.state.lock().await.get_event(event_id))
    }

    async fn save_event(&self, event: &JudicialEvent) -> Result<()> {
        self.mutate(|state| state.save_event(event)).await
    }

    async fn get_deadline(&self, deadline_id: &str) -> Result<Option<Deadline>> {
        Ok(self.state.lock().await.get_deadline(deadline_id))
    }

    async fn save_deadline(&self, deadline: &Deadline) -> Result<()> {
        self.mutate(|state| {
            state.save_deadline(deadline);
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl SyncStateStore for LocalStorage {
    async fn load_cursor(&self, case_id: &str) -> Result<SyncCursor> {
        Ok(self.state.lock().await.load_cursor(case_id))
    }

    async fn save_cursor(&self, case_id: &str, cursor: &SyncCursor) -> Result<()> {
        self.mutate(|state| {
            state.save_cursor(case_id, cursor);
            Ok(())
        })
        .await
    }

    async fn last_successful_run(&self, key: &RunKey) -> Result<Option<SyncRun>> {
        Ok(self.state.lock().await.last_successful_run(key))
    }

    async fn record_run(&self, run: &SyncRun) -> Result<()> {
        self.mutate(|state| {
            state.record_run(run);
            Ok(())
        })
        .await
    }

    async fn list_runs(&self, org_id: &str) -> Result<Vec<SyncRun>> {
        Ok(self.state.lock().await.list_runs(org_id))
    }

    async fn begin_batch(&self) {
        let _state = self.state.lock().await;
        self.open_batches.fetch_add(1, Ordering::SeqCst);
    }

    async fn end_batch(&self) -> Result<()> {
        let state = self.state.lock().await;
        let open = self.open_batches.load(Ordering::SeqCst).saturating_sub(1);
        self.open_batches.store(open, Ordering::SeqCst);

        if open == 0 && self.dirty.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.write_json(STATE_FILE, &*state).await {
                self.dirty.store(true, Ordering::SeqCst);
                return Err(e);
            }
            log::debug!("Flushed batched writes to {}", STATE_FILE);
        }
        Ok(())
    }
}

#[async_trait]
impl CaseDirectory for LocalStorage {
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
impl RuleSource for LocalStorage {
    async fn active_rules(&self, scope: &TenantScope) -> Result<Vec<DeadlineRule>> {
        Ok(self.catalog.active_rules(scope))
    }

    async fn monitor_filters(&self, scope: &TenantScope) -> Result<Vec<MonitorFilter>> {
        Ok(self.catalog.monitor_filters(scope))
    }
}
