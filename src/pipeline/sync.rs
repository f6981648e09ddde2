// src/pipeline/sync.rs

//! Sync orchestration: per-case pulls and per-tenant daily bundles.
//!
//! Every attempt leaves a [`SyncRun`] behind. Adapter failures end the run
//! as failed instead of propagating; only errors in caller-supplied input
//! (unknown case, malformed identifier, unknown partition, unsupported
//! source) reach the caller.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, TimeDelta};
use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{NormalizedRecord, RunKey, SyncConfig, SyncRun, SyncStatus, TenantScope};
use crate::services::{CaseNumber, RecordProcessor};
use crate::sources::SourceAdapter;
use crate::storage::{CaseDirectory, SyncStateStore};
use crate::utils::Clock;

/// Result of a daily batch request.
#[derive(Debug, Clone, PartialEq)]
pub enum DailyOutcome {
    /// A run already succeeded for this key; nothing was fetched
    AlreadySynced(SyncRun),
    /// A new run was attempted
    Ran(SyncRun),
}

impl DailyOutcome {
    pub fn run(&self) -> &SyncRun {
        match self {
            DailyOutcome::AlreadySynced(run) | DailyOutcome::Ran(run) => run,
        }
    }
}

/// Drives adapters and feeds their records through the processor.
pub struct SyncOrchestrator {
    processor: Arc<RecordProcessor>,
    state: Arc<dyn SyncStateStore>,
    cases: Arc<dyn CaseDirectory>,
    clock: Arc<dyn Clock>,
    max_concurrent: usize,
    cursor_overlap: TimeDelta,
}

impl SyncOrchestrator {
    pub fn new(
        processor: Arc<RecordProcessor>,
        state: Arc<dyn SyncStateStore>,
        cases: Arc<dyn CaseDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            processor,
            state,
            cases,
            clock,
            max_concurrent: 1,
            cursor_overlap: SyncConfig::default().cursor_overlap(),
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_cursor_overlap(mut self, overlap: TimeDelta) -> Self {
        self.cursor_overlap = overlap.max(TimeDelta::zero());
        self
    }

    /// Pull new movements of one tracked case.
    ///
    /// The cursor advances once the whole batch went through the processor,
    /// failed records included; they stay on the run's error log. The next
    /// pull starts `cursor_overlap` before the cursor so late-indexed
    /// movements are still seen, and dedup absorbs the repeats.
    pub async fn sync_case(
        &self,
        scope: &TenantScope,
        case_id: &str,
        adapter: &dyn SourceAdapter,
    ) -> Result<SyncRun> {
        let case = self
            .cases
            .get_case(scope, case_id)
            .await?
            .ok_or_else(|| AppError::not_found("case", case_id))?;
        let number = CaseNumber::parse(&case.case_number)?;

        let mut cursor = self.state.load_cursor(case_id).await?;
        let index = match cursor.jurisdiction_index.clone() {
            Some(index) => index,
            None => {
                let jurisdiction = number.jurisdiction();
                if !jurisdiction.is_known() {
                    return Err(AppError::UnknownSourceIndex(format!(
                        "no partition for {}",
                        number
                    )));
                }
                log::info!("Case {} belongs to {}", case_id, jurisdiction.code);
                cursor.jurisdiction_index = Some(jurisdiction.index.clone());
                self.state.save_cursor(case_id, &cursor).await?;
                jurisdiction.index
            }
        };

        let started_at = self.clock.now();
        let key = RunKey {
            org_id: scope.org_id.clone(),
            source: adapter.tag(),
            run_date: self.clock.today(),
            case_id: Some(case_id.to_string()),
        };
        let mut run = SyncRun::start(key, started_at);

        let since = if cursor.initial_sync_done {
            cursor.last_synced_at.map(|at| at - self.cursor_overlap)
        } else {
            None
        };
        log::info!(
            "Syncing case {} ({}) from {} since {}",
            case_id,
            number,
            index,
            since.map_or_else(|| "the beginning".to_string(), |s| s.to_rfc3339())
        );

        let records = match adapter.fetch_movements(&number, &index, since).await {
            Ok(records) => records,
            Err(err) => return self.abort(run, err).await,
        };

        self.process_batch(scope, &mut run, &records).await?;
        run.complete(self.clock.now());

        cursor.last_synced_at = Some(started_at);
        cursor.initial_sync_done = true;
        self.state.save_cursor(case_id, &cursor).await?;

        self.state.record_run(&run).await?;
        log_summary(&run);
        Ok(run)
    }

    /// Ingest one day of a bundle source for a tenant.
    ///
    /// A key that already has a successful run is not fetched again.
    pub async fn sync_daily(
        &self,
        scope: &TenantScope,
        date: NaiveDate,
        adapter: &dyn SourceAdapter,
    ) -> Result<DailyOutcome> {
        let key = RunKey {
            org_id: scope.org_id.clone(),
            source: adapter.tag(),
            run_date: date,
            case_id: None,
        };
        if let Some(previous) = self.state.last_successful_run(&key).await? {
            log::info!(
                "{} bundle of {} already synced for {} (run {})",
                key.source,
                date,
                scope.org_id,
                previous.id
            );
            return Ok(DailyOutcome::AlreadySynced(previous));
        }

        let tracked: HashSet<String> = self
            .cases
            .monitored_cases(scope)
            .await?
            .iter()
            .map(|c| c.identifier_digits())
            .filter(|digits| digits.len() == crate::services::identifier::CNJ_DIGITS)
            .collect();

        let mut run = SyncRun::start(key, self.clock.now());
        log::info!(
            "Syncing {} bundle of {} for {} ({} tracked identifiers)",
            adapter.tag(),
            date,
            scope.org_id,
            tracked.len()
        );

        let bytes = match adapter.fetch_daily_bundle(date).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                run.fail(format!("no bundle published for {date}"), self.clock.now());
                self.state.record_run(&run).await?;
                log_summary(&run);
                return Ok(DailyOutcome::Ran(run));
            }
            Err(err) => return self.abort(run, err).await.map(DailyOutcome::Ran),
        };

        let records = match adapter.parse_bundle(&bytes, &tracked) {
            Ok(records) => records,
            Err(err) => return self.abort(run, err).await.map(DailyOutcome::Ran),
        };

        self.process_batch(scope, &mut run, &records).await?;
        run.complete(self.clock.now());
        self.state.record_run(&run).await?;
        log_summary(&run);
        Ok(DailyOutcome::Ran(run))
    }

    /// Pull every monitored case of a tenant, several at a time.
    ///
    /// Cases rejected before fetching (bad identifier, unknown court) are
    /// logged and left out of the result.
    pub async fn sync_all_cases(
        &self,
        scope: &TenantScope,
        adapter: &dyn SourceAdapter,
    ) -> Result<Vec<SyncRun>> {
        let cases = self.cases.monitored_cases(scope).await?;
        log::info!(
            "Syncing {} monitored case(s) of {}, {} at a time",
            cases.len(),
            scope.org_id,
            self.max_concurrent
        );

        let mut results = stream::iter(cases)
            .map(|case| async move {
                let result = self.sync_case(scope, &case.id, adapter).await;
                (case, result)
            })
            .buffer_unordered(self.max_concurrent);

        let mut runs = Vec::new();
        while let Some((case, result)) = results.next().await {
            match result {
                Ok(run) => runs.push(run),
                Err(err) => log::warn!("Skipped case {} ({}): {}", case.id, case.case_number, err),
            }
        }

        let failed = runs
            .iter()
            .filter(|r| r.status == SyncStatus::Failed)
            .count();
        log::info!("Synced {} case(s), {} failed", runs.len(), failed);
        Ok(runs)
    }

    /// Feed records one by one; failures are logged on the run.
    ///
    /// Only a failure to flush the batch's writes is returned.
    async fn process_batch(
        &self,
        scope: &TenantScope,
        run: &mut SyncRun,
        records: &[NormalizedRecord],
    ) -> Result<()> {
        run.found = records.len();
        self.state.begin_batch().await;
        for record in records {
            match self.processor.process(scope, record).await {
                Ok(outcome) if outcome.created => run.imported += 1,
                Ok(_) => run.duplicates += 1,
                Err(err) => {
                    log::warn!("Failed to process {} record {}: {}", record.source, record.source_id, err);
                    run.record_error(format!("{}: {}", record.source_id, err));
                }
            }
        }
        self.state.end_batch().await
    }

    /// End a run after a fetch-level failure.
    ///
    /// Input errors are recorded and then returned to the caller.
    async fn abort(&self, mut run: SyncRun, err: AppError) -> Result<SyncRun> {
        let detail = match &err {
            AppError::Source(source) => format!("{}: {}", source.kind(), source),
            other => other.to_string(),
        };
        log::error!("Sync of {} failed: {}", run.key.org_id, detail);
        run.fail(detail, self.clock.now());
        self.state.record_run(&run).await?;

        if err.is_input_error() {
            return Err(err);
        }
        log_summary(&run);
        Ok(run)
    }
}

fn log_summary(run: &SyncRun) {
    log::info!(
        "Run {} [{} {} {}]: found {}, imported {}, duplicates {}, errors {} -> {}",
        run.id,
        run.key.org_id,
        run.key.source,
        run.key.case_id.as_deref().unwrap_or("daily"),
        run.found,
        run.imported,
        run.duplicates,
        run.errors,
        run.status.as_str()
    );
}
