// src/pipeline/ingest.rs

//! One-shot import of normalized records from a JSON file.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::{NormalizedRecord, TenantScope};
use crate::services::RecordProcessor;

/// Counters of an import.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub found: usize,
    pub imported: usize,
    pub duplicates: usize,
    pub errors: usize,
}

/// Read a JSON array of normalized records.
pub async fn load_records(path: &Path) -> Result<Vec<NormalizedRecord>> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        AppError::validation(format!("cannot read records from {}: {e}", path.display()))
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Feed records through the processor; failures are logged and counted.
pub async fn run_ingest(
    processor: &RecordProcessor,
    scope: &TenantScope,
    records: &[NormalizedRecord],
) -> IngestSummary {
    let mut summary = IngestSummary {
        found: records.len(),
        ..IngestSummary::default()
    };

    for record in records {
        match processor.process(scope, record).await {
            Ok(outcome) if outcome.created => summary.imported += 1,
            Ok(_) => summary.duplicates += 1,
            Err(e) => {
                summary.errors += 1;
                log::warn!("Record {} not ingested: {}", record.source_id, e);
            }
        }
    }

    log::info!(
        "Ingested {} of {} record(s): {} duplicate(s), {} error(s)",
        summary.imported,
        summary.found,
        summary.duplicates,
        summary.errors
    );
    summary
}
