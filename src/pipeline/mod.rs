//! Pipeline entry points.
//!
//! - `SyncOrchestrator`: per-case pulls and per-tenant daily bundles
//! - `run_ingest`: one-shot import of normalized records

pub mod ingest;
pub mod sync;

pub use ingest::{IngestSummary, load_records, run_ingest};
pub use sync::{DailyOutcome, SyncOrchestrator};
