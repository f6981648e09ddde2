// src/models/mod.rs

//! Domain models for the ingestion pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod case;
mod config;
mod publication;
mod record;
mod rule;
mod sync;

// Re-export all public types
pub use case::{TenantScope, TrackedCase};
pub use config::{
    ClassifierConfig, Config, DATAJUD_API_KEY_ENV, DatajudConfig, DeadlineConfig, DjenConfig,
    KeywordGroup, LoggingConfig, SourcesConfig, SyncConfig,
};
pub use publication::{
    Deadline, DeadlinePriority, EventStatus, JudicialEvent, Publication, Urgency,
};
pub use record::{NormalizedRecord, SourceTag};
pub use rule::{DeadlineRule, FilterKind, MonitorFilter};
pub use sync::{RunKey, SyncCursor, SyncRun, SyncStatus};
