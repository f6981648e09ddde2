//! Service layer for the ingestion pipeline.
//!
//! This module contains the business logic for:
//! - Case identifier parsing and jurisdiction lookup (`identifier`)
//! - Event classification and monitor filters (`ContentClassifier`)
//! - Deadline rules and urgency tiers (`DeadlineEngine`, `UrgencyCalculator`)
//! - Record ingestion (`RecordProcessor`)
//! - Event workflow (`EventService`)

pub mod classifier;
pub mod deadlines;
mod events;
pub mod identifier;
mod processor;

pub use classifier::{Classification, ContentClassifier};
pub use deadlines::{DeadlineEngine, DeadlinePlan, UrgencyCalculator};
pub use events::{EventService, EventView};
pub use identifier::{CaseNumber, Jurisdiction};
pub use processor::{ProcessOutcome, RecordProcessor};
