// src/lib.rs

//! judsync: judicial publication ingestion pipeline.
//!
//! Pulls publications from upstream judicial sources, deduplicates them,
//! matches them to tracked cases, classifies the legal event and derives
//! statutory deadlines.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod sources;
pub mod storage;
pub mod utils;
