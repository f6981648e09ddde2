//! Upstream source adapters.
//!
//! Every adapter reduces its upstream format to [`NormalizedRecord`] before
//! anything reaches the record processor. Two shapes exist:
//!
//! - per-case pulls (`fetch_movements`), e.g. the DataJud search API
//! - daily bundles (`fetch_daily_bundle` + `parse_bundle`), e.g. the DJEN gazette
//!
//! Operations an adapter does not offer fail with
//! [`AppError::UnsupportedSource`].

pub mod datajud;
pub mod djen;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{AppError, Result};
use crate::models::{NormalizedRecord, SourceTag};
use crate::services::CaseNumber;

pub use datajud::DatajudAdapter;
pub use djen::DjenAdapter;

/// A fetcher for one upstream source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn tag(&self) -> SourceTag;

    /// Movements of one case in the given source partition.
    ///
    /// `since == None` requests the full history.
    async fn fetch_movements(
        &self,
        case: &CaseNumber,
        index: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<NormalizedRecord>> {
        let _ = (case, index, since);
        Err(AppError::unsupported(self.tag(), "per-case movements"))
    }

    /// Raw daily bundle, `None` when nothing was published that day.
    async fn fetch_daily_bundle(&self, date: NaiveDate) -> Result<Option<Vec<u8>>> {
        let _ = date;
        Err(AppError::unsupported(self.tag(), "daily bundles"))
    }

    /// Records of a bundle concerning one of `identifiers` (digits only).
    fn parse_bundle(
        &self,
        bytes: &[u8],
        identifiers: &HashSet<String>,
    ) -> Result<Vec<NormalizedRecord>> {
        let _ = (bytes, identifiers);
        Err(AppError::unsupported(self.tag(), "daily bundles"))
    }
}
