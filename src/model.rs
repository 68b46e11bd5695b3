use std::fmt;

use serde::Serialize;

use crate::error::FailureReason;

/// A row of the URL queue awaiting harvest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub movie_id: String,
    pub url: String,
    pub is_deprecated: bool,
}

impl QueueEntry {
    pub fn new(movie_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            movie_id: movie_id.into(),
            url: url.into(),
            is_deprecated: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Tv,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Tv => "tv",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully parsed and encoded catalog row, keyed by `movie_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogRecord {
    pub movie_id: String,
    pub url: String,
    pub title: String,
    pub content_type: ContentType,
    pub release_year: i32,
    pub runtime_minutes: u32,
    pub rating: f64,
    pub rating_count: u64,
    pub genre_bitmask: u32,
    pub country_code: u8,
    pub poster_url: String,
}

/// Result of harvesting a single queue entry.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(CatalogRecord),
    Deprecated { movie_id: String, url: String },
    TransientFailure {
        movie_id: String,
        url: String,
        reason: FailureReason,
    },
    FatalConnectionFault { reason: String },
}

/// Everything one batch produced, before reconciliation.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub batch_num: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub deprecated: Vec<QueueEntry>,
    pub records: Vec<CatalogRecord>,
    /// Set when a connection fault cut the batch short.
    pub aborted: bool,
    /// Entries never attempted because of an abort. They stay queued.
    pub unattempted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Success,
    Partial,
    Failure,
}

/// Aggregate accounting for one harvest run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub success_batches: usize,
    pub partial_batches: usize,
    pub failure_batches: usize,
    pub records_written: usize,
    pub deprecated_marked: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub deprecated_found: usize,
}

impl RunReport {
    pub fn record_batch(&mut self, batch: &BatchReport) {
        self.attempted += batch.attempted;
        self.succeeded += batch.succeeded;
        self.failed += batch.failed;
        self.deprecated_found += batch.deprecated.len();
    }

    pub fn record_status(&mut self, status: BatchStatus) {
        match status {
            BatchStatus::Success => self.success_batches += 1,
            BatchStatus::Partial => self.partial_batches += 1,
            BatchStatus::Failure => self.failure_batches += 1,
        }
    }
}
