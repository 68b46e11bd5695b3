use tracing::{error, info};

use crate::catalog::Catalog;
use crate::model::{BatchReport, BatchStatus};

/// Per-phase result of reconciling one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub upserted: usize,
    pub deleted: usize,
    pub deprecated_marked: usize,
    pub upsert_failed: bool,
    pub delete_failed: bool,
    pub deprecate_failed: bool,
}

impl SyncOutcome {
    /// Failed if the upsert was rejected. Partial if the batch was cut short
    /// or a later phase failed.
    pub fn status(&self, aborted: bool) -> BatchStatus {
        if self.upsert_failed {
            BatchStatus::Failure
        } else if aborted || self.delete_failed || self.deprecate_failed {
            BatchStatus::Partial
        } else {
            BatchStatus::Success
        }
    }
}

/// Write one batch's results back to the catalog and queue.
///
/// Upsert, delete and deprecate are attempted independently. Queue rows are
/// deleted only for records the upsert confirmed.
pub fn sync_batch<C: Catalog + ?Sized>(catalog: &C, report: &BatchReport) -> SyncOutcome {
    let mut outcome = SyncOutcome::default();
    let batch = report.batch_num;

    let mut confirmed = Vec::new();
    if !report.records.is_empty() {
        match catalog.upsert(&report.records) {
            Ok(()) => {
                outcome.upserted = report.records.len();
                confirmed = report.records.iter().map(|r| r.movie_id.clone()).collect();
                info!("Batch {}: upserted {} movies", batch, outcome.upserted);
            }
            Err(e) => {
                outcome.upsert_failed = true;
                error!("Batch {}: error upserting movie data: {:#}", batch, e);
            }
        }
    }

    if !confirmed.is_empty() {
        match catalog.delete_entries(&confirmed) {
            Ok(()) => {
                outcome.deleted = confirmed.len();
                info!("Batch {}: deleted {} queue entries", batch, outcome.deleted);
            }
            Err(e) => {
                outcome.delete_failed = true;
                error!("Batch {}: error deleting movie urls: {:#}", batch, e);
            }
        }
    }

    if !report.deprecated.is_empty() {
        let ids: Vec<String> = report
            .deprecated
            .iter()
            .map(|e| e.movie_id.clone())
            .collect();
        match catalog.mark_deprecated(&ids) {
            Ok(()) => {
                outcome.deprecated_marked = ids.len();
                info!("Batch {}: marked {} urls deprecated", batch, ids.len());
            }
            Err(e) => {
                outcome.deprecate_failed = true;
                error!("Batch {}: error marking deprecated urls: {:#}", batch, e);
            }
        }
    }

    outcome
}
