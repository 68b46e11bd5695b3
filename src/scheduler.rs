use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::config::HarvestConfig;
use crate::encode::genre_names;
use crate::fetch::PageFetcher;
use crate::model::{BatchReport, BatchStatus, FetchOutcome, QueueEntry};
use crate::progress::{ItemStatus, Progress};
use crate::sync::{sync_batch, SyncOutcome};

/// A numbered slice of the candidate list. Numbers start at 1 and run across the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub num: usize,
    pub entries: Vec<QueueEntry>,
}

/// Split candidates into consecutive batches of at most `batch_size`.
pub fn partition(entries: &[QueueEntry], batch_size: usize) -> Vec<Batch> {
    entries
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(i, chunk)| Batch {
            num: i + 1,
            entries: chunk.to_vec(),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub report: BatchReport,
    /// `None` when results were not persisted.
    pub sync: Option<SyncOutcome>,
}

impl BatchResult {
    pub fn status(&self) -> BatchStatus {
        match &self.sync {
            Some(sync) => sync.status(self.report.aborted),
            None if self.report.aborted => BatchStatus::Partial,
            None => BatchStatus::Success,
        }
    }
}

pub struct Scheduler<'a> {
    config: &'a HarvestConfig,
    progress: &'a Progress,
    show_objects: bool,
    total_batches: usize,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        config: &'a HarvestConfig,
        progress: &'a Progress,
        show_objects: bool,
        total_batches: usize,
    ) -> Self {
        Self {
            config,
            progress,
            show_objects,
            total_batches,
        }
    }

    /// Run every batch of one session window concurrently on the current task.
    /// Each batch is reconciled through `sink` as soon as it finishes.
    pub async fn run_window<F, C>(
        &self,
        fetcher: &F,
        batches: &[Batch],
        sink: Option<&C>,
    ) -> Vec<BatchResult>
    where
        F: PageFetcher,
        C: Catalog + ?Sized,
    {
        let runs = batches.iter().map(|batch| async move {
            let report = self.run_batch(fetcher, batch).await;
            let sync = sink.map(|catalog| sync_batch(catalog, &report));
            BatchResult { report, sync }
        });
        join_all(runs).await
    }

    /// Fetch a batch one item at a time. A connection fault ends the batch;
    /// whatever was gathered before it is still returned.
    pub async fn run_batch<F: PageFetcher>(&self, fetcher: &F, batch: &Batch) -> BatchReport {
        let total = batch.entries.len();
        let bar = self.progress.batch(batch.num, self.total_batches, total);
        let mut report = BatchReport {
            batch_num: batch.num,
            ..BatchReport::default()
        };

        for (i, entry) in batch.entries.iter().enumerate() {
            if !self.config.request_delay.is_zero() {
                tokio::time::sleep(self.config.request_delay).await;
            }

            let started = Instant::now();
            let outcome = fetcher.fetch(entry).await;
            let latency = started.elapsed();
            report.attempted += 1;

            match outcome {
                FetchOutcome::Success(record) => {
                    report.succeeded += 1;
                    bar.item(i + 1, ItemStatus::Ok, &record.title, latency);
                    if self.show_objects {
                        match serde_json::to_string_pretty(&record) {
                            Ok(json) => self.progress.println(format!(
                                "{json}\n    genres: {}",
                                genre_names(record.genre_bitmask).join(", ")
                            )),
                            Err(e) => warn!("Could not render {}: {}", record.movie_id, e),
                        }
                    }
                    report.records.push(record);
                }
                FetchOutcome::Deprecated { movie_id, url } => {
                    bar.item(i + 1, ItemStatus::Deprecated, &movie_id, latency);
                    report.deprecated.push(QueueEntry::new(movie_id, url));
                }
                FetchOutcome::TransientFailure {
                    movie_id, reason, ..
                } => {
                    report.failed += 1;
                    bar.item(i + 1, ItemStatus::Failed, &movie_id, latency);
                    debug!("Batch {}: {} failed: {}", batch.num, movie_id, reason);
                }
                FetchOutcome::FatalConnectionFault { reason } => {
                    report.failed += 1;
                    report.aborted = true;
                    report.unattempted = total - (i + 1);
                    bar.item(i + 1, ItemStatus::Fatal, &entry.movie_id, latency);
                    bar.note(format!("Connection error: {reason}"));
                    warn!(
                        "Batch {} aborted after connection fault, {} entries left queued",
                        batch.num, report.unattempted
                    );
                    break;
                }
            }
        }

        bar.finish(&report);
        report
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::catalog::memory::MemoryStore;
    use crate::testing::ScriptedFetcher;

    fn config() -> HarvestConfig {
        HarvestConfig {
            request_delay: Duration::ZERO,
            ..HarvestConfig::default()
        }
    }

    fn entries(ids: &[&str]) -> Vec<QueueEntry> {
        ids.iter()
            .map(|id| QueueEntry::new(*id, format!("/film/{id}/")))
            .collect()
    }

    #[test]
    fn partition_keeps_order_and_numbers_batches() {
        let batches = partition(&entries(&["1", "2", "3", "4", "5"]), 2);
        let sizes: Vec<usize> = batches.iter().map(|b| b.entries.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(batches[2].num, 3);
        assert_eq!(batches[2].entries[0].movie_id, "5");
        assert!(partition(&[], 500).is_empty());
    }

    #[tokio::test]
    async fn all_successful_batch() {
        let config = config();
        let progress = Progress::hidden();
        let scheduler = Scheduler::new(&config, &progress, false, 1);
        let batch = Batch {
            num: 1,
            entries: entries(&["1", "2", "3"]),
        };

        let report = scheduler.run_batch(&ScriptedFetcher::new(), &batch).await;
        assert_eq!(report.succeeded, report.attempted);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.failed, 0);
        assert!(!report.aborted);
    }

    #[tokio::test]
    async fn connection_fault_stops_the_batch() {
        let config = config();
        let progress = Progress::hidden();
        let scheduler = Scheduler::new(&config, &progress, false, 1);
        let queued = entries(&["1", "2", "3", "4", "5"]);
        let store = MemoryStore::with_queue(
            &queued
                .iter()
                .map(|e| (e.movie_id.as_str(), e.url.as_str()))
                .collect::<Vec<_>>(),
        );
        let fetcher = ScriptedFetcher::new().fatal("/film/2/");
        let batch = Batch {
            num: 1,
            entries: queued,
        };

        let results = scheduler
            .run_window(&fetcher, std::slice::from_ref(&batch), Some(&store))
            .await;
        let result = &results[0];

        assert_eq!(fetcher.called(), vec!["/film/1/", "/film/2/"]);
        assert!(result.report.aborted);
        assert_eq!(result.report.unattempted, 3);
        assert_eq!(result.status(), BatchStatus::Partial);

        assert!(store.entry("1").is_none());
        assert!(store.catalog.borrow().contains_key("1"));
        for id in ["2", "3", "4", "5"] {
            let entry = store.entry(id).unwrap();
            assert!(!entry.is_deprecated, "{id}");
        }
    }

    #[tokio::test]
    async fn window_batches_interleave_and_stay_independent() {
        let config = config();
        let progress = Progress::hidden();
        let scheduler = Scheduler::new(&config, &progress, false, 2);
        let batches = partition(&entries(&["1", "2", "3", "4"]), 2);
        let fetcher = ScriptedFetcher::new().fatal("/film/1/");

        let results = scheduler
            .run_window::<_, MemoryStore>(&fetcher, &batches, None)
            .await;

        assert_eq!(&fetcher.called()[..2], &["/film/1/", "/film/3/"]);
        assert!(results[0].report.aborted);
        assert_eq!(results[0].status(), BatchStatus::Partial);
        assert_eq!(results[1].report.succeeded, 2);
        assert_eq!(results[1].status(), BatchStatus::Success);
        assert!(results.iter().all(|r| r.sync.is_none()));
    }

    #[tokio::test]
    async fn outcomes_are_sorted_into_the_report() {
        let config = config();
        let progress = Progress::hidden();
        let scheduler = Scheduler::new(&config, &progress, true, 1);
        let queued = entries(&["1", "2", "3"]);
        let fetcher = ScriptedFetcher::new()
            .deprecated(&queued[1])
            .failing(&queued[2]);
        let batch = Batch {
            num: 1,
            entries: queued,
        };

        let report = scheduler.run_batch(&fetcher, &batch).await;
        assert_eq!((report.attempted, report.succeeded, report.failed), (3, 1, 1));
        assert_eq!(report.records[0].movie_id, "1");
        assert_eq!(report.deprecated, vec![QueueEntry::new("2", "/film/2/")]);
    }
}
