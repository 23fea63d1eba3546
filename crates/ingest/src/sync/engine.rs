//! The resumable pull loop
//!
//! A [`SyncEngine`] drives one [`Resource`] from its first page (or its resume
//! watermark) until the cursor is exhausted, the item limit is reached or an
//! interrupt arrives. Items are processed strictly in the order they are
//! returned, one at a time.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use super::interrupt::InterruptController;
use super::limiter::RateLimiter;
use super::progress::ProgressTracker;
use super::timing::format_duration;
use crate::config::SyncConfig;
use crate::error::{StoreError, SyncError};
use crate::models::{Batch, Checkpoint, PageRequest};
use crate::storage::{CheckpointStore, CheckpointTracker, FailedRecordTracker};

/// A remote collection synced item by item into a local store
pub trait Resource {
    /// Item type as returned by the remote side
    type Raw;
    /// Item type handed to [`Resource::store_item`]
    type Item;

    /// Fetch one page
    ///
    /// Any error is fatal for the run.
    fn fetch_batch(
        &self,
        request: &PageRequest,
    ) -> impl Future<Output = anyhow::Result<Batch<Self::Raw>>>;

    /// Convert a page of raw items into storable items, preserving order
    fn extract_items(&self, raw: Vec<Self::Raw>) -> Vec<Self::Item>;

    /// Store one item; must be idempotent under re-delivery
    fn store_item(&self, item: &Self::Item) -> Result<(), StoreError>;

    /// Identifier used when recording a failed item
    fn item_id(&self, item: &Self::Item) -> String;

    /// Date used to advance the checkpoint after `item` was stored
    fn watermark(&self, _item: &Self::Item) -> Option<DateTime<Utc>> {
        None
    }
}

/// Why a run stopped without a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The cursor was exhausted; the checkpoint was deleted
    Completed,
    /// The item limit was reached; the checkpoint was kept
    LimitReached,
    /// A termination signal arrived; the checkpoint was kept
    Interrupted,
}

impl SyncOutcome {
    /// Whether a checkpoint is left behind to resume from
    pub fn is_partial(&self) -> bool {
        !matches!(self, SyncOutcome::Completed)
    }
}

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// Items the loop attempted to store
    pub processed: usize,
    /// Items received from the remote side
    pub fetched: usize,
    pub transient_failures: usize,
    pub permanent_failures: usize,
    pub elapsed: Duration,
    /// Processed items per second
    pub rate: f64,
    /// Failed-records file, if this run appended to it
    pub failed_records_path: Option<PathBuf>,
    /// Checkpoint left behind, if any
    pub checkpoint: Option<Checkpoint>,
}

#[derive(Debug, Default)]
struct FailureCounts {
    transient: usize,
    permanent: usize,
}

/// Per-run state shared by the loop
struct Run<'a> {
    checkpoint: &'a CheckpointTracker,
    failed: &'a FailedRecordTracker,
    limiter: Option<&'a RateLimiter>,
    progress: &'a mut ProgressTracker,
    failures: &'a mut FailureCounts,
    cancel: CancellationToken,
}

/// Drives a single [`Resource`] to completion, limit or interruption
pub struct SyncEngine<R> {
    resource: R,
    config: SyncConfig,
    interrupt: InterruptController,
}

impl<R: Resource> SyncEngine<R> {
    pub fn new(resource: R, config: SyncConfig) -> Result<Self, SyncError> {
        Self::with_interrupt_controller(resource, config, InterruptController::new())
    }

    /// Create an engine that reacts to an existing controller
    pub fn with_interrupt_controller(
        resource: R,
        config: SyncConfig,
        interrupt: InterruptController,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        Ok(Self {
            resource,
            config,
            interrupt,
        })
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn interrupt_controller(&self) -> &InterruptController {
        &self.interrupt
    }

    /// Run the sync loop
    ///
    /// Returns `Err` only for fatal errors: a failed fetch, or checkpoint and
    /// failed-record files that cannot be read or written.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let name = self.config.resource_name.as_str();
        let checkpoint = CheckpointTracker::new(
            CheckpointStore::new(&self.config.checkpoint_dir),
            name,
        );
        let failed = FailedRecordTracker::new(&self.config.failed_dir, name);
        let limiter = self.config.rate_limit.map(RateLimiter::from_rate);
        let mut progress = ProgressTracker::new(self.config.limit);
        let mut failures = FailureCounts::default();

        let since = if self.config.resume {
            checkpoint.load()?.map(|c| c.last_watermark)
        } else {
            None
        };

        match since {
            Some(since) => info!(
                "Syncing {} updated since {}",
                name,
                since.format("%Y-%m-%d %H:%M:%S")
            ),
            None => info!("Syncing {} from the beginning", name),
        }

        let saver = checkpoint.clone();
        let resource_name = name.to_string();
        let callbacks = self.interrupt.push_callbacks(
            move || saver.save_or_log(),
            move || warn!("Exiting without finishing {}", resource_name),
        );
        let started_listener = self.config.listen_for_signals && self.interrupt.listen();

        let result = {
            let mut run = Run {
                checkpoint: &checkpoint,
                failed: &failed,
                limiter: limiter.as_ref(),
                progress: &mut progress,
                failures: &mut failures,
                cancel: self.interrupt.cancellation_token(),
            };
            self.sync_loop(&mut run, PageRequest::first(since)).await
        };
        self.interrupt.remove_callbacks(callbacks);
        if started_listener {
            self.interrupt.stop_listening();
        }

        let flushed = failed.flush();
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                match flushed {
                    Ok(Some(path)) => announce_failed(failures.transient, &path),
                    Ok(None) => {}
                    Err(flush_error) => warn!("{}", flush_error),
                }
                return Err(e);
            }
        };
        let failed_records_path = flushed?;

        let saved = match outcome {
            SyncOutcome::Completed => {
                checkpoint.delete()?;
                None
            }
            SyncOutcome::LimitReached | SyncOutcome::Interrupted => checkpoint.save()?,
        };

        let (elapsed, rate) = progress.stats();
        let report = SyncReport {
            outcome,
            processed: progress.processed(),
            fetched: progress.fetched(),
            transient_failures: failures.transient,
            permanent_failures: failures.permanent,
            elapsed,
            rate,
            failed_records_path,
            checkpoint: saved,
        };

        self.log_summary(&report);
        Ok(report)
    }

    async fn sync_loop(
        &self,
        run: &mut Run<'_>,
        mut request: PageRequest,
    ) -> Result<SyncOutcome, SyncError> {
        let name = self.config.resource_name.as_str();

        loop {
            if let Some(outcome) = self.should_stop(run.progress) {
                return Ok(outcome);
            }

            if let Some(limiter) = run.limiter {
                if limiter.admit(&run.cancel).await.is_err() {
                    return Ok(SyncOutcome::Interrupted);
                }
            }

            let batch = tokio::select! {
                biased;
                _ = run.cancel.cancelled() => return Ok(SyncOutcome::Interrupted),
                batch = self.resource.fetch_batch(&request) => batch.map_err(SyncError::Fetch)?,
            };

            if batch.is_empty() {
                return Ok(SyncOutcome::Completed);
            }

            let Batch {
                items,
                next_cursor,
                total_available,
            } = batch;

            run.progress.add_fetched(items.len());
            run.progress
                .report(name, run.progress.fetched(), total_available);

            for item in self.resource.extract_items(items) {
                if self.store(&item, run) {
                    if let Some(date) = self.resource.watermark(&item) {
                        run.checkpoint.advance(date);
                    }
                }
                run.progress.increment();

                if let Some(outcome) = self.should_stop(run.progress) {
                    return Ok(outcome);
                }
            }

            if next_cursor.is_empty() {
                return Ok(SyncOutcome::Completed);
            }
            request = request.next(next_cursor);
        }
    }

    /// Store one item; returns true on success
    fn store(&self, item: &R::Item, run: &mut Run<'_>) -> bool {
        let error = match self.resource.store_item(item) {
            Ok(()) => return true,
            Err(e) => e,
        };

        let id = self.resource.item_id(item);
        if run.failed.record(&id, &error) {
            run.failures.transient += 1;
            warn!(
                "Failed to store {} {} (recorded for retry): {}",
                self.config.resource_name, id, error
            );
        } else {
            run.failures.permanent += 1;
            warn!(
                "Failed to store {} {}, skipping: {}",
                self.config.resource_name, id, error
            );
        }
        false
    }

    fn should_stop(&self, progress: &ProgressTracker) -> Option<SyncOutcome> {
        if self.interrupt.stop_requested() {
            Some(SyncOutcome::Interrupted)
        } else if progress.limit_reached() {
            Some(SyncOutcome::LimitReached)
        } else {
            None
        }
    }

    fn log_summary(&self, report: &SyncReport) {
        let name = &self.config.resource_name;
        let verb = match report.outcome {
            SyncOutcome::Completed => "Synced",
            SyncOutcome::LimitReached => "Stopped at limit after",
            SyncOutcome::Interrupted => "Interrupted after",
        };
        info!(
            "{} {} {} in {} ({:.1}/sec)",
            verb,
            report.processed,
            name,
            format_duration(report.elapsed),
            report.rate
        );

        if report.permanent_failures > 0 {
            warn!(
                "{} {} items could not be stored and were skipped",
                report.permanent_failures, name
            );
        }
        if let Some(path) = &report.failed_records_path {
            announce_failed(report.transient_failures, path);
        }
        if report.outcome.is_partial() {
            info!("Run again with --resume to continue {}", name);
        }
    }
}

fn announce_failed(count: usize, path: &std::path::Path) {
    warn!(
        "{} items failed transiently and were recorded in {}",
        count,
        path.display()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::load_failed_records;
    use crate::sync::Signal;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Pages of (id, day) pairs, with an optional failing id set
    struct Pages {
        pages: Vec<Vec<(&'static str, u32)>>,
        stored: Mutex<Vec<String>>,
        requests: Mutex<Vec<PageRequest>>,
        locked: Vec<&'static str>,
        broken: Vec<&'static str>,
    }

    impl Pages {
        fn new(pages: Vec<Vec<(&'static str, u32)>>) -> Self {
            Self {
                pages,
                stored: Mutex::new(Vec::new()),
                requests: Mutex::new(Vec::new()),
                locked: Vec::new(),
                broken: Vec::new(),
            }
        }

        fn total(&self) -> usize {
            self.pages.iter().map(Vec::len).sum()
        }
    }

    impl Resource for Pages {
        type Raw = (&'static str, u32);
        type Item = (String, DateTime<Utc>);

        async fn fetch_batch(&self, request: &PageRequest) -> anyhow::Result<Batch<Self::Raw>> {
            self.requests.lock().push(request.clone());
            let index: usize = match &request.cursor {
                Some(cursor) => cursor.parse()?,
                None => 0,
            };
            let items = self.pages.get(index).cloned().unwrap_or_default();
            let next = if index + 1 < self.pages.len() {
                (index + 1).to_string()
            } else {
                String::new()
            };
            Ok(Batch::new(items, next, self.total()))
        }

        fn extract_items(&self, raw: Vec<Self::Raw>) -> Vec<Self::Item> {
            raw.into_iter()
                .map(|(id, day)| {
                    let date = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
                    (id.to_string(), date)
                })
                .collect()
        }

        fn store_item(&self, item: &Self::Item) -> Result<(), StoreError> {
            if self.locked.contains(&item.0.as_str()) {
                return Err(StoreError::new("upsert", "database is locked"));
            }
            if self.broken.contains(&item.0.as_str()) {
                return Err(StoreError::new("upsert", "NOT NULL constraint failed"));
            }
            self.stored.lock().push(item.0.clone());
            Ok(())
        }

        fn item_id(&self, item: &Self::Item) -> String {
            item.0.clone()
        }

        fn watermark(&self, item: &Self::Item) -> Option<DateTime<Utc>> {
            Some(item.1)
        }
    }

    /// A resource whose first fetch never returns
    #[derive(Default)]
    struct Stalled {
        stored: AtomicUsize,
    }

    impl Resource for Stalled {
        type Raw = ();
        type Item = ();

        async fn fetch_batch(&self, _request: &PageRequest) -> anyhow::Result<Batch<()>> {
            std::future::pending().await
        }

        fn extract_items(&self, raw: Vec<()>) -> Vec<()> {
            raw
        }

        fn store_item(&self, _item: &()) -> Result<(), StoreError> {
            self.stored.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn item_id(&self, _item: &()) -> String {
            String::new()
        }
    }

    fn config(dir: &TempDir, limit: usize) -> SyncConfig {
        SyncConfig::new("pages")
            .with_rate_limit(None)
            .with_limit(limit)
            .with_checkpoint_dir(dir.path().join("checkpoints"))
            .with_failed_dir(dir.path().join("failed"))
            .with_signal_handling(false)
    }

    #[tokio::test]
    async fn test_completes_all_pages() {
        let dir = TempDir::new().unwrap();
        let pages = Pages::new(vec![vec![("a", 1), ("b", 2)], vec![("c", 3)]]);
        let engine = SyncEngine::new(pages, config(&dir, 0)).unwrap();

        let report = engine.run().await.unwrap();
        assert_eq!(report.outcome, SyncOutcome::Completed);
        assert_eq!(report.processed, 3);
        assert_eq!(report.fetched, 3);
        assert!(report.checkpoint.is_none());
        assert_eq!(*engine.resource().stored.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let dir = TempDir::new().unwrap();
        let mut pages = Pages::new(vec![vec![("a", 1), ("b", 2), ("c", 3), ("d", 4)]]);
        pages.locked = vec!["a"];
        pages.broken = vec!["c"];
        let engine = SyncEngine::new(pages, config(&dir, 0)).unwrap();

        let report = engine.run().await.unwrap();
        assert_eq!(report.outcome, SyncOutcome::Completed);
        assert_eq!(report.processed, 4);
        assert_eq!(report.transient_failures, 1);
        assert_eq!(report.permanent_failures, 1);
        assert_eq!(*engine.resource().stored.lock(), vec!["b", "d"]);

        let recorded = load_failed_records(dir.path().join("failed"), "pages").unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].id, "a");
    }

    #[tokio::test]
    async fn test_failed_items_do_not_advance_watermark() {
        let dir = TempDir::new().unwrap();
        let mut pages = Pages::new(vec![vec![("a", 1), ("b", 9)], vec![("c", 2)]]);
        pages.broken = vec!["b"];
        let engine = SyncEngine::new(pages, config(&dir, 2)).unwrap();

        let report = engine.run().await.unwrap();
        assert_eq!(report.outcome, SyncOutcome::LimitReached);
        let checkpoint = report.checkpoint.unwrap();
        assert_eq!(checkpoint.last_watermark.format("%d").to_string(), "01");
    }

    #[tokio::test]
    async fn test_interrupt_before_start() {
        let dir = TempDir::new().unwrap();
        let pages = Pages::new(vec![vec![("a", 1)]]);
        let engine = SyncEngine::new(pages, config(&dir, 0)).unwrap();
        engine.interrupt_controller().on_signal(Signal::Interrupt);

        let report = engine.run().await.unwrap();
        assert_eq!(report.outcome, SyncOutcome::Interrupted);
        assert_eq!(report.processed, 0);
        assert!(engine.resource().requests.lock().is_empty());
        // Nothing observed, nothing to save
        assert!(report.checkpoint.is_none());
    }

    #[tokio::test]
    async fn test_resume_passes_watermark() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoints"));
        let since = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        store.save("pages", since).unwrap();

        let pages = Pages::new(vec![vec![("a", 6)], vec![("b", 7)]]);
        let engine = SyncEngine::new(pages, config(&dir, 0).with_resume(true)).unwrap();
        engine.run().await.unwrap();

        let requests = engine.resource().requests.lock();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.since == Some(since)));
        assert_eq!(requests[1].cursor.as_deref(), Some("1"));
        assert!(store.load("pages").unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_cancels_pending_fetch() {
        let dir = TempDir::new().unwrap();
        let engine = SyncEngine::new(Stalled::default(), config(&dir, 0)).unwrap();
        let controller = engine.interrupt_controller().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            controller.on_signal(Signal::Interrupt);
        });

        let report = engine.run().await.unwrap();
        assert_eq!(report.outcome, SyncOutcome::Interrupted);
        assert_eq!(report.processed, 0);
        assert_eq!(engine.resource().stored.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shared_controller_outlives_run() {
        let dir = TempDir::new().unwrap();
        let controller = InterruptController::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        controller.arm(
            move || {
                f.fetch_add(1, Ordering::SeqCst);
            },
            || {},
        );

        let pages = Pages::new(vec![vec![("a", 1)]]);
        let engine =
            SyncEngine::with_interrupt_controller(pages, config(&dir, 0), controller.clone())
                .unwrap();
        let report = engine.run().await.unwrap();
        assert_eq!(report.outcome, SyncOutcome::Completed);

        // The caller's listener and callbacks survive the run
        assert!(controller.is_listening());
        controller.on_signal(Signal::Interrupt);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        controller.disarm();
    }

    #[tokio::test]
    async fn test_own_listener_stops_after_run() {
        let dir = TempDir::new().unwrap();
        let pages = Pages::new(vec![vec![("a", 1)]]);
        let engine = SyncEngine::new(pages, config(&dir, 0).with_signal_handling(true)).unwrap();

        engine.run().await.unwrap();
        assert!(!engine.interrupt_controller().is_listening());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let pages = Pages::new(Vec::new());
        let result = SyncEngine::new(pages, SyncConfig::new(""));
        assert!(matches!(result, Err(SyncError::Config(_))));
    }
}
