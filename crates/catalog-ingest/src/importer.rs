//! Import orchestrator.
//!
//! Drives one run across every file listed in the manifest:
//!
//! ```text
//! Idle → ListingFiles → ProcessingFile(i) → Decoding → Batching → Storing → Indexing
//!                              ↑                                                │
//!                              └───────────────── next file ────────────────────┘
//!                                                                               ↓
//!                                                                   Reporting → Done
//! ```
//!
//! Only a bad configuration or an unreachable manifest aborts the run. A file
//! that cannot be downloaded, opened or fully read is counted as failed and
//! the run moves on to the next one. Files are processed strictly one after
//! another, and each downloaded file is deleted before the next one starts.

use std::time::Instant;

use serde::Serialize;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::config::ImportConfig;
use crate::fetch::{FeedFetcher, FetchConfig};
use crate::notify::{FailureNotification, NotificationSink};
use crate::pipeline::{ProductStore, accumulate};
use crate::report::{FileReport, ImportRunReport};
use crate::source::{NdjsonConfig, NdjsonRecords};
use crate::{Error, Result};
use catalog_core::DEFAULT_BATCH_SIZE;
use catalog_core::metrics::{increment, set_gauge};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    Idle,
    ListingFiles,
    /// Working on the given file (1-based position in the manifest).
    ProcessingFile(usize),
    Decoding,
    Batching,
    Storing,
    /// Stored batch handed to the search indexer.
    Indexing,
    Reporting,
    Done,
    Aborted,
}

/// Tuning knobs for a run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Records per batch.
    pub batch_size: usize,

    /// Progress reporting interval (lines).
    pub progress_interval: usize,

    /// HTTP client settings.
    pub fetch: FetchConfig,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: NdjsonConfig::default().progress_interval,
            fetch: FetchConfig::default(),
        }
    }
}

/// Runs the import pipeline.
pub struct Importer {
    config: ImportConfig,
    options: ImportOptions,
    store: ProductStore,
    sink: Box<dyn NotificationSink>,
    phase: ImportPhase,
}

impl Importer {
    pub fn new(
        config: ImportConfig,
        options: ImportOptions,
        store: ProductStore,
        sink: Box<dyn NotificationSink>,
    ) -> Self {
        Self {
            config,
            options,
            store,
            sink,
            phase: ImportPhase::Idle,
        }
    }

    pub fn phase(&self) -> ImportPhase {
        self.phase
    }

    pub fn store(&self) -> &ProductStore {
        &self.store
    }

    /// Import every file in the manifest.
    ///
    /// Returns the run report, or the error that aborted the run. An abort
    /// also sends a [`FailureNotification`] to the configured sink.
    pub async fn run(&mut self) -> Result<ImportRunReport> {
        set_gauge("import_running", 1.0);
        let result = self.run_inner().await;
        set_gauge("import_running", 0.0);

        if let Err(e) = &result {
            self.sink
                .notify(FailureNotification::new(e.to_string(), self.phase));
            self.set_phase(ImportPhase::Aborted);
        }

        result
    }

    async fn run_inner(&mut self) -> Result<ImportRunReport> {
        self.set_phase(ImportPhase::ListingFiles);

        let fetcher = FeedFetcher::new(self.options.fetch.clone())
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;

        std::fs::create_dir_all(&self.config.scratch_dir).map_err(|e| {
            Error::Config(format!(
                "cannot create scratch directory {}: {}",
                self.config.scratch_dir.display(),
                e
            ))
        })?;

        let files = fetcher.list_files(&self.config.manifest_url).await?;
        tracing::info!("Manifest lists {} files", files.len());

        let mut report = ImportRunReport::new(files.len());

        for (i, name) in files.iter().enumerate() {
            self.set_phase(ImportPhase::ProcessingFile(i + 1));
            tracing::info!("[{}/{}] Processing: {}", i + 1, files.len(), name);

            let started = Instant::now();
            let mut file_report = self.import_file(&fetcher, name).await;
            file_report.duration = started.elapsed();

            match &file_report.error {
                None => {
                    metrics::counter!("import_files_total", "result" => "success").increment(1);
                    tracing::info!(
                        "[{}/{}] Finished {}: {} lines, {} stored, {} failed, {} decode failures ({:.1}s)",
                        i + 1,
                        files.len(),
                        name,
                        file_report.lines_read,
                        file_report.records_stored,
                        file_report.records_failed,
                        file_report.decode_failures,
                        file_report.duration.as_secs_f64()
                    );
                }
                Some(e) => {
                    metrics::counter!("import_files_total", "result" => "failure").increment(1);
                    tracing::warn!("[{}/{}] Failed {}: {}", i + 1, files.len(), name, e);
                }
            }

            report.record_file(file_report);
        }

        self.set_phase(ImportPhase::Reporting);
        report.finish();
        tracing::info!("Import complete: {}", report.summary());

        self.set_phase(ImportPhase::Done);
        Ok(report)
    }

    /// Download, decode and store one file. Never fails: problems end up in
    /// the returned report.
    async fn import_file(&mut self, fetcher: &FeedFetcher, name: &str) -> FileReport {
        let downloaded = match fetcher
            .download_file(&self.config.base_url, name, &self.config.scratch_dir)
            .await
        {
            Ok(downloaded) => downloaded,
            Err(e) => return FileReport::failed(name, e),
        };

        let mut file_report = FileReport::new(name);
        file_report.size_bytes = downloaded.size_bytes;

        self.set_phase(ImportPhase::Decoding);
        let ndjson_config = NdjsonConfig {
            progress_interval: self.options.progress_interval.max(1),
        };
        // Owns the scratch file from here on; dropping it deletes the file.
        let mut records = match NdjsonRecords::open(&downloaded.path, ndjson_config) {
            Ok(records) => records,
            Err(e) => {
                file_report.error = Some(e.to_string());
                return file_report;
            }
        };

        // Decoding and SQLite writes block; keep them off the async workers.
        run_blocking(|| self.store_records(&mut records, name, &mut file_report));

        file_report.apply_decode_stats(records.stats());
        drop(records);

        increment("import_lines_total", file_report.lines_read as u64);
        increment("import_decode_failures_total", file_report.decode_failures as u64);

        file_report
    }

    /// Batch and store every record `records` yields.
    fn store_records(
        &mut self,
        records: &mut NdjsonRecords,
        name: &str,
        file_report: &mut FileReport,
    ) {
        self.set_phase(ImportPhase::Batching);
        for batch in accumulate(&mut *records, self.options.batch_size) {
            self.set_phase(ImportPhase::Storing);
            let batch_len = batch.len();
            let outcome = self.store.store_batch(batch);

            file_report.batches += 1;
            file_report.records_stored += outcome.stored.len();
            file_report.records_inserted += outcome.inserted;
            file_report.records_failed += outcome.failed;

            tracing::debug!(
                "{} batch {}: {}/{} stored ({} new), {} failed",
                name,
                file_report.batches,
                outcome.stored.len(),
                batch_len,
                outcome.inserted,
                outcome.failed
            );

            if self.store.has_subscriber() && !outcome.stored.is_empty() {
                self.set_phase(ImportPhase::Indexing);
            }
            self.set_phase(ImportPhase::Batching);
        }
    }

    fn set_phase(&mut self, phase: ImportPhase) {
        if self.phase != phase {
            tracing::trace!("Phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }
}

/// Run `f` on the current thread, telling a multi-threaded runtime to move
/// its other tasks elsewhere first.
fn run_blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}
