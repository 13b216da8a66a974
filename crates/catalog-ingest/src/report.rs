//! Per-file and per-run import counters.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::source::DecodeStats;

/// Outcome of importing one feed file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileReport {
    pub name: String,
    pub size_bytes: u64,

    pub lines_read: usize,
    pub records_decoded: usize,
    pub decode_failures: usize,

    /// Records inserted or updated.
    pub records_stored: usize,
    /// Of `records_stored`, how many were new.
    pub records_inserted: usize,
    /// Records rejected by validation or the store.
    pub records_failed: usize,
    pub batches: usize,

    /// Why the file counts as failed (download, open or read error).
    pub error: Option<String>,

    #[serde(skip)]
    pub duration: Duration,
}

impl FileReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// A file that never reached decoding.
    pub fn failed(name: impl Into<String>, error: impl ToString) -> Self {
        Self {
            name: name.into(),
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Copy the decoder's counters in. A read error fails the file.
    pub fn apply_decode_stats(&mut self, stats: &DecodeStats) {
        self.lines_read = stats.lines_read;
        self.records_decoded = stats.records_decoded;
        self.decode_failures = stats.decode_failures;
        if let Some(e) = &stats.read_error {
            self.error = Some(format!("read error after line {}: {}", stats.lines_read, e));
        }
    }
}

/// Counters for one run across every file of the manifest.
///
/// Counters only ever grow while a run is in progress.
#[derive(Debug, Clone, Serialize)]
pub struct ImportRunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    pub files_total: usize,
    pub files_succeeded: usize,
    pub files_failed: usize,

    pub lines_read: usize,
    pub records_decoded: usize,
    pub decode_failures: usize,
    pub records_stored: usize,
    pub records_inserted: usize,
    pub records_failed: usize,
    pub batches: usize,

    pub files: Vec<FileReport>,
}

impl ImportRunReport {
    pub fn new(files_total: usize) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            files_total,
            files_succeeded: 0,
            files_failed: 0,
            lines_read: 0,
            records_decoded: 0,
            decode_failures: 0,
            records_stored: 0,
            records_inserted: 0,
            records_failed: 0,
            batches: 0,
            files: Vec::new(),
        }
    }

    /// Merge one finished file into the run totals.
    pub fn record_file(&mut self, file: FileReport) {
        if file.succeeded() {
            self.files_succeeded += 1;
        } else {
            self.files_failed += 1;
        }

        self.lines_read += file.lines_read;
        self.records_decoded += file.records_decoded;
        self.decode_failures += file.decode_failures;
        self.records_stored += file.records_stored;
        self.records_inserted += file.records_inserted;
        self.records_failed += file.records_failed;
        self.batches += file.batches;

        self.files.push(file);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Files attempted so far.
    pub fn files_processed(&self) -> usize {
        self.files_succeeded + self.files_failed
    }

    pub fn has_failures(&self) -> bool {
        self.files_failed > 0 || self.decode_failures > 0 || self.records_failed > 0
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }

    /// One-line summary for logs, ending with the elapsed time once the run
    /// has finished.
    pub fn summary(&self) -> String {
        let counts = format!(
            "{}/{} files succeeded ({} failed), {} lines, {} records stored ({} new), {} records failed, {} decode failures",
            self.files_succeeded,
            self.files_total,
            self.files_failed,
            self.lines_read,
            self.records_stored,
            self.records_inserted,
            self.records_failed,
            self.decode_failures
        );
        match self.duration() {
            Some(elapsed) => {
                let secs = elapsed.num_milliseconds() as f64 / 1000.0;
                format!("{counts} in {secs:.2}s")
            }
            None => counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, stored: usize, failed: usize) -> FileReport {
        FileReport {
            name: name.to_string(),
            lines_read: stored + failed,
            records_decoded: stored + failed,
            records_stored: stored,
            records_inserted: stored,
            records_failed: failed,
            batches: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_record_file_accumulates() {
        let mut report = ImportRunReport::new(3);
        report.record_file(file("a.json", 10, 1));
        report.record_file(FileReport::failed("b.json", "timed out"));
        report.record_file(file("c.json", 5, 0));

        assert_eq!(report.files_succeeded, 2);
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.files_processed(), 3);
        assert_eq!(report.records_stored, 15);
        assert_eq!(report.records_failed, 1);
        assert_eq!(report.lines_read, 16);
        assert_eq!(report.batches, 2);
        assert_eq!(report.files.len(), 3);
        assert!(report.has_failures());
    }

    #[test]
    fn test_read_error_fails_file() {
        let mut report = FileReport::new("broken.json.gz");
        report.apply_decode_stats(&DecodeStats {
            lines_read: 120,
            records_decoded: 119,
            decode_failures: 1,
            read_error: Some("unexpected end of file".to_string()),
        });

        assert!(!report.succeeded());
        assert_eq!(report.records_decoded, 119);
        assert!(report.error.as_deref().unwrap().contains("line 120"));
    }

    #[test]
    fn test_clean_run_has_no_failures() {
        let mut report = ImportRunReport::new(1);
        report.record_file(file("a.json", 3, 0));
        report.finish();

        assert!(!report.has_failures());
        assert!(report.duration().is_some());
        assert!(report.summary().starts_with("1/1 files succeeded"));
    }

    #[test]
    fn test_summary_reports_elapsed_time() {
        let mut report = ImportRunReport::new(1);
        report.record_file(file("a.json", 3, 0));
        assert!(!report.summary().contains(" in "));

        report.finish();
        let finished_at = report.finished_at.unwrap();
        report.started_at = finished_at - chrono::Duration::milliseconds(1500);

        let summary = report.summary();
        assert!(summary.ends_with(" in 1.50s"), "{summary}");
    }

    #[test]
    fn test_report_serializes() {
        let mut report = ImportRunReport::new(1);
        report.record_file(FileReport::failed("a.json", "HTTP 404"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["files_failed"], 1);
        assert_eq!(json["files"][0]["error"], "HTTP 404");
    }
}
