//! Newline-delimited JSON product file reader.
//!
//! Reads a downloaded feed file (plain or `.gz`) one line at a time and
//! yields each line that decodes to a product record. Lines that do not are
//! logged, counted, and skipped.
//!
//! The reader owns the file for its whole life: dropping it closes the handle
//! and deletes the file from scratch storage, whether the lines were all
//! consumed, iteration stopped early, or a read failed midway.

use super::DecodeStats;
use crate::{Error, Result};
use catalog_core::{RawProduct, parse_record};
use flate2::read::MultiGzDecoder;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, ErrorKind};
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Configuration for the NDJSON reader.
#[derive(Debug, Clone)]
pub struct NdjsonConfig {
    /// Progress reporting interval (lines).
    pub progress_interval: usize,
}

impl Default for NdjsonConfig {
    fn default() -> Self {
        Self {
            progress_interval: 100_000,
        }
    }
}

/// A file in scratch storage that is deleted when this guard drops.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Take ownership of `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed scratch file {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove scratch file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Lazy sequence of product records decoded from one feed file.
pub struct NdjsonRecords {
    // Field order matters: the reader (and its file handle) drops before
    // the scratch guard deletes the file.
    reader: Box<dyn BufRead + Send>,
    line: Vec<u8>,
    stats: DecodeStats,
    finished: bool,
    config: NdjsonConfig,
    scratch: ScratchFile,
}

impl NdjsonRecords {
    /// Open `path` for decoding.
    ///
    /// A `.gz` extension selects transparent gzip decompression. The file is
    /// deleted when the returned reader drops; if opening fails it is deleted
    /// right away.
    pub fn open(path: impl Into<PathBuf>, config: NdjsonConfig) -> Result<Self> {
        let scratch = ScratchFile::new(path);

        let file = File::open(scratch.path()).map_err(|e| {
            Error::Decode(format!("cannot open {}: {}", scratch.path().display(), e))
        })?;

        let reader: Box<dyn BufRead + Send> = if is_gzip(scratch.path()) {
            tracing::debug!("Reading gzip-compressed file {}", scratch.path().display());
            Box::new(BufReader::with_capacity(
                READ_BUFFER_SIZE,
                MultiGzDecoder::new(file),
            ))
        } else {
            Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file))
        };

        Ok(Self {
            reader,
            line: Vec::with_capacity(4096),
            stats: DecodeStats::default(),
            finished: false,
            config,
            scratch,
        })
    }

    /// Counters for the lines read so far.
    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    /// Path of the file being decoded.
    pub fn path(&self) -> &Path {
        self.scratch.path()
    }
}

impl Iterator for NdjsonRecords {
    type Item = RawProduct;

    fn next(&mut self) -> Option<RawProduct> {
        while !self.finished {
            self.line.clear();

            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => self.finished = true,
                Ok(_) => {
                    self.stats.lines_read += 1;
                    let line_number = self.stats.lines_read;

                    if line_number.is_multiple_of(self.config.progress_interval) {
                        tracing::info!(
                            "Progress: {} lines, {} records, {} failures",
                            line_number,
                            self.stats.records_decoded,
                            self.stats.decode_failures
                        );
                    }

                    match parse_record(&self.line) {
                        Ok(Some(record)) => {
                            self.stats.records_decoded += 1;
                            return Some(record);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!("Line {}: {}", line_number, e);
                            self.stats.decode_failures += 1;
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!(
                        "Read error in {} after line {}: {}",
                        self.scratch.path().display(),
                        self.stats.lines_read,
                        e
                    );
                    self.stats.decode_failures += 1;
                    self.stats.read_error = Some(e.to_string());
                    self.finished = true;
                }
            }
        }

        None
    }
}

impl FusedIterator for NdjsonRecords {}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::decode;
    use crate::test_support::{gzip, product_lines};
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_decode_plain_file() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "products.json", product_lines(1, 5).as_bytes());

        let mut records = decode(&path).unwrap();
        let decoded: Vec<_> = records.by_ref().collect();

        assert_eq!(decoded.len(), 5);
        assert_eq!(decoded[0].normalized_code().unwrap(), 1);
        assert_eq!(decoded[4].normalized_code().unwrap(), 5);
        assert_eq!(records.stats().lines_read, 5);
        assert_eq!(records.stats().records_decoded, 5);
        assert_eq!(records.stats().decode_failures, 0);
    }

    #[test]
    fn test_decode_gzip_file() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "products.json.gz", &gzip(product_lines(10, 3).as_bytes()));

        let codes: Vec<i64> = decode(&path)
            .unwrap()
            .map(|r| r.normalized_code().unwrap())
            .collect();

        assert_eq!(codes, vec![10, 11, 12]);
    }

    #[test]
    fn test_decode_concatenated_gzip_members() {
        let tmp = TempDir::new().unwrap();
        let mut contents = gzip(product_lines(1, 2).as_bytes());
        contents.extend(gzip(product_lines(3, 2).as_bytes()));
        let path = write_file(&tmp, "multi.json.gz", &contents);

        assert_eq!(decode(&path).unwrap().count(), 4);
    }

    #[test]
    fn test_malformed_line_is_counted_and_skipped() {
        let tmp = TempDir::new().unwrap();
        let mut contents = product_lines(1, 3);
        contents.push_str("{\"code\": \"4\", broken\n");
        contents.push_str(&product_lines(5, 2));
        let path = write_file(&tmp, "products.json", contents.as_bytes());

        let mut records = decode(&path).unwrap();
        assert_eq!(records.by_ref().count(), 5);
        assert_eq!(records.stats().lines_read, 6);
        assert_eq!(records.stats().decode_failures, 1);
        assert!(records.stats().read_error.is_none());
    }

    #[test]
    fn test_blank_and_falsy_lines() {
        let tmp = TempDir::new().unwrap();
        let contents = "\n{\"code\":\"1\"}\n   \nnull\n{}\n[]\n\"\"\n{\"code\":\"2\"}";
        let path = write_file(&tmp, "products.json", contents.as_bytes());

        let mut records = decode(&path).unwrap();
        assert_eq!(records.by_ref().count(), 2);

        let stats = records.stats();
        assert_eq!(stats.lines_read, 8);
        assert_eq!(stats.records_decoded, 2);
        // Blank lines are not failures; null, {}, [] and "" are.
        assert_eq!(stats.decode_failures, 4);
    }

    #[test]
    fn test_file_deleted_after_full_consumption() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "products.json", product_lines(1, 2).as_bytes());

        let records = decode(&path).unwrap();
        assert_eq!(records.count(), 2);

        assert!(!path.exists());
    }

    #[test]
    fn test_decode_not_restartable() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "products.json", product_lines(1, 2).as_bytes());

        assert_eq!(decode(&path).unwrap().count(), 2);

        let err = decode(&path).err().unwrap();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_file_deleted_on_early_drop() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(&tmp, "products.json", product_lines(1, 10).as_bytes());

        let mut records = decode(&path).unwrap();
        assert!(records.next().is_some());
        assert!(path.exists());
        drop(records);

        assert!(!path.exists());
    }

    #[test]
    fn test_truncated_gzip_records_read_error() {
        let tmp = TempDir::new().unwrap();
        let full = gzip(product_lines(1, 200).as_bytes());
        let path = write_file(&tmp, "broken.json.gz", &full[..full.len() / 2]);

        let mut records = decode(&path).unwrap();
        let decoded = records.by_ref().count();

        assert!(decoded < 200);
        assert!(records.stats().read_error.is_some());
        assert!(records.stats().decode_failures >= 1);
        drop(records);
        assert!(!path.exists());
    }

    #[test]
    fn test_scratch_file_guard_tolerates_missing_file() {
        let tmp = TempDir::new().unwrap();
        let guard = ScratchFile::new(tmp.path().join("never-created.json"));
        drop(guard);
    }
}
