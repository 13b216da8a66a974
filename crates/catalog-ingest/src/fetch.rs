//! Feed fetcher.
//!
//! Downloads the manifest of importable file names, then each listed file.
//! File bodies are streamed to scratch storage chunk by chunk, so a
//! multi-gigabyte feed file never sits in memory.
//!
//! There are no retries here: every request gets one attempt, bounded by the
//! client's connect and total timeouts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use crate::{Error, Result};

/// Configuration for the feed fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Maximum time to establish a connection.
    pub connect_timeout: Duration,

    /// Maximum time for a whole request, body included.
    pub timeout: Duration,

    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
            user_agent: concat!("catalog-import/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// A feed file written to scratch storage.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    /// File name as listed in the manifest.
    pub name: String,

    /// Where the body was written.
    pub path: PathBuf,

    /// Body size in bytes.
    pub size_bytes: u64,
}

/// HTTP client for the remote feed.
pub struct FeedFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl FeedFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { client, config })
    }

    /// Get the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch the manifest and return the file names it lists, in order.
    pub async fn list_files(&self, manifest_url: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(manifest_url)
            .send()
            .await
            .map_err(|e| Error::fetch(manifest_url, describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(manifest_url, format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::fetch(manifest_url, describe(&e)))?;

        Ok(parse_manifest(&body))
    }

    /// Download `base_url + file_name` into `dest_dir`.
    ///
    /// Fails on a non-2xx status, a transport error or timeout, or an empty
    /// body. Whatever was written before a failure is removed.
    pub async fn download_file(
        &self,
        base_url: &str,
        file_name: &str,
        dest_dir: &Path,
    ) -> Result<DownloadedFile> {
        let url = format!("{base_url}{file_name}");
        validate_file_name(file_name).map_err(|reason| Error::fetch(&url, reason))?;

        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(file_name);

        let result = match self.stream_to_file(&url, &dest).await {
            Ok(0) => Err(Error::fetch(&url, "empty body")),
            other => other,
        };

        match result {
            Ok(size_bytes) => {
                tracing::debug!("Downloaded {} ({} bytes) to {}", url, size_bytes, dest.display());
                Ok(DownloadedFile {
                    name: file_name.to_string(),
                    path: dest,
                    size_bytes,
                })
            }
            Err(e) => {
                match tokio::fs::remove_file(&dest).await {
                    Ok(()) => {}
                    Err(rm) if rm.kind() == std::io::ErrorKind::NotFound => {}
                    Err(rm) => {
                        tracing::warn!(
                            "Failed to remove partial download {}: {}",
                            dest.display(),
                            rm
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn stream_to_file(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::fetch(url, describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(url, format!("HTTP {status}")));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::fetch(url, describe(&e)))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        Ok(written)
    }
}

/// Split a manifest body into file names.
///
/// One name per line; surrounding whitespace is trimmed and blank lines
/// (including the usual trailing one) are dropped.
pub fn parse_manifest(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reject names that would resolve outside the scratch directory.
fn validate_file_name(name: &str) -> std::result::Result<(), String> {
    let unsafe_name = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');

    if unsafe_name {
        return Err(format!("refusing unsafe file name {name:?}"));
    }
    Ok(())
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}
