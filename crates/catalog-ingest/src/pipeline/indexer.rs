//! Search indexer for stored products.
//!
//! The indexer is a derived consumer of the product store:
//! - It receives a [`StoredBatch`] after each batch commits
//! - Projects the searchable products to [`SearchRecord`]s
//! - Submits them to the configured [`SearchBackend`]
//!
//! ```text
//! ProductStore ──StoredBatch──▶ channel ──▶ SearchIndexer thread ──▶ Algolia
//! ```
//!
//! The channel from [`index_queue`] holds at most [`INDEX_QUEUE_CAPACITY`]
//! batches. A slow or unreachable index makes the store wait for room rather
//! than pile up stored batches in memory.
//!
//! Index failures are logged and counted, never raised: by the time a batch
//! reaches the indexer its products are already committed.

use std::future::Future;
use std::thread;
use std::time::Duration;

use catalog_core::SearchRecord;
use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;

use super::store::StoredBatch;
use crate::config::{SearchConfig, SearchDriver};
use crate::{Error, Result};

/// Stored batches waiting for the indexer before the store blocks.
pub const INDEX_QUEUE_CAPACITY: usize = 1;

/// Channel carrying stored batches from the product store to the indexer.
pub fn index_queue() -> (Sender<StoredBatch>, Receiver<StoredBatch>) {
    crossbeam_channel::bounded(INDEX_QUEUE_CAPACITY)
}

/// A search service that accepts batches of records.
pub trait SearchBackend: Send + Sync + 'static {
    /// Add or replace `records` in the index, keyed by their object id.
    fn submit_batch(&self, records: &[SearchRecord]) -> impl Future<Output = Result<()>> + Send;
}

// =============================================================================
// Algolia
// =============================================================================

/// Algolia REST batch endpoint client.
pub struct AlgoliaBackend {
    client: reqwest::Client,
    endpoint: String,
    app_id: String,
    api_key: String,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    requests: Vec<BatchOperation<'a>>,
}

#[derive(Serialize)]
struct BatchOperation<'a> {
    action: &'static str,
    body: &'a SearchRecord,
}

impl AlgoliaBackend {
    /// Create a client for `index_name` in application `app_id`.
    pub fn new(app_id: &str, api_key: &str, index_name: &str) -> Result<Self> {
        if app_id.is_empty() || api_key.is_empty() {
            return Err(Error::Config(
                "Algolia application id and API key are required".into(),
            ));
        }

        let endpoint = format!("https://{app_id}.algolia.net/1/indexes/{index_name}/batch");
        Self::with_endpoint(app_id, api_key, endpoint)
    }

    /// Create a client posting to an explicit batch endpoint URL.
    pub fn with_endpoint(app_id: &str, api_key: &str, endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            app_id: app_id.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl SearchBackend for AlgoliaBackend {
    async fn submit_batch(&self, records: &[SearchRecord]) -> Result<()> {
        let request = BatchRequest {
            requests: records
                .iter()
                .map(|body| BatchOperation {
                    action: "updateObject",
                    body,
                })
                .collect(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Algolia-API-Key", &self.api_key)
            .header("X-Algolia-Application-Id", &self.app_id)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Index(format!("request to {} failed: {}", self.endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Index(format!("HTTP {}: {}", status, body.trim())));
        }

        Ok(())
    }
}

// =============================================================================
// Indexer
// =============================================================================

/// What happened to one stored batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Indexing is turned off.
    Skipped,
    /// Searchable records were submitted (possibly zero).
    Indexed { records: usize },
    /// The backend rejected the batch or could not be reached.
    Failed { error: String },
}

/// Counters returned by the indexer thread when it exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexerStats {
    pub batches_indexed: usize,
    pub records_indexed: usize,
    pub batches_failed: usize,
    pub batches_skipped: usize,
}

impl IndexerStats {
    fn record(&mut self, outcome: &IndexOutcome) {
        match outcome {
            IndexOutcome::Skipped => self.batches_skipped += 1,
            IndexOutcome::Indexed { records } => {
                self.batches_indexed += 1;
                self.records_indexed += records;
            }
            IndexOutcome::Failed { .. } => self.batches_failed += 1,
        }
    }
}

/// Pushes stored products to a search backend.
pub struct SearchIndexer<B> {
    /// `None` when indexing is disabled.
    backend: Option<B>,
}

impl SearchIndexer<AlgoliaBackend> {
    /// Build the indexer selected by `config`.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        match config.driver {
            SearchDriver::Disabled => Ok(Self::disabled()),
            SearchDriver::Algolia => {
                let backend = AlgoliaBackend::new(&config.app_id, &config.api_key, &config.index_name)?;
                tracing::info!(
                    "Search indexer initialized: driver=algolia, index={}",
                    config.index_name
                );
                Ok(Self::new(backend))
            }
        }
    }
}

impl<B: SearchBackend> SearchIndexer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// An indexer that skips every batch.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Submit the searchable products of `batch` to the backend.
    ///
    /// Trashed products are left out. Never fails: backend errors are logged
    /// and reported as [`IndexOutcome::Failed`].
    pub async fn index_batch(&self, batch: &StoredBatch) -> IndexOutcome {
        let Some(backend) = &self.backend else {
            return IndexOutcome::Skipped;
        };

        let records: Vec<SearchRecord> = batch
            .products
            .iter()
            .filter(|p| p.is_searchable())
            .map(|p| p.to_search_record())
            .collect();

        if records.is_empty() {
            return IndexOutcome::Indexed { records: 0 };
        }

        match backend.submit_batch(&records).await {
            Ok(()) => {
                metrics::counter!("search_batches_indexed_total").increment(1);
                metrics::counter!("search_records_indexed_total").increment(records.len() as u64);
                tracing::debug!("Indexed {} products", records.len());
                IndexOutcome::Indexed {
                    records: records.len(),
                }
            }
            Err(e) => {
                metrics::counter!("search_index_errors_total").increment(1);
                tracing::warn!(
                    "Search indexing failed for {} products (stored data unaffected): {}",
                    records.len(),
                    e
                );
                IndexOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Consume stored batches on a background thread until the channel
    /// disconnects, then return the thread's counters.
    pub fn start(self, receiver: Receiver<StoredBatch>) -> thread::JoinHandle<IndexerStats> {
        thread::spawn(move || {
            let mut stats = IndexerStats::default();

            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!("Search indexer could not start a runtime: {}", e);
                    return stats;
                }
            };

            tracing::info!("Search indexer thread started");

            for batch in receiver.iter() {
                let outcome = rt.block_on(self.index_batch(&batch));
                stats.record(&outcome);
            }

            tracing::info!(
                "Search indexer thread stopped: {} batches, {} records indexed, {} failed",
                stats.batches_indexed,
                stats.records_indexed,
                stats.batches_failed
            );

            stats
        })
    }
}
