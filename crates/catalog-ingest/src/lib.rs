//! Product catalog bulk import.
//!
//! This crate downloads product feed files listed in a remote manifest,
//! decodes them line by line, upserts the records into the product store,
//! and pushes stored products to the search index.
//!
//! # Modules
//!
//! - [`config`] - Environment-driven run configuration
//! - [`fetch`] - Manifest and feed file downloads
//! - [`source`] - Streaming NDJSON decoding (plain or gzip)
//! - [`pipeline`] - Batching, the SQLite product store, search indexing
//! - [`importer`] - The run loop tying it all together
//! - [`report`] / [`notify`] - Run counters and abort notifications
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   FeedFetcher   │  Manifest, then one file at a time into scratch storage
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  NdjsonRecords  │  Lazy line decoding; deletes the file when dropped
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Batches     │  Fixed-size groups in arrival order
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  ProductStore   │  SQLite upsert by code, one transaction per record
//! └────────┬────────┘
//!          │ StoredBatch (channel)
//!          ▼
//! ┌─────────────────┐
//! │  SearchIndexer  │  Background thread; failures never touch the store
//! └─────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod importer;
pub mod notify;
pub mod pipeline;
pub mod report;
pub mod source;

#[cfg(test)]
mod test_support;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

pub use config::{ImportConfig, SearchConfig, SearchDriver};
pub use fetch::{DownloadedFile, FeedFetcher, FetchConfig};
pub use importer::{ImportOptions, ImportPhase, Importer};
pub use notify::{ChannelSink, FailureNotification, LogSink, NotificationSink};
pub use pipeline::{
    AlgoliaBackend, INDEX_QUEUE_CAPACITY, IndexOutcome, IndexerStats, ProductStore, SearchBackend,
    SearchIndexer, StoreOutcome, StoredBatch, index_queue,
};
pub use report::{FileReport, ImportRunReport};
pub use source::{DecodeStats, NdjsonRecords, decode};
