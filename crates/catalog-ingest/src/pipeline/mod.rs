//! Core pipeline components for product import.
//!
//! - [`batch`] - Groups decoded records into fixed-size batches
//! - [`ProductStore`] - SQLite upsert store keyed by normalized product code
//! - [`SearchIndexer`] - Pushes stored products to the search index
//!
//! # Architecture
//!
//! ```text
//! [NdjsonRecords] → [Batches] → [ProductStore] ──StoredBatch──▶ [SearchIndexer]
//!                                     ↓                              ↓
//!                                  SQLite                         Algolia
//! ```
//!
//! The store is the source of truth; the search index is derived from it and
//! may lag or miss batches without affecting what was stored.

pub mod batch;
mod indexer;
pub mod schema;
mod store;

pub use batch::{Batches, accumulate, effective_batch_size};
pub use indexer::{
    AlgoliaBackend, INDEX_QUEUE_CAPACITY, IndexOutcome, IndexerStats, SearchBackend, SearchIndexer,
    index_queue,
};
pub use store::{ProductStore, StoreOutcome, StoredBatch};
