//! Core types and shared utilities for the product catalog import pipeline.
//!
//! This crate provides:
//! - The product data model (feed record, stored entity, search projection)
//! - Product code normalization and feed-line parsing
//! - Prometheus metrics helpers
//! - Shared error types

mod error;
pub mod metrics;
mod product;

/// Batch size used when none (or a non-positive one) is configured.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Name of the search index products are pushed to unless configured otherwise.
pub const DEFAULT_SEARCH_INDEX: &str = "products";

pub use error::{Error, Result};
pub use product::{
    Product, ProductFields, ProductStatus, RawProduct, SearchRecord, normalize_code, parse_record,
};
