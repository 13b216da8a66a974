//! Feed file decoding.
//!
//! Turns a downloaded feed file into a lazy stream of [`RawProduct`]s.
//!
//! [`RawProduct`]: catalog_core::RawProduct

mod ndjson;

pub use ndjson::{NdjsonConfig, NdjsonRecords, ScratchFile};

use crate::Result;
use std::path::Path;

/// Open a feed file with the default reader configuration.
///
/// The file is consumed: it is deleted once the returned reader drops, so a
/// second `decode` of the same path fails.
pub fn decode(path: impl AsRef<Path>) -> Result<NdjsonRecords> {
    NdjsonRecords::open(path.as_ref(), NdjsonConfig::default())
}

/// Counters for one decoded file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Lines read, blank ones included.
    pub lines_read: usize,

    /// Lines that decoded to a product record.
    pub records_decoded: usize,

    /// Lines that were not usable records, plus a terminal read error.
    pub decode_failures: usize,

    /// Set when reading stopped early on an I/O error.
    pub read_error: Option<String>,
}
