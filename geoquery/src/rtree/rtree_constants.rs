//! Constants for the R-Tree and its file-backed store.

/// Default maximum entries per node
pub const DEFAULT_MAX_FANOUT: usize = 64;

/// Default minimum entries before underflow (about 40% of max)
pub const DEFAULT_MIN_FANOUT: usize = 25;

/// Default page size (16KB) - balances I/O efficiency and memory usage
pub const PAGE_SIZE: usize = 16384;

/// Default cache size in number of pages (16MB with 16KB pages)
pub const DEFAULT_CACHE_PAGES: usize = 1024;

/// Hilbert curve order used to sort entries during bulk load
pub const BULK_LOAD_HILBERT_ORDER: u32 = 16;

/// Magic number for file format identification
pub const MAGIC: u32 = 0x47515254; // "GQRT"

/// File format version
pub const FORMAT_VERSION: u32 = 1;
