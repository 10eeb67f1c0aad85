//! R-Tree over pluggable node storage.
//!
//! The tree is an arena: nodes live in a [`NodeStore`] and refer to each
//! other only through [`NodeRef`]s, never by pointer. Two stores ship with
//! the crate:
//! - [`MemoryNodeStore`], a plain in-memory arena
//! - [`FileNodeStore`], checksummed pages in a single file behind an LRU
//!   cache, loaded on demand
//!
//! [`RTreeIndex`] implements insertion with quadratic or linear splits,
//! deletion with condensing, bulk loading, lazy window search and
//! best-first nearest-neighbour iteration on top of either store.

pub mod rtree_types;
pub mod rtree_constants;
pub mod rtree_cache;
pub mod rtree_storage;
pub mod node_store;
pub mod split;
mod cursor;
mod integrity;
mod nearest;
mod rtree_impl;

pub use cursor::SearchIter;
pub use integrity::IntegrityReport;
pub use nearest::{EntryDistance, NearestIter};
pub use node_store::{MemoryNodeStore, MetadataStore, NodeStore, TreeStore};
pub use rtree_constants::{DEFAULT_CACHE_PAGES, DEFAULT_MAX_FANOUT, DEFAULT_MIN_FANOUT};
pub use rtree_impl::RTreeIndex;
pub use rtree_storage::{FileNodeStore, FileStoreOptions};
pub use rtree_types::{
    Bounded, ChildRef, GeometryRef, LeafEntry, Node, NodeRef, PayloadId, RTreeStats,
    SpatialError, SpatialResult, StoreStats,
};
pub use split::SplitStrategy;
