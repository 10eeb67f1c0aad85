use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::bounding_box::BoundingBox;
use crate::config::RTreeConfig;
use crate::rtree::{
    LeafEntry, MemoryNodeStore, PayloadId, RTreeIndex, SpatialResult, TreeStore,
};

/// A cloneable handle to an index shared between threads.
///
/// One writer or many readers at a time: mutations take the exclusive lock
/// and every reader sees the tree either fully before or fully after a
/// mutation. Pipelines are built against a read guard and hold it for as
/// long as they live.
///
/// # Examples
///
/// ```
/// use geoquery::{BoundingBox, QueryPipeline, RTreeConfig, SharedIndex};
///
/// let index = SharedIndex::in_memory(RTreeConfig::new()).unwrap();
/// index.insert(BoundingBox::point(1.0, 1.0), 7).unwrap();
///
/// let guard = index.read();
/// let hits = QueryPipeline::nearest(&guard, 0.0, 0.0, 1).payloads().unwrap();
/// assert_eq!(hits, vec![7]);
/// ```
pub struct SharedIndex<S: TreeStore = MemoryNodeStore> {
    index: Arc<RwLock<RTreeIndex<S>>>,
}

impl SharedIndex<MemoryNodeStore> {
    pub fn in_memory(config: RTreeConfig) -> SpatialResult<Self> {
        Ok(Self::new(RTreeIndex::in_memory(config)?))
    }
}

impl<S: TreeStore> SharedIndex<S> {
    pub fn new(index: RTreeIndex<S>) -> Self {
        SharedIndex {
            index: Arc::new(RwLock::new(index)),
        }
    }

    /// Opens the tree already held by `store`.
    pub fn open(store: S, config: RTreeConfig) -> SpatialResult<Self> {
        Ok(Self::new(RTreeIndex::open(store, config)?))
    }

    /// Bulk loads `entries` into an empty store.
    pub fn bulk_load<I>(store: S, config: RTreeConfig, entries: I) -> SpatialResult<Self>
    where
        I: IntoIterator<Item = LeafEntry>,
    {
        Ok(Self::new(RTreeIndex::bulk_load(store, config, entries)?))
    }

    /// Acquires a shared read lock
    pub fn read(&self) -> RwLockReadGuard<'_, RTreeIndex<S>> {
        self.index.read()
    }

    /// Acquires the exclusive write lock
    pub fn write(&self) -> RwLockWriteGuard<'_, RTreeIndex<S>> {
        self.index.write()
    }

    /// Runs `f` under a read lock.
    pub fn query<R>(&self, f: impl FnOnce(&RTreeIndex<S>) -> R) -> R {
        f(&self.index.read())
    }

    pub fn insert(&self, bbox: BoundingBox, payload: PayloadId) -> SpatialResult<()> {
        self.index.write().insert(bbox, payload)
    }

    pub fn insert_entry(&self, entry: LeafEntry) -> SpatialResult<()> {
        self.index.write().insert_entry(entry)
    }

    pub fn delete(&self, bbox: &BoundingBox, payload: PayloadId) -> SpatialResult<bool> {
        self.index.write().delete(bbox, payload)
    }

    pub fn clear(&self) -> SpatialResult<()> {
        self.index.write().clear()
    }

    /// Collects a window search under a single read lock.
    pub fn search(&self, window: &BoundingBox) -> SpatialResult<Vec<LeafEntry>> {
        self.index.read().search(window).collect()
    }

    /// Collects the `k` nearest entries under a single read lock.
    pub fn nearest(&self, x: f64, y: f64, k: usize) -> SpatialResult<Vec<(LeafEntry, f64)>> {
        self.index.read().nearest(x, y, k).collect()
    }

    pub fn len(&self) -> u64 {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Takes the index back once no other handle remains.
    pub fn try_unwrap(self) -> Result<RTreeIndex<S>, Self> {
        Arc::try_unwrap(self.index)
            .map(RwLock::into_inner)
            .map_err(|index| SharedIndex { index })
    }
}

impl<S: TreeStore> Clone for SharedIndex<S> {
    fn clone(&self) -> Self {
        SharedIndex {
            index: Arc::clone(&self.index),
        }
    }
}
