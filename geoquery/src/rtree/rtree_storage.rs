//! File-backed node store.
//!
//! Nodes are kept in fixed-size pages of a single file. Page 0 holds the
//! [`FileHeader`] with the tree metadata; every other page holds either a
//! checksummed node or a link in the free-page chain.
//!
//! Pages are read one at a time on demand and kept in an LRU [`PageCache`].
//! Writes only dirty the cache; dirty pages reach the file when they are
//! evicted or when [`FileNodeStore::flush`] runs. A node is encoded and
//! size-checked when it is written, so a page that would not fit is refused
//! at the mutation that produced it.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::node_store::{MetadataStore, NodeStore};
use super::rtree_cache::PageCache;
use super::rtree_constants::{DEFAULT_CACHE_PAGES, PAGE_SIZE};
use super::rtree_types::{
    ChildRef, FileHeader, FreePage, LeafEntry, Node, NodeRef, PageWithChecksum, SpatialError,
    SpatialResult, StoreStats,
};
use crate::bounding_box::BoundingBox;

/// Smallest page size accepted; the header is always decodable from this prefix.
const MIN_PAGE_SIZE: usize = 4096;

/// Options for creating or opening a [`FileNodeStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStoreOptions {
    /// Number of pages kept in the LRU cache
    pub cache_pages: usize,
    /// Page size in bytes for newly created files
    pub page_size: usize,
}

impl Default for FileStoreOptions {
    fn default() -> Self {
        Self {
            cache_pages: DEFAULT_CACHE_PAGES,
            page_size: PAGE_SIZE,
        }
    }
}

/// Raw page I/O: one seek and one read or write per call.
struct PageFile {
    file: RwLock<File>,
    page_size: usize,
}

impl PageFile {
    fn offset(&self, page_id: NodeRef) -> u64 {
        page_id * self.page_size as u64
    }

    fn read_raw(&self, page_id: NodeRef, len: usize) -> SpatialResult<Vec<u8>> {
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(self.offset(page_id)))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn check_fits(&self, page_id: NodeRef, len: usize) -> SpatialResult<()> {
        if len > self.page_size {
            return Err(SpatialError::InvalidOperation(format!(
                "Page {} too large: {} bytes (max {})",
                page_id, len, self.page_size
            )));
        }
        Ok(())
    }

    fn write_raw(&self, page_id: NodeRef, mut bytes: Vec<u8>) -> SpatialResult<()> {
        self.check_fits(page_id, bytes.len())?;
        bytes.resize(self.page_size, 0);

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(self.offset(page_id)))?;
        file.write_all(&bytes)?;
        Ok(())
    }

    fn write_header(&self, header: &FileHeader) -> SpatialResult<()> {
        let bytes = encode(header)?;
        self.write_raw(0, bytes)
    }

    fn read_node(&self, page_id: NodeRef) -> SpatialResult<Node> {
        let buffer = self.read_raw(page_id, self.page_size)?;
        let page: PageWithChecksum = decode(&buffer).map_err(|e| {
            SpatialError::corrupt(page_id, format!("undecodable page: {}", e))
        })?;
        page.into_node(page_id)
    }

    /// Encodes a node page, failing if it would not fit in one page.
    fn encode_node(&self, page_id: NodeRef, node: &Node) -> SpatialResult<Vec<u8>> {
        let bytes = encode(&PageWithChecksum::new(node.clone())?)?;
        self.check_fits(page_id, bytes.len())?;
        Ok(bytes)
    }

    fn write_node(&self, page_id: NodeRef, node: &Node) -> SpatialResult<()> {
        let bytes = self.encode_node(page_id, node)?;
        self.write_raw(page_id, bytes)
    }

    fn read_free_page(&self, page_id: NodeRef) -> SpatialResult<FreePage> {
        let buffer = self.read_raw(page_id, self.page_size)?;
        decode(&buffer)
    }

    fn write_free_page(&self, page_id: NodeRef, free_page: &FreePage) -> SpatialResult<()> {
        self.write_raw(page_id, encode(free_page)?)
    }

    fn sync(&self) -> SpatialResult<()> {
        self.file.write().sync_all()?;
        Ok(())
    }
}

fn encode<T: serde::Serialize>(value: &T) -> SpatialResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::legacy())
        .map_err(|e| SpatialError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> SpatialResult<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
        .map(|(value, _)| value)
        .map_err(|e| SpatialError::Serialization(e.to_string()))
}

/// Encoded size of the largest page a node of `fanout` entries can need.
///
/// Entries and child references encode to a fixed width, so the size grows
/// linearly with the fanout and two samples per node kind pin it down.
fn full_page_len(fanout: usize) -> SpatialResult<u64> {
    let bbox = BoundingBox::point(0.0, 0.0);
    let page_len = |node: Node| -> SpatialResult<u64> {
        Ok(encode(&PageWithChecksum::new(node)?)?.len() as u64)
    };
    let leaf = |n: usize| Node::Leaf {
        entries: vec![LeafEntry::new(bbox, 0, 0); n],
    };
    let internal = |n: usize| Node::Internal {
        children: vec![ChildRef { bbox, node_ref: 0 }; n],
        level: 1,
    };

    let mut widest = 0u64;
    for (one, two) in [(leaf(1), leaf(2)), (internal(1), internal(2))] {
        let base = page_len(one)?;
        let per_entry = page_len(two)?.saturating_sub(base);
        let full = (fanout.saturating_sub(1) as u64)
            .saturating_mul(per_entry)
            .saturating_add(base);
        widest = widest.max(full);
    }
    Ok(widest)
}

#[derive(Default)]
struct StoreCounters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
}

/// A [`NodeStore`] persisting nodes into a page file.
///
/// Tree metadata (root, height, entry count) lives in the header page and is
/// written by [`flush`](FileNodeStore::flush), which also runs on drop.
pub struct FileNodeStore {
    pages: PageFile,
    path: PathBuf,
    cache: RwLock<PageCache>,
    header: FileHeader,
    counters: StoreCounters,
}

impl FileNodeStore {
    /// Creates (or truncates) a page file with default options.
    pub fn create(path: impl AsRef<Path>) -> SpatialResult<Self> {
        Self::create_with_options(path, FileStoreOptions::default())
    }

    pub fn create_with_options(
        path: impl AsRef<Path>,
        options: FileStoreOptions,
    ) -> SpatialResult<Self> {
        if options.page_size < MIN_PAGE_SIZE {
            return Err(SpatialError::InvalidConfiguration(format!(
                "page_size must be at least {}, got {}",
                MIN_PAGE_SIZE, options.page_size
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;

        let pages = PageFile {
            file: RwLock::new(file),
            page_size: options.page_size,
        };
        let header = FileHeader::new(options.page_size);
        pages.write_header(&header)?;
        pages.sync()?;

        log::debug!("Created R-Tree page file at {:?}", path.as_ref());
        Ok(Self {
            pages,
            path: path.as_ref().to_path_buf(),
            cache: RwLock::new(PageCache::new(options.cache_pages)),
            header,
            counters: StoreCounters::default(),
        })
    }

    /// Opens an existing page file. Only the header is read.
    pub fn open(path: impl AsRef<Path>) -> SpatialResult<Self> {
        Self::open_with_options(path, FileStoreOptions::default())
    }

    /// Opens an existing page file; `options.page_size` is ignored in favour
    /// of the size recorded in the header.
    pub fn open_with_options(
        path: impl AsRef<Path>,
        options: FileStoreOptions,
    ) -> SpatialResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        let header_reader = PageFile {
            file: RwLock::new(file),
            page_size: MIN_PAGE_SIZE,
        };
        let header: FileHeader = decode(&header_reader.read_raw(0, MIN_PAGE_SIZE)?)?;
        header.validate()?;

        let pages = PageFile {
            file: header_reader.file,
            page_size: header.page_size as usize,
        };

        log::debug!(
            "Opened R-Tree page file at {:?} (root {}, height {}, {} entries)",
            path.as_ref(),
            header.root_page,
            header.height,
            header.entry_count
        );
        Ok(Self {
            pages,
            path: path.as_ref().to_path_buf(),
            cache: RwLock::new(PageCache::new(options.cache_pages)),
            header,
            counters: StoreCounters::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes every dirty page and the header, then syncs the file.
    pub fn flush(&self) -> SpatialResult<()> {
        let dirty = self.cache.read().dirty_pages();
        let count = dirty.len();
        for (page_id, node) in dirty {
            self.pages.write_node(page_id, &node)?;
            self.counters.disk_writes.fetch_add(1, Ordering::Relaxed);
            self.cache.write().mark_clean(page_id);
        }

        self.pages.write_header(&self.header)?;
        self.pages.sync()?;
        log::debug!("Flushed {} dirty pages to {:?}", count, self.path);
        Ok(())
    }

    fn check_range(&self, page_id: NodeRef) -> SpatialResult<()> {
        if page_id == 0 || page_id >= self.header.next_page_id {
            return Err(SpatialError::NodeNotFound(page_id));
        }
        Ok(())
    }

    /// Adds a page to the cache, writing back whatever dirty page it evicts.
    fn cache_node(&self, page_id: NodeRef, node: Node, dirty: bool) -> SpatialResult<()> {
        let mut cache = self.cache.write();

        while cache.needs_eviction() && !cache.contains(page_id) {
            match cache.evict_oldest() {
                Some((evict_id, evict_node, true)) => {
                    log::trace!("Evicting dirty page {}", evict_id);
                    self.pages.write_node(evict_id, &evict_node)?;
                    self.counters.disk_writes.fetch_add(1, Ordering::Relaxed);
                }
                Some(_) => {}
                None => break,
            }
        }

        cache.insert(page_id, node, dirty);
        Ok(())
    }
}

impl NodeStore for FileNodeStore {
    fn read_node(&self, node_ref: NodeRef) -> SpatialResult<Node> {
        self.check_range(node_ref)?;

        if let Some(node) = self.cache.write().get(node_ref) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(node.clone());
        }

        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
        self.counters.disk_reads.fetch_add(1, Ordering::Relaxed);
        let node = self.pages.read_node(node_ref)?;
        self.cache_node(node_ref, node.clone(), false)?;
        Ok(node)
    }

    fn allocate_node(&mut self) -> SpatialResult<NodeRef> {
        if self.header.free_list_head != 0 {
            let page_id = self.header.free_list_head;
            let free_page = self.pages.read_free_page(page_id)?;
            self.header.free_list_head = free_page.next_free;
            self.header.free_page_count = self.header.free_page_count.saturating_sub(1);
            return Ok(page_id);
        }

        let page_id = self.header.next_page_id;
        self.header.next_page_id += 1;
        Ok(page_id)
    }

    fn write_node(&mut self, node_ref: NodeRef, node: Node) -> SpatialResult<NodeRef> {
        self.check_range(node_ref)?;
        // a page that cannot be written back must fail now, not at flush
        self.pages.encode_node(node_ref, &node)?;
        self.cache_node(node_ref, node, true)?;
        Ok(node_ref)
    }

    fn free_node(&mut self, node_ref: NodeRef) -> SpatialResult<()> {
        self.check_range(node_ref)?;
        self.cache.write().remove(node_ref);

        self.pages.write_free_page(
            node_ref,
            &FreePage {
                next_free: self.header.free_list_head,
            },
        )?;
        self.header.free_list_head = node_ref;
        self.header.free_page_count += 1;
        Ok(())
    }

    fn check_fanout(&self, max_fanout: usize) -> SpatialResult<()> {
        let needed = full_page_len(max_fanout)?;
        if needed > self.pages.page_size as u64 {
            return Err(SpatialError::InvalidConfiguration(format!(
                "max_fanout {} needs pages of {} bytes, but {:?} uses {} byte pages",
                max_fanout, needed, self.path, self.pages.page_size
            )));
        }
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        let live_pages = self
            .header
            .next_page_id
            .saturating_sub(1)
            .saturating_sub(self.header.free_page_count);
        StoreStats {
            node_count: live_pages,
            cached_pages: self.cache.read().len() as u64,
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            node_reads: self.counters.disk_reads.load(Ordering::Relaxed),
            node_writes: self.counters.disk_writes.load(Ordering::Relaxed),
        }
    }
}

impl MetadataStore for FileNodeStore {
    fn load_root_ref(&self) -> SpatialResult<Option<NodeRef>> {
        Ok(match self.header.root_page {
            0 => None,
            page_id => Some(page_id),
        })
    }

    fn store_root_ref(&mut self, root: Option<NodeRef>) -> SpatialResult<()> {
        self.header.root_page = root.unwrap_or(0);
        Ok(())
    }

    fn load_height(&self) -> SpatialResult<u32> {
        Ok(self.header.height)
    }

    fn store_height(&mut self, height: u32) -> SpatialResult<()> {
        self.header.height = height;
        Ok(())
    }

    fn load_entry_count(&self) -> SpatialResult<u64> {
        Ok(self.header.entry_count)
    }

    fn store_entry_count(&mut self, count: u64) -> SpatialResult<()> {
        self.header.entry_count = count;
        Ok(())
    }
}

impl Drop for FileNodeStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::warn!("Failed to flush R-Tree page file {:?}: {}", self.path, e);
        }
    }
}
