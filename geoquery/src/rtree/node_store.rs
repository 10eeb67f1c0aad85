//! Node storage contracts and the in-memory store.
//!
//! The tree never holds nodes by pointer. Every node lives in a store and is
//! addressed by an opaque [`NodeRef`]; reparenting during splits and condensing
//! is only a matter of rewriting the parent's child list.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::rtree_types::{Node, NodeRef, SpatialError, SpatialResult, StoreStats};

/// Storage for tree nodes.
///
/// Each `write_node` is treated as one atomic replace of the node at `node_ref`.
/// The tree makes no assumption about atomicity across several writes.
pub trait NodeStore: Send + Sync {
    /// Reads a node. Unknown references are an error.
    fn read_node(&self, node_ref: NodeRef) -> SpatialResult<Node>;

    /// Reserves a fresh reference for a node about to be written.
    fn allocate_node(&mut self) -> SpatialResult<NodeRef>;

    /// Stores `node` under `node_ref`, replacing any previous content.
    fn write_node(&mut self, node_ref: NodeRef, node: Node) -> SpatialResult<NodeRef>;

    /// Releases a node; its reference may be handed out again.
    fn free_node(&mut self, node_ref: NodeRef) -> SpatialResult<()>;

    /// Rejects a fanout whose full nodes this store cannot hold.
    fn check_fanout(&self, _max_fanout: usize) -> SpatialResult<()> {
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        StoreStats::default()
    }
}

/// Root and height persistence for a tree.
pub trait MetadataStore {
    fn load_root_ref(&self) -> SpatialResult<Option<NodeRef>>;

    fn store_root_ref(&mut self, root: Option<NodeRef>) -> SpatialResult<()>;

    fn load_height(&self) -> SpatialResult<u32>;

    fn store_height(&mut self, height: u32) -> SpatialResult<()>;

    fn load_entry_count(&self) -> SpatialResult<u64>;

    fn store_entry_count(&mut self, count: u64) -> SpatialResult<()>;
}

/// Everything an [`RTreeIndex`](super::RTreeIndex) needs from its backing store.
pub trait TreeStore: NodeStore + MetadataStore {}

impl<T: NodeStore + MetadataStore> TreeStore for T {}

/// Arena of nodes kept in a `HashMap`, with a free list for reuse.
#[derive(Debug, Default)]
pub struct MemoryNodeStore {
    nodes: HashMap<NodeRef, Node>,
    free_refs: Vec<NodeRef>,
    next_ref: NodeRef,
    root: Option<NodeRef>,
    height: u32,
    entry_count: u64,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self {
            next_ref: 1,
            ..Default::default()
        }
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of `read_node` calls served so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Replaces a node without any bookkeeping, for corrupting a tree in tests.
    #[cfg(test)]
    pub(crate) fn overwrite(&mut self, node_ref: NodeRef, node: Node) {
        self.nodes.insert(node_ref, node);
    }
}

impl NodeStore for MemoryNodeStore {
    fn read_node(&self, node_ref: NodeRef) -> SpatialResult<Node> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.nodes
            .get(&node_ref)
            .cloned()
            .ok_or(SpatialError::NodeNotFound(node_ref))
    }

    fn allocate_node(&mut self) -> SpatialResult<NodeRef> {
        if let Some(node_ref) = self.free_refs.pop() {
            return Ok(node_ref);
        }
        let node_ref = self.next_ref.max(1);
        self.next_ref = node_ref + 1;
        Ok(node_ref)
    }

    fn write_node(&mut self, node_ref: NodeRef, node: Node) -> SpatialResult<NodeRef> {
        if node_ref == 0 {
            return Err(SpatialError::InvalidOperation(
                "Node reference 0 is reserved".into(),
            ));
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.nodes.insert(node_ref, node);
        Ok(node_ref)
    }

    fn free_node(&mut self, node_ref: NodeRef) -> SpatialResult<()> {
        if self.nodes.remove(&node_ref).is_none() {
            return Err(SpatialError::NodeNotFound(node_ref));
        }
        self.free_refs.push(node_ref);
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            node_count: self.nodes.len() as u64,
            node_reads: self.reads.load(Ordering::Relaxed),
            node_writes: self.writes.load(Ordering::Relaxed),
            ..Default::default()
        }
    }
}

impl MetadataStore for MemoryNodeStore {
    fn load_root_ref(&self) -> SpatialResult<Option<NodeRef>> {
        Ok(self.root)
    }

    fn store_root_ref(&mut self, root: Option<NodeRef>) -> SpatialResult<()> {
        self.root = root;
        Ok(())
    }

    fn load_height(&self) -> SpatialResult<u32> {
        Ok(self.height)
    }

    fn store_height(&mut self, height: u32) -> SpatialResult<()> {
        self.height = height;
        Ok(())
    }

    fn load_entry_count(&self) -> SpatialResult<u64> {
        Ok(self.entry_count)
    }

    fn store_entry_count(&mut self, count: u64) -> SpatialResult<()> {
        self.entry_count = count;
        Ok(())
    }
}
