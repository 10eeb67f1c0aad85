//! LRU cache for pages of the file-backed node store.
//!
//! Pages enter the cache only when first read or written. Dirty pages are
//! written back by the owner when they are evicted or flushed.

use std::collections::{HashMap, VecDeque};

use super::rtree_types::{Node, NodeRef};

/// A cached page with its data and dirty flag
pub struct CachedPage {
    pub node: Node,
    pub dirty: bool,
}

/// LRU cache for R-Tree pages
pub struct PageCache {
    pages: HashMap<NodeRef, CachedPage>,
    /// LRU order (front = oldest, back = newest)
    lru_order: VecDeque<NodeRef>,
    max_pages: usize,
}

impl PageCache {
    pub fn new(max_pages: usize) -> Self {
        Self {
            pages: HashMap::new(),
            lru_order: VecDeque::new(),
            max_pages: max_pages.max(1),
        }
    }

    fn touch(&mut self, page_id: NodeRef) {
        self.lru_order.retain(|&id| id != page_id);
        self.lru_order.push_back(page_id);
    }

    /// Get a page from cache, updating LRU order.
    /// Returns None if the page must be loaded from disk.
    pub fn get(&mut self, page_id: NodeRef) -> Option<&Node> {
        if !self.pages.contains_key(&page_id) {
            return None;
        }
        self.touch(page_id);
        self.pages.get(&page_id).map(|cached| &cached.node)
    }

    /// Insert a page (after loading from disk or creating new)
    pub fn insert(&mut self, page_id: NodeRef, node: Node, dirty: bool) {
        self.touch(page_id);
        self.pages.insert(page_id, CachedPage { node, dirty });
    }

    pub fn needs_eviction(&self) -> bool {
        self.pages.len() >= self.max_pages
    }

    /// Remove the least recently used page (returns page_id, node, dirty flag)
    pub fn evict_oldest(&mut self) -> Option<(NodeRef, Node, bool)> {
        while let Some(page_id) = self.lru_order.pop_front() {
            if let Some(cached) = self.pages.remove(&page_id) {
                return Some((page_id, cached.node, cached.dirty));
            }
        }
        None
    }

    /// Dirty pages with their content, for flushing
    pub fn dirty_pages(&self) -> Vec<(NodeRef, Node)> {
        let mut dirty: Vec<_> = self
            .pages
            .iter()
            .filter(|(_, cached)| cached.dirty)
            .map(|(id, cached)| (*id, cached.node.clone()))
            .collect();
        dirty.sort_by_key(|(id, _)| *id);
        dirty
    }

    pub fn mark_clean(&mut self, page_id: NodeRef) {
        if let Some(cached) = self.pages.get_mut(&page_id) {
            cached.dirty = false;
        }
    }

    pub fn remove(&mut self, page_id: NodeRef) -> Option<(Node, bool)> {
        self.lru_order.retain(|&id| id != page_id);
        self.pages.remove(&page_id).map(|c| (c.node, c.dirty))
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn contains(&self, page_id: NodeRef) -> bool {
        self.pages.contains_key(&page_id)
    }

    pub fn is_dirty(&self, page_id: NodeRef) -> bool {
        self.pages.get(&page_id).is_some_and(|c| c.dirty)
    }
}
