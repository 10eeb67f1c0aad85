//! RTreeIndex implementation.

use std::cmp::Ordering;

use crate::bounding_box::BoundingBox;
use crate::config::RTreeConfig;
use crate::distance::DistanceMetric;
use crate::hilbert::sort_by_hilbert;

use super::cursor::{SearchIter, SearchMode};
use super::nearest::NearestIter;
use super::node_store::{MemoryNodeStore, TreeStore};
use super::rtree_constants::BULK_LOAD_HILBERT_ORDER;
use super::rtree_types::{
    ChildRef, LeafEntry, Node, NodeRef, PayloadId, RTreeStats, SpatialError, SpatialResult,
};

/// One step of a root-to-leaf descent: an internal node and the child taken.
struct PathStep {
    node_ref: NodeRef,
    node: Node,
    child_index: usize,
}

/// Height-balanced R-Tree over a [`TreeStore`].
///
/// The index owns its store and caches the tree metadata (root reference,
/// height and entry count), writing it back to the store after every
/// mutation. Mutations take `&mut self` and reads take `&self`; wrap the
/// index in a [`SharedIndex`](crate::SharedIndex) to share it across threads.
///
/// Nodes are addressed only through [`NodeRef`]s. Operations that need to
/// walk back up (split propagation, condensing) keep the descent path they
/// recorded on the way down.
pub struct RTreeIndex<S: TreeStore = MemoryNodeStore> {
    store: S,
    config: RTreeConfig,
    root: Option<NodeRef>,
    height: u32,
    entry_count: u64,
}

impl RTreeIndex<MemoryNodeStore> {
    /// Creates an empty index backed by a [`MemoryNodeStore`].
    pub fn in_memory(config: RTreeConfig) -> SpatialResult<Self> {
        Self::open(MemoryNodeStore::new(), config)
    }
}

impl<S: TreeStore> RTreeIndex<S> {
    /// Opens the tree held by `store`, or an empty tree for a fresh store.
    ///
    /// Only the metadata is loaded; nodes are read on demand.
    pub fn open(store: S, config: RTreeConfig) -> SpatialResult<Self> {
        config.validate()?;
        store.check_fanout(config.get_max_fanout())?;

        let root = store.load_root_ref()?;
        let height = store.load_height()?;
        let entry_count = store.load_entry_count()?;

        if root.is_some() != (height > 0) {
            return Err(SpatialError::corrupt(
                root.unwrap_or(0),
                format!("root {:?} is inconsistent with height {}", root, height),
            ));
        }

        log::debug!(
            "Opened R-Tree (root {:?}, height {}, {} entries)",
            root,
            height,
            entry_count
        );
        Ok(Self {
            store,
            config,
            root,
            height,
            entry_count,
        })
    }

    /// Builds a packed tree bottom-up from `entries`.
    ///
    /// # Algorithm
    /// 1. Sort entries by the Hilbert index of their box centers, normalized
    ///    to the extent of the whole input (stable for equal indices)
    /// 2. Pack consecutive runs of `max_fanout` entries into leaves
    /// 3. Pack the resulting child references the same way, level by level,
    ///    until a single root remains
    ///
    /// A trailing run shorter than `min_fanout` borrows entries from the run
    /// before it, so every non-root node respects the fanout bounds.
    ///
    /// The store must not hold a tree yet.
    pub fn bulk_load<I>(store: S, config: RTreeConfig, entries: I) -> SpatialResult<Self>
    where
        I: IntoIterator<Item = LeafEntry>,
    {
        config.validate()?;
        store.check_fanout(config.get_max_fanout())?;
        if store.load_root_ref()?.is_some() {
            return Err(SpatialError::InvalidOperation(
                "Bulk load requires a store without a tree".into(),
            ));
        }

        let mut entries: Vec<LeafEntry> = entries.into_iter().collect();
        for entry in &entries {
            entry.bbox.validate()?;
        }

        let mut index = Self {
            store,
            config,
            root: None,
            height: 0,
            entry_count: entries.len() as u64,
        };
        if entries.is_empty() {
            index.persist_metadata()?;
            return Ok(index);
        }

        sort_by_hilbert(&mut entries, BULK_LOAD_HILBERT_ORDER);

        let max_fanout = index.config.get_max_fanout();
        let min_fanout = index.config.get_min_fanout();

        let mut level_refs = Vec::new();
        for chunk in pack(entries, max_fanout, min_fanout) {
            level_refs.push(index.write_new(Node::Leaf { entries: chunk })?);
        }

        let mut height = 1;
        while level_refs.len() > 1 {
            let mut parents = Vec::new();
            for chunk in pack(level_refs, max_fanout, min_fanout) {
                parents.push(index.write_new(Node::Internal {
                    children: chunk,
                    level: height,
                })?);
            }
            level_refs = parents;
            height += 1;
        }

        index.root = level_refs.pop().map(|child| child.node_ref);
        index.height = height;
        index.persist_metadata()?;

        log::debug!(
            "Bulk loaded {} entries into a tree of height {}",
            index.entry_count,
            index.height
        );
        Ok(index)
    }

    /// Inserts a box keyed by `payload`, which doubles as the geometry reference.
    pub fn insert(&mut self, bbox: BoundingBox, payload: PayloadId) -> SpatialResult<()> {
        self.insert_entry(LeafEntry::new(bbox, payload, payload))
    }

    /// Inserts a leaf entry. Duplicates are kept.
    ///
    /// Fails with [`SpatialError::InvalidBoundingBox`] before touching the
    /// tree if the entry's box is malformed.
    pub fn insert_entry(&mut self, entry: LeafEntry) -> SpatialResult<()> {
        entry.bbox.validate()?;
        self.insert_leaf_entry(entry)?;
        self.entry_count += 1;
        self.persist_metadata()
    }

    /// Removes the first entry matching both `bbox` and `payload`.
    ///
    /// Returns `Ok(false)` when no such entry exists. Nodes left underfull
    /// are dissolved and their entries reinserted.
    pub fn delete(&mut self, bbox: &BoundingBox, payload: PayloadId) -> SpatialResult<bool> {
        bbox.validate()?;
        let Some(root) = self.root else {
            return Ok(false);
        };

        let mut path = Vec::with_capacity(self.height as usize);
        let Some((leaf_ref, mut leaf, position)) =
            self.find_leaf(root, None, bbox, payload, &mut path)?
        else {
            log::trace!("No entry {} at {} to delete", payload, bbox);
            return Ok(false);
        };

        if let Node::Leaf { entries } = &mut leaf {
            entries.remove(position);
        }
        self.entry_count = self.entry_count.saturating_sub(1);

        self.condense_tree(path, leaf_ref, leaf)?;
        self.persist_metadata()?;
        Ok(true)
    }

    /// Lazily yields every entry whose box intersects `query`, edges included.
    pub fn search(&self, query: &BoundingBox) -> SearchIter<'_, S> {
        SearchIter::new(self, SearchMode::Intersects(*query))
    }

    /// Lazily yields every entry whose box lies inside `query`.
    pub fn search_contained(&self, query: &BoundingBox) -> SearchIter<'_, S> {
        SearchIter::new(self, SearchMode::Contained(*query))
    }

    /// Full scan in tree order.
    pub fn entries(&self) -> SearchIter<'_, S> {
        SearchIter::new(self, SearchMode::All)
    }

    /// Best-first iteration over the `k` entries nearest to `(x, y)`,
    /// by distance to their boxes.
    pub fn nearest(&self, x: f64, y: f64, k: usize) -> NearestIter<'_, S> {
        self.nearest_with_metric(x, y, k, DistanceMetric::Euclidean)
    }

    /// Like [`nearest`](RTreeIndex::nearest), measuring with `metric`. With
    /// [`DistanceMetric::Haversine`] `x` is a longitude, `y` a latitude and
    /// distances are in meters.
    pub fn nearest_with_metric(
        &self,
        x: f64,
        y: f64,
        k: usize,
        metric: DistanceMetric,
    ) -> NearestIter<'_, S> {
        NearestIter::new(self, BoundingBox::point(x, y), metric, None, k)
    }

    /// Frees every node and leaves an empty tree.
    pub fn clear(&mut self) -> SpatialResult<()> {
        if let Some(root) = self.root {
            let node = self.store.read_node(root)?;
            let mut discarded = Vec::new();
            self.dissolve(node, &mut discarded)?;
            self.store.free_node(root)?;
            log::debug!("Cleared R-Tree ({} entries)", discarded.len());
        }

        self.root = None;
        self.height = 0;
        self.entry_count = 0;
        self.persist_metadata()
    }

    /// Extent of the whole tree, or `None` when empty.
    pub fn root_bbox(&self) -> SpatialResult<Option<BoundingBox>> {
        match self.root {
            Some(root) => Ok(Some(self.read_checked(root, None)?.compute_bbox())),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> u64 {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Number of levels; 0 for an empty tree, 1 for a single leaf.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn root_ref(&self) -> Option<NodeRef> {
        self.root
    }

    pub fn config(&self) -> &RTreeConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn stats(&self) -> RTreeStats {
        RTreeStats {
            total_entries: self.entry_count,
            tree_height: self.height,
            store: self.store.stats(),
        }
    }

    /// Reads a node and checks it against what its parent recorded.
    ///
    /// `expected` is the box stored in the parent's child reference; `None`
    /// for the root.
    pub(crate) fn read_checked(
        &self,
        node_ref: NodeRef,
        expected: Option<&BoundingBox>,
    ) -> SpatialResult<Node> {
        let node = self.store.read_node(node_ref)?;

        let max_fanout = self.config.get_max_fanout();
        if node.len() > max_fanout {
            return Err(SpatialError::corrupt(
                node_ref,
                format!("fanout {} exceeds maximum {}", node.len(), max_fanout),
            ));
        }

        if let Some(expected) = expected {
            let actual = node.compute_bbox();
            if actual != *expected {
                return Err(SpatialError::corrupt(
                    node_ref,
                    format!("bounding box {} differs from parent record {}", actual, expected),
                ));
            }
        }

        Ok(node)
    }

    fn persist_metadata(&mut self) -> SpatialResult<()> {
        self.store.store_root_ref(self.root)?;
        self.store.store_height(self.height)?;
        self.store.store_entry_count(self.entry_count)
    }

    fn write_new(&mut self, node: Node) -> SpatialResult<ChildRef> {
        let bbox = node.compute_bbox();
        let node_ref = self.store.allocate_node()?;
        self.store.write_node(node_ref, node)?;
        Ok(ChildRef { bbox, node_ref })
    }

    /// Places an already validated entry without touching the entry count.
    fn insert_leaf_entry(&mut self, entry: LeafEntry) -> SpatialResult<()> {
        let Some(root) = self.root else {
            let leaf = self.write_new(Node::Leaf {
                entries: vec![entry],
            })?;
            self.root = Some(leaf.node_ref);
            self.height = 1;
            return Ok(());
        };

        let (path, leaf_ref, mut leaf) = self.choose_leaf(root, &entry.bbox)?;
        match &mut leaf {
            Node::Leaf { entries } => entries.push(entry),
            Node::Internal { .. } => {
                return Err(SpatialError::corrupt(leaf_ref, "descent ended on an internal node"));
            }
        }

        let (bbox, split) = self.write_or_split(leaf_ref, leaf)?;
        self.adjust_tree(path, leaf_ref, bbox, split)
    }

    /// Descends from the root to the leaf best suited for `bbox`.
    fn choose_leaf(
        &self,
        root: NodeRef,
        bbox: &BoundingBox,
    ) -> SpatialResult<(Vec<PathStep>, NodeRef, Node)> {
        let mut path = Vec::with_capacity(self.height as usize);
        let mut node_ref = root;
        let mut node = self.read_checked(root, None)?;

        while let Node::Internal { children, .. } = &node {
            let child_index = self.choose_subtree(node_ref, children, bbox)?;
            let child = children[child_index].clone();
            let next = self.read_checked(child.node_ref, Some(&child.bbox))?;

            path.push(PathStep {
                node_ref,
                node,
                child_index,
            });
            node_ref = child.node_ref;
            node = next;
        }

        if path.len() + 1 != self.height as usize {
            return Err(SpatialError::corrupt(
                node_ref,
                format!(
                    "leaf found at depth {} in a tree of height {}",
                    path.len() + 1,
                    self.height
                ),
            ));
        }
        Ok((path, node_ref, node))
    }

    /// Least enlargement, then least area, then fewest entries, then first.
    fn choose_subtree(
        &self,
        node_ref: NodeRef,
        children: &[ChildRef],
        bbox: &BoundingBox,
    ) -> SpatialResult<usize> {
        let mut best_key: Option<(f64, f64)> = None;
        let mut tied: Vec<usize> = Vec::new();

        for (i, child) in children.iter().enumerate() {
            let key = (child.bbox.enlargement(bbox), child.bbox.area());
            let ordering = match best_key {
                None => Ordering::Less,
                Some(best) => key.0.total_cmp(&best.0).then(key.1.total_cmp(&best.1)),
            };
            match ordering {
                Ordering::Less => {
                    best_key = Some(key);
                    tied.clear();
                    tied.push(i);
                }
                Ordering::Equal => tied.push(i),
                Ordering::Greater => {}
            }
        }

        if tied.len() <= 1 {
            return tied
                .first()
                .copied()
                .ok_or_else(|| SpatialError::corrupt(node_ref, "internal node without children"));
        }

        let mut best = tied[0];
        let mut best_len = usize::MAX;
        for i in tied {
            let child = &children[i];
            let len = self.read_checked(child.node_ref, Some(&child.bbox))?.len();
            if len < best_len {
                best = i;
                best_len = len;
            }
        }
        Ok(best)
    }

    /// Writes `node`, splitting it first when it overflows.
    ///
    /// Returns the box of the node kept at `node_ref` and, after a split,
    /// the reference to the new sibling.
    fn write_or_split(
        &mut self,
        node_ref: NodeRef,
        node: Node,
    ) -> SpatialResult<(BoundingBox, Option<ChildRef>)> {
        if node.len() <= self.config.get_max_fanout() {
            let bbox = node.compute_bbox();
            self.store.write_node(node_ref, node)?;
            return Ok((bbox, None));
        }

        let strategy = self.config.get_split_strategy();
        let min_fanout = self.config.get_min_fanout();
        let (kept, moved) = match node {
            Node::Leaf { entries } => {
                let (a, b) = strategy.split(entries, min_fanout)?;
                (Node::Leaf { entries: a }, Node::Leaf { entries: b })
            }
            Node::Internal { children, level } => {
                let (a, b) = strategy.split(children, min_fanout)?;
                (
                    Node::Internal { children: a, level },
                    Node::Internal { children: b, level },
                )
            }
        };

        log::debug!(
            "Split node {} at level {} ({}): {} / {}",
            node_ref,
            kept.level(),
            strategy,
            kept.len(),
            moved.len()
        );

        let bbox = kept.compute_bbox();
        self.store.write_node(node_ref, kept)?;
        let sibling = self.write_new(moved)?;
        Ok((bbox, Some(sibling)))
    }

    /// Walks the recorded path upward, refreshing every ancestor box and
    /// absorbing splits. A split reaching the root grows the tree.
    fn adjust_tree(
        &mut self,
        mut path: Vec<PathStep>,
        mut child_ref: NodeRef,
        mut child_bbox: BoundingBox,
        mut split: Option<ChildRef>,
    ) -> SpatialResult<()> {
        while let Some(PathStep {
            node_ref,
            mut node,
            child_index,
        }) = path.pop()
        {
            let Node::Internal { children, .. } = &mut node else {
                return Err(SpatialError::corrupt(node_ref, "leaf recorded as a parent"));
            };
            children[child_index].bbox = child_bbox;
            if let Some(sibling) = split.take() {
                children.push(sibling);
            }

            let (bbox, parent_split) = self.write_or_split(node_ref, node)?;
            child_ref = node_ref;
            child_bbox = bbox;
            split = parent_split;
        }

        if let Some(sibling) = split {
            let new_root = self.write_new(Node::Internal {
                children: vec![
                    ChildRef {
                        bbox: child_bbox,
                        node_ref: child_ref,
                    },
                    sibling,
                ],
                level: self.height,
            })?;
            self.root = Some(new_root.node_ref);
            self.height += 1;
            log::debug!(
                "Root split, new root {} at height {}",
                new_root.node_ref,
                self.height
            );
        }
        Ok(())
    }

    /// Finds the leaf holding the exact (`bbox`, `payload`) pair.
    ///
    /// Every child whose box contains `bbox` is explored, since overlapping
    /// siblings may both qualify. On success `path` holds the descent.
    fn find_leaf(
        &self,
        node_ref: NodeRef,
        expected: Option<&BoundingBox>,
        bbox: &BoundingBox,
        payload: PayloadId,
        path: &mut Vec<PathStep>,
    ) -> SpatialResult<Option<(NodeRef, Node, usize)>> {
        let node = self.read_checked(node_ref, expected)?;

        let children = match &node {
            Node::Leaf { entries } => {
                let position = entries
                    .iter()
                    .position(|e| e.bbox == *bbox && e.payload == payload);
                return Ok(position.map(|pos| (node_ref, node, pos)));
            }
            Node::Internal { children, .. } => children.clone(),
        };

        for (child_index, child) in children.iter().enumerate() {
            if !child.bbox.contains(bbox) {
                continue;
            }

            path.push(PathStep {
                node_ref,
                node: node.clone(),
                child_index,
            });
            if let Some(found) = self.find_leaf(child.node_ref, Some(&child.bbox), bbox, payload, path)? {
                return Ok(Some(found));
            }
            path.pop();
        }
        Ok(None)
    }

    /// Dissolves underfull nodes along `path`, shrinks the root and
    /// reinserts the orphaned entries.
    fn condense_tree(
        &mut self,
        mut path: Vec<PathStep>,
        node_ref: NodeRef,
        node: Node,
    ) -> SpatialResult<()> {
        let min_fanout = self.config.get_min_fanout();
        let mut orphans = Vec::new();
        let mut current_ref = node_ref;
        let mut current = node;

        while let Some(PathStep {
            node_ref: parent_ref,
            node: mut parent,
            child_index,
        }) = path.pop()
        {
            let Node::Internal { children, .. } = &mut parent else {
                return Err(SpatialError::corrupt(parent_ref, "leaf recorded as a parent"));
            };

            if current.len() < min_fanout {
                log::trace!("Dissolving underfull node {} ({} entries)", current_ref, current.len());
                self.dissolve(current, &mut orphans)?;
                self.store.free_node(current_ref)?;
                children.remove(child_index);
            } else {
                children[child_index].bbox = current.compute_bbox();
                self.store.write_node(current_ref, current)?;
            }

            current_ref = parent_ref;
            current = parent;
        }

        self.shrink_root(current_ref, current)?;

        if !orphans.is_empty() {
            log::debug!("Reinserting {} orphaned entries", orphans.len());
            for entry in orphans {
                self.insert_leaf_entry(entry)?;
            }
        }
        Ok(())
    }

    /// Stores the root after condensing. An empty root empties the tree and
    /// an internal root with a single child is replaced by that child.
    fn shrink_root(&mut self, mut root_ref: NodeRef, mut root: Node) -> SpatialResult<()> {
        loop {
            if root.is_empty() {
                self.store.free_node(root_ref)?;
                self.root = None;
                self.height = 0;
                return Ok(());
            }

            let only_child = match &root {
                Node::Internal { children, .. } if children.len() == 1 => Some(children[0].clone()),
                _ => None,
            };

            let Some(child) = only_child else {
                self.store.write_node(root_ref, root)?;
                self.root = Some(root_ref);
                return Ok(());
            };

            self.store.free_node(root_ref)?;
            root = self.read_checked(child.node_ref, Some(&child.bbox))?;
            root_ref = child.node_ref;
            self.height = self.height.saturating_sub(1);
            log::debug!("Collapsed root into node {} at height {}", root_ref, self.height);
        }
    }

    /// Collects the leaf entries below `node`, freeing its descendants.
    fn dissolve(&mut self, node: Node, orphans: &mut Vec<LeafEntry>) -> SpatialResult<()> {
        match node {
            Node::Leaf { entries } => orphans.extend(entries),
            Node::Internal { children, .. } => {
                for child in children {
                    let child_node = self.read_checked(child.node_ref, Some(&child.bbox))?;
                    self.dissolve(child_node, orphans)?;
                    self.store.free_node(child.node_ref)?;
                }
            }
        }
        Ok(())
    }
}

/// Splits `items` into runs of `max_fanout`, topping up a short final run
/// from the one before it.
fn pack<T>(items: Vec<T>, max_fanout: usize, min_fanout: usize) -> Vec<Vec<T>> {
    let mut groups: Vec<Vec<T>> = Vec::with_capacity(items.len().div_ceil(max_fanout));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        groups.push(iter.by_ref().take(max_fanout).collect());
    }

    let count = groups.len();
    if count >= 2 && groups[count - 1].len() < min_fanout {
        let needed = min_fanout - groups[count - 1].len();
        let previous = &mut groups[count - 2];
        let mut moved = previous.split_off(previous.len() - needed);
        moved.append(&mut groups[count - 1]);
        groups[count - 1] = moved;
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtree::{NodeStore, SplitStrategy};
    use rand::{Rng, SeedableRng};

    fn small_config() -> RTreeConfig {
        RTreeConfig::new().max_fanout(4).min_fanout(2)
    }

    fn point(x: f64, y: f64) -> BoundingBox {
        BoundingBox::point(x, y)
    }

    fn payloads(iter: SearchIter<'_, MemoryNodeStore>) -> Vec<u64> {
        let mut ids: Vec<u64> = iter.map(|r| r.unwrap().payload).collect();
        ids.sort_unstable();
        ids
    }

    fn random_boxes(seed: u64, count: usize) -> Vec<(BoundingBox, u64)> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        (0..count)
            .map(|i| {
                let x = rng.gen_range(0.0..1000.0);
                let y = rng.gen_range(0.0..1000.0);
                let w = rng.gen_range(0.0..20.0);
                let h = rng.gen_range(0.0..20.0);
                (BoundingBox::new(x, y, x + w, y + h), i as u64)
            })
            .collect()
    }

    fn assert_valid<S: TreeStore>(tree: &RTreeIndex<S>) {
        let report = tree.check_integrity().unwrap();
        assert!(report.is_valid(), "integrity errors: {:?}", report.errors);
    }

    #[test]
    fn test_empty_tree() {
        let tree = RTreeIndex::in_memory(RTreeConfig::new()).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 0);
        assert_eq!(tree.root_bbox().unwrap(), None);
        assert_eq!(tree.search(&BoundingBox::new(0.0, 0.0, 1.0, 1.0)).count(), 0);
        assert_eq!(tree.nearest(0.0, 0.0, 3).count(), 0);
    }

    #[test]
    fn test_three_points_split_root() {
        let config = RTreeConfig::new().max_fanout(2).min_fanout(1);
        let mut tree = RTreeIndex::in_memory(config).unwrap();

        tree.insert(point(10.0, 10.0), 1).unwrap();
        tree.insert(point(10.0, 20.0), 2).unwrap();
        assert_eq!(tree.height(), 1);

        tree.insert(point(50.0, 50.0), 3).unwrap();
        assert_eq!(tree.height(), 2);

        let root = tree.store().read_node(tree.root_ref().unwrap()).unwrap();
        match root {
            Node::Internal { children, level } => {
                assert_eq!(level, 1);
                assert_eq!(children.len(), 2);
                for child in children {
                    assert!(tree.store().read_node(child.node_ref).unwrap().is_leaf());
                }
            }
            Node::Leaf { .. } => panic!("root should have split"),
        }

        let all = tree.search(&BoundingBox::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(payloads(all), vec![1, 2, 3]);
        assert_valid(&tree);
    }

    #[test]
    fn test_delete_then_insert_stays_balanced() {
        let config = RTreeConfig::new().max_fanout(2).min_fanout(1);
        let mut tree = RTreeIndex::in_memory(config).unwrap();
        tree.insert(point(10.0, 10.0), 1).unwrap();
        tree.insert(point(10.0, 20.0), 2).unwrap();
        tree.insert(point(50.0, 50.0), 3).unwrap();

        assert!(tree.delete(&point(10.0, 20.0), 2).unwrap());
        tree.insert(point(10.0, 21.0), 4).unwrap();

        assert_eq!(tree.len(), 3);
        assert_valid(&tree);
        let all = tree.search(&BoundingBox::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(payloads(all), vec![1, 3, 4]);
    }

    #[test]
    fn test_invalid_box_rejected() {
        let mut tree = RTreeIndex::in_memory(small_config()).unwrap();
        let inverted = BoundingBox::new(5.0, 5.0, 1.0, 1.0);

        assert!(matches!(
            tree.insert(inverted, 1),
            Err(SpatialError::InvalidBoundingBox(_))
        ));
        assert!(matches!(
            tree.insert(BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0), 1),
            Err(SpatialError::InvalidBoundingBox(_))
        ));
        assert!(matches!(
            tree.delete(&inverted, 1),
            Err(SpatialError::InvalidBoundingBox(_))
        ));
        assert!(tree.is_empty());
        assert_eq!(tree.store().node_count(), 0);
    }

    #[test]
    fn test_infinite_boxes_insert_and_delete() {
        let mut tree =
            RTreeIndex::in_memory(RTreeConfig::new().max_fanout(2).min_fanout(1)).unwrap();
        let everything = BoundingBox::new(
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
            f64::INFINITY,
            f64::INFINITY,
        );

        for id in 0..6 {
            tree.insert(everything, id).unwrap();
        }
        tree.insert(BoundingBox::new(f64::NEG_INFINITY, 0.0, f64::INFINITY, 0.0), 6)
            .unwrap();
        tree.insert(point(3.0, 4.0), 7).unwrap();

        assert_eq!(tree.len(), 8);
        assert!(tree.check_integrity().unwrap().is_valid());
        assert_eq!(payloads(tree.search(&point(3.0, 4.0))), vec![0, 1, 2, 3, 4, 5, 7]);

        assert!(tree.delete(&everything, 2).unwrap());
        assert_eq!(tree.len(), 7);
        assert!(tree.check_integrity().unwrap().is_valid());
    }

    #[test]
    fn test_invalid_query_yields_error() {
        let mut tree = RTreeIndex::in_memory(small_config()).unwrap();
        tree.insert(point(1.0, 1.0), 1).unwrap();

        let mut iter = tree.search(&BoundingBox::new(5.0, 5.0, 1.0, 1.0));
        assert!(matches!(iter.next(), Some(Err(SpatialError::InvalidBoundingBox(_)))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_delete_missing_entry() {
        let mut tree = RTreeIndex::in_memory(small_config()).unwrap();
        assert!(!tree.delete(&point(1.0, 1.0), 1).unwrap());

        tree.insert(point(1.0, 1.0), 1).unwrap();
        assert!(!tree.delete(&point(1.0, 1.0), 2).unwrap());
        assert!(!tree.delete(&point(2.0, 2.0), 1).unwrap());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_duplicates_allowed() {
        let mut tree = RTreeIndex::in_memory(small_config()).unwrap();
        for _ in 0..3 {
            tree.insert(point(1.0, 1.0), 7).unwrap();
        }
        assert_eq!(tree.len(), 3);
        assert!(tree.delete(&point(1.0, 1.0), 7).unwrap());
        assert_eq!(tree.search(&point(1.0, 1.0)).count(), 2);
    }

    #[test]
    fn test_delete_everything_empties_tree() {
        let mut tree = RTreeIndex::in_memory(small_config()).unwrap();
        let boxes = random_boxes(7, 200);
        for (bbox, id) in &boxes {
            tree.insert(*bbox, *id).unwrap();
        }
        assert!(tree.height() >= 3);

        for (i, (bbox, id)) in boxes.iter().enumerate() {
            assert!(tree.delete(bbox, *id).unwrap(), "entry {} not deleted", id);
            if i % 25 == 0 {
                assert_valid(&tree);
            }
        }

        assert!(tree.is_empty());
        assert_eq!(tree.height(), 0);
        assert_eq!(tree.root_ref(), None);
        assert_eq!(tree.store().node_count(), 0);
    }

    #[test]
    fn test_search_matches_brute_force() {
        for strategy in [SplitStrategy::Quadratic, SplitStrategy::Linear] {
            let config = RTreeConfig::new()
                .max_fanout(8)
                .min_fanout(3)
                .split_strategy(strategy);
            let mut tree = RTreeIndex::in_memory(config).unwrap();
            let boxes = random_boxes(42, 500);
            for (bbox, id) in &boxes {
                tree.insert(*bbox, *id).unwrap();
            }
            assert_valid(&tree);

            let mut rng = rand::rngs::StdRng::seed_from_u64(99);
            for _ in 0..20 {
                let x = rng.gen_range(0.0..900.0);
                let y = rng.gen_range(0.0..900.0);
                let query = BoundingBox::new(x, y, x + 100.0, y + 100.0);

                let mut expected: Vec<u64> = boxes
                    .iter()
                    .filter(|(b, _)| b.intersects(&query))
                    .map(|(_, id)| *id)
                    .collect();
                expected.sort_unstable();
                assert_eq!(payloads(tree.search(&query)), expected);

                let mut contained: Vec<u64> = boxes
                    .iter()
                    .filter(|(b, _)| query.contains(b))
                    .map(|(_, id)| *id)
                    .collect();
                contained.sort_unstable();
                assert_eq!(payloads(tree.search_contained(&query)), contained);
            }
        }
    }

    #[test]
    fn test_search_touching_edges() {
        let mut tree = RTreeIndex::in_memory(small_config()).unwrap();
        tree.insert(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 1).unwrap();
        tree.insert(BoundingBox::new(20.0, 20.0, 30.0, 30.0), 2).unwrap();

        let touching = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
        assert_eq!(payloads(tree.search(&touching)), vec![1, 2]);
        assert_eq!(payloads(tree.search_contained(&touching)), Vec::<u64>::new());
    }

    #[test]
    fn test_nearest_matches_brute_force() {
        let mut tree = RTreeIndex::in_memory(small_config()).unwrap();
        let boxes = random_boxes(3, 300);
        for (bbox, id) in &boxes {
            tree.insert(*bbox, *id).unwrap();
        }

        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        for _ in 0..25 {
            let x = rng.gen_range(0.0..1000.0);
            let y = rng.gen_range(0.0..1000.0);

            let best = boxes
                .iter()
                .map(|(b, _)| b.distance_to_point(x, y))
                .fold(f64::INFINITY, f64::min);

            let (_, distance) = tree.nearest(x, y, 1).next().unwrap().unwrap();
            assert_eq!(distance, best);
        }
    }

    #[test]
    fn test_nearest_ascending_and_bounded() {
        let mut tree = RTreeIndex::in_memory(small_config()).unwrap();
        for i in 0..50 {
            tree.insert(point(i as f64, 0.0), i).unwrap();
        }

        let hits: Vec<_> = tree.nearest(10.2, 0.0, 5).map(|r| r.unwrap()).collect();
        let ids: Vec<u64> = hits.iter().map(|(e, _)| e.payload).collect();
        assert_eq!(ids, vec![10, 11, 9, 12, 8]);
        assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));

        assert_eq!(tree.nearest(10.0, 0.0, 0).count(), 0);
        let within: Vec<_> = tree.nearest(10.0, 0.0, 10).within(1.0).collect();
        assert_eq!(within.len(), 3);
    }

    #[test]
    fn test_nearest_equal_distance_orders_by_payload() {
        let mut tree = RTreeIndex::in_memory(small_config()).unwrap();
        for id in [5, 3, 9, 1] {
            tree.insert(point(1.0, 1.0), id).unwrap();
        }
        let ids: Vec<u64> = tree
            .nearest(0.0, 0.0, 4)
            .map(|r| r.unwrap().0.payload)
            .collect();
        assert_eq!(ids, vec![1, 3, 5, 9]);
    }

    #[test]
    fn test_bulk_load() {
        let boxes = random_boxes(5, 1000);
        let entries = boxes.iter().map(|(b, id)| LeafEntry::new(*b, *id, *id));
        let tree = RTreeIndex::bulk_load(MemoryNodeStore::new(), small_config(), entries).unwrap();

        assert_eq!(tree.len(), 1000);
        assert_valid(&tree);

        let query = BoundingBox::new(100.0, 100.0, 400.0, 400.0);
        let mut expected: Vec<u64> = boxes
            .iter()
            .filter(|(b, _)| b.intersects(&query))
            .map(|(_, id)| *id)
            .collect();
        expected.sort_unstable();
        assert_eq!(payloads(tree.search(&query)), expected);
    }

    #[test]
    fn test_bulk_load_rebalances_last_node() {
        // 9 entries at fanout 4 would leave a single entry in the last leaf
        let entries = (0..9).map(|i| LeafEntry::new(point(i as f64, 0.0), i, i));
        let tree = RTreeIndex::bulk_load(MemoryNodeStore::new(), small_config(), entries).unwrap();
        assert_eq!(tree.height(), 2);
        assert_valid(&tree);
    }

    #[test]
    fn test_bulk_load_then_mutate() {
        let boxes = random_boxes(8, 100);
        let entries = boxes.iter().map(|(b, id)| LeafEntry::new(*b, *id, *id));
        let mut tree =
            RTreeIndex::bulk_load(MemoryNodeStore::new(), small_config(), entries).unwrap();

        for (bbox, id) in boxes.iter().take(60) {
            assert!(tree.delete(bbox, *id).unwrap());
        }
        tree.insert(point(500.0, 500.0), 1000).unwrap();
        assert_eq!(tree.len(), 41);
        assert_valid(&tree);
    }

    #[test]
    fn test_bulk_load_requires_empty_store() {
        let mut tree = RTreeIndex::in_memory(small_config()).unwrap();
        tree.insert(point(1.0, 1.0), 1).unwrap();
        let store = tree.into_store();

        let result = RTreeIndex::bulk_load(store, small_config(), std::iter::empty());
        assert!(matches!(result, Err(SpatialError::InvalidOperation(_))));
    }

    #[test]
    fn test_bulk_load_empty() {
        let tree =
            RTreeIndex::bulk_load(MemoryNodeStore::new(), small_config(), std::iter::empty())
                .unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 0);
    }

    #[test]
    fn test_clear_frees_nodes() {
        let mut tree = RTreeIndex::in_memory(small_config()).unwrap();
        for (bbox, id) in random_boxes(1, 100) {
            tree.insert(bbox, id).unwrap();
        }
        tree.clear().unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.store().node_count(), 0);

        tree.insert(point(1.0, 1.0), 1).unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_reopen_from_store() {
        let mut tree = RTreeIndex::in_memory(small_config()).unwrap();
        for (bbox, id) in random_boxes(2, 50) {
            tree.insert(bbox, id).unwrap();
        }
        let height = tree.height();
        let extent = tree.root_bbox().unwrap();

        let reopened = RTreeIndex::open(tree.into_store(), small_config()).unwrap();
        assert_eq!(reopened.len(), 50);
        assert_eq!(reopened.height(), height);
        assert_eq!(reopened.root_bbox().unwrap(), extent);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RTreeConfig::new().max_fanout(4).min_fanout(3);
        assert!(matches!(
            RTreeIndex::in_memory(config),
            Err(SpatialError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_corrupt_child_box_detected() {
        let mut tree = RTreeIndex::in_memory(small_config()).unwrap();
        for i in 0..10 {
            tree.insert(point(i as f64, i as f64), i).unwrap();
        }

        let root = tree.store().read_node(tree.root_ref().unwrap()).unwrap();
        let Node::Internal { children, .. } = root else {
            panic!("expected an internal root");
        };
        let victim = children[0].node_ref;
        let mut store = tree.into_store();
        store.overwrite(
            victim,
            Node::Leaf {
                entries: vec![LeafEntry::new(point(500.0, 500.0), 99, 99)],
            },
        );

        let tree = RTreeIndex::open(store, small_config()).unwrap();
        let result: SpatialResult<Vec<_>> = tree.entries().collect();
        assert!(matches!(result, Err(SpatialError::CorruptNode { node, .. }) if node == victim));
        assert!(!tree.check_integrity().unwrap().is_valid());
    }

    #[test]
    fn test_stats() {
        let mut tree = RTreeIndex::in_memory(small_config()).unwrap();
        for i in 0..20 {
            tree.insert(point(i as f64, 0.0), i).unwrap();
        }
        let stats = tree.stats();
        assert_eq!(stats.total_entries, 20);
        assert_eq!(stats.tree_height, tree.height());
        assert!(stats.store.node_count > 1);
    }

    #[test]
    fn test_pack_tops_up_last_group() {
        let groups = pack((0..9).collect(), 4, 2);
        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 3, 2]);
        assert_eq!(groups.concat(), (0..9).collect::<Vec<_>>());

        let single = pack(vec![1], 4, 2);
        assert_eq!(single, vec![vec![1]]);
    }
}
