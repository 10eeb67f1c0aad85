//! Best-first nearest-neighbour traversal.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::bounding_box::BoundingBox;
use crate::distance::DistanceMetric;

use super::node_store::TreeStore;
use super::rtree_impl::RTreeIndex;
use super::rtree_types::{LeafEntry, Node, NodeRef, SpatialError, SpatialResult};

/// Exact distance from the query to a leaf entry.
pub type EntryDistance<'a> = Box<dyn Fn(&LeafEntry) -> SpatialResult<f64> + 'a>;

enum Item {
    Node {
        node_ref: NodeRef,
        expected: Option<BoundingBox>,
    },
    Entry(LeafEntry),
}

struct Candidate {
    distance: f64,
    item: Item,
    seq: u64,
}

impl Candidate {
    fn rank(&self) -> (u8, u64) {
        match &self.item {
            Item::Node { .. } => (0, 0),
            Item::Entry(entry) => (1, entry.payload),
        }
    }
}

// BinaryHeap pops the greatest element, so the nearest candidate compares greatest.
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.rank().cmp(&self.rank()))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Lazy k-nearest-neighbour iterator yielding `(entry, distance)` in
/// ascending distance.
///
/// Nodes sit in a priority queue keyed by the minimum distance from the
/// query to their box and are only read when popped, so a subtree farther
/// than the k-th hit is never opened. Equal distances resolve nodes first,
/// then by ascending payload, then by discovery order.
///
/// Box distances are measured with a [`DistanceMetric`]. Entry distances
/// default to the metric's distance to the entry's box; a custom
/// [`EntryDistance`] can supply exact geometry distances as long as it never
/// returns less than the box distance.
pub struct NearestIter<'a, S: TreeStore> {
    index: &'a RTreeIndex<S>,
    origin: BoundingBox,
    metric: DistanceMetric,
    entry_distance: Option<EntryDistance<'a>>,
    heap: BinaryHeap<Candidate>,
    remaining: usize,
    max_distance: f64,
    seq: u64,
    error: Option<SpatialError>,
}

impl<'a, S: TreeStore> NearestIter<'a, S> {
    pub(crate) fn new(
        index: &'a RTreeIndex<S>,
        origin: BoundingBox,
        metric: DistanceMetric,
        entry_distance: Option<EntryDistance<'a>>,
        k: usize,
    ) -> Self {
        let mut iter = Self {
            index,
            origin,
            metric,
            entry_distance,
            heap: BinaryHeap::new(),
            remaining: k,
            max_distance: f64::INFINITY,
            seq: 0,
            error: metric.check_origin(&origin).err(),
        };

        if iter.error.is_none() && k > 0 {
            if let Some(root) = index.root_ref() {
                iter.push(
                    0.0,
                    Item::Node {
                        node_ref: root,
                        expected: None,
                    },
                );
            }
        }
        iter
    }

    /// Stops the iteration at hits farther than `max_distance` (inclusive bound).
    pub fn within(mut self, max_distance: f64) -> Self {
        self.max_distance = max_distance;
        self
    }

    fn push(&mut self, distance: f64, item: Item) {
        if distance > self.max_distance {
            return;
        }
        self.seq += 1;
        self.heap.push(Candidate {
            distance,
            item,
            seq: self.seq,
        });
    }

    fn distance_to_entry(&self, entry: &LeafEntry) -> SpatialResult<f64> {
        match &self.entry_distance {
            Some(distance) => distance(entry),
            None => Ok(self.metric.box_distance(&self.origin, &entry.bbox)),
        }
    }

    fn expand(&mut self, node: Node) -> SpatialResult<()> {
        match node {
            Node::Leaf { entries } => {
                for entry in entries {
                    let distance = self.distance_to_entry(&entry)?;
                    self.push(distance, Item::Entry(entry));
                }
            }
            Node::Internal { children, .. } => {
                for child in children {
                    let distance = self.metric.box_distance(&self.origin, &child.bbox);
                    self.push(
                        distance,
                        Item::Node {
                            node_ref: child.node_ref,
                            expected: Some(child.bbox),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn fail(&mut self, error: SpatialError) -> Option<SpatialResult<(LeafEntry, f64)>> {
        self.heap.clear();
        self.remaining = 0;
        Some(Err(error))
    }
}

impl<S: TreeStore> Iterator for NearestIter<'_, S> {
    type Item = SpatialResult<(LeafEntry, f64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(error) = self.error.take() {
            return self.fail(error);
        }

        while self.remaining > 0 {
            let candidate = self.heap.pop()?;
            if candidate.distance > self.max_distance {
                self.heap.clear();
                return None;
            }

            match candidate.item {
                Item::Entry(entry) => {
                    self.remaining -= 1;
                    if self.remaining == 0 {
                        self.heap.clear();
                    }
                    return Some(Ok((entry, candidate.distance)));
                }
                Item::Node { node_ref, expected } => {
                    let expanded = self
                        .index
                        .read_checked(node_ref, expected.as_ref())
                        .and_then(|node| self.expand(node));
                    if let Err(error) = expanded {
                        return self.fail(error);
                    }
                }
            }
        }
        None
    }
}
