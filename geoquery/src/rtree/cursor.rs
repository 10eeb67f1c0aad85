//! Lazy depth-first window search.

use crate::bounding_box::BoundingBox;

use super::node_store::TreeStore;
use super::rtree_impl::RTreeIndex;
use super::rtree_types::{LeafEntry, Node, NodeRef, SpatialError, SpatialResult};

#[derive(Debug, Clone, Copy)]
pub(crate) enum SearchMode {
    Intersects(BoundingBox),
    Contained(BoundingBox),
    All,
}

impl SearchMode {
    fn descends_into(&self, bbox: &BoundingBox) -> bool {
        match self {
            SearchMode::Intersects(query) | SearchMode::Contained(query) => query.intersects(bbox),
            SearchMode::All => true,
        }
    }

    fn accepts(&self, bbox: &BoundingBox) -> bool {
        match self {
            SearchMode::Intersects(query) => query.intersects(bbox),
            SearchMode::Contained(query) => query.contains(bbox),
            SearchMode::All => true,
        }
    }
}

/// Iterator over the entries matched by a window search.
///
/// Nodes are read one at a time as the traversal reaches them, in child
/// order. The first error (a malformed query window or a corrupt node) is
/// yielded once and ends the iteration.
pub struct SearchIter<'a, S: TreeStore> {
    index: &'a RTreeIndex<S>,
    mode: SearchMode,
    stack: Vec<(NodeRef, Option<BoundingBox>)>,
    pending: std::vec::IntoIter<LeafEntry>,
    error: Option<SpatialError>,
}

impl<'a, S: TreeStore> SearchIter<'a, S> {
    pub(crate) fn new(index: &'a RTreeIndex<S>, mode: SearchMode) -> Self {
        let error = match &mode {
            SearchMode::Intersects(query) | SearchMode::Contained(query) => query.validate().err(),
            SearchMode::All => None,
        };
        let stack = match error {
            Some(_) => Vec::new(),
            None => index.root_ref().map(|root| (root, None)).into_iter().collect(),
        };

        Self {
            index,
            mode,
            stack,
            pending: Vec::new().into_iter(),
            error,
        }
    }

    fn fail(&mut self, error: SpatialError) -> Option<SpatialResult<LeafEntry>> {
        self.stack.clear();
        self.pending = Vec::new().into_iter();
        Some(Err(error))
    }
}

impl<S: TreeStore> Iterator for SearchIter<'_, S> {
    type Item = SpatialResult<LeafEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(error) = self.error.take() {
            return self.fail(error);
        }

        loop {
            let mode = self.mode;
            if let Some(entry) = self.pending.find(|e| mode.accepts(&e.bbox)) {
                return Some(Ok(entry));
            }

            let (node_ref, expected) = self.stack.pop()?;
            match self.index.read_checked(node_ref, expected.as_ref()) {
                Ok(Node::Leaf { entries }) => self.pending = entries.into_iter(),
                Ok(Node::Internal { children, .. }) => {
                    // reversed so the first child is visited first
                    for child in children.into_iter().rev() {
                        if mode.descends_into(&child.bbox) {
                            self.stack.push((child.node_ref, Some(child.bbox)));
                        }
                    }
                }
                Err(error) => return self.fail(error),
            }
        }
    }
}
