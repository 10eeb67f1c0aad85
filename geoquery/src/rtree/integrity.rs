//! Structural integrity checking.

use crate::bounding_box::BoundingBox;

use super::node_store::TreeStore;
use super::rtree_impl::RTreeIndex;
use super::rtree_types::{Node, NodeRef, SpatialError, SpatialResult};

/// Result of [`RTreeIndex::check_integrity`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrityReport {
    /// Nodes read during the walk
    pub nodes_checked: u64,
    /// Leaf entries reached from the root
    pub entries_found: u64,
    /// Nodes that could not be read or failed their checksum
    pub corrupted_nodes: Vec<NodeRef>,
    /// Detailed findings
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn record(&mut self, message: String) {
        log::warn!("R-Tree integrity: {}", message);
        self.errors.push(message);
    }
}

impl<S: TreeStore> RTreeIndex<S> {
    /// Walks the whole tree and reports every structural violation found:
    /// - a parent's recorded box differing from the union of the child
    /// - fanout above the maximum, or below the minimum outside the root
    /// - levels out of sequence, which also catches leaves at uneven depth
    /// - an entry count different from the stored metadata
    ///
    /// Unreadable nodes are reported and skipped. Only I/O failures abort
    /// the check.
    pub fn check_integrity(&self) -> SpatialResult<IntegrityReport> {
        let mut report = IntegrityReport::new();

        match self.root_ref() {
            None if self.height() != 0 => {
                report.record(format!("empty tree with height {}", self.height()));
            }
            None => {}
            Some(root) => {
                let root_level = self.height().saturating_sub(1);
                self.check_node(root, None, root_level, true, &mut report)?;
            }
        }

        if report.entries_found != self.len() && report.corrupted_nodes.is_empty() {
            report.record(format!(
                "found {} entries, metadata records {}",
                report.entries_found,
                self.len()
            ));
        }

        log::debug!(
            "Integrity check: {} nodes, {} entries, {} errors",
            report.nodes_checked,
            report.entries_found,
            report.errors.len()
        );
        Ok(report)
    }

    fn check_node(
        &self,
        node_ref: NodeRef,
        expected: Option<&BoundingBox>,
        expected_level: u32,
        is_root: bool,
        report: &mut IntegrityReport,
    ) -> SpatialResult<()> {
        let node = match self.store().read_node(node_ref) {
            Ok(node) => node,
            Err(SpatialError::Io(e)) => return Err(SpatialError::Io(e)),
            Err(e) => {
                report.corrupted_nodes.push(node_ref);
                report.record(format!("node {}: {}", node_ref, e));
                return Ok(());
            }
        };
        report.nodes_checked += 1;

        if node.level() != expected_level {
            report.record(format!(
                "node {} is at level {}, expected {}",
                node_ref,
                node.level(),
                expected_level
            ));
        }

        let max_fanout = self.config().get_max_fanout();
        let min_fanout = self.config().get_min_fanout();
        if node.len() > max_fanout {
            report.record(format!(
                "node {} holds {} entries, maximum is {}",
                node_ref,
                node.len(),
                max_fanout
            ));
        }
        if !is_root && node.len() < min_fanout {
            report.record(format!(
                "node {} holds {} entries, minimum is {}",
                node_ref,
                node.len(),
                min_fanout
            ));
        }

        if let Some(expected) = expected {
            let actual = node.compute_bbox();
            if actual != *expected {
                report.record(format!(
                    "node {} covers {}, parent records {}",
                    node_ref, actual, expected
                ));
            }
        }

        match node {
            Node::Leaf { entries } => {
                for entry in &entries {
                    if !entry.bbox.is_valid() {
                        report.record(format!(
                            "node {} holds invalid box {} for payload {}",
                            node_ref, entry.bbox, entry.payload
                        ));
                    }
                }
                report.entries_found += entries.len() as u64;
            }
            Node::Internal { children, level } => {
                if is_root && children.len() < 2 {
                    report.record(format!(
                        "internal root {} has {} children",
                        node_ref,
                        children.len()
                    ));
                }
                for child in &children {
                    self.check_node(
                        child.node_ref,
                        Some(&child.bbox),
                        level.saturating_sub(1),
                        false,
                        report,
                    )?;
                }
            }
        }
        Ok(())
    }
}
