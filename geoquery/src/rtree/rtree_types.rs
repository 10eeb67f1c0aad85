//! Core types and data structures for the R-Tree.
//!
//! This module defines the fundamental types used throughout the R-Tree:
//! - Error types and result types
//! - Node types (Leaf and Internal) and their entries
//! - Statistics structures
//! - Page header and checksum wrappers used by the file-backed store

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

use crate::bounding_box::BoundingBox;

use super::rtree_constants::{FORMAT_VERSION, MAGIC, PAGE_SIZE};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur in spatial indexing and query operations
#[derive(Debug, Error)]
pub enum SpatialError {
    /// A bounding box with `min > max` (or NaN) on some axis was supplied.
    /// Raised before any mutation, so the tree is left unchanged.
    #[error("Invalid bounding box {0}: min exceeds max on some axis")]
    InvalidBoundingBox(BoundingBox),

    /// A node read back from storage failed its consistency check.
    #[error("Corrupt node {node}: {reason}")]
    CorruptNode { node: NodeRef, reason: String },

    /// A split produced a group smaller than the minimum fanout.
    #[error("Split produced groups of {left} and {right} entries, minimum fanout is {min_fanout}")]
    SplitInvariantViolation {
        left: usize,
        right: usize,
        min_fanout: usize,
    },

    #[error("Node {0} not found in store")]
    NodeNotFound(NodeRef),

    #[error("Geometry {0} not found")]
    GeometryNotFound(GeometryRef),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl SpatialError {
    pub(crate) fn corrupt(node: NodeRef, reason: impl Into<String>) -> Self {
        SpatialError::CorruptNode {
            node,
            reason: reason.into(),
        }
    }
}

/// Result type for spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;

/// Opaque reference to a node in a [`NodeStore`](super::NodeStore).
/// Zero is never handed out; on disk it marks "no node".
pub type NodeRef = u64;

/// Opaque identifier of the payload a leaf entry points at
pub type PayloadId = u64;

/// Opaque reference to a geometry held by a
/// [`GeometryProvider`](crate::geometry::GeometryProvider)
pub type GeometryRef = u64;

// ============================================================================
// Statistics
// ============================================================================

/// Counters reported by a node store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub node_count: u64,
    pub cached_pages: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub node_reads: u64,
    pub node_writes: u64,
}

/// Statistics about an R-Tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RTreeStats {
    pub total_entries: u64,
    pub tree_height: u32,
    pub store: StoreStats,
}

// ============================================================================
// Node Types
// ============================================================================

/// Anything carrying a bounding box that a split can partition.
pub trait Bounded {
    fn bbox(&self) -> &BoundingBox;
}

/// An entry in a leaf node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafEntry {
    pub bbox: BoundingBox,
    pub payload: PayloadId,
    pub geometry: GeometryRef,
}

impl LeafEntry {
    pub fn new(bbox: BoundingBox, payload: PayloadId, geometry: GeometryRef) -> Self {
        Self {
            bbox,
            payload,
            geometry,
        }
    }
}

impl Bounded for LeafEntry {
    fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }
}

/// A child reference in an internal node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildRef {
    pub bbox: BoundingBox,
    pub node_ref: NodeRef,
}

impl Bounded for ChildRef {
    fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }
}

/// Node types in the R-Tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Leaf node containing actual entries
    Leaf { entries: Vec<LeafEntry> },
    /// Internal node containing child references
    Internal {
        children: Vec<ChildRef>,
        level: u32, // Height from leaf level (leaves are 0)
    },
}

impl Node {
    /// Get the bounding box enclosing all children/entries
    pub fn compute_bbox(&self) -> BoundingBox {
        match self {
            Node::Leaf { entries } => BoundingBox::union_all(entries.iter().map(|e| &e.bbox)),
            Node::Internal { children, .. } => {
                BoundingBox::union_all(children.iter().map(|c| &c.bbox))
            }
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    pub fn level(&self) -> u32 {
        match self {
            Node::Leaf { .. } => 0,
            Node::Internal { level, .. } => *level,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Node::Leaf { entries } => entries.len(),
            Node::Internal { children, .. } => children.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Free List Page
// ============================================================================

/// A free page in the free list chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreePage {
    /// Next free page in the chain (0 = end of chain)
    pub next_free: NodeRef,
}

// ============================================================================
// Page with Checksum
// ============================================================================

/// A page wrapped with CRC32 checksum for corruption detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageWithChecksum {
    pub checksum: u32,
    pub node: Node,
}

impl PageWithChecksum {
    pub fn new(node: Node) -> SpatialResult<Self> {
        let checksum = Self::calculate_checksum(&node)?;
        Ok(Self { checksum, node })
    }

    /// Calculate CRC32 checksum of the encoded node
    pub fn calculate_checksum(node: &Node) -> SpatialResult<u32> {
        let serialized = bincode::serde::encode_to_vec(node, bincode::config::legacy())
            .map_err(|e| SpatialError::Serialization(e.to_string()))?;
        Ok(crc32(&serialized))
    }

    /// Verify checksum and consume self to return the node
    pub fn into_node(self, page_id: NodeRef) -> SpatialResult<Node> {
        let expected = Self::calculate_checksum(&self.node)?;
        if self.checksum != expected {
            return Err(SpatialError::corrupt(
                page_id,
                format!(
                    "page checksum mismatch (expected: {:x}, got: {:x})",
                    expected, self.checksum
                ),
            ));
        }
        Ok(self.node)
    }
}

/// CRC32-MPEG2 over a byte slice.
fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0x04C11DB7;
    let mut crc: u32 = 0xFFFFFFFF;

    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x80000000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }

    crc ^ 0xFFFFFFFF
}

// ============================================================================
// File Header
// ============================================================================

/// Header stored in page 0 of an R-Tree file. Holds the tree metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub page_size: u32,
    /// Root page, 0 when the tree is empty
    pub root_page: NodeRef,
    pub next_page_id: NodeRef,
    pub entry_count: u64,
    pub height: u32,
    pub free_list_head: NodeRef,
    pub free_page_count: u64,
}

impl FileHeader {
    pub fn new(page_size: usize) -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            page_size: page_size as u32,
            root_page: 0,
            next_page_id: 1,
            entry_count: 0,
            height: 0,
            free_list_head: 0,
            free_page_count: 0,
        }
    }

    pub fn validate(&self) -> SpatialResult<()> {
        if self.magic != MAGIC {
            return Err(SpatialError::InvalidOperation(
                "Invalid file format (bad magic)".into(),
            ));
        }
        if self.version != FORMAT_VERSION {
            return Err(SpatialError::InvalidOperation(format!(
                "Unsupported file format version {}",
                self.version
            )));
        }
        Ok(())
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new(PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(boxes: &[BoundingBox]) -> Node {
        Node::Leaf {
            entries: boxes
                .iter()
                .enumerate()
                .map(|(i, b)| LeafEntry::new(*b, i as u64, i as u64))
                .collect(),
        }
    }

    #[test]
    fn test_node_compute_bbox() {
        let node = leaf(&[
            BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            BoundingBox::new(5.0, -2.0, 6.0, 3.0),
        ]);
        assert_eq!(node.compute_bbox(), BoundingBox::new(0.0, -2.0, 6.0, 3.0));
        assert_eq!(node.len(), 2);
        assert!(node.is_leaf());
        assert_eq!(node.level(), 0);
    }

    #[test]
    fn test_empty_node_bbox_is_empty() {
        let node = Node::Leaf { entries: vec![] };
        assert!(node.is_empty());
        assert!(node.compute_bbox().is_empty());
    }

    #[test]
    fn test_internal_node() {
        let node = Node::Internal {
            children: vec![
                ChildRef {
                    bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
                    node_ref: 3,
                },
                ChildRef {
                    bbox: BoundingBox::new(2.0, 2.0, 4.0, 4.0),
                    node_ref: 7,
                },
            ],
            level: 2,
        };
        assert!(!node.is_leaf());
        assert_eq!(node.level(), 2);
        assert_eq!(node.compute_bbox(), BoundingBox::new(0.0, 0.0, 4.0, 4.0));
    }

    #[test]
    fn test_checksum_roundtrip_and_tamper() {
        let node = leaf(&[BoundingBox::point(1.0, 2.0)]);
        let page = PageWithChecksum::new(node.clone()).unwrap();
        assert_eq!(page.clone().into_node(1).unwrap(), node);

        let mut tampered = page;
        tampered.checksum ^= 1;
        assert!(matches!(
            tampered.into_node(1),
            Err(SpatialError::CorruptNode { node: 1, .. })
        ));
    }

    #[test]
    fn test_header_validate() {
        let header = FileHeader::default();
        assert!(header.validate().is_ok());
        assert_eq!(header.root_page, 0);
        assert_eq!(header.height, 0);

        let mut bad = header.clone();
        bad.magic = 0;
        assert!(bad.validate().is_err());

        let mut future = header;
        future.version = FORMAT_VERSION + 1;
        assert!(future.validate().is_err());
    }

    #[test]
    fn test_error_display() {
        let err = SpatialError::InvalidBoundingBox(BoundingBox::new(2.0, 0.0, 1.0, 1.0));
        assert!(err.to_string().contains("BoundingBox(2, 0, 1, 1)"));

        let err = SpatialError::SplitInvariantViolation {
            left: 3,
            right: 0,
            min_fanout: 1,
        };
        assert!(err.to_string().contains("minimum fanout is 1"));
    }
}
