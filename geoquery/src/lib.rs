//! # geoquery - R-Tree Spatial Index and Query Pipelines
//!
//! This crate provides a balanced R-Tree over pluggable node storage,
//! DE-9IM spatial predicates and lazy query pipelines that combine window
//! search, exact geometry refinement, nearest-neighbour ranking and paging.
//!
//! ## Features
//!
//! - **Pluggable Storage**: in-memory arena or checksummed page file with an LRU cache
//! - **Quadratic and Linear Splits**: Guttman's split algorithms, chosen per index
//! - **Bulk Loading**: Hilbert-ordered packing of a whole data set
//! - **Two-Phase Queries**: R-Tree box search followed by exact geometry refinement
//! - **Nearest Neighbours**: lazy best-first traversal in ascending planar or
//!   great-circle (longitude/latitude) distance
//! - **Thread Safe**: one writer or many readers through [`SharedIndex`]
//!
//! ## R-Tree API
//!
//! ```rust
//! use geoquery::{BoundingBox, RTreeConfig, RTreeIndex};
//!
//! # fn main() -> Result<(), geoquery::SpatialError> {
//! let mut tree = RTreeIndex::in_memory(RTreeConfig::new())?;
//! tree.insert(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 1)?;
//! tree.insert(BoundingBox::point(20.0, 20.0), 2)?;
//!
//! let query = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
//! let hits = tree.search(&query).collect::<Result<Vec<_>, _>>()?;
//! assert_eq!(hits.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Query Pipelines
//!
//! ```rust
//! use geoquery::{BoundingBox, GeometryStore, QueryPipeline, RTreeConfig, RTreeIndex, SpatialPredicate};
//! use geo::Point;
//!
//! # fn main() -> Result<(), geoquery::SpatialError> {
//! let geometries = GeometryStore::new();
//! let mut tree = RTreeIndex::in_memory(RTreeConfig::new())?;
//! for (x, y) in [(10.0, 10.0), (10.0, 20.0), (50.0, 50.0)] {
//!     let id = geometries.add(Point::new(x, y));
//!     tree.insert(BoundingBox::point(x, y), id)?;
//! }
//!
//! let center = geometries.add(Point::new(10.0, 10.0));
//! let ids = QueryPipeline::search(&tree, &BoundingBox::new(0.0, 0.0, 100.0, 100.0))
//!     .filter(&geometries, SpatialPredicate::WithinDistance(center, 5.0))
//!     .payloads()?;
//! assert_eq!(ids, vec![1]);
//! # Ok(())
//! # }
//! ```

// Core R-Tree modules
pub mod bounding_box;
pub mod config;
pub mod distance;
pub mod hilbert;
pub mod rtree;

// Spatial query modules
pub mod geometry;
pub mod pipeline;
pub mod predicate;
pub mod shared;

// Re-export R-Tree types
pub use bounding_box::BoundingBox;
pub use config::RTreeConfig;
pub use distance::DistanceMetric;
pub use rtree::{
    FileNodeStore, FileStoreOptions, IntegrityReport, LeafEntry, MemoryNodeStore, MetadataStore,
    NodeStore, RTreeIndex, RTreeStats, SpatialError, SpatialResult, SplitStrategy, TreeStore,
};

// Re-export geometry types
pub use geometry::{GeometryProvider, GeometryStore, Relation};

// Re-export query types
pub use pipeline::{QueryHit, QueryPipeline};
pub use predicate::{BoxVerdict, PredicateEvaluator, SpatialPredicate};
pub use shared::SharedIndex;
