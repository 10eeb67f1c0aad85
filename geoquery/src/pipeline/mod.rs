//! Lazy query pipelines over an [`RTreeIndex`].
//!
//! A pipeline starts from a source (a window search or a nearest-neighbour
//! traversal), then chains stages, each one a pull iterator wrapping the
//! previous one:
//!
//! ```text
//! search / nearest  ->  filter  ->  order_by_distance  ->  range / limit  ->  project
//! ```
//!
//! Nothing is read from the index until the first hit is pulled, and
//! dropping the pipeline abandons the query. A pipeline borrows the index
//! immutably, so it cannot outlive a read guard of a [`SharedIndex`].
//!
//! [`SharedIndex`]: crate::SharedIndex

mod filtered_stream;
mod paged_stream;
mod sorted_stream;

use crate::bounding_box::BoundingBox;
use crate::distance::DistanceMetric;
use crate::geometry::GeometryProvider;
use crate::predicate::SpatialPredicate;
use crate::rtree::{
    EntryDistance, GeometryRef, LeafEntry, NearestIter, PayloadId, RTreeIndex, SpatialResult,
    TreeStore,
};

use filtered_stream::FilteredStream;
use paged_stream::PagedStream;
use sorted_stream::SortedStream;

/// One result of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub entry: LeafEntry,
    /// Distance to the query origin, set by nearest sources and
    /// [`QueryPipeline::order_by_distance`]
    pub distance: Option<f64>,
}

impl QueryHit {
    pub fn new(entry: LeafEntry) -> Self {
        Self {
            entry,
            distance: None,
        }
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }

    #[inline]
    pub fn payload(&self) -> PayloadId {
        self.entry.payload
    }
}

type HitStream<'a> = Box<dyn Iterator<Item = SpatialResult<QueryHit>> + 'a>;

/// A composable, lazily evaluated spatial query.
///
/// The pipeline is itself an iterator of `SpatialResult<QueryHit>`. An error
/// from storage or from the geometry provider is yielded in place of a hit.
pub struct QueryPipeline<'a> {
    stream: HitStream<'a>,
    // hits arrive in ascending distance
    ordered: bool,
}

impl<'a> QueryPipeline<'a> {
    /// Wraps any stream of hits, for example the output of another pipeline.
    pub fn from_hits<I>(hits: I) -> Self
    where
        I: Iterator<Item = SpatialResult<QueryHit>> + 'a,
    {
        Self {
            stream: Box::new(hits),
            ordered: false,
        }
    }

    /// Entries whose box intersects `window`, edges inclusive.
    pub fn search<S: TreeStore + 'a>(index: &'a RTreeIndex<S>, window: &BoundingBox) -> Self {
        Self::from_hits(index.search(window).map(|entry| entry.map(QueryHit::new)))
    }

    /// Entries whose box lies entirely inside `window`.
    pub fn search_contained<S: TreeStore + 'a>(
        index: &'a RTreeIndex<S>,
        window: &BoundingBox,
    ) -> Self {
        Self::from_hits(
            index
                .search_contained(window)
                .map(|entry| entry.map(QueryHit::new)),
        )
    }

    /// The `k` entries nearest to `(x, y)` by box distance, nearest first.
    pub fn nearest<S: TreeStore + 'a>(index: &'a RTreeIndex<S>, x: f64, y: f64, k: usize) -> Self {
        Self::from_nearest(index.nearest(x, y, k))
    }

    /// The `k` entries nearest to `(x, y)` under `metric`, nearest first.
    ///
    /// ```rust
    /// use geoquery::{BoundingBox, DistanceMetric, QueryPipeline, RTreeConfig, RTreeIndex};
    ///
    /// # fn main() -> Result<(), geoquery::SpatialError> {
    /// let mut tree = RTreeIndex::in_memory(RTreeConfig::new())?;
    /// tree.insert(BoundingBox::point(2.35, 48.86), 1)?; // Paris
    /// tree.insert(BoundingBox::point(-0.13, 51.51), 2)?; // London
    /// tree.insert(BoundingBox::point(13.40, 52.52), 3)?; // Berlin
    ///
    /// // from Brussels, in meters along the great circle
    /// let hits = QueryPipeline::nearest_with_metric(&tree, 4.35, 50.85, 3, DistanceMetric::Haversine)
    ///     .range(0, 1)
    ///     .payloads()?;
    /// assert_eq!(hits, vec![1, 2]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn nearest_with_metric<S: TreeStore + 'a>(
        index: &'a RTreeIndex<S>,
        x: f64,
        y: f64,
        k: usize,
        metric: DistanceMetric,
    ) -> Self {
        Self::from_nearest(index.nearest_with_metric(x, y, k, metric))
    }

    /// The `k` entries whose geometry is nearest to `geometry`, nearest first.
    ///
    /// Subtrees are ranked by box distance from the geometry's envelope and
    /// entries by exact distance from the provider. An empty geometry has
    /// no neighbours.
    pub fn nearest_to_geometry<S, P>(
        index: &'a RTreeIndex<S>,
        provider: &'a P,
        geometry: GeometryRef,
        k: usize,
    ) -> Self
    where
        S: TreeStore + 'a,
        P: GeometryProvider + ?Sized + 'a,
    {
        let origin = match provider.bounding_box_of(geometry) {
            Ok(origin) => origin,
            Err(e) => return Self::from_hits(std::iter::once(Err(e))),
        };
        if origin.is_empty() {
            return Self::from_hits(std::iter::empty());
        }

        let distance: EntryDistance<'a> =
            Box::new(move |entry: &LeafEntry| provider.distance(geometry, entry.geometry));
        Self::from_nearest(NearestIter::new(
            index,
            origin,
            DistanceMetric::Euclidean,
            Some(distance),
            k,
        ))
    }

    fn from_nearest<S: TreeStore + 'a>(nearest: NearestIter<'a, S>) -> Self {
        Self {
            stream: Box::new(nearest.map(|hit| {
                hit.map(|(entry, distance)| QueryHit::new(entry).with_distance(distance))
            })),
            ordered: true,
        }
    }

    /// Keeps hits whose geometry satisfies `predicate`.
    pub fn filter<P>(self, provider: &'a P, predicate: SpatialPredicate) -> Self
    where
        P: GeometryProvider + ?Sized + 'a,
    {
        Self {
            stream: Box::new(FilteredStream::new(self.stream, provider, predicate)),
            ordered: self.ordered,
        }
    }

    /// Reorders every hit by ascending box distance to `(x, y)`.
    ///
    /// The whole upstream is buffered when the first hit is pulled.
    pub fn order_by_distance(self, x: f64, y: f64) -> Self {
        Self {
            stream: Box::new(SortedStream::new(self.stream, x, y)),
            ordered: true,
        }
    }

    /// Drops hits farther than `max_distance`, inclusive. On a nearest
    /// source or after [`order_by_distance`] the stream ends at the first
    /// hit beyond the bound. Hits without a distance never pass.
    ///
    /// [`order_by_distance`]: QueryPipeline::order_by_distance
    pub fn within(self, max_distance: f64) -> Self {
        let accept = move |hit: &SpatialResult<QueryHit>| match hit {
            Ok(hit) => hit.distance.is_some_and(|d| d <= max_distance),
            Err(_) => true,
        };

        let stream: HitStream<'a> = if self.ordered {
            Box::new(self.stream.take_while(accept))
        } else {
            Box::new(self.stream.filter(accept))
        };
        Self {
            stream,
            ordered: self.ordered,
        }
    }

    /// Skips `low` hits, then yields up to `high - low + 1`. Nothing when
    /// `high < low`.
    pub fn range(self, low: usize, high: usize) -> Self {
        Self {
            stream: Box::new(PagedStream::range(self.stream, low, high)),
            ordered: self.ordered,
        }
    }

    pub fn limit(self, n: usize) -> Self {
        Self {
            stream: Box::new(PagedStream::new(self.stream, 0, n)),
            ordered: self.ordered,
        }
    }

    /// Maps each hit that survives the previous stages.
    pub fn project<T, F>(self, mut f: F) -> impl Iterator<Item = SpatialResult<T>> + 'a
    where
        T: 'a,
        F: FnMut(QueryHit) -> T + 'a,
    {
        self.stream.map(move |hit| hit.map(&mut f))
    }

    /// Payload ids of the remaining hits, stopping at the first error.
    pub fn payloads(self) -> SpatialResult<Vec<PayloadId>> {
        self.project(|hit| hit.entry.payload).collect()
    }
}

impl Iterator for QueryPipeline<'_> {
    type Item = SpatialResult<QueryHit>;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream.next()
    }
}
