//! Exact geometry behind the index.
//!
//! The tree only ever sees bounding boxes and opaque [`GeometryRef`]s. Exact
//! relations and distances are answered by a [`GeometryProvider`], which
//! the [`PredicateEvaluator`](crate::PredicateEvaluator) and the query
//! pipeline consult once the box-level checks are inconclusive.
//!
//! [`GeometryStore`] is the provided implementation: an in-memory map of
//! `geo` geometries evaluated with `geo`'s DE-9IM [`Relate`] support and
//! Euclidean distance.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};

use geo::relate::IntersectionMatrix;
use geo::{BoundingRect, Coord, Distance, Euclidean, Geometry, Line, Point, Rect, Relate};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;
use crate::rtree::{GeometryRef, SpatialError, SpatialResult};

/// Topological relations decided from the DE-9IM intersection matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    Contains,
    CoveredBy,
    Covers,
    Crosses,
    Disjoint,
    Intersects,
    Overlaps,
    Touches,
    Within,
}

impl Relation {
    pub const ALL: [Relation; 9] = [
        Relation::Contains,
        Relation::CoveredBy,
        Relation::Covers,
        Relation::Crosses,
        Relation::Disjoint,
        Relation::Intersects,
        Relation::Overlaps,
        Relation::Touches,
        Relation::Within,
    ];

    /// The relation that holds with the operands swapped.
    pub fn converse(self) -> Relation {
        match self {
            Relation::Contains => Relation::Within,
            Relation::Within => Relation::Contains,
            Relation::Covers => Relation::CoveredBy,
            Relation::CoveredBy => Relation::Covers,
            symmetric => symmetric,
        }
    }

    pub fn holds_in(self, matrix: &IntersectionMatrix) -> bool {
        match self {
            Relation::Contains => matrix.is_contains(),
            Relation::CoveredBy => matrix.is_coveredby(),
            Relation::Covers => matrix.is_covers(),
            Relation::Crosses => matrix.is_crosses(),
            Relation::Disjoint => matrix.is_disjoint(),
            Relation::Intersects => matrix.is_intersects(),
            Relation::Overlaps => matrix.is_overlaps(),
            Relation::Touches => matrix.is_touches(),
            Relation::Within => matrix.is_within(),
        }
    }
}

impl Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Relation::Contains => "contains",
            Relation::CoveredBy => "coveredBy",
            Relation::Covers => "covers",
            Relation::Crosses => "crosses",
            Relation::Disjoint => "disjoint",
            Relation::Intersects => "intersects",
            Relation::Overlaps => "overlaps",
            Relation::Touches => "touches",
            Relation::Within => "within",
        };
        write!(f, "{}", name)
    }
}

/// Source of exact geometry for the references stored in the index.
///
/// Every method fails with [`SpatialError::GeometryNotFound`] for an
/// unknown reference and with nothing else.
pub trait GeometryProvider: Send + Sync {
    /// Envelope of the geometry; [`BoundingBox::empty`] for an empty geometry.
    fn bounding_box_of(&self, geometry: GeometryRef) -> SpatialResult<BoundingBox>;

    /// Whether `relation` holds from `a` to `b`.
    fn exact_relation(
        &self,
        a: GeometryRef,
        b: GeometryRef,
        relation: Relation,
    ) -> SpatialResult<bool>;

    /// Whether `relation` holds from the geometry to an axis-aligned window.
    fn exact_window_relation(
        &self,
        geometry: GeometryRef,
        window: &BoundingBox,
        relation: Relation,
    ) -> SpatialResult<bool>;

    /// Minimum Euclidean distance; infinite when either side is empty.
    fn distance(&self, a: GeometryRef, b: GeometryRef) -> SpatialResult<f64>;
}

/// Envelope of a `geo` geometry, [`BoundingBox::empty`] when it has no points.
pub fn bounding_box(geometry: &Geometry<f64>) -> BoundingBox {
    match geometry.bounding_rect() {
        Some(rect) => BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y),
        None => BoundingBox::empty(),
    }
}

/// The geometry a window stands for: a polygon, or a line or point when
/// the window is flat.
pub fn window_geometry(window: &BoundingBox) -> Geometry<f64> {
    let min = Coord {
        x: window.min_x,
        y: window.min_y,
    };
    let max = Coord {
        x: window.max_x,
        y: window.max_y,
    };

    match (window.width() == 0.0, window.height() == 0.0) {
        (true, true) => Geometry::Point(Point(min)),
        (true, false) | (false, true) => Geometry::Line(Line::new(min, max)),
        (false, false) => Geometry::Polygon(Rect::new(min, max).to_polygon()),
    }
}

/// Evaluates `relation` between two geometries.
///
/// An empty geometry is disjoint from everything and takes part in no
/// other relation.
pub fn relate(a: &Geometry<f64>, b: &Geometry<f64>, relation: Relation) -> bool {
    if is_empty(a) || is_empty(b) {
        return relation == Relation::Disjoint;
    }
    relation.holds_in(&a.relate(b))
}

/// Minimum Euclidean distance, infinite when either side is empty.
pub fn distance(a: &Geometry<f64>, b: &Geometry<f64>) -> f64 {
    if is_empty(a) || is_empty(b) {
        return f64::INFINITY;
    }
    Euclidean.distance(a, b)
}

fn is_empty(geometry: &Geometry<f64>) -> bool {
    geometry.bounding_rect().is_none()
}

/// In-memory [`GeometryProvider`] over `geo::Geometry<f64>` values.
///
/// Reads share a lock, so the store can be consulted from several query
/// threads while new geometries are added.
#[derive(Debug)]
pub struct GeometryStore {
    geometries: RwLock<HashMap<GeometryRef, Geometry<f64>>>,
    next_ref: AtomicU64,
}

impl GeometryStore {
    pub fn new() -> Self {
        Self {
            geometries: RwLock::new(HashMap::new()),
            next_ref: AtomicU64::new(1),
        }
    }

    /// Stores a geometry under a fresh reference.
    pub fn add(&self, geometry: impl Into<Geometry<f64>>) -> GeometryRef {
        let geometry_ref = self.next_ref.fetch_add(1, Ordering::Relaxed);
        self.geometries.write().insert(geometry_ref, geometry.into());
        geometry_ref
    }

    /// Stores a geometry under a caller-chosen reference, returning the
    /// geometry it replaces.
    pub fn insert(
        &self,
        geometry_ref: GeometryRef,
        geometry: impl Into<Geometry<f64>>,
    ) -> Option<Geometry<f64>> {
        self.next_ref
            .fetch_max(geometry_ref.saturating_add(1), Ordering::Relaxed);
        self.geometries.write().insert(geometry_ref, geometry.into())
    }

    pub fn remove(&self, geometry_ref: GeometryRef) -> Option<Geometry<f64>> {
        self.geometries.write().remove(&geometry_ref)
    }

    pub fn get(&self, geometry_ref: GeometryRef) -> Option<Geometry<f64>> {
        self.geometries.read().get(&geometry_ref).cloned()
    }

    pub fn contains(&self, geometry_ref: GeometryRef) -> bool {
        self.geometries.read().contains_key(&geometry_ref)
    }

    pub fn len(&self) -> usize {
        self.geometries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.read().is_empty()
    }

    fn with_geometry<R>(
        &self,
        geometry_ref: GeometryRef,
        f: impl FnOnce(&Geometry<f64>) -> R,
    ) -> SpatialResult<R> {
        let geometries = self.geometries.read();
        geometries
            .get(&geometry_ref)
            .map(f)
            .ok_or(SpatialError::GeometryNotFound(geometry_ref))
    }

    fn with_pair<R>(
        &self,
        a: GeometryRef,
        b: GeometryRef,
        f: impl FnOnce(&Geometry<f64>, &Geometry<f64>) -> R,
    ) -> SpatialResult<R> {
        let geometries = self.geometries.read();
        let first = geometries.get(&a).ok_or(SpatialError::GeometryNotFound(a))?;
        let second = geometries.get(&b).ok_or(SpatialError::GeometryNotFound(b))?;
        Ok(f(first, second))
    }
}

impl Default for GeometryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GeometryProvider for GeometryStore {
    fn bounding_box_of(&self, geometry: GeometryRef) -> SpatialResult<BoundingBox> {
        self.with_geometry(geometry, bounding_box)
    }

    fn exact_relation(
        &self,
        a: GeometryRef,
        b: GeometryRef,
        relation: Relation,
    ) -> SpatialResult<bool> {
        self.with_pair(a, b, |first, second| relate(first, second, relation))
    }

    fn exact_window_relation(
        &self,
        geometry: GeometryRef,
        window: &BoundingBox,
        relation: Relation,
    ) -> SpatialResult<bool> {
        let window = window_geometry(window);
        self.with_geometry(geometry, |g| relate(g, &window, relation))
    }

    fn distance(&self, a: GeometryRef, b: GeometryRef) -> SpatialResult<f64> {
        self.with_pair(a, b, distance)
    }
}
