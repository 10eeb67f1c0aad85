//! Spatial relation predicates.
//!
//! Every relation is answered in two phases:
//! 1. **Box phase**: the bounding boxes of both operands often decide the
//!    answer on their own (disjoint boxes, a box that cannot contain the
//!    other, an empty geometry).
//! 2. **Exact phase**: otherwise the [`GeometryProvider`] evaluates the
//!    DE-9IM relation on the real geometries.
//!
//! The box phase never changes an answer, it only avoids exact work.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;
use crate::geometry::{GeometryProvider, Relation};
use crate::rtree::{GeometryRef, LeafEntry, SpatialResult};

/// Outcome of comparing bounding boxes only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxVerdict {
    /// The relation holds whatever the exact geometries are
    Holds,
    /// The relation cannot hold
    Fails,
    /// Only the exact geometries can tell
    Undecided,
}

/// Decides `relation` from `a` to `b` using their bounding boxes alone.
///
/// An empty box stands for an empty geometry, which is disjoint from
/// everything and satisfies no other relation.
pub fn box_verdict(relation: Relation, a: &BoundingBox, b: &BoundingBox) -> BoxVerdict {
    if a.is_empty() || b.is_empty() {
        return match relation {
            Relation::Disjoint => BoxVerdict::Holds,
            _ => BoxVerdict::Fails,
        };
    }

    if !a.intersects(b) {
        return match relation {
            Relation::Disjoint => BoxVerdict::Holds,
            _ => BoxVerdict::Fails,
        };
    }

    match relation {
        Relation::Contains | Relation::Covers if !a.contains(b) => BoxVerdict::Fails,
        Relation::Within | Relation::CoveredBy if !b.contains(a) => BoxVerdict::Fails,
        _ => BoxVerdict::Undecided,
    }
}

/// A predicate applied to the geometry of each candidate entry, which is
/// always the left operand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpatialPredicate {
    Contains(GeometryRef),
    CoveredBy(GeometryRef),
    Covers(GeometryRef),
    Crosses(GeometryRef),
    Disjoint(GeometryRef),
    Intersects(GeometryRef),
    Overlaps(GeometryRef),
    Touches(GeometryRef),
    Within(GeometryRef),
    /// Intersects an axis-aligned window
    IntersectsWindow(BoundingBox),
    /// Minimum distance to the geometry at most the given distance
    WithinDistance(GeometryRef, f64),
}

impl SpatialPredicate {
    /// The DE-9IM relation and its right operand, for the geometry-to-geometry forms.
    pub fn relation(&self) -> Option<(Relation, GeometryRef)> {
        match *self {
            SpatialPredicate::Contains(other) => Some((Relation::Contains, other)),
            SpatialPredicate::CoveredBy(other) => Some((Relation::CoveredBy, other)),
            SpatialPredicate::Covers(other) => Some((Relation::Covers, other)),
            SpatialPredicate::Crosses(other) => Some((Relation::Crosses, other)),
            SpatialPredicate::Disjoint(other) => Some((Relation::Disjoint, other)),
            SpatialPredicate::Intersects(other) => Some((Relation::Intersects, other)),
            SpatialPredicate::Overlaps(other) => Some((Relation::Overlaps, other)),
            SpatialPredicate::Touches(other) => Some((Relation::Touches, other)),
            SpatialPredicate::Within(other) => Some((Relation::Within, other)),
            SpatialPredicate::IntersectsWindow(_) | SpatialPredicate::WithinDistance(..) => None,
        }
    }
}

impl Display for SpatialPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialPredicate::IntersectsWindow(window) => write!(f, "intersectsWindow({})", window),
            SpatialPredicate::WithinDistance(other, distance) => {
                write!(f, "withinDistance(#{}, {})", other, distance)
            }
            predicate => match predicate.relation() {
                Some((relation, other)) => write!(f, "{}(#{})", relation, other),
                None => write!(f, "{:?}", predicate),
            },
        }
    }
}

/// Evaluates spatial relations between geometries known to a provider.
///
/// Each method returns `Ok(bool)`; the only error is an unknown geometry
/// reference (or a malformed window for [`intersects_window`]).
///
/// [`intersects_window`]: PredicateEvaluator::intersects_window
pub struct PredicateEvaluator<'p, P: GeometryProvider + ?Sized> {
    provider: &'p P,
}

impl<'p, P: GeometryProvider + ?Sized> PredicateEvaluator<'p, P> {
    pub fn new(provider: &'p P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &'p P {
        self.provider
    }

    /// `b` lies in `a` and at least one interior point is shared.
    pub fn contains(&self, a: GeometryRef, b: GeometryRef) -> SpatialResult<bool> {
        self.relate(a, b, Relation::Contains)
    }

    /// No point of `a` lies outside `b`; boundaries may touch.
    pub fn covered_by(&self, a: GeometryRef, b: GeometryRef) -> SpatialResult<bool> {
        self.relate(a, b, Relation::CoveredBy)
    }

    pub fn covers(&self, a: GeometryRef, b: GeometryRef) -> SpatialResult<bool> {
        self.relate(a, b, Relation::Covers)
    }

    pub fn crosses(&self, a: GeometryRef, b: GeometryRef) -> SpatialResult<bool> {
        self.relate(a, b, Relation::Crosses)
    }

    pub fn disjoint(&self, a: GeometryRef, b: GeometryRef) -> SpatialResult<bool> {
        self.relate(a, b, Relation::Disjoint)
    }

    pub fn intersects(&self, a: GeometryRef, b: GeometryRef) -> SpatialResult<bool> {
        self.relate(a, b, Relation::Intersects)
    }

    /// Interiors meet and each has points outside the other. Touching is not overlapping.
    pub fn overlaps(&self, a: GeometryRef, b: GeometryRef) -> SpatialResult<bool> {
        self.relate(a, b, Relation::Overlaps)
    }

    /// Only boundaries meet.
    pub fn touches(&self, a: GeometryRef, b: GeometryRef) -> SpatialResult<bool> {
        self.relate(a, b, Relation::Touches)
    }

    pub fn within(&self, a: GeometryRef, b: GeometryRef) -> SpatialResult<bool> {
        self.relate(a, b, Relation::Within)
    }

    /// Whether the geometry shares at least one point with the window.
    ///
    /// A flat window is treated as the line or point it degenerates to.
    pub fn intersects_window(
        &self,
        geometry: GeometryRef,
        window: &BoundingBox,
    ) -> SpatialResult<bool> {
        window.validate()?;
        let bbox = self.provider.bounding_box_of(geometry)?;

        if bbox.is_empty() || !window.intersects(&bbox) {
            return Ok(false);
        }
        if window.contains(&bbox) {
            return Ok(true);
        }
        self.provider
            .exact_window_relation(geometry, window, Relation::Intersects)
    }

    /// Whether the minimum Euclidean distance between `a` and `b` is at most
    /// `distance`. Empty geometries are never within any distance.
    pub fn within_distance(
        &self,
        a: GeometryRef,
        b: GeometryRef,
        distance: f64,
    ) -> SpatialResult<bool> {
        let a_box = self.provider.bounding_box_of(a)?;
        let b_box = self.provider.bounding_box_of(b)?;

        if a_box.is_empty() || b_box.is_empty() || distance.is_nan() || distance < 0.0 {
            return Ok(false);
        }
        if a_box.distance_to(&b_box) > distance {
            return Ok(false);
        }
        Ok(self.provider.distance(a, b)? <= distance)
    }

    /// Applies `predicate` with `geometry` as the left operand.
    pub fn evaluate(
        &self,
        geometry: GeometryRef,
        predicate: &SpatialPredicate,
    ) -> SpatialResult<bool> {
        match *predicate {
            SpatialPredicate::IntersectsWindow(window) => self.intersects_window(geometry, &window),
            SpatialPredicate::WithinDistance(other, distance) => {
                self.within_distance(geometry, other, distance)
            }
            _ => match predicate.relation() {
                Some((relation, other)) => self.relate(geometry, other, relation),
                None => Ok(false),
            },
        }
    }

    /// Applies `predicate` to the geometry of an index entry.
    pub fn matches_entry(
        &self,
        entry: &LeafEntry,
        predicate: &SpatialPredicate,
    ) -> SpatialResult<bool> {
        self.evaluate(entry.geometry, predicate)
    }

    fn relate(&self, a: GeometryRef, b: GeometryRef, relation: Relation) -> SpatialResult<bool> {
        let a_box = self.provider.bounding_box_of(a)?;
        let b_box = self.provider.bounding_box_of(b)?;

        match box_verdict(relation, &a_box, &b_box) {
            BoxVerdict::Holds => Ok(true),
            BoxVerdict::Fails => Ok(false),
            BoxVerdict::Undecided => self.provider.exact_relation(a, b, relation),
        }
    }
}
