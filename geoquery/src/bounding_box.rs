use std::hash::Hash;

use crate::rtree::{SpatialError, SpatialResult};

/// A 2D axis-aligned bounding box represented by minimum and maximum coordinates.
///
/// `BoundingBox` is the key of every R-Tree entry. It is a plain value: new boxes
/// are produced by [`union`](BoundingBox::union) and
/// [`intersection`](BoundingBox::intersection), never by mutating a box shared
/// with someone else.
///
/// A box is valid when `min <= max` holds on both axes. A degenerate (point) box
/// has `min == max` on both axes and is perfectly valid.
///
/// # Examples
///
/// ```rust
/// use geoquery::BoundingBox;
///
/// let bbox = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
/// assert!(bbox.contains_point(50.0, 50.0));
/// assert_eq!(bbox.area(), 10_000.0);
/// ```
#[derive(Clone, Copy, Default, Debug, serde::Deserialize, serde::Serialize)]
pub struct BoundingBox {
    /// Minimum X coordinate
    pub min_x: f64,
    /// Minimum Y coordinate
    pub min_y: f64,
    /// Maximum X coordinate
    pub max_x: f64,
    /// Maximum Y coordinate
    pub max_y: f64,
}

/// Folds `-0.0` into `0.0` so equality, ordering and hashing agree.
#[inline]
fn canonical(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}

impl BoundingBox {
    fn canonical_coords(&self) -> [f64; 4] {
        [
            canonical(self.min_x),
            canonical(self.min_y),
            canonical(self.max_x),
            canonical(self.max_y),
        ]
    }
}

impl PartialEq for BoundingBox {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for BoundingBox {}

impl PartialOrd for BoundingBox {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BoundingBox {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let (a, b) = (self.canonical_coords(), other.canonical_coords());
        a[0].total_cmp(&b[0])
            .then(a[1].total_cmp(&b[1]))
            .then(a[2].total_cmp(&b[2]))
            .then(a[3].total_cmp(&b[3]))
    }
}

impl Hash for BoundingBox {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for coord in self.canonical_coords() {
            coord.to_bits().hash(state);
        }
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BoundingBox({}, {}, {}, {})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

impl BoundingBox {
    /// Creates a new bounding box with the specified coordinates.
    ///
    /// No validation happens here; operations that store a box call
    /// [`validate`](BoundingBox::validate) before touching the tree.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> BoundingBox {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Creates a degenerate box covering a single point.
    pub fn point(x: f64, y: f64) -> BoundingBox {
        BoundingBox::new(x, y, x, y)
    }

    /// The identity element for [`union`](BoundingBox::union).
    ///
    /// Inverted infinite bounds, so it is never valid and intersects nothing.
    pub fn empty() -> BoundingBox {
        BoundingBox::new(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        )
    }

    /// Returns true for inverted boxes such as [`BoundingBox::empty`].
    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Computes the union of all boxes, or [`BoundingBox::empty`] for none.
    pub fn union_all<'a, I>(boxes: I) -> BoundingBox
    where
        I: IntoIterator<Item = &'a BoundingBox>,
    {
        boxes
            .into_iter()
            .fold(BoundingBox::empty(), |acc, b| acc.union(b))
    }

    /// Returns the width of the bounding box.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Returns the height of the bounding box.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Returns the area of the bounding box. Empty boxes and boxes that are
    /// flat on one axis have zero area, even when the other axis is infinite.
    pub fn area(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let (width, height) = (self.width(), self.height());
        if width == 0.0 || height == 0.0 {
            return 0.0;
        }
        width * height
    }

    /// Half perimeter of the box.
    pub fn margin(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.width() + self.height()
    }

    /// Area growth needed for this box to also cover `other`.
    ///
    /// Zero when `other` is already covered. Growth between two infinite
    /// areas is reported as infinite rather than NaN.
    pub fn enlargement(&self, other: &BoundingBox) -> f64 {
        if self.contains(other) {
            return 0.0;
        }
        let growth = self.union(other).area() - self.area();
        if growth.is_nan() {
            f64::INFINITY
        } else {
            growth
        }
    }

    /// Returns the center point of the bounding box.
    pub fn center(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    /// Checks if this bounding box contains a point (edges included).
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Checks if this bounding box contains another bounding box (edges included).
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Checks if this bounding box intersects another bounding box.
    ///
    /// Touching edges and corners count as an intersection.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Returns the union of this bounding box with another.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Returns the intersection of this bounding box with another, if they intersect.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }
        Some(BoundingBox::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        ))
    }

    /// Minimum Euclidean distance from a point to this box; zero inside.
    pub fn distance_to_point(&self, x: f64, y: f64) -> f64 {
        let dx = (self.min_x - x).max(x - self.max_x).max(0.0);
        let dy = (self.min_y - y).max(y - self.max_y).max(0.0);
        dx.hypot(dy)
    }

    /// Minimum Euclidean distance between two boxes; zero when they intersect.
    pub fn distance_to(&self, other: &BoundingBox) -> f64 {
        let dx = (self.min_x - other.max_x).max(other.min_x - self.max_x).max(0.0);
        let dy = (self.min_y - other.max_y).max(other.min_y - self.max_y).max(0.0);
        dx.hypot(dy)
    }

    /// Checks if this bounding box is a point (zero area).
    pub fn is_point(&self) -> bool {
        self.min_x == self.max_x && self.min_y == self.max_y
    }

    /// Checks if this bounding box is valid (min <= max, no NaN).
    pub fn is_valid(&self) -> bool {
        // NaN fails both comparisons
        self.min_x <= self.max_x && self.min_y <= self.max_y
    }

    /// Returns an `InvalidBoundingBox` error unless the box is valid.
    pub fn validate(&self) -> SpatialResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(SpatialError::InvalidBoundingBox(*self))
        }
    }
}
