//! Distance metrics for nearest-neighbour search.
//!
//! A metric measures from a query origin to an indexed bounding box. The
//! nearest-neighbour traversal ranks subtrees by that distance, so it must
//! never exceed the distance to anything inside the box.

use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;
use crate::rtree::{SpatialError, SpatialResult};

/// How distances from a query origin are measured.
///
/// ```rust
/// use geoquery::{BoundingBox, DistanceMetric};
///
/// // one degree of latitude on the mean earth sphere
/// let d = DistanceMetric::Haversine.point_to_box(15.0, 15.0, &BoundingBox::point(15.0, 16.0));
/// assert!((d - 111_195.0).abs() < 1.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Planar distance in coordinate units.
    #[default]
    Euclidean,
    /// Great-circle distance in meters on the mean earth sphere. `x` is read
    /// as longitude and `y` as latitude, both in degrees.
    Haversine,
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMetric::Euclidean => write!(f, "euclidean"),
            DistanceMetric::Haversine => write!(f, "haversine"),
        }
    }
}

impl DistanceMetric {
    /// Checks that this metric can measure from `origin`.
    ///
    /// Haversine distances are measured from a single longitude/latitude
    /// point; any valid box works for the Euclidean metric.
    pub fn check_origin(&self, origin: &BoundingBox) -> SpatialResult<()> {
        origin.validate()?;
        match self {
            DistanceMetric::Euclidean => Ok(()),
            DistanceMetric::Haversine => {
                let (lon, lat) = (origin.min_x, origin.min_y);
                let on_globe = (-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat);
                if origin.is_point() && on_globe {
                    Ok(())
                } else {
                    Err(SpatialError::InvalidOperation(format!(
                        "{} is not a longitude/latitude point",
                        origin
                    )))
                }
            }
        }
    }

    /// Smallest distance from `origin` to any point of `bbox`. For the
    /// Haversine metric `origin` is expected to be a point.
    pub fn box_distance(&self, origin: &BoundingBox, bbox: &BoundingBox) -> f64 {
        match self {
            DistanceMetric::Euclidean => origin.distance_to(bbox),
            DistanceMetric::Haversine => haversine_to_box(origin.min_x, origin.min_y, bbox),
        }
    }

    /// Smallest distance from the point `(x, y)` to any point of `bbox`.
    pub fn point_to_box(&self, x: f64, y: f64, bbox: &BoundingBox) -> f64 {
        self.box_distance(&BoundingBox::point(x, y), bbox)
    }
}

/// Great-circle distance from `(lon, lat)` to the nearest point of a
/// longitude/latitude box.
///
/// With the origin's longitude inside the box the nearest point lies on the
/// origin's own meridian. Otherwise it lies on one of the two edge meridians,
/// because for any latitude the distance shrinks as the longitude gap does.
fn haversine_to_box(lon: f64, lat: f64, bbox: &BoundingBox) -> f64 {
    if !bbox.is_valid() {
        return f64::INFINITY;
    }
    let origin = Point::new(lon, lat);
    let min_lat = bbox.min_y.clamp(-90.0, 90.0);
    let max_lat = bbox.max_y.clamp(-90.0, 90.0);

    if lon >= bbox.min_x && lon <= bbox.max_x {
        return Haversine.distance(origin, Point::new(lon, lat.clamp(min_lat, max_lat)));
    }

    meridian_distance(origin, bbox.min_x, min_lat, max_lat)
        .min(meridian_distance(origin, bbox.max_x, min_lat, max_lat))
}

/// Great-circle distance from `origin` to the meridian arc at `lon` between
/// `min_lat` and `max_lat`.
///
/// Along a meridian the cosine of the central angle is a sinusoid in the
/// latitude, peaking at `atan2(sin φ, cos φ · cos Δλ)`. The nearest point is
/// that peak when it falls on the arc, otherwise one of the arc's ends.
fn meridian_distance(origin: Point, lon: f64, min_lat: f64, max_lat: f64) -> f64 {
    let phi = origin.y().to_radians();
    let delta_lon = (lon - origin.x()).to_radians();
    let peak = phi.sin().atan2(phi.cos() * delta_lon.cos()).to_degrees();

    [min_lat, max_lat, peak]
        .into_iter()
        .filter(|candidate| (min_lat..=max_lat).contains(candidate))
        .map(|candidate| Haversine.distance(origin, Point::new(lon, candidate)))
        .fold(f64::INFINITY, f64::min)
}
