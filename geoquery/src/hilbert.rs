//! Hilbert curve ordering for bulk loading.
//!
//! Box centers are mapped onto a Hilbert curve laid over the extent of the
//! whole input, so neighbouring boxes end up next to each other once sorted.

use crate::bounding_box::BoundingBox;
use crate::rtree::Bounded;

/// Maximum supported curve order (bits per axis).
const MAX_HILBERT_ORDER: u32 = 32;

/// Curve index of a point in the unit square.
///
/// Coordinates outside `[0, 1]` are clamped to the nearest grid cell.
pub fn hilbert_index(x: f64, y: f64, order: u32) -> u64 {
    let order = order.clamp(1, MAX_HILBERT_ORDER);
    let n = 1u64 << order;
    let scale = n as f64 - 0.5;

    let xi = ((x.clamp(0.0, 1.0) * scale) as u64).min(n - 1);
    let yi = ((y.clamp(0.0, 1.0) * scale) as u64).min(n - 1);

    xy2d(n, xi, yi)
}

/// Curve index of a point inside `extent`. A flat axis maps to the middle.
pub fn hilbert_index_in(x: f64, y: f64, extent: &BoundingBox, order: u32) -> u64 {
    let normalize = |v: f64, lo: f64, hi: f64| {
        let range = hi - lo;
        if range > 0.0 {
            (v - lo) / range
        } else {
            0.5
        }
    };

    hilbert_index(
        normalize(x, extent.min_x, extent.max_x),
        normalize(y, extent.min_y, extent.max_y),
        order,
    )
}

/// Stable sort by the curve index of each box center, normalized to the
/// extent of all items.
pub fn sort_by_hilbert<T: Bounded>(items: &mut Vec<T>, order: u32) {
    let extent = BoundingBox::union_all(items.iter().map(|item| item.bbox()));
    if extent.is_empty() {
        return;
    }

    let mut keyed: Vec<(u64, T)> = items
        .drain(..)
        .map(|item| {
            let (cx, cy) = item.bbox().center();
            (hilbert_index_in(cx, cy, &extent, order), item)
        })
        .collect();

    keyed.sort_by_key(|(key, _)| *key);
    items.extend(keyed.into_iter().map(|(_, item)| item));
}

fn xy2d(n: u64, mut x: u64, mut y: u64) -> u64 {
    let mut d = 0u64;
    let mut s = n / 2;

    while s > 0 {
        let rx = ((x & s) > 0) as u64;
        let ry = ((y & s) > 0) as u64;
        d += s * s * ((3 * rx) ^ ry);
        rotate(s, &mut x, &mut y, rx, ry);
        s /= 2;
    }

    d
}

fn rotate(n: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = n.wrapping_sub(1).wrapping_sub(*x);
            *y = n.wrapping_sub(1).wrapping_sub(*y);
        }
        std::mem::swap(x, y);
    }
}
