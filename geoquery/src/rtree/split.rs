//! Node split strategies.
//!
//! When a node grows past the maximum fanout its entries are partitioned into
//! two groups. Both groups must hold at least the minimum fanout, otherwise the
//! split fails with [`SpatialError::SplitInvariantViolation`].
//!
//! Splits are deterministic for a given entry order: every tie is resolved in
//! favour of the entry that came first.

use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;

use super::rtree_types::{Bounded, SpatialError, SpatialResult};

/// The split algorithm used when a node overflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SplitStrategy {
    /// Guttman's quadratic-cost split. Seeds are the pair wasting the most
    /// area; remaining entries are placed by greatest preference first.
    #[default]
    Quadratic,
    /// Guttman's linear-cost split. Seeds are the pair with the greatest
    /// normalized separation; remaining entries are placed in order.
    Linear,
}

impl std::fmt::Display for SplitStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitStrategy::Quadratic => write!(f, "quadratic"),
            SplitStrategy::Linear => write!(f, "linear"),
        }
    }
}

impl SplitStrategy {
    /// Partitions `entries` into two groups of at least `min_fanout` each.
    pub fn split<T: Bounded>(
        &self,
        entries: Vec<T>,
        min_fanout: usize,
    ) -> SpatialResult<(Vec<T>, Vec<T>)> {
        if entries.len() < 2 {
            return Err(SpatialError::InvalidOperation(format!(
                "Cannot split a node holding {} entries",
                entries.len()
            )));
        }

        let (left, right) = match self {
            SplitStrategy::Quadratic => distribute(entries, min_fanout, quadratic_seeds, true),
            SplitStrategy::Linear => distribute(entries, min_fanout, linear_seeds, false),
        };

        if left.len() < min_fanout || right.len() < min_fanout {
            return Err(SpatialError::SplitInvariantViolation {
                left: left.len(),
                right: right.len(),
                min_fanout,
            });
        }

        log::trace!(
            "{} split into groups of {} and {} entries",
            self,
            left.len(),
            right.len()
        );
        Ok((left, right))
    }
}

/// One side of a split under construction.
struct Group<T> {
    items: Vec<T>,
    bbox: BoundingBox,
}

impl<T: Bounded> Group<T> {
    fn seeded(seed: T) -> Self {
        let bbox = *seed.bbox();
        Self {
            items: vec![seed],
            bbox,
        }
    }

    fn push(&mut self, item: T) {
        self.bbox = self.bbox.union(item.bbox());
        self.items.push(item);
    }
}

/// Seeds by maximum wasted area: `area(a ∪ b) - area(a) - area(b)`.
fn quadratic_seeds(boxes: &[BoundingBox]) -> (usize, usize) {
    let mut best = (0, 1);
    let mut best_waste = f64::NEG_INFINITY;

    for i in 0..boxes.len() {
        for j in (i + 1)..boxes.len() {
            let waste = boxes[i].union(&boxes[j]).area() - boxes[i].area() - boxes[j].area();
            if waste > best_waste {
                best_waste = waste;
                best = (i, j);
            }
        }
    }
    best
}

/// Seeds by greatest separation along either axis, normalized by the extent
/// of the whole set on that axis.
fn linear_seeds(boxes: &[BoundingBox]) -> (usize, usize) {
    let total = BoundingBox::union_all(boxes);
    let axes: [(fn(&BoundingBox) -> f64, fn(&BoundingBox) -> f64); 2] = [
        (|b| b.min_x, |b| b.max_x),
        (|b| b.min_y, |b| b.max_y),
    ];

    let mut best = (0, 1);
    let mut best_separation = f64::NEG_INFINITY;

    for (low, high) in axes {
        let mut highest_low = 0;
        let mut lowest_high = 0;
        for i in 1..boxes.len() {
            if low(&boxes[i]) > low(&boxes[highest_low]) {
                highest_low = i;
            }
            if high(&boxes[i]) < high(&boxes[lowest_high]) {
                lowest_high = i;
            }
        }

        if highest_low == lowest_high {
            // one entry is extreme on both sides; partner it with the next lowest high
            lowest_high = (0..boxes.len())
                .filter(|&i| i != highest_low)
                .min_by(|&a, &b| high(&boxes[a]).total_cmp(&high(&boxes[b])))
                .unwrap_or(if highest_low == 0 { 1 } else { 0 });
        }

        let width = high(&total) - low(&total);
        let separation = low(&boxes[highest_low]) - high(&boxes[lowest_high]);
        let normalized = if width > 0.0 {
            separation / width
        } else {
            separation
        };

        if normalized > best_separation {
            best_separation = normalized;
            best = (
                highest_low.min(lowest_high),
                highest_low.max(lowest_high),
            );
        }
    }
    best
}

/// True when an entry should join the first group: least enlargement, then
/// smaller area, then fewer entries, then the first group.
fn prefers_first<T>(first: &Group<T>, second: &Group<T>, d1: f64, d2: f64) -> bool {
    if d1 != d2 {
        return d1 < d2;
    }
    let (a1, a2) = (first.bbox.area(), second.bbox.area());
    if a1 != a2 {
        return a1 < a2;
    }
    first.items.len() <= second.items.len()
}

/// Seeds both groups, then assigns the rest. With `pick_next` the entry with
/// the greatest enlargement difference goes first (quadratic); otherwise
/// entries are taken in their original order (linear).
fn distribute<T: Bounded>(
    entries: Vec<T>,
    min_fanout: usize,
    seeds: fn(&[BoundingBox]) -> (usize, usize),
    pick_next: bool,
) -> (Vec<T>, Vec<T>) {
    let boxes: Vec<BoundingBox> = entries.iter().map(|e| *e.bbox()).collect();
    let (seed_a, seed_b) = seeds(&boxes);

    let mut slots: Vec<Option<T>> = entries.into_iter().map(Some).collect();
    let mut pending: Vec<usize> = (0..slots.len())
        .filter(|&i| i != seed_a && i != seed_b)
        .collect();

    let (Some(first_seed), Some(second_seed)) = (slots[seed_a].take(), slots[seed_b].take()) else {
        // seeds are always two distinct in-range indices
        return (Vec::new(), Vec::new());
    };
    let mut first = Group::seeded(first_seed);
    let mut second = Group::seeded(second_seed);

    while !pending.is_empty() {
        if first.items.len() + pending.len() <= min_fanout {
            pending
                .drain(..)
                .filter_map(|i| slots[i].take())
                .for_each(|item| first.push(item));
            break;
        }
        if second.items.len() + pending.len() <= min_fanout {
            pending
                .drain(..)
                .filter_map(|i| slots[i].take())
                .for_each(|item| second.push(item));
            break;
        }

        let position = if pick_next {
            let mut best_position = 0;
            let mut best_difference = f64::NEG_INFINITY;
            for (position, &i) in pending.iter().enumerate() {
                let difference = (first.bbox.enlargement(&boxes[i])
                    - second.bbox.enlargement(&boxes[i]))
                .abs();
                if difference > best_difference {
                    best_difference = difference;
                    best_position = position;
                }
            }
            best_position
        } else {
            0
        };

        let i = pending.remove(position);
        let d1 = first.bbox.enlargement(&boxes[i]);
        let d2 = second.bbox.enlargement(&boxes[i]);
        let to_first = prefers_first(&first, &second, d1, d2);

        if let Some(item) = slots[i].take() {
            if to_first {
                first.push(item);
            } else {
                second.push(item);
            }
        }
    }

    (first.items, second.items)
}
