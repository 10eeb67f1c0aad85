use serde::{Deserialize, Serialize};

use crate::rtree::rtree_constants::{DEFAULT_MAX_FANOUT, DEFAULT_MIN_FANOUT};
use crate::rtree::{SpatialError, SpatialResult, SplitStrategy};

/// R-Tree shape configuration.
///
/// Holds the fanout bounds and the split strategy used when a node
/// overflows. Built with chained setters and checked with
/// [`validate`](RTreeConfig::validate) when an index is opened.
///
/// Defaults:
/// - max fanout: 64
/// - min fanout: 25
/// - split strategy: quadratic
///
/// The struct is serde-serializable so a host can keep it alongside its own
/// settings; missing fields fall back to the defaults.
///
/// ```rust
/// use geoquery::{RTreeConfig, SplitStrategy};
///
/// let config = RTreeConfig::new()
///     .max_fanout(8)
///     .min_fanout(3)
///     .split_strategy(SplitStrategy::Linear);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RTreeConfig {
    max_fanout: usize,
    min_fanout: usize,
    split_strategy: SplitStrategy,
}

impl Default for RTreeConfig {
    fn default() -> Self {
        Self {
            max_fanout: DEFAULT_MAX_FANOUT,
            min_fanout: DEFAULT_MIN_FANOUT,
            split_strategy: SplitStrategy::default(),
        }
    }
}

impl RTreeConfig {
    /// Creates a configuration with default values.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of entries per node.
    #[inline]
    pub fn max_fanout(mut self, max_fanout: usize) -> Self {
        self.max_fanout = max_fanout;
        self
    }

    /// Sets the minimum number of entries per non-root node.
    #[inline]
    pub fn min_fanout(mut self, min_fanout: usize) -> Self {
        self.min_fanout = min_fanout;
        self
    }

    /// Sets the overflow split algorithm.
    #[inline]
    pub fn split_strategy(mut self, split_strategy: SplitStrategy) -> Self {
        self.split_strategy = split_strategy;
        self
    }

    #[inline]
    pub fn get_max_fanout(&self) -> usize {
        self.max_fanout
    }

    #[inline]
    pub fn get_min_fanout(&self) -> usize {
        self.min_fanout
    }

    #[inline]
    pub fn get_split_strategy(&self) -> SplitStrategy {
        self.split_strategy
    }

    /// Checks that the bounds allow every split to produce two legal nodes:
    /// `max_fanout >= 2` and `1 <= min_fanout <= max_fanout / 2`.
    pub fn validate(&self) -> SpatialResult<()> {
        if self.max_fanout < 2 {
            return Err(SpatialError::InvalidConfiguration(format!(
                "max_fanout must be at least 2, got {}",
                self.max_fanout
            )));
        }
        if self.min_fanout == 0 || self.min_fanout > self.max_fanout / 2 {
            return Err(SpatialError::InvalidConfiguration(format!(
                "min_fanout must be between 1 and {} (max_fanout / 2), got {}",
                self.max_fanout / 2,
                self.min_fanout
            )));
        }
        Ok(())
    }
}
