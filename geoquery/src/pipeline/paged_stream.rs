use crate::rtree::SpatialResult;

use super::QueryHit;

/// Skips the first `skip` hits, then yields at most `size` hits.
///
/// Errors are passed through without counting towards either bound.
pub(crate) struct PagedStream<'a> {
    raw_stream: Box<dyn Iterator<Item = SpatialResult<QueryHit>> + 'a>,
    skip: usize,
    remaining: usize,
}

impl<'a> PagedStream<'a> {
    pub fn new(
        raw_stream: Box<dyn Iterator<Item = SpatialResult<QueryHit>> + 'a>,
        skip: usize,
        size: usize,
    ) -> Self {
        PagedStream {
            raw_stream,
            skip,
            remaining: size,
        }
    }

    /// Inclusive page `[low, high]`; empty when `high < low`.
    pub fn range(
        raw_stream: Box<dyn Iterator<Item = SpatialResult<QueryHit>> + 'a>,
        low: usize,
        high: usize,
    ) -> Self {
        let size = if high < low {
            0
        } else {
            (high - low).saturating_add(1)
        };
        Self::new(raw_stream, low, size)
    }
}

impl Iterator for PagedStream<'_> {
    type Item = SpatialResult<QueryHit>;

    fn next(&mut self) -> Option<Self::Item> {
        // stop pulling upstream once the page is full
        if self.remaining == 0 {
            return None;
        }

        loop {
            match self.raw_stream.next()? {
                Ok(hit) => {
                    if self.skip > 0 {
                        self.skip -= 1;
                        continue;
                    }
                    self.remaining -= 1;
                    return Some(Ok(hit));
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
