use crate::rtree::{SpatialError, SpatialResult};

use super::QueryHit;

/// Buffers the whole upstream on the first pull, then yields it by
/// ascending distance to a point. Equal distances keep ascending payload
/// order, then upstream order.
///
/// An upstream error is yielded alone and ends the stream.
pub(crate) struct SortedStream<'a> {
    raw_stream: Option<Box<dyn Iterator<Item = SpatialResult<QueryHit>> + 'a>>,
    origin: (f64, f64),
    sorted: std::vec::IntoIter<QueryHit>,
    error: Option<SpatialError>,
}

impl<'a> SortedStream<'a> {
    pub fn new(
        raw_stream: Box<dyn Iterator<Item = SpatialResult<QueryHit>> + 'a>,
        x: f64,
        y: f64,
    ) -> Self {
        SortedStream {
            raw_stream: Some(raw_stream),
            origin: (x, y),
            sorted: Vec::new().into_iter(),
            error: None,
        }
    }

    fn fill(&mut self, raw_stream: Box<dyn Iterator<Item = SpatialResult<QueryHit>> + 'a>) {
        let (x, y) = self.origin;
        let mut buffered = Vec::new();
        for hit in raw_stream {
            match hit {
                Ok(hit) => {
                    let distance = hit.entry.bbox.distance_to_point(x, y);
                    buffered.push(hit.with_distance(distance));
                }
                Err(e) => {
                    self.error = Some(e);
                    return;
                }
            }
        }

        buffered.sort_by(|a, b| {
            let a_distance = a.distance.unwrap_or(f64::INFINITY);
            let b_distance = b.distance.unwrap_or(f64::INFINITY);
            a_distance
                .total_cmp(&b_distance)
                .then_with(|| a.entry.payload.cmp(&b.entry.payload))
        });
        log::trace!("Reordered {} hits by distance to ({}, {})", buffered.len(), x, y);
        self.sorted = buffered.into_iter();
    }
}

impl Iterator for SortedStream<'_> {
    type Item = SpatialResult<QueryHit>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(raw_stream) = self.raw_stream.take() {
            self.fill(raw_stream);
        }
        if let Some(e) = self.error.take() {
            self.sorted = Vec::new().into_iter();
            return Some(Err(e));
        }
        self.sorted.next().map(Ok)
    }
}
