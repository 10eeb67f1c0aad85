use crate::geometry::GeometryProvider;
use crate::predicate::{PredicateEvaluator, SpatialPredicate};
use crate::rtree::SpatialResult;

use super::QueryHit;

pub(crate) struct FilteredStream<'a, P: GeometryProvider + ?Sized> {
    raw_stream: Box<dyn Iterator<Item = SpatialResult<QueryHit>> + 'a>,
    evaluator: PredicateEvaluator<'a, P>,
    predicate: SpatialPredicate,
}

impl<'a, P: GeometryProvider + ?Sized> FilteredStream<'a, P> {
    pub fn new(
        raw_stream: Box<dyn Iterator<Item = SpatialResult<QueryHit>> + 'a>,
        provider: &'a P,
        predicate: SpatialPredicate,
    ) -> Self {
        FilteredStream {
            raw_stream,
            evaluator: PredicateEvaluator::new(provider),
            predicate,
        }
    }
}

impl<P: GeometryProvider + ?Sized> Iterator for FilteredStream<'_, P> {
    type Item = SpatialResult<QueryHit>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.raw_stream.next() {
                Some(Ok(hit)) => match self.evaluator.matches_entry(&hit.entry, &self.predicate) {
                    Ok(true) => return Some(Ok(hit)),
                    Ok(false) => continue,
                    Err(e) => return Some(Err(e)),
                },
                Some(Err(e)) => return Some(Err(e)),
                None => return None,
            }
        }
    }
}
