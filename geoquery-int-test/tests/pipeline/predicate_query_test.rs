use geo::{LineString, Point};
use geoquery::geometry::{relate, window_geometry};
use geoquery::{
    BoundingBox, PredicateEvaluator, QueryPipeline, RTreeConfig, Relation, SpatialPredicate,
};
use geoquery_int_test::test_util::{cleanup, create_test_context, create_test_context_with, run_test};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn test_window_then_within_distance() {
    run_test(
        || create_test_context_with(RTreeConfig::new().max_fanout(2).min_fanout(1)),
        |ctx| {
            let a = ctx.add_geometry(Point::new(10.0, 10.0))?;
            let _b = ctx.add_geometry(Point::new(10.0, 20.0))?;
            let _c = ctx.add_geometry(Point::new(50.0, 50.0))?;

            let geometries = ctx.geometries();
            let center = geometries.add(Point::new(10.0, 10.0));

            let tree = ctx.index();
            let tree = tree.read();
            let hits = QueryPipeline::search(&tree, &BoundingBox::new(0.0, 0.0, 10.0, 15.0))
                .filter(geometries.as_ref(), SpatialPredicate::WithinDistance(center, 15.0))
                .payloads()?;
            assert_eq!(hits, vec![a]);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_intersects_filter_matches_exact_relation() {
    run_test(
        create_test_context,
        |ctx| {
            let mut rng = StdRng::seed_from_u64(99);
            for _ in 0..400 {
                let x = rng.random_range(0.0..200.0);
                let y = rng.random_range(0.0..200.0);
                if rng.random_bool(0.5) {
                    let line = LineString::from(vec![
                        (x, y),
                        (x + rng.random_range(-10.0..10.0), y + rng.random_range(-10.0..10.0)),
                    ]);
                    ctx.add_geometry(line)?;
                } else {
                    let w = rng.random_range(0.0..8.0);
                    let h = rng.random_range(0.0..8.0);
                    ctx.add_geometry(window_geometry(&BoundingBox::new(x, y, x + w, y + h)))?;
                }
            }

            let geometries = ctx.geometries();
            let query = window_geometry(&BoundingBox::new(60.0, 60.0, 120.0, 90.0));
            let query_box = geoquery::geometry::bounding_box(&query);
            let query_id = geometries.add(query.clone());

            let tree = ctx.index();
            let tree = tree.read();
            let mut hits = QueryPipeline::search(&tree, &query_box)
                .filter(geometries.as_ref(), SpatialPredicate::Intersects(query_id))
                .payloads()?;
            hits.sort_unstable();

            let mut expected: Vec<u64> = (1..=400u64)
                .filter(|id| {
                    geometries
                        .get(*id)
                        .is_some_and(|g| relate(&g, &query, Relation::Intersects))
                })
                .collect();
            expected.sort_unstable();
            assert_eq!(hits, expected);

            // the box phase alone over-approximates
            let candidates = QueryPipeline::search(&tree, &query_box).payloads()?;
            assert!(candidates.len() >= hits.len());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_nearest_to_geometry_with_predicate() {
    run_test(
        create_test_context,
        |ctx| {
            let road = ctx.add_geometry(LineString::from(vec![(0.0, 0.0), (100.0, 0.0)]))?;
            let mut stops = Vec::new();
            for i in 0..20 {
                stops.push(ctx.add_geometry(Point::new(i as f64 * 5.0, 3.0 + i as f64))?);
            }

            let geometries = ctx.geometries();
            let tree = ctx.index();
            let tree = tree.read();

            // nearest stops to the road, the road itself excluded
            let nearest = QueryPipeline::nearest_to_geometry(&tree, geometries.as_ref(), road, 10)
                .filter(geometries.as_ref(), SpatialPredicate::Disjoint(road))
                .limit(3)
                .payloads()?;
            assert_eq!(nearest, stops[..3].to_vec());

            let evaluator = PredicateEvaluator::new(geometries.as_ref());
            for id in &nearest {
                assert!(evaluator.within_distance(*id, road, 5.0)?);
            }
            Ok(())
        },
        cleanup,
    )
}
