use geo::{Distance, Haversine, Point};
use geoquery::{BoundingBox, DistanceMetric, QueryHit, QueryPipeline, SpatialResult};
use geoquery_int_test::test_util::{brute_force_nearest, cleanup, create_test_context, run_test};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn test_nearest_pages_concatenate_to_unpaged() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            let mut rng = StdRng::seed_from_u64(42);
            let mut points = Vec::new();
            for id in 0..10000u64 {
                let bbox = BoundingBox::point(rng.random_range(10.0..20.0), rng.random_range(10.0..20.0));
                index.insert(bbox, id)?;
                points.push((bbox, id));
            }

            let tree = index.read();
            let unpaged: Vec<QueryHit> =
                QueryPipeline::nearest(&tree, 15.0, 15.0, 1000).collect::<SpatialResult<_>>()?;
            assert_eq!(unpaged.len(), 1000);

            let expected = brute_force_nearest(&points, 15.0, 15.0, 1000);
            let actual: Vec<(u64, f64)> = unpaged
                .iter()
                .map(|hit| (hit.payload(), hit.distance.unwrap_or(f64::NAN)))
                .collect();
            assert_eq!(actual, expected);

            let mut paged = Vec::new();
            for page in 0..10 {
                let low = page * 100;
                let hits: Vec<QueryHit> = QueryPipeline::nearest(&tree, 15.0, 15.0, 1000)
                    .range(low, low + 99)
                    .collect::<SpatialResult<_>>()?;
                assert_eq!(hits.len(), 100);
                paged.extend(hits);
            }
            assert_eq!(paged, unpaged);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_nearest_within_distance_cutoff() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            let mut rng = StdRng::seed_from_u64(7);
            let mut points = Vec::new();
            for id in 0..2000u64 {
                let bbox = BoundingBox::point(rng.random_range(0.0..100.0), rng.random_range(0.0..100.0));
                index.insert(bbox, id)?;
                points.push((bbox, id));
            }

            let tree = index.read();
            let hits: Vec<QueryHit> = QueryPipeline::nearest(&tree, 50.0, 50.0, usize::MAX)
                .within(10.0)
                .collect::<SpatialResult<_>>()?;

            let expected = points
                .iter()
                .filter(|(bbox, _)| bbox.distance_to_point(50.0, 50.0) <= 10.0)
                .count();
            assert_eq!(hits.len(), expected);
            assert!(hits
                .windows(2)
                .all(|pair| pair[0].distance <= pair[1].distance));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_order_by_distance_pages() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            for i in 0..900u64 {
                index.insert(BoundingBox::point((i % 30) as f64, (i / 30) as f64), i)?;
            }

            let tree = index.read();
            let window = BoundingBox::new(5.0, 5.0, 25.0, 25.0);
            let all = QueryPipeline::search(&tree, &window)
                .order_by_distance(12.5, 17.5)
                .payloads()?;
            assert_eq!(all.len(), 21 * 21);

            let page = QueryPipeline::search(&tree, &window)
                .order_by_distance(12.5, 17.5)
                .range(40, 59)
                .payloads()?;
            assert_eq!(page, all[40..60].to_vec());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_lat_lon_nearest_pages() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            let mut rng = StdRng::seed_from_u64(2024);
            let mut points = Vec::new();
            for id in 0..5000u64 {
                let (lon, lat) = (rng.random_range(0.0..30.0), rng.random_range(0.0..30.0));
                index.insert(BoundingBox::point(lon, lat), id)?;
                points.push((id, Point::new(lon, lat)));
            }

            let origin = Point::new(15.0, 15.0);
            let mut expected: Vec<(u64, f64)> = points
                .iter()
                .map(|(id, p)| (*id, Haversine.distance(origin, *p)))
                .collect();
            expected.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

            let tree = index.read();
            let mut paged = Vec::new();
            for page in 0..20 {
                let (low, high) = (page * 50, page * 50 + 49);
                let hits: Vec<QueryHit> =
                    QueryPipeline::nearest_with_metric(&tree, 15.0, 15.0, 5000, DistanceMetric::Haversine)
                        .range(low, high)
                        .collect::<SpatialResult<_>>()?;
                assert_eq!(hits.len(), 50);
                paged.extend(hits.iter().map(|hit| (hit.payload(), hit.distance.unwrap_or(f64::NAN))));
            }
            assert_eq!(paged, expected[..1000].to_vec());

            // within takes meters under this metric
            let near = QueryPipeline::nearest_with_metric(&tree, 15.0, 15.0, 5000, DistanceMetric::Haversine)
                .within(100_000.0)
                .payloads()?;
            let expected_near = expected.iter().filter(|(_, d)| *d <= 100_000.0).count();
            assert_eq!(near.len(), expected_near);
            Ok(())
        },
        cleanup,
    )
}
