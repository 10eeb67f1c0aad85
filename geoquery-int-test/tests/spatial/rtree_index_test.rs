use geoquery::{BoundingBox, RTreeConfig, SplitStrategy};
use geoquery_int_test::test_util::{
    brute_force_window, cleanup, create_test_context, create_test_context_with, run_test,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn small_config() -> RTreeConfig {
    RTreeConfig::new().max_fanout(2).min_fanout(1)
}

#[test]
fn test_three_points_split_root() {
    run_test(
        || create_test_context_with(small_config()),
        |ctx| {
            let index = ctx.index();
            index.insert(BoundingBox::point(10.0, 10.0), 1)?;
            index.insert(BoundingBox::point(10.0, 20.0), 2)?;
            assert_eq!(index.read().height(), 1);

            index.insert(BoundingBox::point(50.0, 50.0), 3)?;
            assert_eq!(index.read().height(), 2);

            let mut all: Vec<u64> = index
                .search(&BoundingBox::new(0.0, 0.0, 100.0, 100.0))?
                .into_iter()
                .map(|entry| entry.payload)
                .collect();
            all.sort();
            assert_eq!(all, vec![1, 2, 3]);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_delete_then_insert_keeps_balance() {
    run_test(
        || create_test_context_with(small_config()),
        |ctx| {
            let index = ctx.index();
            index.insert(BoundingBox::point(10.0, 10.0), 1)?;
            index.insert(BoundingBox::point(10.0, 20.0), 2)?;
            index.insert(BoundingBox::point(50.0, 50.0), 3)?;

            assert!(index.delete(&BoundingBox::point(10.0, 20.0), 2)?);
            index.insert(BoundingBox::point(10.0, 21.0), 4)?;

            let report = index.read().check_integrity()?;
            assert!(report.is_valid(), "{:?}", report.errors);
            assert_eq!(report.entries_found, 3);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_random_workload_matches_brute_force() {
    for strategy in [SplitStrategy::Quadratic, SplitStrategy::Linear] {
        run_test(
            || create_test_context_with(RTreeConfig::new().max_fanout(8).min_fanout(3).split_strategy(strategy)),
            |ctx| {
                let index = ctx.index();
                let mut rng = StdRng::seed_from_u64(2024);
                let mut live = Vec::new();

                for id in 0..3000u64 {
                    let x = rng.random_range(0.0..1000.0);
                    let y = rng.random_range(0.0..1000.0);
                    let bbox = BoundingBox::new(x, y, x + rng.random_range(0.0..20.0), y + rng.random_range(0.0..20.0));
                    index.insert(bbox, id)?;
                    live.push((bbox, id));

                    // every fourth step removes a random survivor
                    if id % 4 == 3 {
                        let victim = live.swap_remove(rng.random_range(0..live.len()));
                        assert!(index.delete(&victim.0, victim.1)?);
                    }
                }

                assert_eq!(index.len(), live.len() as u64);
                let report = index.read().check_integrity()?;
                assert!(report.is_valid(), "{:?}", report.errors);

                for _ in 0..50 {
                    let x = rng.random_range(0.0..1000.0);
                    let y = rng.random_range(0.0..1000.0);
                    let window = BoundingBox::new(x, y, x + 100.0, y + 100.0);

                    let mut found: Vec<u64> =
                        index.search(&window)?.into_iter().map(|e| e.payload).collect();
                    found.sort_unstable();
                    assert_eq!(found, brute_force_window(&live, &window));
                }
                Ok(())
            },
            cleanup,
        )
    }
}

#[test]
fn test_delete_everything() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            for i in 0..500u64 {
                index.insert(BoundingBox::point((i % 50) as f64, (i / 50) as f64), i)?;
            }
            for i in (0..500u64).rev() {
                assert!(index.delete(&BoundingBox::point((i % 50) as f64, (i / 50) as f64), i)?);
            }

            let tree = index.read();
            assert!(tree.is_empty());
            assert_eq!(tree.height(), 0);
            assert_eq!(tree.root_bbox()?, None);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_invalid_box_leaves_tree_untouched() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            index.insert(BoundingBox::point(1.0, 1.0), 1)?;

            let inverted = BoundingBox::new(5.0, 5.0, 1.0, 1.0);
            assert!(index.insert(inverted, 2).is_err());
            assert!(index.delete(&inverted, 1).is_err());
            assert_eq!(index.len(), 1);
            Ok(())
        },
        cleanup,
    )
}
