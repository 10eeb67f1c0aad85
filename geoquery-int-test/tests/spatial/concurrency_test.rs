use geoquery::{BoundingBox, QueryPipeline};
use geoquery_int_test::test_util::{cleanup, create_test_context, run_test};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_readers_during_writes() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            let num_readers = 4;
            let inserts = 2000u64;
            let barrier = Arc::new(Barrier::new(num_readers + 1));
            let everything = BoundingBox::new(-1.0, -1.0, 1000.0, 1000.0);

            let writer = {
                let index = index.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..inserts {
                        index.insert(BoundingBox::point((i % 40) as f64, (i / 40) as f64), i)?;
                        // delete every tenth entry again to exercise condensing
                        if i % 10 == 9 {
                            let gone = i - 5;
                            let bbox = BoundingBox::point((gone % 40) as f64, (gone / 40) as f64);
                            index.delete(&bbox, gone)?;
                        }
                    }
                    Ok::<(), geoquery::SpatialError>(())
                })
            };

            let mut readers = vec![];
            for _ in 0..num_readers {
                let index = index.clone();
                let barrier = Arc::clone(&barrier);
                readers.push(thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..100 {
                        let guard = index.read();
                        let seen = QueryPipeline::search(&guard, &everything)
                            .payloads()
                            .map(|ids| ids.len() as u64);
                        // a reader sees a whole number of mutations
                        assert_eq!(seen.ok(), Some(guard.len()));
                    }
                }));
            }

            for reader in readers {
                reader.join().expect("reader panicked");
            }
            writer.join().expect("writer panicked")?;

            let expected = inserts - inserts / 10;
            assert_eq!(index.len(), expected);
            let report = index.read().check_integrity()?;
            assert!(report.is_valid(), "{:?}", report.errors);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_pipelines_share_read_lock() {
    run_test(
        create_test_context,
        |ctx| {
            let index = ctx.index();
            for i in 0..100u64 {
                index.insert(BoundingBox::point(i as f64, 0.0), i)?;
            }

            let guard = index.read();
            let other = index.read();
            let near = QueryPipeline::nearest(&guard, 0.0, 0.0, 3).payloads()?;
            let far = QueryPipeline::nearest(&other, 99.0, 0.0, 3).payloads()?;
            assert_eq!(near, vec![0, 1, 2]);
            assert_eq!(far, vec![99, 98, 97]);
            Ok(())
        },
        cleanup,
    )
}
