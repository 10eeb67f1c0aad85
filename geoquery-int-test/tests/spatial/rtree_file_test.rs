use geoquery::rtree::rtree_constants::PAGE_SIZE;
use geoquery::{
    BoundingBox, FileNodeStore, FileStoreOptions, LeafEntry, RTreeConfig, RTreeIndex,
    SpatialError,
};
use geoquery_int_test::test_util::{cleanup, create_test_context, run_test, test_config};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};

fn cell(i: u64) -> BoundingBox {
    let x = (i % 64) as f64;
    let y = (i / 64) as f64;
    BoundingBox::new(x, y, x + 0.5, y + 0.5)
}

#[test]
fn test_file_index_survives_reopen() {
    run_test(
        create_test_context,
        |ctx| {
            let path = ctx.path().join("persist.rtree");
            let window = BoundingBox::new(10.0, 10.0, 20.0, 20.0);

            let expected = {
                let store = FileNodeStore::create(&path)?;
                let mut tree = RTreeIndex::open(store, test_config())?;
                for i in 0..2000u64 {
                    tree.insert(cell(i), i)?;
                }
                for i in (0..2000u64).step_by(3) {
                    assert!(tree.delete(&cell(i), i)?);
                }
                let mut hits: Vec<u64> = tree
                    .search(&window)
                    .map(|entry| entry.map(|e| e.payload))
                    .collect::<Result<_, _>>()?;
                hits.sort_unstable();
                hits
            };

            let store = FileNodeStore::open(&path)?;
            let tree = RTreeIndex::open(store, test_config())?;
            assert_eq!(tree.len(), 2000 - 667);

            let report = tree.check_integrity()?;
            assert!(report.is_valid(), "{:?}", report.errors);

            let mut hits: Vec<u64> = tree
                .search(&window)
                .map(|entry| entry.map(|e| e.payload))
                .collect::<Result<_, _>>()?;
            hits.sort_unstable();
            assert_eq!(hits, expected);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_small_cache_bulk_load() {
    run_test(
        create_test_context,
        |ctx| {
            let path = ctx.path().join("bulk.rtree");
            let options = FileStoreOptions {
                cache_pages: 4,
                ..FileStoreOptions::default()
            };
            let entries = (0..5000u64).map(|i| LeafEntry::new(cell(i), i, i));

            {
                let store = FileNodeStore::create_with_options(&path, options.clone())?;
                let tree = RTreeIndex::bulk_load(store, test_config(), entries)?;
                assert_eq!(tree.len(), 5000);
            }

            let store = FileNodeStore::open_with_options(&path, options)?;
            let tree = RTreeIndex::open(store, test_config())?;
            let report = tree.check_integrity()?;
            assert!(report.is_valid(), "{:?}", report.errors);
            assert_eq!(report.entries_found, 5000);

            let nearest: Vec<u64> = tree
                .nearest(0.1, 0.1, 1)
                .map(|hit| hit.map(|(entry, _)| entry.payload))
                .collect::<Result<_, _>>()?;
            assert_eq!(nearest, vec![0]);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_corrupted_root_page_detected() {
    run_test(
        create_test_context,
        |ctx| {
            let path = ctx.path().join("corrupt.rtree");
            let root = {
                let store = FileNodeStore::create(&path)?;
                let mut tree = RTreeIndex::open(store, RTreeConfig::new())?;
                for i in 0..40u64 {
                    tree.insert(cell(i), i)?;
                }
                tree.root_ref().unwrap_or_default()
            };

            {
                let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
                let offset = root * PAGE_SIZE as u64 + 32;
                let mut byte = [0u8; 1];
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(&mut byte)?;
                byte[0] ^= 0xFF;
                file.seek(SeekFrom::Start(offset))?;
                file.write_all(&byte)?;
            }

            let store = FileNodeStore::open(&path)?;
            let tree = RTreeIndex::open(store, RTreeConfig::new())?;
            let result: Result<Vec<LeafEntry>, SpatialError> =
                tree.search(&BoundingBox::new(0.0, 0.0, 64.0, 64.0)).collect();
            assert!(matches!(result, Err(SpatialError::CorruptNode { node, .. }) if node == root));
            Ok(())
        },
        cleanup,
    )
}
