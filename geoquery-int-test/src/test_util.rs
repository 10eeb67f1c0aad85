use geoquery::{
    BoundingBox, GeometryStore, RTreeConfig, SharedIndex, SpatialError, SpatialResult,
};
use std::backtrace::Backtrace;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{env, fs, thread};

#[cfg(not(feature = "memory"))]
pub type TestStore = geoquery::FileNodeStore;
#[cfg(feature = "memory")]
pub type TestStore = geoquery::MemoryNodeStore;

/// Runs a test with retry logic and error handling.
/// Tests run on the current thread so a failure reports the test's own backtrace.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> SpatialResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> SpatialResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> SpatialResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => match after(ctx) {
                        Ok(_) => Ok(()),
                        Err(e) => Err((format!("After run failed: {:?}", e), backtrace.to_string())),
                    },
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();

        let error = match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                last_backtrace = Some(bt);
                e
            }
            Err(panic_err) => {
                let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                last_backtrace = Some(Backtrace::capture().to_string());
                format!("Panic: {}", err_msg)
            }
        };

        if attempt < MAX_RETRIES {
            eprintln!(
                "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                attempt, MAX_RETRIES, elapsed
            );
            eprintln!("Error: {}", error);
            eprintln!("Retrying in {}ms...\n", 100 * attempt);
            thread::sleep(Duration::from_millis(100 * attempt as u64));
        }
        last_error = Some(error);
    }

    // All retries exhausted - print full details
    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

/// A fresh index and geometry store, plus a scratch directory removed by [`cleanup`].
#[derive(Clone)]
pub struct TestContext {
    path: PathBuf,
    index: SharedIndex<TestStore>,
    geometries: Arc<GeometryStore>,
}

impl TestContext {
    pub fn new(path: PathBuf, index: SharedIndex<TestStore>) -> Self {
        Self {
            path,
            index,
            geometries: Arc::new(GeometryStore::new()),
        }
    }

    /// Scratch directory owned by this context.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> SharedIndex<TestStore> {
        self.index.clone()
    }

    pub fn geometries(&self) -> Arc<GeometryStore> {
        self.geometries.clone()
    }

    /// Stores `geometry` and indexes it under its envelope, returning its id.
    pub fn add_geometry(&self, geometry: impl Into<geo::Geometry<f64>>) -> SpatialResult<u64> {
        let geometry = geometry.into();
        let bbox = geoquery::geometry::bounding_box(&geometry);
        let id = self.geometries.add(geometry);
        self.index.insert(bbox, id)?;
        Ok(id)
    }
}

pub fn random_path() -> PathBuf {
    let id = uuid::Uuid::new_v4();
    env::temp_dir().join(format!("geoquery_{}", id))
}

pub fn test_config() -> RTreeConfig {
    RTreeConfig::new().max_fanout(16).min_fanout(6)
}

pub fn create_test_context() -> SpatialResult<TestContext> {
    create_test_context_with(test_config())
}

pub fn create_test_context_with(config: RTreeConfig) -> SpatialResult<TestContext> {
    let path = random_path();
    fs::create_dir_all(&path)?;

    #[cfg(not(feature = "memory"))]
    let store = geoquery::FileNodeStore::create(path.join("index.rtree"))?;
    #[cfg(feature = "memory")]
    let store = geoquery::MemoryNodeStore::new();

    match SharedIndex::open(store, config) {
        Ok(index) => Ok(TestContext::new(path, index)),
        Err(e) => {
            let _ = fs::remove_dir_all(&path);
            Err(e)
        }
    }
}

pub fn cleanup(ctx: TestContext) -> SpatialResult<()> {
    let path = ctx.path().to_path_buf();
    drop(ctx);

    let max_retries = 5;
    for retry in 0..max_retries {
        if !path.exists() {
            return Ok(());
        }
        match fs::remove_dir_all(&path) {
            Ok(_) => return Ok(()),
            Err(e) if retry < max_retries - 1 => {
                log::debug!("Retrying removal of {:?}: {}", path, e);
                thread::sleep(Duration::from_millis(50 * (retry + 1) as u64));
            }
            Err(e) => return Err(SpatialError::Io(e)),
        }
    }
    Ok(())
}

/// Payload ids of every entry whose box intersects `window`, by brute force.
pub fn brute_force_window(entries: &[(BoundingBox, u64)], window: &BoundingBox) -> Vec<u64> {
    let mut ids: Vec<u64> = entries
        .iter()
        .filter(|(bbox, _)| bbox.intersects(window))
        .map(|(_, id)| *id)
        .collect();
    ids.sort_unstable();
    ids
}

/// `(payload, distance)` of the `k` entries nearest to a point, by brute force,
/// equal distances ordered by payload.
pub fn brute_force_nearest(
    entries: &[(BoundingBox, u64)],
    x: f64,
    y: f64,
    k: usize,
) -> Vec<(u64, f64)> {
    let mut ranked: Vec<(u64, f64)> = entries
        .iter()
        .map(|(bbox, id)| (*id, bbox.distance_to_point(x, y)))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}
