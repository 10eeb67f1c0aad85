//! R-Tree integration tests.
//!
//! These tests drive the index through its public API only, over the
//! store selected by the crate features.

mod concurrency_test;
mod rtree_file_test;
mod rtree_index_test;
