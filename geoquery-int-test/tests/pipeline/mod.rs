//! Query pipeline integration tests.

mod nearest_paging_test;
mod predicate_query_test;
