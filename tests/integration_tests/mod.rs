//! Integration test suites

mod api_test;
mod frontier_test;
mod worker_test;
