//! End-to-end tests driving the job registry

mod crawl_tests;
mod support;
