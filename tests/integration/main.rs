//! Integration tests for search-trawl
//!
//! `run_tests` drives whole runs through the coordinator against the
//! scripted API; `http_tests` checks the HTTP adapter against wiremock.

mod common;
mod http_tests;
mod run_tests;
