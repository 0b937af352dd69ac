//! Integration tests for listing-funnel
//!
//! These tests use wiremock to serve search pages and API responses and
//! drive the real HTTP fetchers, parser, cache and batch coordinator.

mod batch_tests;
mod common;
mod funnel_tests;
