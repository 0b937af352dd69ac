//! Full batch runs: config file, SQLite cache, mock server

use crate::common::{write_config, AMAZON_RESULTS, MERCADOLIBRE_API_RESULTS};
use listing_funnel::batch::{BatchCoordinator, TargetStatus};
use listing_funnel::cache::{open_cache, CacheStore};
use listing_funnel::model::StrategyKind;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEARCHES: &str = r#"
[[search]]
platform = "amazon"
query = "echo"
pages = 2

[[search]]
platform = "mercadolibre"
query = "portatil"

[[search]]
platform = "amazon"
query = "ghost"
pages = 3
"#;

async fn mount_catalog(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/s"))
        .and(query_param("k", "echo"))
        .respond_with(ResponseTemplate::new(200).set_body_string(AMAZON_RESULTS))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/sites/MCO/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MERCADOLIBRE_API_RESULTS))
        .mount(server)
        .await;

    // Anything else (the "ghost" search) is a server error on every profile
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_batch_then_cached_rerun() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server, true, SEARCHES);
    let targets = config.targets();
    assert_eq!(targets.len(), 6);

    let cache = Arc::new(open_cache(&config.cache.path()).unwrap());
    let coordinator = BatchCoordinator::from_config(&config, cache).unwrap();
    let report = coordinator.run(targets.clone()).await;

    let statuses: Vec<_> = report.targets.iter().map(|r| r.status.to_string()).collect();
    assert_eq!(statuses[0], "succeeded via DesktopFetch");
    // Page 2 serves the same listings, so nothing new is merged from it
    assert_eq!(statuses[1], "succeeded via DesktopFetch");
    assert_eq!(statuses[2], "succeeded via RemoteAPI");
    assert_eq!(statuses[3], "exhausted after trying Cached..StealthBrowser");
    // Pages 2 and 3 of "ghost" either ran and were exhausted, or were skipped
    for status in &report.targets[4..] {
        assert!(matches!(
            status.status,
            TargetStatus::Skipped | TargetStatus::Exhausted { .. }
        ));
    }

    // Two Amazon records (deduplicated across pages) and two MercadoLibre records
    assert_eq!(report.results.len(), 4);
    let ids: Vec<_> = report.results.iter().map(|r| r.identity.as_str()).collect();
    assert_eq!(ids, vec!["B08N5WRWNW", "B07XJ8C8F5", "MCO555", "MCO777"]);

    let requests_after_first_run = server.received_requests().await.unwrap().len();
    drop(coordinator);

    // Reopen the cache from disk: every successful target is now served locally
    let cache = Arc::new(open_cache(&config.cache.path()).unwrap());
    assert_eq!(cache.stats().unwrap().fresh, 3);
    let coordinator = BatchCoordinator::from_config(&config, cache).unwrap();
    let rerun = coordinator.run(targets[..3].to_vec()).await;

    for target in &rerun.targets {
        match &target.status {
            TargetStatus::Succeeded { strategy, .. } => assert_eq!(*strategy, StrategyKind::Cached),
            other => panic!("{}: expected cached success, got {}", target.target, other),
        }
    }
    assert_eq!(rerun.results.len(), 4);
    assert_eq!(
        server.received_requests().await.unwrap().len(),
        requests_after_first_run
    );
}

#[tokio::test]
async fn test_sequential_batch_skips_pages_after_empty_first_page() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let dir = TempDir::new().unwrap();
    let mut config = write_config(dir.path(), &server, false, SEARCHES);
    config.funnel.max_concurrent_targets = 1;

    let coordinator = BatchCoordinator::from_config(
        &config,
        Arc::new(listing_funnel::cache::MemoryCache::new()),
    )
    .unwrap();
    let report = coordinator.run(config.targets()).await;

    let statuses: Vec<_> = report.targets.iter().map(|r| r.status.clone()).collect();
    assert!(matches!(statuses[3], TargetStatus::Exhausted { .. }));
    assert_eq!(statuses[4], TargetStatus::Skipped);
    assert_eq!(statuses[5], TargetStatus::Skipped);
    assert_eq!(report.counts().succeeded, 3);
}

#[tokio::test]
async fn test_cancelled_batch_touches_nothing() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &server, true, SEARCHES);

    let cache = Arc::new(open_cache(&config.cache.path()).unwrap());
    let coordinator = BatchCoordinator::from_config(&config, cache.clone()).unwrap();
    coordinator.cancellation_token().cancel();

    let report = coordinator.run(config.targets()).await;

    assert_eq!(report.counts().cancelled, 6);
    assert!(report.results.is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(cache.stats().unwrap().total, 0);
}
