//! Single-target funnel runs against a mock server

use crate::common::{
    write_config, AMAZON_CAPTCHA, AMAZON_RESULTS, MERCADOLIBRE_API_RESULTS, MERCADOLIBRE_RESULTS,
};
use listing_funnel::cache::{CacheKey, CacheStore, MemoryCache};
use listing_funnel::funnel::{Funnel, FunnelOutcome};
use listing_funnel::model::{FetchTarget, Platform, StrategyKind};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html; charset=utf-8")
}

fn funnel_for(server: &MockServer, dir: &TempDir) -> (Funnel, Arc<MemoryCache>) {
    let config = write_config(dir.path(), server, false, "");
    let cache = Arc::new(MemoryCache::new());
    let funnel = Funnel::from_config(&config, cache.clone()).expect("Failed to build funnel");
    (funnel, cache)
}

#[tokio::test]
async fn test_amazon_desktop_fetch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/s"))
        .and(query_param("k", "echo dot"))
        .and(query_param("page", "1"))
        .respond_with(html(AMAZON_RESULTS))
        .expect(1)
        .mount(&server)
        .await;

    let (funnel, cache) = funnel_for(&server, &dir);
    let target = FetchTarget::new(Platform::Amazon, "Echo  Dot", 1);

    match funnel.run(&target).await {
        FunnelOutcome::Succeeded {
            strategy, records, ..
        } => {
            // Amazon has no structured API, so the desktop profile is the first remote strategy
            assert_eq!(strategy, StrategyKind::DesktopFetch);
            assert_eq!(records.len(), 2);
            assert_eq!(records[0].identity, "B08N5WRWNW");
            assert_eq!(records[0].price, 49.99);
            assert_eq!(records[0].rating, Some(4.7));
            assert_eq!(
                records[0].url.as_deref(),
                Some(format!("{}/Echo-Dot/dp/B08N5WRWNW", server.uri()).as_str())
            );
            assert_eq!(records[1].price, 39.99);
        }
        other => panic!("expected success, got {:?}", other),
    }

    assert!(cache.peek(&CacheKey::for_target(&target)).is_some());
}

#[tokio::test]
async fn test_mercadolibre_api() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/sites/MLA/search"))
        .and(query_param("q", "portatil"))
        .and(query_param("offset", "50"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(MERCADOLIBRE_API_RESULTS)
                .insert_header("content-type", "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (funnel, _cache) = funnel_for(&server, &dir);
    let target = FetchTarget::new(Platform::MercadoLibre, "portatil", 2).with_region("ar");

    match funnel.run(&target).await {
        FunnelOutcome::Succeeded {
            strategy, records, ..
        } => {
            assert_eq!(strategy, StrategyKind::RemoteApi);
            assert_eq!(records.len(), 2);
            assert_eq!(records[0].identity, "MCO555");
            assert_eq!(records[0].price, 1_599_900.0);
            assert_eq!(records[0].currency, "COP");
            assert_eq!(records[1].url, None);
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rate_limited_api_falls_back_to_listing_page() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/sites/MCO/search"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/portatil"))
        .respond_with(html(MERCADOLIBRE_RESULTS))
        .expect(1)
        .mount(&server)
        .await;

    let (funnel, _cache) = funnel_for(&server, &dir);
    let target = FetchTarget::new(Platform::MercadoLibre, "portatil", 1);

    let outcome = funnel.run(&target).await;
    match &outcome {
        FunnelOutcome::Succeeded {
            strategy, records, ..
        } => {
            assert_eq!(*strategy, StrategyKind::DesktopFetch);
            assert_eq!(records[0].identity, "MCO1234567890");
            assert_eq!(records[0].price, 1_899_900.0);
        }
        other => panic!("expected success, got {:?}", other),
    }

    let api_attempts: Vec<_> = outcome
        .attempts()
        .iter()
        .filter(|a| a.strategy == StrategyKind::RemoteApi)
        .collect();
    assert_eq!(api_attempts.len(), 3);
    assert!(api_attempts.iter().all(|a| a.outcome == "retryable: HTTP 429"));
}

#[tokio::test]
async fn test_captcha_escalates_to_mobile_profile() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/s"))
        .respond_with(html(AMAZON_CAPTCHA))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/gp/aw/s"))
        .respond_with(html(AMAZON_RESULTS))
        .expect(1)
        .mount(&server)
        .await;

    let (funnel, _cache) = funnel_for(&server, &dir);
    let target = FetchTarget::new(Platform::Amazon, "echo", 1);

    let outcome = funnel.run(&target).await;
    match &outcome {
        FunnelOutcome::Succeeded { strategy, .. } => {
            assert_eq!(*strategy, StrategyKind::MobileFetch)
        }
        other => panic!("expected success, got {:?}", other),
    }

    let desktop: Vec<_> = outcome
        .attempts()
        .iter()
        .filter(|a| a.strategy == StrategyKind::DesktopFetch)
        .map(|a| a.outcome.as_str())
        .collect();
    assert_eq!(
        desktop,
        vec![
            "retryable: bot challenge (captcha)",
            "terminal: bot challenge (captcha)"
        ]
    );
}

#[tokio::test]
async fn test_not_found_is_terminal() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let (funnel, cache) = funnel_for(&server, &dir);
    let target = FetchTarget::new(Platform::Amazon, "echo", 1);

    match funnel.run(&target).await {
        FunnelOutcome::Exhausted { tried, attempts } => {
            assert_eq!(tried, StrategyKind::ALL.to_vec());
            let outcomes: Vec<_> = attempts.iter().map(|a| a.outcome.as_str()).collect();
            assert_eq!(outcomes[0], "retryable: cache miss");
            assert!(outcomes[1].starts_with("terminal: unsupported"));
            assert_eq!(outcomes[2], "terminal: HTTP 404");
            assert_eq!(outcomes[3], "terminal: HTTP 404");
            assert!(outcomes[4].starts_with("terminal: unsupported"));
        }
        other => panic!("expected exhausted, got {:?}", other),
    }

    assert_eq!(cache.stats().unwrap().total, 0);
}

#[tokio::test]
async fn test_no_results_page_is_terminal() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/sites/MCO/search"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"paging":{"total":0},"results":[]}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/xyzzy"))
        .respond_with(html(
            "<html><body><h3>No hay publicaciones que coincidan con tu búsqueda.</h3></body></html>",
        ))
        .expect(2)
        .mount(&server)
        .await;

    let (funnel, _cache) = funnel_for(&server, &dir);
    let target = FetchTarget::new(Platform::MercadoLibre, "xyzzy", 1);

    let outcome = funnel.run(&target).await;
    assert!(matches!(outcome, FunnelOutcome::Exhausted { .. }));
    assert!(outcome
        .attempts()
        .iter()
        .skip(1)
        .take(3)
        .all(|a| a.outcome == "terminal: no listings"));
}

#[tokio::test]
async fn test_challenge_pages_are_saved_for_inspection() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let pages_dir = dir.path().join("debug_pages");

    Mock::given(method("GET"))
        .and(path("/s"))
        .respond_with(html(AMAZON_CAPTCHA))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/gp/aw/s"))
        .respond_with(html(AMAZON_RESULTS))
        .mount(&server)
        .await;

    let debug_section = format!(
        "[debug]\nsave-pages-dir = \"{}\"\n",
        pages_dir.display().to_string().replace('\\', "/")
    );
    let config = write_config(dir.path(), &server, false, &debug_section);
    let funnel = Funnel::from_config(&config, Arc::new(MemoryCache::new())).unwrap();

    let outcome = funnel.run(&FetchTarget::new(Platform::Amazon, "echo", 1)).await;
    assert!(outcome.is_success());

    let mut saved: Vec<_> = std::fs::read_dir(&pages_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    saved.sort();
    // Both desktop captchas are kept; the accepted mobile page is not
    assert_eq!(saved.len(), 2);
    for path in &saved {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("amazon_echo_p1_desktop-fetch_challenge_"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), AMAZON_CAPTCHA);
    }
}
