//! Fetcher and detail resolver against the in-memory ERS node
//!
//! Covers page arithmetic at the boundaries, fail-fast listing, per-id
//! detail isolation and the shared connection bound.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use trustsec_common::{Collection, ErsError, LimitedTransport};
use trustsec_sync::{DetailResolver, Fetcher, Tag};
use trustsec_test::{seed_tags, FakeErsServer};

const PAGE_SIZE: usize = 10;

#[tokio::test]
async fn test_pagination_boundaries() {
    for total in [0, PAGE_SIZE, PAGE_SIZE + 1, 5 * PAGE_SIZE - 1] {
        let server = Arc::new(FakeErsServer::new());
        seed_tags(&server, total);
        let fetcher = Fetcher::with_page_size(server.clone(), PAGE_SIZE);

        let summaries = fetcher.fetch_all(Collection::Tag).await.unwrap();
        assert_eq!(summaries.len(), total, "total {}", total);

        let ids: HashSet<&str> = summaries.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), total, "duplicates at total {}", total);

        for summary in &summaries {
            let body = serde_json::to_value(summary).unwrap();
            assert!(body.get("link").is_none());
        }

        let pages = total.div_ceil(PAGE_SIZE).max(1);
        assert_eq!(server.count("GET", Collection::Tag.path()), pages);
    }
}

#[tokio::test]
async fn test_failed_page_aborts_fetch() {
    let server = Arc::new(FakeErsServer::new());
    seed_tags(&server, 35);
    server.fail_page(Collection::Tag, 3, 500);

    let fetcher = Fetcher::with_page_size(server.clone(), PAGE_SIZE);
    let err = fetcher.fetch_all(Collection::Tag).await.unwrap_err();
    assert!(matches!(err, ErsError::BadStatus { status: 500, .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_failed_first_page() {
    let server = Arc::new(FakeErsServer::new());
    seed_tags(&server, 5);
    server.fail_page(Collection::Tag, 1, 401);

    let fetcher = Fetcher::with_page_size(server.clone(), PAGE_SIZE);
    let err = fetcher.fetch_all(Collection::Tag).await.unwrap_err();
    assert!(matches!(err, ErsError::BadStatus { status: 401, .. }));
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_unreachable_node() {
    let server = Arc::new(FakeErsServer::new());
    server.set_unreachable(true);

    let fetcher = Fetcher::new(server.clone());
    let err = fetcher.fetch_all(Collection::Acl).await.unwrap_err();
    assert!(matches!(err, ErsError::Transport { .. }));
}

#[tokio::test]
async fn test_remaining_pages_run_concurrently() {
    let server = Arc::new(FakeErsServer::new().with_latency(Duration::from_millis(5)));
    seed_tags(&server, 60);

    let fetcher = Fetcher::with_page_size(server.clone(), 5);
    let summaries = fetcher.fetch_all(Collection::Tag).await.unwrap();
    assert_eq!(summaries.len(), 60);
    assert!(server.peak_in_flight() > 1);
}

#[tokio::test]
async fn test_connection_limit_holds() {
    let server = Arc::new(FakeErsServer::new().with_latency(Duration::from_millis(5)));
    seed_tags(&server, 95);
    let limited = Arc::new(LimitedTransport::new(server.clone(), 3));

    let fetcher = Fetcher::with_page_size(limited.clone(), 5);
    let summaries = fetcher.fetch_all(Collection::Tag).await.unwrap();
    let resolved = DetailResolver::new(limited)
        .resolve_details::<Tag>(&summaries)
        .await;

    assert_eq!(resolved.resources.len(), 95);
    assert!(server.peak_in_flight() <= 3);
}

#[tokio::test]
async fn test_detail_failure_isolated() {
    let server = Arc::new(FakeErsServer::new());
    let ids = seed_tags(&server, 5);
    server.fail_detail(ids[2].clone());

    let fetcher = Fetcher::new(server.clone());
    let resolved = DetailResolver::new(server.clone())
        .fetch_resolved::<Tag>(&fetcher)
        .await
        .unwrap();

    assert!(!resolved.is_complete());
    assert_eq!(resolved.resources.len(), 4);
    assert_eq!(resolved.failures.len(), 1);
    assert_eq!(resolved.failures[0].key, ids[2]);
    assert!(matches!(
        resolved.failures[0].error,
        ErsError::RemoteRejection { status: 500, .. }
    ));
    assert!(resolved.resources.iter().all(|t| t.id != ids[2]));
    assert_eq!(resolved.resources[0].name, "Tag0000");
}
