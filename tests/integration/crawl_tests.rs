//! Integration tests for site access and the crawl pipeline
//!
//! These tests use wiremock to stand in for the story site and test
//! caching, skipping, and the full pipeline end-to-end.

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use whateley_fetch::config::Config;
use whateley_fetch::crawler::{run_pipeline, PublicationOrder, SiteAccess, WordCount};
use whateley_fetch::storage::{
    lock_cache, open_cache, CacheKind, CacheStatus, CacheStore,
};
use whateley_fetch::{FailureKind, StoryIdentity, WhateleyError};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock site
fn create_test_config(server: &MockServer, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.client.base_url = server.uri();
    config.client.max_concurrency = 3;
    config.cache.database_path = dir
        .path()
        .join("cache.db")
        .to_string_lossy()
        .into_owned();
    config.crawl.process_workers = 2;
    config
}

/// A story page as the site serves it, chrome included
fn story_page(category: &str, id: u64, slug: &str, date: &str, words: &str) -> String {
    format!(
        r#"<html><head><title>{slug} - Whateley Academy</title><script>var x = 1;</script></head>
<body><div id="nav"><a href="/">Home</a></div>
<div class="item-page">
<ul class="actions"><li class="print-icon"><a href="/index.php/{category}/{id}-{slug}?tmpl=component&amp;print=1">Print</a></li></ul>
<dl class="article-info"><dd class="published"><time datetime="{date}" itemprop="datePublished">date</time></dd></dl>
<div itemprop="articleBody"><p>{words}</p></div>
</div><div class="sidebar">Ads</div></body></html>"#
    )
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body)
}

/// Mounts a response for the id-only article URL
async fn mount_id(server: &MockServer, id: u64, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/index.php"))
        .and(query_param("id", id.to_string()))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_cache_miss_then_hit_is_slug_independent() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir);

    Mock::given(method("GET"))
        .and(path("/index.php/stories/279-hive-part-4-who-dun-it"))
        .respond_with(html(story_page(
            "original-timeline",
            279,
            "hive-part-4-who-dun-it",
            "2015-06-01T10:00:00-07:00",
            "It was a dark night.",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let access = SiteAccess::new(&config).unwrap();

    let requested = StoryIdentity::new("stories", "279", "hive-part-4-who-dun-it");
    let page = access.get_story(&requested).await.unwrap();
    assert_eq!(page.identity().id, "279");
    assert_eq!(page.identity().category, "original-timeline");
    assert_eq!(page.word_count(), 5);
    assert!(!page.html().contains("Ads"));
    assert!(!page.html().contains("var x"));

    // Renamed page, same id: served from the same row without a request
    let renamed = StoryIdentity::new("stories", "279", "a-new-name");
    let again = access.get_story(&renamed).await.unwrap();
    assert_eq!(again.identity().id, "279");
    assert_eq!(again.body_html(), page.body_html());

    let stats = lock_cache(access.cache()).unwrap().statistics().unwrap();
    assert_eq!(stats.page_count, 1);
}

#[tokio::test]
async fn test_stale_entry_is_refreshed_in_place() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir);

    let mut cache = open_cache(&config.cache).unwrap();
    let old = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
    let original_row = cache
        .write(
            CacheKind::Page,
            None,
            "story-12",
            story_page("stories", 12, "old-name", "2014-01-01T00:00:00+00:00", "old text").as_bytes(),
            None,
            old,
        )
        .unwrap();

    mount_id(
        &server,
        12,
        html(story_page(
            "stories",
            12,
            "new-name",
            "2014-01-01T00:00:00+00:00",
            "new text here",
        )),
    )
    .await;

    let access = SiteAccess::with_cache(&config, cache).unwrap();
    let page = access.get_story_by_id(12).await.unwrap();
    assert_eq!(page.identity().slug, "new-name");
    assert_eq!(page.word_count(), 3);

    let cache = lock_cache(access.cache()).unwrap();
    assert_eq!(
        cache
            .check_stale(CacheKind::Page, "story-12", Utc::now())
            .unwrap(),
        CacheStatus::Fresh(original_row)
    );
    assert_eq!(cache.statistics().unwrap().page_count, 1);
}

#[tokio::test]
async fn test_offline_miss_sends_no_request() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server, &dir);
    config.cache.offline = true;

    let access = SiteAccess::new(&config).unwrap();
    let err = access.get_story_by_id(9).await.unwrap_err();

    assert_eq!(
        FailureKind::classify(&err, &config.crawl),
        FailureKind::Offline
    );
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fetch_statuses_are_classified() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir);

    mount_id(&server, 3, ResponseTemplate::new(404)).await;
    mount_id(&server, 4, ResponseTemplate::new(403)).await;
    mount_id(&server, 5, ResponseTemplate::new(500)).await;

    let access = SiteAccess::new(&config).unwrap();
    let kind = |err: WhateleyError| FailureKind::classify(&err, &config.crawl);

    assert_eq!(
        kind(access.get_story_by_id(3).await.unwrap_err()),
        FailureKind::NotFound
    );
    assert_eq!(
        kind(access.get_story_by_id(4).await.unwrap_err()),
        FailureKind::Forbidden
    );
    assert_eq!(
        kind(access.get_story_by_id(5).await.unwrap_err()),
        FailureKind::HttpStatus
    );

    // Failures are never cached
    let stats = lock_cache(access.cache()).unwrap().statistics().unwrap();
    assert_eq!(stats.page_count, 0);
}

#[tokio::test]
async fn test_pipeline_collects_every_accepted_story() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server, &dir);
    config.crawl.first_id = 1;
    config.crawl.last_id = 7;

    mount_id(
        &server,
        1,
        html(story_page("stories", 1, "later", "2016-01-01T00:00:00+00:00", "b")),
    )
    .await;
    mount_id(
        &server,
        2,
        html(story_page(
            "2nd-gen-canon",
            2,
            "earlier",
            "2015-01-01T00:00:00+00:00",
            "a",
        )),
    )
    .await;
    mount_id(&server, 3, ResponseTemplate::new(404)).await;
    mount_id(&server, 4, ResponseTemplate::new(403)).await;
    mount_id(
        &server,
        5,
        html(format!(
            r#"<html><head><base href="{}/index.php/community/forum"></head><body>Forum</body></html>"#,
            server.uri()
        )),
    )
    .await;
    mount_id(
        &server,
        6,
        html(story_page("news", 6, "notice", "2016-01-01T00:00:00+00:00", "c")),
    )
    .await;

    let access = Arc::new(SiteAccess::new(&config).unwrap());
    let base = url::Url::parse(&config.client.base_url).unwrap();
    let outcome = run_pipeline(
        access,
        &config.crawl,
        config.client.max_concurrency,
        Arc::new(PublicationOrder::new(base)),
    )
    .await
    .unwrap();

    let ids: Vec<u64> = outcome.records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![2, 1]);
    assert!(outcome.records[0].url.ends_with("/index.php/2nd-gen-canon/2-earlier"));

    let summary = &outcome.summary;
    assert_eq!(summary.emitted, 6);
    assert_eq!(summary.resolved, 3);
    assert_eq!(summary.accepted, 2);
    assert_eq!(summary.collected, 2);
    assert_eq!(summary.skipped_count(FailureKind::NotFound), 1);
    assert_eq!(summary.skipped_count(FailureKind::Forbidden), 1);
    assert_eq!(summary.skipped_count(FailureKind::ExcludedSection), 1);
    assert_eq!(summary.skipped_count(FailureKind::ExcludedCategory), 1);
    assert_eq!(
        summary.collected + summary.total_skipped(),
        summary.emitted
    );
    assert_eq!(outcome.worker_states.len(), 2);
}

#[tokio::test]
async fn test_pipeline_stops_on_unidentifiable_page() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server, &dir);
    config.crawl.first_id = 1;
    config.crawl.last_id = 3;

    mount_id(
        &server,
        1,
        html(story_page("stories", 1, "fine", "2016-01-01T00:00:00+00:00", "a b")),
    )
    .await;
    mount_id(
        &server,
        2,
        html("<html><head><title>Redesigned</title></head><body><p>New layout</p></body></html>".to_string()),
    )
    .await;

    let access = Arc::new(SiteAccess::new(&config).unwrap());
    let err = run_pipeline(
        access,
        &config.crawl,
        config.client.max_concurrency,
        Arc::new(WordCount),
    )
    .await
    .err()
    .expect("crawl should stop");

    assert_eq!(
        FailureKind::classify(&err, &config.crawl),
        FailureKind::CanonicalParse
    );
    assert!(err.to_string().contains("story 2"));
}

#[tokio::test]
async fn test_processing_failure_stops_fetching() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server, &dir);
    config.crawl.first_id = 1;
    config.crawl.last_id = 41;
    config.crawl.process_workers = 2;

    // Resolves fine but has no publish date, so the transform fails
    mount_id(
        &server,
        1,
        html(
            r#"<html><head><title>Undated</title></head><body><div class="item-page">
<div class="print-icon"><a href="/index.php/stories/1-undated?tmpl=component&amp;print=1">Print</a></div>
<div itemprop="articleBody"><p>no date</p></div></div></body></html>"#
                .to_string(),
        ),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/index.php"))
        .respond_with(
            html(story_page("stories", 2, "slow", "2016-01-01T00:00:00+00:00", "a"))
                .set_delay(Duration::from_millis(250)),
        )
        .mount(&server)
        .await;

    let access = Arc::new(SiteAccess::new(&config).unwrap());
    let base = url::Url::parse(&config.client.base_url).unwrap();
    let err = run_pipeline(access, &config.crawl, 1, Arc::new(PublicationOrder::new(base)))
        .await
        .err()
        .expect("crawl should stop");

    assert!(err.to_string().contains("story 1"));
    let requests = server.received_requests().await.unwrap();
    assert!(
        requests.len() < 10,
        "{} of 40 ids were requested after the failure",
        requests.len()
    );
}

#[tokio::test]
async fn test_concurrent_requests_for_one_story_fetch_once() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir);

    Mock::given(method("GET"))
        .and(path("/index.php"))
        .and(query_param("id", "42"))
        .respond_with(
            html(story_page(
                "stories",
                42,
                "shared",
                "2016-01-01T00:00:00+00:00",
                "one two",
            ))
            .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let access = Arc::new(SiteAccess::new(&config).unwrap());
    let mut handles = Vec::new();
    for _ in 0..6 {
        let access = Arc::clone(&access);
        handles.push(tokio::spawn(async move { access.get_story_by_id(42).await }));
    }
    for handle in handles {
        let page = handle.await.unwrap().unwrap();
        assert_eq!(page.identity().id, "42");
        assert_eq!(page.word_count(), 2);
    }

    let stats = lock_cache(access.cache()).unwrap().statistics().unwrap();
    assert_eq!(stats.page_count, 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_asset_is_fetched_once_and_cached() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir);

    Mock::given(method("GET"))
        .and(path("/images/breaks/linebreak-bluearcs.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(vec![0xff, 0xd8, 0xff, 0xe0]),
        )
        .expect(1)
        .mount(&server)
        .await;

    let access = SiteAccess::new(&config).unwrap();
    let url = url::Url::parse(&format!(
        "{}/images/breaks/linebreak-bluearcs.jpg",
        server.uri()
    ))
    .unwrap();

    let first = access.get_asset(&url).await.unwrap();
    assert_eq!(first.body, vec![0xff, 0xd8, 0xff, 0xe0]);
    assert_eq!(first.content_type.as_deref(), Some("image/jpeg"));

    let second = access.get_asset(&url).await.unwrap();
    assert_eq!(second.body, first.body);
    assert_eq!(second.content_type.as_deref(), Some("image/jpeg"));
}

#[tokio::test]
async fn test_search_finds_cached_stories() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir);

    mount_id(
        &server,
        40,
        html(story_page(
            "stories",
            40,
            "crystal-hall",
            "2016-01-01T00:00:00+00:00",
            "She found the Crystal Hall empty.",
        )),
    )
    .await;
    mount_id(
        &server,
        41,
        html(story_page(
            "stories",
            41,
            "other",
            "2016-01-01T00:00:00+00:00",
            "Nothing here.",
        )),
    )
    .await;

    let access = SiteAccess::new(&config).unwrap();
    access.get_story_by_id(41).await.unwrap();
    access.get_story_by_id(40).await.unwrap();

    assert_eq!(access.search_fulltext("Crystal Hall").unwrap(), vec![40]);

    let hits = access
        .search_with_context("Crystal Hall", 4, 6)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 40);
    assert_eq!(hits[0].snippet, "the Crystal Hall empty");
}
