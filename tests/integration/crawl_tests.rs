//! Integration tests for the crawl side
//!
//! Login, discovery, pagination, extraction and the full coordinated crawl
//! against a mock forum.

use crate::support::*;
use async_trait::async_trait;
use forum_harvest::crawler::{
    discover_forums, extract_posts, extract_threads, fetch_page, resolve_pages, Coordinator,
    PageMarker,
};
use forum_harvest::queue::{decode_envelope, BrokerError, EnvelopePublisher, MemoryPublisher};
use forum_harvest::{HarvestError, Post, Session};
use std::collections::BTreeSet;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn marker() -> PageMarker {
    PageMarker::new("Pagina 1 de").unwrap()
}

fn forum_url(server: &MockServer, id: u32) -> Url {
    base_url(server)
        .join(&format!("forumdisplay.php?f={}", id))
        .unwrap()
}

fn thread_url(server: &MockServer, id: u32) -> Url {
    base_url(server)
        .join(&format!("showthread.php?t={}", id))
        .unwrap()
}

#[tokio::test]
async fn test_login_sends_digest_form_and_keeps_cookie() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login.php"))
        .and(query_param("do", "login"))
        .and(body_string_contains("vb_login_username=alice"))
        .and(body_string_contains(
            "vb_login_md5password=5f4dcc3b5aa765d61d8327deb882cf99",
        ))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "bbsessionhash=abc123; path=/")
                .set_body_string("<html><body>Thank you for logging in</body></html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("cookie", "bbsessionhash=abc123"))
        .respond_with(html("members only"))
        .expect(1)
        .mount(&server)
        .await;

    let session = Session::authenticate(&forum_config(&server)).await.unwrap();
    let page = fetch_page(&session, session.base_url()).await.unwrap();

    assert_eq!(page.url(), session.base_url());
}

#[tokio::test]
async fn test_login_response_is_not_inspected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login.php"))
        .respond_with(ResponseTemplate::new(403).set_body_string("wrong password"))
        .expect(1)
        .mount(&server)
        .await;

    let session = Session::authenticate(&forum_config(&server)).await;

    assert!(session.is_ok());
}

#[tokio::test]
async fn test_login_to_unreachable_forum_fails() {
    let server = MockServer::start().await;
    let mut config = forum_config(&server);
    config.base_url = "http://127.0.0.1:9/".to_string();

    let result = Session::authenticate(&config).await;

    match result {
        Err(HarvestError::AuthTransport { url, .. }) => {
            assert_eq!(url, "http://127.0.0.1:9/login.php?do=login");
        }
        other => panic!("expected AuthTransport, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_login_timeout_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login.php"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("slow")
                .set_delay(Duration::from_secs(3)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut config = forum_config(&server);
    config.request_timeout_secs = 1;

    let result = Session::authenticate(&config).await;

    match result {
        Err(HarvestError::AuthTransport { source, .. }) => assert!(source.is_timeout()),
        other => panic!("expected AuthTransport, got {:?}", other.map(|_| ())),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_login_gives_up_after_one_attempt() {
    let server = MockServer::start().await;
    let mut config = forum_config(&server);
    config.base_url = "http://127.0.0.1:9/".to_string();
    config.connect_attempts = 1;
    config.backoff_ms = 5_000;

    let started = std::time::Instant::now();
    let result = Session::authenticate(&config).await;

    assert!(matches!(result, Err(HarvestError::AuthTransport { .. })));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_discovery_excludes_root_and_survives_cycles() {
    let server = MockServer::start().await;

    mount_index(
        &server,
        r#"<a href="forumdisplay.php?f=1">A</a>
           <a href="forumdisplay.php?f=2">B</a>
           <a href="forumdisplay.php?do=markread&amp;f=0">Mark all read</a>"#,
    )
    .await;
    mount_forum(
        &server,
        "1",
        r#"<a href="forumdisplay.php?f=3">C</a>
           <a href="forumdisplay.php?f=2">B again</a>"#,
    )
    .await;
    mount_forum(&server, "2", "no subforums").await;
    mount_forum(&server, "3", r#"<a href="forumdisplay.php?f=1">back to A</a>"#).await;

    let session = quick_session(&server);
    let forums = discover_forums(&session, session.base_url()).await;

    let expected: BTreeSet<Url> = [1, 2, 3].iter().map(|&f| forum_url(&server, f)).collect();
    assert_eq!(forums, expected);

    // Each forum page was fetched exactly once
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 4);
}

#[tokio::test]
async fn test_discovery_rooted_at_forum_excludes_it() {
    let server = MockServer::start().await;

    mount_forum(&server, "1", r#"<a href="forumdisplay.php?f=2">child</a>"#).await;
    mount_forum(&server, "2", r#"<a href="forumdisplay.php?f=1">parent</a>"#).await;

    let session = quick_session(&server);
    let forums = discover_forums(&session, &forum_url(&server, 1)).await;

    assert_eq!(forums.into_iter().collect::<Vec<_>>(), vec![forum_url(&server, 2)]);
}

#[tokio::test]
async fn test_discovery_skips_failed_branch() {
    let server = MockServer::start().await;

    mount_index(
        &server,
        r#"<a href="forumdisplay.php?f=1">slow</a>
           <a href="forumdisplay.php?f=2">fine</a>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/forumdisplay.php"))
        .and(query_param("f", "1"))
        .respond_with(html(r#"<a href="forumdisplay.php?f=9">hidden</a>"#).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;
    mount_forum(&server, "2", r#"<a href="forumdisplay.php?f=4">D</a>"#).await;
    mount_forum(&server, "4", "leaf").await;

    let session = quick_session(&server);
    let forums = discover_forums(&session, session.base_url()).await;

    assert!(forums.contains(&forum_url(&server, 1)));
    assert!(forums.contains(&forum_url(&server, 4)));
    assert!(!forums.contains(&forum_url(&server, 9)));
}

#[tokio::test]
async fn test_discovery_of_unreachable_root_is_empty() {
    let server = MockServer::start().await;
    let session = quick_session(&server);
    let root = Url::parse("http://127.0.0.1:9/").unwrap();

    assert!(discover_forums(&session, &root).await.is_empty());
}

#[tokio::test]
async fn test_pagination_from_marker() {
    let server = MockServer::start().await;
    mount_forum(&server, "5", &page_nav(3)).await;

    let session = quick_session(&server);
    let pages = resolve_pages(&session, &forum_url(&server, 5), &marker()).await;

    let pages: Vec<String> = pages.iter().map(|u| u.to_string()).collect();
    assert_eq!(
        pages,
        vec![
            format!("{}forumdisplay.php?f=5&page=1", base_url(&server)),
            format!("{}forumdisplay.php?f=5&page=2", base_url(&server)),
            format!("{}forumdisplay.php?f=5&page=3", base_url(&server)),
        ]
    );
}

#[tokio::test]
async fn test_pagination_without_marker_keeps_url() {
    let server = MockServer::start().await;
    mount_forum(&server, "5", r#"<td class="vbmenu_control">Show threads</td>"#).await;

    let session = quick_session(&server);
    let listing = forum_url(&server, 5);

    assert_eq!(resolve_pages(&session, &listing, &marker()).await, vec![listing]);
}

#[tokio::test]
async fn test_pagination_of_unreachable_listing_keeps_url() {
    let server = MockServer::start().await;
    let session = quick_session(&server);
    let listing = Url::parse("http://127.0.0.1:9/forumdisplay.php?f=1").unwrap();

    assert_eq!(resolve_pages(&session, &listing, &marker()).await, vec![listing]);
}

#[tokio::test]
async fn test_thread_and_post_extraction() {
    let server = MockServer::start().await;
    mount_forum(
        &server,
        "1",
        r#"<a href="showthread.php?t=10">First</a>
           <a href="showthread.php?t=11">Second</a>
           <a href="showthread.php?t=10#post5">First, jump</a>
           <a href="showthread.php?t=10&amp;goto=newpost">New posts</a>"#,
    )
    .await;
    mount_thread(
        &server,
        "10",
        &[
            styled_post(1, "Alice", "Hello <b>world</b>"),
            guest_post(2, "Guest", "anonymous"),
            styled_post(3, "Alice", "Hello <b>world</b>"),
        ]
        .concat(),
    )
    .await;

    let session = quick_session(&server);

    let threads = extract_threads(&session, &forum_url(&server, 1)).await.unwrap();
    assert_eq!(
        threads.into_iter().collect::<Vec<_>>(),
        vec![thread_url(&server, 10), thread_url(&server, 11)]
    );

    let posts = extract_posts(&session, &thread_url(&server, 10)).await;
    let expected: BTreeSet<Post> = [
        Post::new("Alice", "Hello <b>world</b>"),
        Post::new("Guest", "anonymous"),
    ]
    .into_iter()
    .collect();
    assert_eq!(posts, expected);
}

#[tokio::test]
async fn test_unreachable_pages() {
    let server = MockServer::start().await;
    let session = quick_session(&server);
    let forum = Url::parse("http://127.0.0.1:9/forumdisplay.php?f=1").unwrap();
    let thread = Url::parse("http://127.0.0.1:9/showthread.php?t=1").unwrap();

    assert!(extract_threads(&session, &forum).await.is_err());
    assert!(extract_posts(&session, &thread).await.is_empty());
}

/// Index with one forum of two listing pages and two threads; the first
/// thread is sticky and listed on both pages
async fn mount_small_forum(server: &MockServer) {
    mount_index(server, r#"<a href="forumdisplay.php?f=1">General</a>"#).await;
    mount_forum(
        server,
        "1",
        &format!(
            r#"{}
               <a href="showthread.php?t=10">Sticky</a>
               <a href="showthread.php?t=11">Question</a>"#,
            page_nav(2)
        ),
    )
    .await;
    mount_thread(
        server,
        "10",
        &[
            styled_post(101, "Alice", "Hello <b>world</b>"),
            styled_post(102, "Bob", "same"),
            styled_post(103, "Bob", "same"),
        ]
        .concat(),
    )
    .await;
    mount_thread(server, "11", &guest_post(201, "Guest", "anyone?")).await;
}

#[tokio::test]
async fn test_full_crawl_publishes_one_envelope_per_thread_page() {
    let server = MockServer::start().await;
    mount_small_forum(&server).await;

    let session = quick_session(&server);
    let marker = marker();
    let publisher = MemoryPublisher::new();

    let stats = Coordinator::new(&session, &marker, &publisher)
        .run(session.base_url())
        .await;

    assert_eq!(stats.forums, 1);
    assert_eq!(stats.listing_pages, 2);
    assert_eq!(stats.threads, 2);
    assert_eq!(stats.thread_pages, 2);
    assert_eq!(stats.posts, 3);
    assert_eq!(stats.envelopes_published, 2);

    let envelopes: Vec<Vec<Post>> = publisher
        .envelopes()
        .iter()
        .map(|body| decode_envelope(body).unwrap())
        .collect();
    assert_eq!(
        envelopes,
        vec![
            vec![
                Post::new("Alice", "Hello <b>world</b>"),
                Post::new("Bob", "same"),
            ],
            vec![Post::new("Guest", "anyone?")],
        ]
    );
}

#[tokio::test]
async fn test_empty_thread_pages_are_not_published() {
    let server = MockServer::start().await;
    mount_index(&server, r#"<a href="forumdisplay.php?f=1">General</a>"#).await;
    mount_forum(&server, "1", r#"<a href="showthread.php?t=10">Moved</a>"#).await;
    mount_thread(&server, "10", "This thread has been moved").await;

    let session = quick_session(&server);
    let marker = marker();
    let publisher = MemoryPublisher::new();

    let stats = Coordinator::new(&session, &marker, &publisher)
        .run(session.base_url())
        .await;

    assert_eq!(stats.thread_pages, 1);
    assert_eq!(stats.envelopes_published, 0);
    assert_eq!(publisher.publish_count(), 0);
}

struct RefusingPublisher;

#[async_trait]
impl EnvelopePublisher for RefusingPublisher {
    async fn publish(&self, _posts: &[Post]) -> Result<(), BrokerError> {
        let invalid = serde_json::from_str::<Vec<Post>>("{").unwrap_err();
        Err(BrokerError::Encode(invalid))
    }
}

#[tokio::test]
async fn test_publish_failures_do_not_stop_the_crawl() {
    let server = MockServer::start().await;
    mount_small_forum(&server).await;

    let session = quick_session(&server);
    let marker = marker();

    let stats = Coordinator::new(&session, &marker, &RefusingPublisher)
        .run(session.base_url())
        .await;

    assert_eq!(stats.threads, 2);
    assert_eq!(stats.envelopes_published, 0);
    assert_eq!(stats.publish_failures, 2);
}
