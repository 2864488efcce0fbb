//! Integration tests for the persistence side
//!
//! Envelopes produced by a real crawl of the mock forum are fed through the
//! consumer state machine into SQLite.

use crate::support::*;
use forum_harvest::crawler::{Coordinator, PageMarker};
use forum_harvest::queue::{
    persist_delivery, Action, ConsumerEvent, ConsumerMachine, DeliveryOutcome, MemoryPublisher,
};
use forum_harvest::storage::{open_sink, PostSink, SqliteSink};
use forum_harvest::Post;
use wiremock::MockServer;

async fn crawl_envelopes(server: &MockServer) -> Vec<Vec<u8>> {
    mount_index(
        server,
        r#"<a href="forumdisplay.php?f=1">General</a>
           <a href="forumdisplay.php?f=2">Offtopic</a>"#,
    )
    .await;
    mount_forum(
        server,
        "1",
        r#"<a href="showthread.php?t=10">One</a>
           <a href="showthread.php?t=11">Two</a>"#,
    )
    .await;
    mount_forum(server, "2", r#"<a href="showthread.php?t=20">Three</a>"#).await;
    mount_thread(
        server,
        "10",
        &format!(
            "{}{}{}",
            page_nav(2),
            styled_post(1, "Ann", "first"),
            styled_post(2, "Ben", "<i>second</i>")
        ),
    )
    .await;
    mount_thread(server, "11", &guest_post(3, "Guest", "third")).await;
    mount_thread(server, "20", &styled_post(4, "Ann", "fourth")).await;

    let session = quick_session(server);
    let marker = PageMarker::new("Pagina 1 de").unwrap();
    let publisher = MemoryPublisher::new();

    Coordinator::new(&session, &marker, &publisher)
        .run(session.base_url())
        .await;

    publisher.envelopes()
}

fn consuming<S: PostSink>(sink: S) -> ConsumerMachine<S> {
    let mut machine = ConsumerMachine::new(sink);
    for event in [
        ConsumerEvent::Start,
        ConsumerEvent::Connected,
        ConsumerEvent::ChannelOpened,
        ConsumerEvent::QueueDeclared,
        ConsumerEvent::ConsumeStarted,
    ] {
        machine.handle(event);
    }
    machine
}

/// Delivers every envelope in order, settling each before the next
fn deliver_all<S: PostSink>(machine: &mut ConsumerMachine<S>, envelopes: &[Vec<u8>]) {
    for (index, body) in envelopes.iter().enumerate() {
        let delivery_tag = index as u64 + 1;
        let actions = machine.handle(ConsumerEvent::Delivered {
            delivery_tag,
            body: body.clone(),
        });
        assert_eq!(actions, vec![Action::Ack(delivery_tag)]);
        machine.handle(ConsumerEvent::Settled { delivery_tag });
    }
}

#[tokio::test]
async fn test_crawled_posts_reach_the_database() {
    let server = MockServer::start().await;
    let envelopes = crawl_envelopes(&server).await;

    // Thread 10 has two pages carrying the same posts
    assert_eq!(envelopes.len(), 4);

    let mut machine = consuming(SqliteSink::new_in_memory().unwrap());
    deliver_all(&mut machine, &envelopes);

    let stored = machine.sink().posts().unwrap();
    assert_eq!(stored.len(), 6);
    assert_eq!(machine.stats().posts_persisted, 6);
    assert!(stored.contains(&Post::new("Ben", "<i>second</i>")));
    assert!(stored.contains(&Post::new("Guest", "third")));
    assert!(stored.contains(&Post::new("Ann", "fourth")));
}

#[tokio::test]
async fn test_round_trip_into_file_database() {
    let server = MockServer::start().await;
    let envelopes = crawl_envelopes(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("posts.db");

    {
        let mut machine = consuming(open_sink(&db_path).unwrap());
        deliver_all(&mut machine, &envelopes);
    }

    let sink = open_sink(&db_path).unwrap();
    assert_eq!(sink.count_posts().unwrap(), 6);
    assert_eq!(
        sink.count_by_author(1).unwrap(),
        vec![("Ann".to_string(), 3)]
    );
}

#[tokio::test]
async fn test_redelivered_envelope_is_stored_twice() {
    let server = MockServer::start().await;
    let envelopes = crawl_envelopes(&server).await;
    let mut sink = SqliteSink::new_in_memory().unwrap();

    let first = &envelopes[0];
    assert_eq!(persist_delivery(&mut sink, first), DeliveryOutcome::Persisted(2));
    assert_eq!(persist_delivery(&mut sink, first), DeliveryOutcome::Persisted(2));

    assert_eq!(sink.count_posts().unwrap(), 4);
}

#[test]
fn test_foreign_message_is_rejected_without_writes() {
    let mut machine = consuming(SqliteSink::new_in_memory().unwrap());

    let actions = machine.handle(ConsumerEvent::Delivered {
        delivery_tag: 1,
        body: br#"{"event":"unrelated"}"#.to_vec(),
    });

    assert_eq!(actions, vec![Action::Reject(1)]);
    assert_eq!(machine.sink().count_posts().unwrap(), 0);
}
