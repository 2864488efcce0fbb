//! Crawl coordinator - main crawl orchestration logic
//!
//! Walks the forum tree in order: discovery, listing pagination, thread
//! extraction, thread pagination, post extraction. Each thread page that
//! yields posts becomes one envelope handed to the publisher. Every fetch is
//! awaited before the next one starts.

use crate::config::Config;
use crate::crawler::discovery::discover_forums;
use crate::crawler::extract::{extract_posts, extract_threads};
use crate::crawler::pagination::{resolve_pages, PageMarker};
use crate::crawler::session::Session;
use crate::queue::{AmqpPublisher, EnvelopePublisher};
use crate::{ConfigError, HarvestError, Post};
use std::collections::HashSet;
use url::Url;

/// Counters reported at the end of a crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub forums: usize,
    pub listing_pages: usize,
    pub listings_skipped: usize,
    pub threads: usize,
    pub thread_pages: usize,
    pub posts: usize,
    pub envelopes_published: usize,
    pub publish_failures: usize,
}

/// Drives one crawl over an authenticated session
pub struct Coordinator<'a, P: EnvelopePublisher + ?Sized> {
    session: &'a Session,
    marker: &'a PageMarker,
    publisher: &'a P,
    seen_threads: HashSet<Url>,
    stats: CrawlStats,
}

impl<'a, P: EnvelopePublisher + ?Sized> Coordinator<'a, P> {
    pub fn new(session: &'a Session, marker: &'a PageMarker, publisher: &'a P) -> Self {
        Self {
            session,
            marker,
            publisher,
            seen_threads: HashSet::new(),
            stats: CrawlStats::default(),
        }
    }

    /// Crawls every forum reachable from `root`
    ///
    /// Failures are contained per URL and logged; the crawl always runs to
    /// the end and reports what it managed to do.
    pub async fn run(mut self, root: &Url) -> CrawlStats {
        tracing::info!("Starting crawl at {}", root);

        let forums = discover_forums(self.session, root).await;
        self.stats.forums = forums.len();

        for forum in &forums {
            self.crawl_forum(forum).await;
        }

        tracing::info!(
            "Crawl complete: {} forums, {} threads, {} posts in {} envelopes",
            self.stats.forums,
            self.stats.threads,
            self.stats.posts,
            self.stats.envelopes_published
        );
        self.stats
    }

    async fn crawl_forum(&mut self, forum: &Url) {
        tracing::debug!("Processing forum: {}", forum);

        for listing in resolve_pages(self.session, forum, self.marker).await {
            self.stats.listing_pages += 1;

            let threads = match extract_threads(self.session, &listing).await {
                Ok(threads) => threads,
                Err(e) => {
                    tracing::warn!("skipping {}: {}", listing, e);
                    self.stats.listings_skipped += 1;
                    continue;
                }
            };

            for thread in threads {
                // Sticky threads show up on every listing page
                if self.seen_threads.insert(thread.clone()) {
                    self.stats.threads += 1;
                    self.crawl_thread(&thread).await;
                }
            }
        }
    }

    async fn crawl_thread(&mut self, thread: &Url) {
        for page in resolve_pages(self.session, thread, self.marker).await {
            self.stats.thread_pages += 1;

            let posts: Vec<Post> = extract_posts(self.session, &page)
                .await
                .into_iter()
                .collect();
            if posts.is_empty() {
                tracing::debug!("No posts on {}", page);
                continue;
            }

            self.stats.posts += posts.len();
            match self.publisher.publish(&posts).await {
                Ok(()) => self.stats.envelopes_published += 1,
                Err(e) => {
                    tracing::error!("Failed to publish posts from {}: {}", page, e);
                    self.stats.publish_failures += 1;
                }
            }
        }
    }
}

/// Authenticates and crawls the configured forum into `publisher`
///
/// # Arguments
///
/// * `config` - The harvester configuration
/// * `publisher` - Destination for post envelopes
///
/// # Returns
///
/// * `Ok(CrawlStats)` - Crawl finished
/// * `Err(HarvestError)` - Login could not be delivered
pub async fn crawl_into<P: EnvelopePublisher + ?Sized>(
    config: &Config,
    publisher: &P,
) -> Result<CrawlStats, HarvestError> {
    let marker = PageMarker::new(&config.forum.page_marker)
        .map_err(|e| ConfigError::Validation(format!("page-marker: {}", e)))?
        .with_max_pages(config.forum.max_pages);
    let session = Session::authenticate(&config.forum).await?;
    let root = session.base_url().clone();

    Ok(Coordinator::new(&session, &marker, publisher)
        .run(&root)
        .await)
}

/// Runs a complete crawl publishing to the configured broker
pub async fn run_crawl(config: &Config) -> Result<CrawlStats, HarvestError> {
    let publisher = AmqpPublisher::connect(&config.broker).await?;
    let stats = crawl_into(config, &publisher).await;
    publisher.close().await?;
    stats
}
