//! Crawler module for the authenticated forum walk
//!
//! This module contains the crawling side of the pipeline, including:
//! - Login and the cookie-carrying HTTP session
//! - Page fetching and HTML parsing
//! - Forum discovery, pagination and post extraction
//! - Overall crawl coordination

mod coordinator;
mod discovery;
mod extract;
mod fetcher;
mod links;
mod pagination;
mod session;

pub use coordinator::{crawl_into, run_crawl, Coordinator, CrawlStats};
pub use discovery::{discover_forums, subforum_links};
pub use extract::{extract_posts, extract_threads, page_posts, thread_links};
pub use fetcher::{fetch_page, FetchError, FetchErrorKind, Page};
pub use links::{is_action_link, resolve_href};
pub use pagination::{expand_pages, page_count, resolve_pages, PageMarker, DEFAULT_MAX_PAGES};
pub use session::{build_http_client, login_form, password_digest, Session};
