//! Thread and post extraction
//!
//! This module extracts:
//! - Thread URLs from a forum listing page
//! - `(username, content)` posts from a thread page
//!
//! vBulletin renders each post in a container with id `post<N>`. Registered
//! authors appear in a `bigusername` element; guests and deleted users only
//! have the `postmenu_<N>` element, so that fallback is always consulted.

use crate::crawler::links::{matching_links, THREAD_HREF};
use crate::crawler::{fetch_page, FetchError, Page, Session};
use crate::Post;
use regex::Regex;
use scraper::{ElementRef, Selector};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use url::Url;

static POST_CONTAINER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^post[0-9]+$").unwrap());

static POST_MENU_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^postmenu_[0-9]+$").unwrap());

static POST_MESSAGE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^post_message_[0-9]+$").unwrap());

/// Returns the thread URLs linked from a forum page
pub fn thread_links(page: &Page) -> BTreeSet<Url> {
    matching_links(page, &THREAD_HREF).into_iter().collect()
}

/// Fetches a forum listing page and returns the threads it links to
///
/// Unlike discovery, a fetch failure here is an error for the whole page;
/// the caller decides whether to skip it.
pub async fn extract_threads(session: &Session, forum_page: &Url) -> Result<BTreeSet<Url>, FetchError> {
    let page = fetch_page(session, forum_page).await?;
    let threads = thread_links(&page);
    tracing::debug!("{} threads on {}", threads.len(), forum_page);
    Ok(threads)
}

/// Extracts every post on a thread page
///
/// Containers lacking a message body or any author element are malformed and
/// skipped. Exact-duplicate posts collapse.
pub fn page_posts(page: &Page) -> BTreeSet<Post> {
    let mut posts = BTreeSet::new();

    let Ok(with_id) = Selector::parse("[id]") else {
        return posts;
    };

    for container in page.document().select(&with_id) {
        let Some(id) = container.value().id() else {
            continue;
        };
        if !POST_CONTAINER_ID.is_match(id) {
            continue;
        }

        match extract_post(container) {
            Some(post) => {
                posts.insert(post);
            }
            None => tracing::debug!("Skipping malformed post container {} on {}", id, page.url()),
        }
    }

    posts
}

/// Fetches a thread page and extracts its posts
///
/// A page that cannot be fetched yields no posts.
pub async fn extract_posts(session: &Session, thread_page: &Url) -> BTreeSet<Post> {
    match fetch_page(session, thread_page).await {
        Ok(page) => page_posts(&page),
        Err(e) => {
            tracing::warn!("skipping {}: {}", thread_page, e);
            BTreeSet::new()
        }
    }
}

fn extract_post(container: ElementRef<'_>) -> Option<Post> {
    let username = styled_username(container).or_else(|| menu_username(container))?;
    let message = descendant_with_id(container, &POST_MESSAGE_ID)?;

    // Inner HTML is the concatenation of the serialized child nodes
    Some(Post {
        username,
        content: message.inner_html(),
    })
}

fn styled_username(container: ElementRef<'_>) -> Option<String> {
    let selector = Selector::parse(".bigusername").ok()?;
    container.select(&selector).find_map(first_text)
}

fn menu_username(container: ElementRef<'_>) -> Option<String> {
    descendant_with_id(container, &POST_MENU_ID).and_then(first_text)
}

fn descendant_with_id<'a>(container: ElementRef<'a>, pattern: &Regex) -> Option<ElementRef<'a>> {
    let selector = Selector::parse("[id]").ok()?;
    container
        .select(&selector)
        .find(|element| element.value().id().is_some_and(|id| pattern.is_match(id)))
}

/// First non-blank text fragment of an element, trimmed
///
/// Usernames styled by usergroup (`<b>`, `<span style=..>`) come out as
/// their plain text rather than the wrapping markup.
fn first_text(element: ElementRef<'_>) -> Option<String> {
    element
        .text()
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}
