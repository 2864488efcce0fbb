//! Link patterns of the forum software
//!
//! Subforum and thread links are recognised by their exact href shape and
//! resolved against the page they were found on.

use crate::crawler::Page;
use regex::Regex;
use scraper::Selector;
use std::sync::LazyLock;
use url::Url;

/// `forumdisplay.php?f=<digits>` with nothing after the id
pub static FORUM_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^forumdisplay\.php\?f=[0-9]+$").unwrap());

/// `showthread.php?t=<digits>` with nothing after the id
pub static THREAD_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^showthread\.php\?t=[0-9]+$").unwrap());

/// Returns true for hrefs that trigger a forum action (`do=markread`, ...)
/// rather than display a forum or thread
pub fn is_action_link(href: &str) -> bool {
    href.split_once('?')
        .map(|(_, query)| query.split('&').any(|param| param.starts_with("do=")))
        .unwrap_or(false)
}

/// Resolves `href` against `base`, dropping any fragment
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let mut url = base.join(href).ok()?;
    url.set_fragment(None);
    Some(url)
}

/// Collects the absolute URLs of every anchor whose href matches `pattern`
///
/// Results keep document order and may contain repeats; callers collapse
/// them into whatever set they maintain.
pub fn matching_links(page: &Page, pattern: &Regex) -> Vec<Url> {
    let mut links = Vec::new();

    let Ok(selector) = Selector::parse("a[href]") else {
        return links;
    };

    for element in page.document().select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();

        if is_action_link(href) || !pattern.is_match(href) {
            continue;
        }

        if let Some(url) = resolve_href(page.url(), href) {
            links.push(url);
        }
    }

    links
}
