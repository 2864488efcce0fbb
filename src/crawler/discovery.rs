//! Forum hierarchy discovery
//!
//! Walks the forum tree from a root URL with an explicit worklist. Each node
//! is fetched at most once; a node that cannot be fetched ends its branch
//! without failing the walk.

use crate::crawler::links::{matching_links, FORUM_HREF};
use crate::crawler::{fetch_page, Page, Session};
use std::collections::{BTreeSet, HashSet};
use url::Url;

/// Returns the subforum links found on a page, in document order
pub fn subforum_links(page: &Page) -> Vec<Url> {
    matching_links(page, &FORUM_HREF)
}

/// Discovers every forum reachable from `root`
///
/// # Algorithm
///
/// 1. Seed the worklist and the visited set with `root`
/// 2. Pop a URL and fetch it; on failure log `skipping <url>` and continue
/// 3. Push every unseen subforum link, so each URL is fetched once
/// 4. Stop when the worklist is empty
///
/// Links are pushed in reverse so that popping follows document order, which
/// gives the same pre-order walk as a recursive traversal.
///
/// # Returns
///
/// The discovered subforum URLs. The root is the seed, not a discovery, and
/// is never part of the result.
pub async fn discover_forums(session: &Session, root: &Url) -> BTreeSet<Url> {
    let mut visited: HashSet<Url> = HashSet::new();
    let mut discovered: BTreeSet<Url> = BTreeSet::new();
    let mut pending: Vec<Url> = vec![root.clone()];
    visited.insert(root.clone());

    while let Some(url) = pending.pop() {
        let links = match fetch_page(session, &url).await {
            Ok(page) => subforum_links(&page),
            Err(e) => {
                tracing::warn!("skipping {}: {}", url, e);
                continue;
            }
        };

        let mut fresh = Vec::new();
        for link in links {
            if visited.insert(link.clone()) {
                tracing::debug!("Discovered forum {} (from {})", link, url);
                discovered.insert(link.clone());
                fresh.push(link);
            }
        }
        pending.extend(fresh.into_iter().rev());
    }

    tracing::info!("Discovered {} forums under {}", discovered.len(), root);
    discovered
}
