//! The post record shared by the crawler, the queue and the sink

use serde::{Deserialize, Serialize};

/// One authored message extracted from a thread page
///
/// `content` holds the raw inner markup of the message body, not plain text.
/// Ordering and hashing are by the `(username, content)` pair, so a set of
/// posts collapses exact duplicates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Post {
    pub username: String,
    pub content: String,
}

impl Post {
    pub fn new(username: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            content: content.into(),
        }
    }
}
