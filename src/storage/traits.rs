//! Storage traits and error types
//!
//! This module defines the trait interface for post sinks and
//! associated error types.

use crate::Post;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// An append-only destination for extracted posts
///
/// There is no uniqueness constraint: inserting the same pair twice stores
/// it twice, so broker redeliveries show up as duplicate rows rather than
/// lost ones.
pub trait PostSink {
    /// Appends one post
    fn insert(&mut self, username: &str, content: &str) -> StorageResult<()>;

    /// Appends every post of one envelope
    ///
    /// The default inserts one by one; backends that can should make the
    /// whole envelope atomic so a failed delivery leaves no partial rows.
    ///
    /// # Returns
    ///
    /// The number of posts written
    fn insert_all(&mut self, posts: &[Post]) -> StorageResult<usize> {
        for post in posts {
            self.insert(&post.username, &post.content)?;
        }
        Ok(posts.len())
    }
}
