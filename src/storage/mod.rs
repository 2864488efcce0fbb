//! Storage module for persisting received posts
//!
//! This module handles the sink side of the pipeline:
//! - SQLite database initialization and schema management
//! - Append-only post inserts, one transaction per envelope
//! - Row counts for the `stats` command

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteSink;
pub use traits::{PostSink, StorageError, StorageResult};

use std::path::Path;

/// Initializes or opens the post database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn open_sink(path: &Path) -> StorageResult<SqliteSink> {
    SqliteSink::new(path)
}
