//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the PostSink trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{PostSink, StorageResult};
use crate::Post;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;

const INSERT_POST: &str = "INSERT INTO posts (username, content, received_at) VALUES (?1, ?2, ?3)";

/// SQLite post sink
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Opens or creates the database at `path`
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Total number of stored posts
    pub fn count_posts(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Post counts per author, most prolific first
    pub fn count_by_author(&self, limit: usize) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT username, COUNT(*) AS n FROM posts GROUP BY username ORDER BY n DESC, username LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        let mut authors = Vec::new();
        for row in rows {
            authors.push(row?);
        }
        Ok(authors)
    }

    /// All stored posts in insertion order
    pub fn posts(&self) -> StorageResult<Vec<Post>> {
        let mut stmt = self
            .conn
            .prepare("SELECT username, content FROM posts ORDER BY id")?;

        let rows = stmt.query_map([], |row| {
            Ok(Post {
                username: row.get(0)?,
                content: row.get(1)?,
            })
        })?;

        let mut posts = Vec::new();
        for row in rows {
            posts.push(row?);
        }
        Ok(posts)
    }
}

impl PostSink for SqliteSink {
    fn insert(&mut self, username: &str, content: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(INSERT_POST, params![username, content, now])?;
        Ok(())
    }

    /// Writes the envelope in one transaction
    fn insert_all(&mut self, posts: &[Post]) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(INSERT_POST)?;
            for post in posts {
                stmt.execute(params![post.username, post.content, now])?;
            }
        }
        tx.commit()?;
        Ok(posts.len())
    }
}
