//! Envelope wire format
//!
//! One envelope carries the posts of one thread page as a JSON array of
//! `{"username": ..., "content": ...}` objects.

use crate::Post;

/// Serializes the posts of one thread page
pub fn encode_envelope(posts: &[Post]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(posts)
}

/// Decodes a message body back into posts, keeping their order
pub fn decode_envelope(body: &[u8]) -> Result<Vec<Post>, serde_json::Error> {
    serde_json::from_slice(body)
}
