//! Shared constants for windowing and batch limits.
//!
//! These bound the live working set of materialized posts and the size of
//! any single fetch, so a very large topic never forces a very large request.

// =============================================================================
// Windowing
// =============================================================================

/// Number of posts loaded per append/prepend window.
pub const CHUNK_SIZE: usize = 20;

/// Stream positions fetched on either side of an excerpt request, so one
/// request covers a neighborhood instead of one request per post.
pub const EXCERPT_NEIGHBORHOOD: usize = 5;

// =============================================================================
// Batch Limits
// =============================================================================

/// Maximum number of post ids allowed in a single batch fetch.
pub const MAX_BATCH_SIZE: usize = 100;

/// Sentinel id carried by an optimistically staged post until the server
/// assigns the canonical id.
pub const STAGED_POST_ID: i64 = -1;
