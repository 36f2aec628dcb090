//! The post model and its merge semantics.

use crate::constants::STAGED_POST_ID;
use serde::{Deserialize, Serialize};

/// A single post within a topic.
///
/// Identity is by `id`; `post_number` determines order within the topic.
/// Posts arrive either from a fetch (loaded directly into the identity map)
/// or from an optimistic local submission (staged with the sentinel id, then
/// committed with the server-assigned one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Stable identity.
    pub id: i64,
    /// 1-based position within the topic.
    pub post_number: u32,
    /// Topic this post belongs to.
    pub topic_id: u64,
    /// Author reference.
    pub username: String,
    /// Body content.
    pub raw: String,
    /// Creation time, epoch milliseconds.
    pub created_at: u64,
    /// Edit version; bumps on each revision.
    #[serde(default = "default_version")]
    pub version: u32,
    /// True once the post has been soft-deleted.
    #[serde(default)]
    pub deleted: bool,
    /// Post number this post replies to, if any.
    #[serde(default)]
    pub reply_to_post_number: Option<u32>,
    /// Number of direct replies to this post.
    #[serde(default)]
    pub reply_count: u32,
}

fn default_version() -> u32 {
    1
}

impl Post {
    /// Creates a post from its identity and content fields.
    pub fn new(id: i64, post_number: u32, topic_id: u64, username: &str, raw: &str) -> Self {
        Self {
            id,
            post_number,
            topic_id,
            username: username.to_string(),
            raw: raw.to_string(),
            created_at: 0,
            version: 1,
            deleted: false,
            reply_to_post_number: None,
            reply_count: 0,
        }
    }

    /// Creates an unconfirmed post carrying the staged sentinel id.
    ///
    /// `post_number` is a guess (one past the current highest) and is
    /// replaced along with the id when the server confirms.
    pub fn staged(topic_id: u64, post_number: u32, username: &str, raw: &str) -> Self {
        Self::new(STAGED_POST_ID, post_number, topic_id, username, raw)
    }

    /// Returns true if this post is the unconfirmed staged sentinel.
    pub fn is_staged(&self) -> bool {
        self.id == STAGED_POST_ID
    }

    /// Updates this post's fields in place from another copy of the same post.
    ///
    /// Used by the identity map on duplicate insert: the stored entry is the
    /// canonical instance and is never replaced wholesale. The id is asserted
    /// to match in debug builds.
    pub fn merge_from(&mut self, other: &Post) {
        debug_assert_eq!(self.id, other.id);
        self.post_number = other.post_number;
        self.topic_id = other.topic_id;
        self.username = other.username.clone();
        self.raw = other.raw.clone();
        self.created_at = other.created_at;
        self.version = other.version;
        self.deleted = other.deleted;
        self.reply_to_post_number = other.reply_to_post_number;
        self.reply_count = other.reply_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_sentinel() {
        let post = Post::staged(1, 4, "eviltrout", "hello");
        assert!(post.is_staged());
        assert_eq!(post.id, STAGED_POST_ID);
        assert_eq!(post.post_number, 4);
    }

    #[test]
    fn test_merge_from_updates_in_place() {
        let mut stored = Post::new(10, 2, 1, "sam", "first draft");
        let mut incoming = stored.clone();
        incoming.raw = "edited body".to_string();
        incoming.version = 2;
        incoming.reply_count = 3;

        stored.merge_from(&incoming);
        assert_eq!(stored.raw, "edited body");
        assert_eq!(stored.version, 2);
        assert_eq!(stored.reply_count, 3);
        assert_eq!(stored.id, 10);
    }

    #[test]
    fn test_wire_defaults() {
        let json = r#"{
            "id": 5, "post_number": 1, "topic_id": 2,
            "username": "sam", "raw": "body", "created_at": 0
        }"#;
        let post: Post = serde_json::from_str(json).unwrap();
        assert_eq!(post.version, 1);
        assert!(!post.deleted);
        assert_eq!(post.reply_count, 0);
    }
}
