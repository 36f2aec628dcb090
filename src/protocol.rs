//! Wire types for the query service and the real-time channel.
//!
//! This module defines the request/response shapes the engine exchanges with
//! its external collaborators:
//!
//! - **Topic view**: the initial windowed snapshot for one topic, carrying a
//!   page of posts plus the full ordered id stream.
//! - **Post batch**: per-id fetches used by window growth and gap fill.
//! - **Excerpt batch**: short previews for a neighborhood of stream positions.
//! - **Tracking messages**: typed deltas pushed over the real-time channel,
//!   which may arrive dropped, duplicated, or reordered.
//! - **Topic list pages**: bulk snapshots reconciled against tracking state.
//!
//! The engine never performs transport itself. Requests are plain values the
//! host serializes and sends; responses are fed back into the matching
//! `apply_*` method. Requests that originate from a `PostStream` carry the
//! stream's `generation` so stale responses arriving after a forced refresh
//! can be recognized and discarded.

use crate::constants::MAX_BATCH_SIZE;
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stream::Post;
use crate::tracking::NotificationLevel;

/// Request for the initial windowed snapshot of a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicViewRequest {
    /// The topic to load.
    pub topic_id: u64,
    /// Center the window near this post number, if given.
    pub near_post: Option<u32>,
    /// Load posts after this post number.
    pub posts_after: Option<u32>,
    /// Load posts before this post number.
    pub posts_before: Option<u32>,
    /// Restrict the stream to these authors.
    pub username_filters: Vec<String>,
    /// Request the summarized (best-of) stream.
    pub summary: bool,
    /// Stream generation this request was issued under.
    pub generation: u64,
}

impl TopicViewRequest {
    /// Creates a request for the default (top-of-topic) window.
    pub fn new(topic_id: u64) -> Self {
        Self {
            topic_id,
            near_post: None,
            posts_after: None,
            posts_before: None,
            username_filters: Vec::new(),
            summary: false,
            generation: 0,
        }
    }

    /// Centers the window near a post number.
    pub fn with_near_post(mut self, post_number: u32) -> Self {
        self.near_post = Some(post_number);
        self
    }

    /// Restricts the stream to the given authors.
    pub fn with_username_filters(mut self, usernames: Vec<String>) -> Self {
        self.username_filters = usernames;
        self
    }

    /// Requests the summarized stream.
    pub fn with_summary(mut self, summary: bool) -> Self {
        self.summary = summary;
        self
    }

    /// Tags the request with a stream generation.
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }
}

/// The `post_stream` portion of a topic view response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostStreamPayload {
    /// The materialized page of posts.
    pub posts: Vec<Post>,
    /// The full ordered id sequence for the topic.
    pub stream: Vec<i64>,
}

/// Gap annotations delivered alongside a topic view: ids known to exist but
/// not spliced into the main stream, keyed by the anchor id they precede or
/// follow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GapsPayload {
    /// Anchor id -> ids that belong immediately before it.
    #[serde(default)]
    pub before: std::collections::HashMap<i64, Vec<i64>>,
    /// Anchor id -> ids that belong immediately after it.
    #[serde(default)]
    pub after: std::collections::HashMap<i64, Vec<i64>>,
}

impl GapsPayload {
    /// Returns true if no gaps are recorded.
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

/// Response to a [`TopicViewRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicViewResponse {
    /// Stream ids plus the materialized page.
    pub post_stream: PostStreamPayload,
    /// Sorted `(post_number, days_ago)` pairs for progress placement.
    #[serde(default)]
    pub timeline_lookup: Vec<(u32, u32)>,
    /// Total posts in the topic.
    pub posts_count: u32,
    /// Highest post number in the topic.
    pub highest_post_number: u32,
    /// Known-but-unloaded runs of ids, if any.
    #[serde(default)]
    pub gaps: Option<GapsPayload>,
    /// Echo of the request generation.
    #[serde(default)]
    pub generation: u64,
}

impl TopicViewResponse {
    /// Parses a raw response body.
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(SyncError::serialization)
    }
}

/// Request to fetch full posts by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostBatchRequest {
    /// Ids to fetch, in stream order. Never exceeds [`MAX_BATCH_SIZE`].
    pub post_ids: Vec<i64>,
    /// Stream generation this request was issued under.
    pub generation: u64,
}

impl PostBatchRequest {
    /// Creates a batch request, capping the id list at [`MAX_BATCH_SIZE`].
    pub fn new(mut post_ids: Vec<i64>, generation: u64) -> Self {
        post_ids.truncate(MAX_BATCH_SIZE);
        Self {
            post_ids,
            generation,
        }
    }
}

/// Response to a [`PostBatchRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostBatchResponse {
    /// The fetched posts. Order is not guaranteed; the stream re-orders.
    pub posts: Vec<Post>,
    /// Echo of the request generation.
    #[serde(default)]
    pub generation: u64,
}

/// Request for short previews of a run of posts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcerptRequest {
    /// Ids to excerpt.
    pub post_ids: Vec<i64>,
}

/// A single post preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostExcerpt {
    /// The excerpted post.
    pub post_id: i64,
    /// Short plain-text preview of the body.
    pub excerpt: String,
}

/// Response to an [`ExcerptRequest`].
pub type ExcerptResponse = Vec<PostExcerpt>;

// =============================================================================
// Real-time channel
// =============================================================================

/// Classification of a push message from the real-time channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// A topic was created.
    NewTopic,
    /// A topic received new activity.
    Latest,
    /// The topic's unread counters changed.
    Unread,
    /// The user's read position in the topic changed.
    Read,
    /// The topic was deleted.
    Delete,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::NewTopic => write!(f, "new_topic"),
            MessageType::Latest => write!(f, "latest"),
            MessageType::Unread => write!(f, "unread"),
            MessageType::Read => write!(f, "read"),
            MessageType::Delete => write!(f, "delete"),
        }
    }
}

/// Per-topic tracking fields carried by a push message.
///
/// Every field is optional: the channel is best-effort and a partial payload
/// merges as "no change" for the missing fields rather than failing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingPayload {
    /// Last post number the user has read, if known.
    #[serde(default)]
    pub last_read_post_number: Option<u32>,
    /// Highest post number in the topic, if known.
    #[serde(default)]
    pub highest_post_number: Option<u32>,
    /// Per-topic subscription intensity, if known.
    #[serde(default)]
    pub notification_level: Option<NotificationLevel>,
    /// Category the topic belongs to, if known.
    #[serde(default)]
    pub category_id: Option<u64>,
}

/// A typed delta message from the real-time channel.
///
/// Messages may be dropped, duplicated, or reordered in transit; handlers
/// must be idempotent and must not assume delivery order matches event order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingMessage {
    /// What kind of delta this is.
    pub message_type: MessageType,
    /// The topic the delta applies to.
    pub topic_id: u64,
    /// Row fields for tracking-relevant message types.
    #[serde(default)]
    pub payload: Option<TrackingPayload>,
}

impl TrackingMessage {
    /// Creates a message with no payload (e.g. `delete`).
    pub fn new(message_type: MessageType, topic_id: u64) -> Self {
        Self {
            message_type,
            topic_id,
            payload: None,
        }
    }

    /// Attaches a tracking payload.
    pub fn with_payload(mut self, payload: TrackingPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Parses a raw channel frame.
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(SyncError::serialization)
    }

    /// Serializes the message for the channel.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(SyncError::serialization)
    }
}

// =============================================================================
// Topic list pages
// =============================================================================

/// A topic as it appears in a bulk list snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicListItem {
    /// The topic id.
    pub id: u64,
    /// Total posts in the topic.
    #[serde(default)]
    pub posts_count: u32,
    /// Highest post number in the topic.
    #[serde(default)]
    pub highest_post_number: u32,
    /// Last post number the user has read, per the server.
    #[serde(default)]
    pub last_read_post_number: Option<u32>,
    /// Server-computed unread count for this user.
    #[serde(default)]
    pub unread: u32,
    /// Server-computed count of posts newer than the user's last visit.
    #[serde(default)]
    pub new_posts: u32,
    /// True if the user has never seen this topic.
    #[serde(default)]
    pub unseen: bool,
    /// Category the topic belongs to.
    #[serde(default)]
    pub category_id: Option<u64>,
    /// The user's subscription level for this topic.
    #[serde(default)]
    pub notification_level: Option<NotificationLevel>,
}

/// One page of a filtered topic list, as fetched from the query service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicListPage {
    /// The topics on this page.
    pub topics: Vec<TopicListItem>,
    /// Cursor to the next page; `None` means this is the final page.
    #[serde(default)]
    pub more_topics_url: Option<String>,
}

impl TopicListPage {
    /// Creates a page from a set of topics with no further pages.
    pub fn new(topics: Vec<TopicListItem>) -> Self {
        Self {
            topics,
            more_topics_url: None,
        }
    }

    /// Marks the page as having a continuation.
    pub fn with_more(mut self, url: impl Into<String>) -> Self {
        self.more_topics_url = Some(url.into());
        self
    }

    /// True if this is the final page of the list.
    pub fn is_last_page(&self) -> bool {
        self.more_topics_url.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_view_request_builders() {
        let req = TopicViewRequest::new(7)
            .with_near_post(40)
            .with_summary(true)
            .with_generation(3);

        assert_eq!(req.topic_id, 7);
        assert_eq!(req.near_post, Some(40));
        assert!(req.summary);
        assert_eq!(req.generation, 3);
        assert!(req.username_filters.is_empty());
    }

    #[test]
    fn test_post_batch_request_capped() {
        let ids: Vec<i64> = (0..500).collect();
        let req = PostBatchRequest::new(ids, 1);
        assert_eq!(req.post_ids.len(), MAX_BATCH_SIZE);
        assert_eq!(req.post_ids[0], 0);
    }

    #[test]
    fn test_message_type_wire_names() {
        let json = serde_json::to_string(&MessageType::NewTopic).unwrap();
        assert_eq!(json, "\"new_topic\"");
        let back: MessageType = serde_json::from_str("\"unread\"").unwrap();
        assert_eq!(back, MessageType::Unread);
    }

    #[test]
    fn test_tracking_message_partial_payload() {
        // Missing fields deserialize to None, never error.
        let json = r#"{"message_type":"unread","topic_id":9,"payload":{"highest_post_number":12}}"#;
        let msg: TrackingMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.message_type, MessageType::Unread);
        let payload = msg.payload.unwrap();
        assert_eq!(payload.highest_post_number, Some(12));
        assert!(payload.last_read_post_number.is_none());
        assert!(payload.notification_level.is_none());
    }

    #[test]
    fn test_topic_list_page_last_page() {
        let page = TopicListPage::new(vec![]);
        assert!(page.is_last_page());
        let page = page.with_more("/latest?page=2");
        assert!(!page.is_last_page());
    }

    #[test]
    fn test_topic_view_response_defaults() {
        // gaps and timeline_lookup are optional on the wire.
        let json = r#"{
            "post_stream": {"posts": [], "stream": [1, 2, 3]},
            "posts_count": 3,
            "highest_post_number": 3
        }"#;
        let resp: TopicViewResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.post_stream.stream, vec![1, 2, 3]);
        assert!(resp.timeline_lookup.is_empty());
        assert!(resp.gaps.is_none());
        assert_eq!(resp.generation, 0);
    }
}
