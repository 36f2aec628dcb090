//! Per-topic tracking rows and their merge semantics.

use crate::protocol::TrackingPayload;
use serde::{Deserialize, Serialize};

/// Per-topic subscription intensity.
///
/// Stored as its numeric wire value; ordering is meaningful (`Tracking` and
/// above participate in unread/new classification).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
#[serde(into = "u8", try_from = "u8")]
pub enum NotificationLevel {
    /// Suppress all notifications for this topic.
    Muted = 0,
    /// Default level: notify on direct mention or reply only.
    Regular = 1,
    /// Count unread and new posts.
    Tracking = 2,
    /// Notify on every new post.
    Watching = 3,
}

impl From<NotificationLevel> for u8 {
    fn from(level: NotificationLevel) -> u8 {
        level as u8
    }
}

impl TryFrom<u8> for NotificationLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NotificationLevel::Muted),
            1 => Ok(NotificationLevel::Regular),
            2 => Ok(NotificationLevel::Tracking),
            3 => Ok(NotificationLevel::Watching),
            other => Err(format!("unknown notification level: {other}")),
        }
    }
}

/// The tracked read-state of one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicTrackingRow {
    /// The topic this row tracks.
    pub topic_id: u64,
    /// Last post number the user has read; `None` for a never-seen topic.
    #[serde(default)]
    pub last_read_post_number: Option<u32>,
    /// Highest post number in the topic.
    #[serde(default)]
    pub highest_post_number: u32,
    /// The user's subscription level, if known.
    #[serde(default)]
    pub notification_level: Option<NotificationLevel>,
    /// Category the topic belongs to, if known.
    #[serde(default)]
    pub category_id: Option<u64>,
}

impl TopicTrackingRow {
    /// Creates a row for a never-seen topic.
    pub fn new(topic_id: u64) -> Self {
        Self {
            topic_id,
            last_read_post_number: None,
            highest_post_number: 0,
            notification_level: None,
            category_id: None,
        }
    }

    /// Merges a push payload into this row, field by field.
    ///
    /// Missing payload fields mean "no change", never an error. Returns
    /// `true` only if some stored value actually changed, so duplicated or
    /// reordered push messages that carry no new information merge as
    /// no-ops.
    pub fn merge_payload(&mut self, payload: &TrackingPayload) -> bool {
        let mut changed = false;

        if let Some(last_read) = payload.last_read_post_number {
            if self.last_read_post_number != Some(last_read) {
                self.last_read_post_number = Some(last_read);
                changed = true;
            }
        }
        if let Some(highest) = payload.highest_post_number {
            if self.highest_post_number != highest {
                self.highest_post_number = highest;
                changed = true;
            }
        }
        if let Some(level) = payload.notification_level {
            if self.notification_level != Some(level) {
                self.notification_level = Some(level);
                changed = true;
            }
        }
        if let Some(category) = payload.category_id {
            if self.category_id != Some(category) {
                self.category_id = Some(category);
                changed = true;
            }
        }
        changed
    }
}
