//! Session-wide read/unread/new tracking across topics.
//!
//! The tracker combines two sources with different trust levels: bulk list
//! snapshots from the query service (authoritative but infrequent) and push
//! messages from the real-time channel (live but best-effort). Push messages
//! may be dropped, duplicated, or reordered, so every handler compares before
//! it mutates; [`TopicTrackingState::sync`] on each fresh list fetch is the
//! correction path that bounds how stale the tracker can drift.
//!
//! Dependent UI recomputes off a single monotonically increasing
//! `message_count` rather than fine-grained observation: any merge that
//! actually changed a row bumps the counter once, and a `sync` pass bumps it
//! once for the whole batch.

use crate::protocol::{MessageType, TopicListItem, TopicListPage, TrackingMessage};
use crate::tracking::{NotificationLevel, TopicTrackingRow};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Session-wide tracker of per-topic read state.
#[derive(Debug, Default)]
pub struct TopicTrackingState {
    rows: HashMap<u64, TopicTrackingRow>,
    /// Change signal for dependent recomputation. Bumps once per mutating
    /// message and once per `sync` pass, never per row.
    message_count: u64,
    /// Topic ids observed over the push channel while a list view is open,
    /// not yet merged into the rendered list.
    incoming: Vec<u64>,
    /// The list filter the incoming buffer is tracking, if any.
    tracking_filter: Option<String>,
    muted_categories: HashSet<u64>,
}

impl TopicTrackingState {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Snapshot ingest
    // =========================================================================

    /// Seeds the tracker from the initial server snapshot. Rows replace any
    /// previous entry for the same topic.
    pub fn load_states(&mut self, rows: Vec<TopicTrackingRow>) {
        for row in rows {
            self.rows.insert(row.topic_id, row);
        }
        debug!(rows = self.rows.len(), "loaded tracking snapshot");
    }

    /// The tracked row for a topic, if any.
    pub fn get(&self, topic_id: u64) -> Option<&TopicTrackingRow> {
        self.rows.get(&topic_id)
    }

    /// Number of tracked rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no rows are tracked.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The current change-signal value.
    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    // =========================================================================
    // Push channel
    // =========================================================================

    /// Applies one push message from the real-time channel.
    ///
    /// Handlers are idempotent: a message that would not change the stored
    /// row merges as a no-op and does not bump `message_count`, so replayed
    /// or reordered deliveries cannot double-fire dependent recomputation.
    pub fn handle_message(&mut self, message: &TrackingMessage) {
        match message.message_type {
            MessageType::Delete => {
                if self.rows.remove(&message.topic_id).is_some() {
                    self.message_count += 1;
                }
            }
            MessageType::Latest => {
                self.register_incoming(message);
            }
            MessageType::NewTopic => {
                self.register_incoming(message);
                self.merge_message(message);
            }
            MessageType::Unread | MessageType::Read => {
                self.merge_message(message);
            }
        }
    }

    /// Registers a new/latest topic in the incoming buffer, unless its
    /// category is muted or no list is currently tracking.
    fn register_incoming(&mut self, message: &TrackingMessage) {
        let category = message.payload.as_ref().and_then(|p| p.category_id);
        if let Some(category) = category {
            if self.muted_categories.contains(&category) {
                return;
            }
        }
        let Some(filter) = self.tracking_filter.as_deref() else {
            return;
        };
        let matches = match filter {
            "new" => message.message_type == MessageType::NewTopic,
            "latest" => true,
            _ => false,
        };
        if matches && !self.incoming.contains(&message.topic_id) {
            self.incoming.push(message.topic_id);
        }
    }

    /// Merges a message payload into its row, creating the row on first
    /// contact. Bumps `message_count` once if anything changed.
    fn merge_message(&mut self, message: &TrackingMessage) {
        let Some(payload) = message.payload.as_ref() else {
            return;
        };
        let row = self
            .rows
            .entry(message.topic_id)
            .or_insert_with(|| TopicTrackingRow::new(message.topic_id));
        if row.merge_payload(payload) {
            self.message_count += 1;
        }
    }

    /// Locally advances the read position for an open topic, ahead of
    /// server confirmation, so badge counts reflect reading immediately.
    ///
    /// Reading past a stale `highest_post_number` raises it too: the user
    /// demonstrably saw that post, and `last_read ≤ highest` must hold.
    pub fn update_seen(&mut self, topic_id: u64, highest_seen: u32) {
        let Some(row) = self.rows.get_mut(&topic_id) else {
            return;
        };
        let advanced = match row.last_read_post_number {
            Some(current) => highest_seen > current,
            None => true,
        };
        if advanced {
            row.last_read_post_number = Some(highest_seen);
            row.highest_post_number = row.highest_post_number.max(highest_seen);
            self.message_count += 1;
        }
    }

    // =========================================================================
    // Snapshot reconciliation
    // =========================================================================

    /// Reconciles a freshly fetched list page against the tracked rows.
    ///
    /// The page is authoritative for what exists but may be staler than the
    /// tracker for what the user has read, so reconciliation runs in four
    /// steps:
    ///
    /// 1. Topics the tracker already knows are read (`last_read > 0`) are
    ///    dropped from a `"new"`-filtered page outright; under other filters
    ///    they are marked do-not-resync so the next step cannot overwrite
    ///    fresher local knowledge with the server's stale copy.
    /// 2. Every remaining topic derives a row: unseen topics get no read
    ///    position; topics reporting counts get
    ///    `last_read = highest − (unread + new_posts)`; topics with nothing
    ///    left to track (and no do-not-resync marker) are evicted.
    /// 3. On the **final** page of a `"new"` or `"unread"` list, rows absent
    ///    from the page are corrected: unread-but-absent rows are marked
    ///    read, new-but-absent rows are dropped. This compensates for push
    ///    messages lost while the list was stale.
    /// 4. `message_count` bumps once for the whole pass.
    pub fn sync(&mut self, page: &mut TopicListPage, filter: &str) {
        let mut do_not_resync: HashSet<u64> = HashSet::new();

        // Step 1: protect locally-read topics from the stale snapshot.
        page.topics.retain(|topic| {
            let locally_read = self
                .rows
                .get(&topic.id)
                .and_then(|row| row.last_read_post_number)
                .map(|last_read| last_read > 0)
                .unwrap_or(false);
            if !locally_read {
                return true;
            }
            if filter == "new" {
                return false;
            }
            do_not_resync.insert(topic.id);
            true
        });

        // Step 2: derive rows from the page.
        for topic in &page.topics {
            if do_not_resync.contains(&topic.id) {
                continue;
            }
            let nothing_tracked = !topic.unseen && topic.unread == 0 && topic.new_posts == 0;
            if nothing_tracked {
                self.rows.remove(&topic.id);
                continue;
            }

            let last_read = if topic.unseen {
                None
            } else {
                Some(
                    topic
                        .highest_post_number
                        .saturating_sub(topic.unread + topic.new_posts),
                )
            };
            let row = self
                .rows
                .entry(topic.id)
                .or_insert_with(|| TopicTrackingRow::new(topic.id));
            row.last_read_post_number = last_read;
            row.highest_post_number = topic.highest_post_number;
            if topic.notification_level.is_some() {
                row.notification_level = topic.notification_level;
            }
            if topic.category_id.is_some() {
                row.category_id = topic.category_id;
            }
        }

        // Step 3: the final page of a new/unread list is exhaustive, so rows
        // absent from it must have been read elsewhere.
        if (filter == "new" || filter == "unread") && page.is_last_page() {
            let present: HashSet<u64> = page.topics.iter().map(|t| t.id).collect();
            if filter == "unread" {
                for row in self.rows.values_mut() {
                    if !present.contains(&row.topic_id) && Self::is_unread(row) {
                        row.last_read_post_number = Some(row.highest_post_number);
                    }
                }
            } else {
                self.rows
                    .retain(|id, row| present.contains(id) || !Self::is_new(row));
            }
        }

        // Step 4: one change signal for the whole pass.
        self.message_count += 1;
        debug!(
            filter,
            topics = page.topics.len(),
            rows = self.rows.len(),
            "synced topic list page"
        );
    }

    /// Patches a cached list's displayed counters from the tracked rows,
    /// used when a list is re-shown without a refetch. Counters clamp at
    /// zero.
    pub fn update_topics(&self, topics: &mut [TopicListItem]) {
        for topic in topics.iter_mut() {
            let Some(row) = self.rows.get(&topic.id) else {
                continue;
            };
            match row.last_read_post_number {
                Some(last_read) => {
                    topic.unread = topic.posts_count.saturating_sub(last_read);
                    topic.new_posts = topic.posts_count.saturating_sub(row.highest_post_number);
                }
                None => {
                    topic.unread = 0;
                    topic.new_posts = topic.posts_count;
                }
            }
        }
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// A topic is new when the user has never read it and is not opted out
    /// of tracking it.
    pub fn is_new(row: &TopicTrackingRow) -> bool {
        row.last_read_post_number.is_none()
            && match row.notification_level {
                Some(level) => level >= NotificationLevel::Tracking,
                None => true,
            }
    }

    /// A topic is unread when the user has read it before, posts exist past
    /// the read position, and the topic is tracked or watched.
    pub fn is_unread(row: &TopicTrackingRow) -> bool {
        match (row.last_read_post_number, row.notification_level) {
            (Some(last_read), Some(level)) => {
                last_read < row.highest_post_number && level >= NotificationLevel::Tracking
            }
            _ => false,
        }
    }

    /// Counts rows classified new, optionally restricted to one category.
    pub fn count_new(&self, category_id: Option<u64>) -> usize {
        self.rows
            .values()
            .filter(|row| Self::is_new(row))
            .filter(|row| category_id.is_none() || row.category_id == category_id)
            .count()
    }

    /// Counts rows classified unread, optionally restricted to one category.
    pub fn count_unread(&self, category_id: Option<u64>) -> usize {
        self.rows
            .values()
            .filter(|row| Self::is_unread(row))
            .filter(|row| category_id.is_none() || row.category_id == category_id)
            .count()
    }

    /// Counts all tracked rows in one category.
    pub fn count_category(&self, category_id: u64) -> usize {
        self.rows
            .values()
            .filter(|row| row.category_id == Some(category_id))
            .count()
    }

    /// Bulk-evicts every row currently classified new ("dismiss new").
    pub fn reset_new(&mut self) {
        let before = self.rows.len();
        self.rows.retain(|_, row| !Self::is_new(row));
        if self.rows.len() != before {
            self.message_count += 1;
        }
    }

    // =========================================================================
    // Incoming indicator
    // =========================================================================

    /// Starts tracking push-announced topics for an open list view. Any
    /// previously buffered ids are cleared.
    pub fn track_incoming(&mut self, filter: impl Into<String>) {
        self.tracking_filter = Some(filter.into());
        self.incoming.clear();
    }

    /// Stops tracking and clears the buffer, on filter change or dismissal.
    pub fn reset_tracking(&mut self) {
        self.tracking_filter = None;
        self.incoming.clear();
    }

    /// True if push-announced topics are waiting to be merged into the list.
    pub fn has_incoming(&self) -> bool {
        !self.incoming.is_empty()
    }

    /// Number of buffered incoming topics.
    pub fn incoming_count(&self) -> usize {
        self.incoming.len()
    }

    // =========================================================================
    // Muted categories
    // =========================================================================

    /// Suppresses incoming-buffer registration for a category.
    pub fn mute_category(&mut self, category_id: u64) {
        self.muted_categories.insert(category_id);
    }

    /// Re-enables incoming-buffer registration for a category.
    pub fn unmute_category(&mut self, category_id: u64) {
        self.muted_categories.remove(&category_id);
    }
}
