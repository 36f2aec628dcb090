//! The post stream: an incrementally-loadable, consistent view of one
//! topic's posts.
//!
//! The stream owns the authoritative ordered id sequence for a topic, the
//! window of posts currently materialized in the identity map, optimistic
//! staging of local submissions, and repair of gaps (runs of ids known to
//! exist but not yet spliced into the main sequence).
//!
//! ## Request/response split
//!
//! The stream never performs transport. Operations that need data return a
//! typed request for the host to send; each request pairs with an `apply_*`
//! method that consumes the response and a `fail_*` method that clears the
//! relevant loading latch without touching window state, so the identical
//! operation can be retried. Overlapping operations on the same edge are
//! rejected by the latch (`Busy`), never queued; the above/below latches are
//! independent so scroll-up and scroll-down fetches never block each other.
//!
//! ## Stale responses
//!
//! Every outgoing request carries the stream's `generation`, bumped on each
//! refresh. A response echoing an older generation is discarded without
//! mutation, so a forced refresh can safely replace state while a fetch is
//! still in flight.

use crate::constants::{CHUNK_SIZE, EXCERPT_NEIGHBORHOOD, STAGED_POST_ID};
use crate::error::TopicLoadError;
use crate::protocol::{
    ExcerptRequest, ExcerptResponse, GapsPayload, PostBatchRequest, PostBatchResponse,
    TopicViewRequest, TopicViewResponse,
};
use crate::stream::{IdentityMap, Post};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Active stream filters. A non-default filter suppresses in-place rendering
/// of pushed posts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamFilters {
    /// Show only the summarized (best-of) stream.
    pub summary: bool,
    /// Restrict the stream to these authors.
    pub username_filters: Vec<String>,
}

impl StreamFilters {
    /// Returns true if any filter deviates from the full stream.
    pub fn is_active(&self) -> bool {
        self.summary || !self.username_filters.is_empty()
    }
}

/// Options for a full stream refresh.
#[derive(Debug, Clone, Default)]
pub struct RefreshOptions {
    /// Center the window near this post number.
    pub near_post: Option<u32>,
    /// Filters the refreshed stream should carry.
    pub filters: StreamFilters,
}

/// Outcome of [`PostStream::begin_refresh`].
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// The requested post is already materialized; nothing to do.
    AlreadyLoaded,
    /// A refresh is already in flight; the call is rejected, not queued.
    AlreadyLoading,
    /// The host should perform this fetch and feed the response back.
    Fetch(TopicViewRequest),
}

/// Outcome of a window-edge load ([`PostStream::begin_append`] /
/// [`PostStream::begin_prepend`]).
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// A fetch for this edge is already in flight.
    Busy,
    /// The window already reaches this edge of the stream.
    AtEdge,
    /// All ids were already materialized and were spliced immediately.
    Loaded(usize),
    /// The host should perform this fetch and feed the response back.
    Fetch(PostBatchRequest),
}

/// Outcome of [`PostStream::stage_post`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageResult {
    /// A staged post is already pending; no state was mutated.
    AlreadyStaging,
    /// The post was staged and rendered into the window.
    Staged,
    /// The post was staged but not rendered (filters active or window not at
    /// the stream tail).
    OffScreen,
}

/// Snapshot of the counter bumps applied by `stage_post`, so `undo_post`
/// can restore the exact pre-stage values.
#[derive(Debug, Clone)]
struct StagedUndo {
    posts_count: u32,
    highest_post_number: u32,
    /// `(post id, reply_count before the bump)` of the replied-to post.
    replied_to: Option<(i64, u32)>,
    /// Whether the sentinel id was spliced into stream and window.
    rendered: bool,
}

/// Gap annotations: ids known to exist but not yet spliced into the stream,
/// keyed by the loaded anchor id they attach to.
#[derive(Debug, Clone, Default)]
struct Gaps {
    before: HashMap<i64, Vec<i64>>,
    after: HashMap<i64, Vec<i64>>,
}

impl Gaps {
    fn from_payload(payload: GapsPayload) -> Self {
        Self {
            before: payload.before,
            after: payload.after,
        }
    }
}

/// The windowed, incrementally-synchronized view of one topic's posts.
#[derive(Debug)]
pub struct PostStream {
    topic_id: u64,
    /// Authoritative ordered id sequence.
    stream: Vec<i64>,
    gaps: Gaps,
    posts: IdentityMap,
    /// Loaded ids, a contiguous (gap-annotated) subrange of `stream`.
    window: Vec<i64>,
    /// Sorted `(post_number, days_ago)` pairs for progress placement.
    timeline_lookup: Vec<(u32, u32)>,
    posts_count: u32,
    highest_post_number: u32,
    filters: StreamFilters,
    chunk_size: usize,

    // Mutual-exclusion latches. An operation that finds its latch set
    // returns a no-op instead of queuing.
    loading_filter: bool,
    loading_above: bool,
    loading_below: bool,
    staging: bool,

    pending_filters: Option<StreamFilters>,
    /// Window ids the in-flight prepend will splice.
    pending_above: Option<Vec<i64>>,
    /// Window ids the in-flight append will splice.
    pending_below: Option<Vec<i64>>,
    /// Ids of the most recent gap fill awaiting bodies.
    pending_gap: Option<Vec<i64>>,
    staged_undo: Option<StagedUndo>,

    excerpts: HashMap<i64, String>,
    /// In-flight excerpt neighborhoods as half-open stream index ranges.
    pending_excerpts: Vec<(usize, usize)>,

    generation: u64,
    loaded: bool,
}

impl PostStream {
    /// Creates an empty stream for a topic. Nothing is materialized until
    /// the first refresh completes.
    pub fn new(topic_id: u64) -> Self {
        Self {
            topic_id,
            stream: Vec::new(),
            gaps: Gaps::default(),
            posts: IdentityMap::new(),
            window: Vec::new(),
            timeline_lookup: Vec::new(),
            posts_count: 0,
            highest_post_number: 0,
            filters: StreamFilters::default(),
            chunk_size: CHUNK_SIZE,
            loading_filter: false,
            loading_above: false,
            loading_below: false,
            staging: false,
            pending_filters: None,
            pending_above: None,
            pending_below: None,
            pending_gap: None,
            staged_undo: None,
            excerpts: HashMap::new(),
            pending_excerpts: Vec::new(),
            generation: 0,
            loaded: false,
        }
    }

    /// Overrides the window chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The topic this stream belongs to.
    pub fn topic_id(&self) -> u64 {
        self.topic_id
    }

    /// The authoritative ordered id sequence.
    pub fn stream(&self) -> &[i64] {
        &self.stream
    }

    /// Ids currently materialized, in stream order.
    pub fn window(&self) -> &[i64] {
        &self.window
    }

    /// Total posts in the topic, per the latest snapshot plus local bumps.
    pub fn posts_count(&self) -> u32 {
        self.posts_count
    }

    /// Highest post number in the topic.
    pub fn highest_post_number(&self) -> u32 {
        self.highest_post_number
    }

    /// The active stream filters.
    pub fn filters(&self) -> &StreamFilters {
        &self.filters
    }

    /// The canonical post for an id, if materialized.
    pub fn get(&self, id: i64) -> Option<&Post> {
        self.posts.get(id)
    }

    /// Number of materialized posts.
    pub fn loaded_count(&self) -> usize {
        self.posts.len()
    }

    /// Materialized posts in stream order.
    pub fn loaded_posts(&self) -> impl Iterator<Item = &Post> {
        self.window.iter().filter_map(|id| self.posts.get(*id))
    }

    /// First loaded id, if any.
    pub fn first_loaded_id(&self) -> Option<i64> {
        self.window.first().copied()
    }

    /// Last loaded id, if any.
    pub fn last_loaded_id(&self) -> Option<i64> {
        self.window.last().copied()
    }

    /// True if a staged post is pending confirmation.
    pub fn is_staging(&self) -> bool {
        self.staging
    }

    /// The current stale-response marker.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn first_loaded_index(&self) -> Option<usize> {
        let first = *self.window.first()?;
        self.stream.iter().position(|id| *id == first)
    }

    fn last_loaded_index(&self) -> Option<usize> {
        let last = *self.window.last()?;
        self.stream.iter().position(|id| *id == last)
    }

    /// True when the window reaches the stream tail.
    pub fn loaded_all_posts(&self) -> bool {
        match self.stream.last() {
            Some(last) => self.window.last() == Some(last),
            None => self.loaded,
        }
    }

    fn is_stale(&self, generation: u64, what: &str) -> bool {
        if generation == self.generation {
            return false;
        }
        warn!(
            topic_id = self.topic_id,
            got = generation,
            want = self.generation,
            "discarding stale {what} response"
        );
        true
    }

    // =========================================================================
    // Window arithmetic
    // =========================================================================

    /// Ids of the next chunk above the window:
    /// `stream[max(0, first − chunk) .. first]`.
    pub fn previous_window(&self) -> Vec<i64> {
        let Some(first) = self.first_loaded_index() else {
            return Vec::new();
        };
        let start = first.saturating_sub(self.chunk_size);
        self.stream[start..first].to_vec()
    }

    /// Ids of the next chunk below the window:
    /// `stream[last + 1 .. min(len, last + chunk + 1)]`.
    pub fn next_window(&self) -> Vec<i64> {
        let Some(last) = self.last_loaded_index() else {
            return Vec::new();
        };
        let start = last + 1;
        let end = self.stream.len().min(start + self.chunk_size);
        if start >= end {
            return Vec::new();
        }
        self.stream[start..end].to_vec()
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Begins a full (re)load of the stream.
    ///
    /// When `near_post` is already materialized under the same filters this
    /// is a no-op. A refresh already in flight rejects the call. Otherwise
    /// the `loading_filter` latch is taken, the generation bumps, and a
    /// fetch is returned.
    pub fn begin_refresh(&mut self, opts: RefreshOptions) -> RefreshOutcome {
        if self.loading_filter {
            return RefreshOutcome::AlreadyLoading;
        }

        if let Some(near) = opts.near_post {
            let materialized = self.loaded_posts().any(|post| post.post_number == near);
            if materialized && self.filters == opts.filters {
                return RefreshOutcome::AlreadyLoaded;
            }
        }

        self.loading_filter = true;
        self.generation += 1;
        self.pending_filters = Some(opts.filters.clone());

        let mut request = TopicViewRequest::new(self.topic_id)
            .with_summary(opts.filters.summary)
            .with_username_filters(opts.filters.username_filters)
            .with_generation(self.generation);
        request.near_post = opts.near_post;
        RefreshOutcome::Fetch(request)
    }

    /// Applies a topic view response, replacing stream, window, and counters.
    ///
    /// Posts merge through the identity map; known ids update in place. A
    /// response from an older generation is discarded untouched. Any edge
    /// fetches pending against the replaced window are dropped.
    pub fn apply_refresh(&mut self, response: TopicViewResponse) {
        if self.is_stale(response.generation, "refresh") {
            return;
        }

        self.loading_filter = false;
        if let Some(filters) = self.pending_filters.take() {
            self.filters = filters;
        }

        let delivered: HashSet<i64> = response.post_stream.posts.iter().map(|p| p.id).collect();
        for post in response.post_stream.posts {
            self.posts.insert(post);
        }

        self.stream = response.post_stream.stream;
        self.gaps = response.gaps.map(Gaps::from_payload).unwrap_or_default();
        self.window = self
            .stream
            .iter()
            .copied()
            .filter(|id| delivered.contains(id))
            .collect();
        self.timeline_lookup = response.timeline_lookup;
        self.posts_count = response.posts_count;
        self.highest_post_number = response.highest_post_number;
        self.loaded = true;

        // The old window is gone; in-flight edge fetches are now stale.
        self.loading_above = false;
        self.loading_below = false;
        self.pending_above = None;
        self.pending_below = None;
        self.pending_gap = None;
        self.pending_excerpts.clear();

        debug!(
            topic_id = self.topic_id,
            stream_len = self.stream.len(),
            window_len = self.window.len(),
            "refreshed post stream"
        );
    }

    /// Records a failed refresh. Existing window state is left untouched;
    /// only the latch clears and the failure is classified for the caller.
    pub fn fail_refresh(&mut self, status: u16) -> TopicLoadError {
        self.loading_filter = false;
        self.pending_filters = None;
        TopicLoadError::from_status(status)
    }

    // =========================================================================
    // Append / prepend
    // =========================================================================

    /// Begins loading the next chunk below the window.
    ///
    /// Ids already materialized splice immediately without a fetch.
    pub fn begin_append(&mut self) -> LoadOutcome {
        if self.loading_below {
            return LoadOutcome::Busy;
        }
        let ids = self.next_window();
        if ids.is_empty() {
            return LoadOutcome::AtEdge;
        }

        let missing = self.missing_from(&ids);
        if missing.is_empty() {
            let count = ids.len();
            self.splice_into_window(&ids);
            return LoadOutcome::Loaded(count);
        }

        self.loading_below = true;
        self.pending_below = Some(ids);
        LoadOutcome::Fetch(PostBatchRequest::new(missing, self.generation))
    }

    /// Begins loading the previous chunk above the window.
    pub fn begin_prepend(&mut self) -> LoadOutcome {
        if self.loading_above {
            return LoadOutcome::Busy;
        }
        let ids = self.previous_window();
        if ids.is_empty() {
            return LoadOutcome::AtEdge;
        }

        let missing = self.missing_from(&ids);
        if missing.is_empty() {
            let count = ids.len();
            self.splice_into_window(&ids);
            return LoadOutcome::Loaded(count);
        }

        self.loading_above = true;
        self.pending_above = Some(ids);
        LoadOutcome::Fetch(PostBatchRequest::new(missing, self.generation))
    }

    /// Applies the posts for the in-flight append, splicing them into the
    /// window in stream order. Returns the number of ids the window grew by.
    pub fn apply_append(&mut self, response: PostBatchResponse) -> usize {
        if self.is_stale(response.generation, "append") {
            return 0;
        }
        self.loading_below = false;
        let ids = self.pending_below.take().unwrap_or_default();
        self.merge_and_splice(response, &ids)
    }

    /// Applies the posts for the in-flight prepend.
    pub fn apply_prepend(&mut self, response: PostBatchResponse) -> usize {
        if self.is_stale(response.generation, "prepend") {
            return 0;
        }
        self.loading_above = false;
        let ids = self.pending_above.take().unwrap_or_default();
        self.merge_and_splice(response, &ids)
    }

    /// Records a failed append. Only the below latch clears; the window is
    /// unchanged and the identical operation is retryable.
    pub fn fail_append(&mut self) {
        self.loading_below = false;
        self.pending_below = None;
    }

    /// Records a failed prepend. Only the above latch clears.
    pub fn fail_prepend(&mut self) {
        self.loading_above = false;
        self.pending_above = None;
    }

    fn missing_from(&self, ids: &[i64]) -> Vec<i64> {
        ids.iter()
            .copied()
            .filter(|id| !self.posts.contains(*id))
            .collect()
    }

    fn merge_and_splice(&mut self, response: PostBatchResponse, ids: &[i64]) -> usize {
        for post in response.posts {
            self.posts.insert(post);
        }
        let before = self.window.len();
        let materialized: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|id| self.posts.contains(*id))
            .collect();
        self.splice_into_window(&materialized);
        self.window.len() - before
    }

    /// Merges ids into the window preserving stream order. Ids not present
    /// in the stream (or already in the window) are ignored.
    fn splice_into_window(&mut self, ids: &[i64]) {
        let mut members: HashSet<i64> = self.window.iter().copied().collect();
        members.extend(ids.iter().copied());
        self.window = self
            .stream
            .iter()
            .copied()
            .filter(|id| members.contains(id))
            .collect();
    }

    // =========================================================================
    // Optimistic staging
    // =========================================================================

    /// Optimistically appends a locally built post ahead of server
    /// confirmation.
    ///
    /// Topic counters (and the replied-to post's reply count) bump
    /// immediately so the UI reflects the submission; the exact pre-stage
    /// values are recorded for [`PostStream::undo_post`]. Exactly one staged
    /// post may be in flight at a time.
    pub fn stage_post(&mut self, mut post: Post) -> StageResult {
        if self.staging {
            return StageResult::AlreadyStaging;
        }
        self.staging = true;

        let replied_to = post.reply_to_post_number.and_then(|number| {
            self.loaded_posts()
                .find(|p| p.post_number == number)
                .map(|p| (p.id, p.reply_count))
        });

        let posts_count = self.posts_count;
        let highest_post_number = self.highest_post_number;

        self.posts_count += 1;
        self.highest_post_number += 1;
        if let Some((id, _)) = replied_to {
            if let Some(target) = self.posts.get_mut(id) {
                target.reply_count += 1;
            }
        }

        post.id = STAGED_POST_ID;
        post.post_number = self.highest_post_number;
        let rendered = !self.filters.is_active() && self.loaded_all_posts();
        self.posts.insert(post);

        if rendered {
            self.stream.push(STAGED_POST_ID);
            self.window.push(STAGED_POST_ID);
        }
        self.staged_undo = Some(StagedUndo {
            posts_count,
            highest_post_number,
            replied_to,
            rendered,
        });

        if rendered {
            StageResult::Staged
        } else {
            StageResult::OffScreen
        }
    }

    /// Replaces the staged sentinel with the server-confirmed post and
    /// clears the staging latch.
    ///
    /// The real-time channel may announce the user's own post before the
    /// HTTP confirmation lands, in which case the confirmed id is already
    /// registered in the stream; the sentinel is then dropped rather than
    /// renamed so the id never appears twice.
    pub fn commit_post(&mut self, post: Post) {
        if !self.staging {
            return;
        }
        let undo = self.staged_undo.take();
        self.staging = false;

        self.posts.remove(STAGED_POST_ID);
        let id = post.id;
        self.highest_post_number = self.highest_post_number.max(post.post_number);
        self.posts.insert(post);

        let rendered = undo.map(|u| u.rendered).unwrap_or(false);
        let announced = self.stream.contains(&id);
        if rendered {
            if announced {
                self.stream.retain(|slot| *slot != STAGED_POST_ID);
                self.window.retain(|slot| *slot != STAGED_POST_ID);
                if !self.window.contains(&id) {
                    self.splice_into_window(&[id]);
                }
            } else {
                for slot in self.stream.iter_mut() {
                    if *slot == STAGED_POST_ID {
                        *slot = id;
                    }
                }
                for slot in self.window.iter_mut() {
                    if *slot == STAGED_POST_ID {
                        *slot = id;
                    }
                }
            }
        } else if !announced {
            self.stream.push(id);
        }

        debug!(topic_id = self.topic_id, post_id = id, "committed staged post");
    }

    /// Unwinds a failed submission: removes the sentinel and restores the
    /// exact counter values `stage_post` bumped, then clears the latch. The
    /// unwind completes before the caller sees the server's validation
    /// error, so counters are never left inconsistent.
    pub fn undo_post(&mut self) {
        if !self.staging {
            return;
        }
        self.staging = false;
        let Some(undo) = self.staged_undo.take() else {
            return;
        };

        self.posts.remove(STAGED_POST_ID);
        if undo.rendered {
            self.stream.retain(|id| *id != STAGED_POST_ID);
            self.window.retain(|id| *id != STAGED_POST_ID);
        }

        self.posts_count = undo.posts_count;
        self.highest_post_number = undo.highest_post_number;
        if let Some((id, previous)) = undo.replied_to {
            if let Some(target) = self.posts.get_mut(id) {
                target.reply_count = previous;
            }
        }
    }

    // =========================================================================
    // Gap repair
    // =========================================================================

    /// Splices a known-but-unloaded run of ids into the stream immediately
    /// before the anchor post and clears that gap annotation. Returns a
    /// fetch for any bodies not yet materialized.
    pub fn fill_gap_before(&mut self, anchor: i64, ids: &[i64]) -> Option<PostBatchRequest> {
        let position = self.stream.iter().position(|id| *id == anchor)?;
        self.gaps.before.remove(&anchor);

        let fresh: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|id| !self.stream.contains(id))
            .collect();
        self.stream.splice(position..position, fresh.iter().copied());
        self.finish_gap_fill(ids)
    }

    /// Splices a known-but-unloaded run of ids into the stream immediately
    /// after the anchor post and clears that gap annotation.
    pub fn fill_gap_after(&mut self, anchor: i64, ids: &[i64]) -> Option<PostBatchRequest> {
        let position = self.stream.iter().position(|id| *id == anchor)?;
        self.gaps.after.remove(&anchor);

        let fresh: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|id| !self.stream.contains(id))
            .collect();
        self.stream
            .splice(position + 1..position + 1, fresh.iter().copied());
        self.finish_gap_fill(ids)
    }

    fn finish_gap_fill(&mut self, ids: &[i64]) -> Option<PostBatchRequest> {
        let missing = self.missing_from(ids);
        if missing.is_empty() {
            self.splice_into_window(ids);
            return None;
        }
        self.pending_gap = Some(ids.to_vec());
        Some(PostBatchRequest::new(missing, self.generation))
    }

    /// Materializes the bodies of the most recent gap fill into the window.
    pub fn apply_gap_fill(&mut self, response: PostBatchResponse) -> usize {
        if self.is_stale(response.generation, "gap fill") {
            return 0;
        }
        let ids = self.pending_gap.take().unwrap_or_default();
        self.merge_and_splice(response, &ids)
    }

    /// Gap ids recorded immediately before the anchor, if any.
    pub fn gap_before(&self, anchor: i64) -> Option<&[i64]> {
        self.gaps.before.get(&anchor).map(Vec::as_slice)
    }

    /// Gap ids recorded immediately after the anchor, if any.
    pub fn gap_after(&self, anchor: i64) -> Option<&[i64]> {
        self.gaps.after.get(&anchor).map(Vec::as_slice)
    }

    // =========================================================================
    // Push notifications
    // =========================================================================

    /// Reacts to a push notification of a new post in this topic.
    ///
    /// The id is registered at the stream tail (idempotently). A fetch is
    /// returned only when no filters are active **and** the window already
    /// reaches the tail; otherwise the next append picks the id up naturally.
    pub fn trigger_new_post(&mut self, post_id: i64) -> Option<PostBatchRequest> {
        if self.stream.contains(&post_id) {
            return None;
        }

        let auto_append = !self.filters.is_active() && self.loaded_all_posts();
        self.stream.push(post_id);

        if !auto_append {
            return None;
        }
        Some(PostBatchRequest::new(vec![post_id], self.generation))
    }

    /// Materializes pushed tail posts into the window and advances the
    /// topic counters from what the server reports.
    pub fn apply_new_posts(&mut self, response: PostBatchResponse) -> usize {
        if self.is_stale(response.generation, "new post") {
            return 0;
        }
        let mut ids = Vec::with_capacity(response.posts.len());
        for post in response.posts {
            ids.push(post.id);
            if !self.posts.contains(post.id) {
                self.posts_count += 1;
            }
            self.highest_post_number = self.highest_post_number.max(post.post_number);
            self.posts.insert(post);
        }
        let before = self.window.len();
        self.splice_into_window(&ids);
        self.window.len() - before
    }

    /// Reacts to a push notification that a post changed. Returns a fetch
    /// for the post when it is part of this stream.
    pub fn trigger_changed_post(&mut self, post_id: i64) -> Option<PostBatchRequest> {
        if !self.stream.contains(&post_id) {
            return None;
        }
        Some(PostBatchRequest::new(vec![post_id], self.generation))
    }

    /// Merges a changed post in place through the identity map.
    pub fn apply_changed_post(&mut self, response: PostBatchResponse) {
        if self.is_stale(response.generation, "changed post") {
            return;
        }
        for post in response.posts {
            self.posts.insert(post);
        }
    }

    /// Reacts to a push notification that a post was deleted: the id is
    /// removed from window, identity map, and stream.
    pub fn trigger_deleted_post(&mut self, post_id: i64) {
        let known = self.stream.contains(&post_id) || self.posts.contains(post_id);
        if !known {
            return;
        }
        self.stream.retain(|id| *id != post_id);
        self.window.retain(|id| *id != post_id);
        self.posts.remove(post_id);
        self.posts_count = self.posts_count.saturating_sub(1);
        debug!(topic_id = self.topic_id, post_id, "removed deleted post");
    }

    /// Reacts to a push notification that a deleted post was recovered.
    /// Returns a fetch; the applied post is inserted at the numerically
    /// correct index by post number, never appended.
    pub fn trigger_recovered_post(&mut self, post_id: i64) -> Option<PostBatchRequest> {
        if self.stream.contains(&post_id) {
            return None;
        }
        Some(PostBatchRequest::new(vec![post_id], self.generation))
    }

    /// Inserts recovered posts into stream and window at the index their
    /// post number dictates. Returns the number of posts inserted.
    ///
    /// The recovered post renders into the window only when loaded posts
    /// bracket its position; otherwise it stays unloaded and the next
    /// append/prepend picks it up, keeping the window contiguous.
    pub fn apply_recovered_post(&mut self, response: PostBatchResponse) -> usize {
        if self.is_stale(response.generation, "recovered post") {
            return 0;
        }
        let mut inserted = 0;
        for post in response.posts {
            let id = post.id;
            let number = post.post_number;
            self.posts.insert(post);
            if self.stream.contains(&id) {
                continue;
            }

            let stream_index = self.stream_insert_index(number);
            let render = match (self.first_loaded_index(), self.last_loaded_index()) {
                (Some(first), Some(last)) => stream_index > first && stream_index <= last,
                _ => false,
            };
            self.stream.insert(stream_index, id);
            if render {
                self.splice_into_window(&[id]);
            }
            self.posts_count += 1;
            self.highest_post_number = self.highest_post_number.max(number);
            inserted += 1;
        }
        inserted
    }

    /// Stream index a post with this number belongs at, using materialized
    /// posts as anchors. Unloaded ids between anchors are assumed to carry
    /// the numbers immediately below their materialized successor.
    fn stream_insert_index(&self, number: u32) -> usize {
        let mut lower = 0;
        for (index, id) in self.stream.iter().enumerate() {
            let Some(post) = self.posts.get(*id) else {
                continue;
            };
            if post.post_number < number {
                lower = index + 1;
            } else {
                let back = (post.post_number - number) as usize;
                return index.saturating_sub(back).max(lower);
            }
        }
        self.stream.len()
    }

    // =========================================================================
    // Excerpts
    // =========================================================================

    /// Requests a short preview for the post at a stream position.
    ///
    /// Fetches cover a neighborhood of ±[`EXCERPT_NEIGHBORHOOD`] positions,
    /// and overlapping in-flight neighborhoods coalesce into the request
    /// already outstanding; a cached position needs no request at all.
    pub fn excerpt(&mut self, position: usize) -> Option<ExcerptRequest> {
        let id = *self.stream.get(position)?;
        if self.excerpts.contains_key(&id) {
            return None;
        }
        if self
            .pending_excerpts
            .iter()
            .any(|(start, end)| (*start..*end).contains(&position))
        {
            return None;
        }

        let start = position.saturating_sub(EXCERPT_NEIGHBORHOOD);
        let end = self.stream.len().min(position + EXCERPT_NEIGHBORHOOD + 1);
        let post_ids: Vec<i64> = self.stream[start..end]
            .iter()
            .copied()
            .filter(|id| !self.excerpts.contains_key(id))
            .collect();
        if post_ids.is_empty() {
            return None;
        }

        self.pending_excerpts.push((start, end));
        Some(ExcerptRequest { post_ids })
    }

    /// Fills the excerpt cache and retires any fully-covered neighborhoods.
    ///
    /// Pending ranges are clamped before slicing: pushed deletions may have
    /// shrunk the stream below a neighborhood recorded while the fetch was
    /// in flight.
    pub fn apply_excerpts(&mut self, response: ExcerptResponse) {
        for entry in response {
            self.excerpts.insert(entry.post_id, entry.excerpt);
        }
        let stream = &self.stream;
        let excerpts = &self.excerpts;
        self.pending_excerpts.retain(|(start, end)| {
            let end = (*end).min(stream.len());
            let start = (*start).min(end);
            stream[start..end].iter().any(|id| !excerpts.contains_key(id))
        });
    }

    /// Drops all in-flight excerpt neighborhoods so they can be re-requested.
    pub fn fail_excerpts(&mut self) {
        self.pending_excerpts.clear();
    }

    /// The cached excerpt for a post, if fetched.
    pub fn cached_excerpt(&self, post_id: i64) -> Option<&str> {
        self.excerpts.get(&post_id).map(String::as_str)
    }

    // =========================================================================
    // Lookup helpers
    // =========================================================================

    /// Days-ago value for the timeline entry closest to a post number, via
    /// binary search of the lookup table. `None` when the table is empty;
    /// callers fall back to [`PostStream::closest_loaded_post`].
    pub fn closest_days_ago(&self, post_number: u32) -> Option<u32> {
        if self.timeline_lookup.is_empty() {
            return None;
        }
        let index = self
            .timeline_lookup
            .partition_point(|(number, _)| *number < post_number);

        let after = self.timeline_lookup.get(index);
        let before = index
            .checked_sub(1)
            .and_then(|i| self.timeline_lookup.get(i));
        match (before, after) {
            (Some(b), Some(a)) => {
                if post_number - b.0 <= a.0 - post_number {
                    Some(b.1)
                } else {
                    Some(a.1)
                }
            }
            (Some(b), None) => Some(b.1),
            (None, Some(a)) => Some(a.1),
            (None, None) => None,
        }
    }

    /// Linear-scan fallback: the loaded post whose number is closest to the
    /// requested one.
    pub fn closest_loaded_post(&self, post_number: u32) -> Option<&Post> {
        self.loaded_posts()
            .min_by_key(|post| post.post_number.abs_diff(post_number))
    }

    /// Resolves a 1-based post number to a post id, walking the stream and
    /// its gap annotations together: each stream entry and each known gap
    /// entry preceding it consumes one ordinal.
    pub fn find_post_id_for_post_number(&self, post_number: u32) -> Option<i64> {
        let mut ordinal = 0u32;
        for id in &self.stream {
            if let Some(before) = self.gaps.before.get(id) {
                for gap_id in before {
                    ordinal += 1;
                    if ordinal == post_number {
                        return Some(*gap_id);
                    }
                }
            }
            ordinal += 1;
            if ordinal == post_number {
                return Some(*id);
            }
            if let Some(after) = self.gaps.after.get(id) {
                for gap_id in after {
                    ordinal += 1;
                    if ordinal == post_number {
                        return Some(*gap_id);
                    }
                }
            }
        }
        None
    }
}
