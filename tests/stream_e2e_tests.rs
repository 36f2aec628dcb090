//! End-to-end tests for the windowed post stream.
//!
//! These tests drive complete reading sessions against a fake server,
//! verifying that window growth, optimistic staging, gap repair, and push
//! handling compose correctly over a whole workflow.

use postsync::constants::STAGED_POST_ID;
use postsync::error::TopicLoadError;
use postsync::protocol::{
    PostBatchRequest, PostBatchResponse, PostStreamPayload, TopicViewResponse,
};
use postsync::stream::{LoadOutcome, Post, PostStream, RefreshOptions, RefreshOutcome, StageResult};

/// Helper to build a post with a plausible body.
fn make_post(id: i64, post_number: u32, topic_id: u64) -> Post {
    let mut post = Post::new(
        id,
        post_number,
        topic_id,
        "eviltrout",
        &format!("post body {post_number}"),
    );
    post.created_at = 1_700_000_000_000 + u64::from(post_number) * 60_000;
    post
}

/// Fake server: answers a batch request with one post per requested id,
/// deriving post numbers from a known stream.
fn answer_batch(request: &PostBatchRequest, stream: &[i64], topic_id: u64) -> PostBatchResponse {
    let posts = request
        .post_ids
        .iter()
        .map(|id| {
            let number = stream.iter().position(|sid| sid == id).unwrap() as u32 + 1;
            make_post(*id, number, topic_id)
        })
        .collect();
    PostBatchResponse {
        posts,
        generation: request.generation,
    }
}

fn topic_view(
    stream_ids: &[i64],
    loaded: &[i64],
    topic_id: u64,
    generation: u64,
) -> TopicViewResponse {
    let posts = loaded
        .iter()
        .map(|id| {
            let number = stream_ids.iter().position(|sid| sid == id).unwrap() as u32 + 1;
            make_post(*id, number, topic_id)
        })
        .collect();
    TopicViewResponse {
        post_stream: PostStreamPayload {
            posts,
            stream: stream_ids.to_vec(),
        },
        timeline_lookup: Vec::new(),
        posts_count: stream_ids.len() as u32,
        highest_post_number: stream_ids.len() as u32,
        gaps: None,
        generation,
    }
}

// =============================================================================
// Reading Session Tests
// =============================================================================

/// Complete reading session: land mid-topic, scroll both directions, then
/// receive and render a pushed reply.
#[test]
fn test_complete_reading_session() {
    let stream_ids: Vec<i64> = (201..=212).collect();
    let mut stream = PostStream::new(9).with_chunk_size(4);

    // =========================================================================
    // Step 1: Initial load near post 6
    // =========================================================================
    let opts = RefreshOptions {
        near_post: Some(6),
        filters: Default::default(),
    };
    let request = match stream.begin_refresh(opts) {
        RefreshOutcome::Fetch(req) => req,
        other => panic!("expected fetch, got {other:?}"),
    };
    stream.apply_refresh(topic_view(
        &stream_ids,
        &[205, 206, 207],
        9,
        request.generation,
    ));
    assert_eq!(stream.window(), &[205, 206, 207]);
    assert_eq!(stream.posts_count(), 12);

    // =========================================================================
    // Step 2: Scroll down twice to reach the tail
    // =========================================================================
    for _ in 0..2 {
        if let LoadOutcome::Fetch(req) = stream.begin_append() {
            let grown = stream.apply_append(answer_batch(&req, &stream_ids, 9));
            assert!(grown > 0);
        }
    }
    assert_eq!(stream.last_loaded_id(), Some(212));
    assert!(stream.loaded_all_posts());

    // =========================================================================
    // Step 3: Scroll up to the head
    // =========================================================================
    let mut loads = 0;
    loop {
        match stream.begin_prepend() {
            LoadOutcome::Fetch(req) => {
                stream.apply_prepend(answer_batch(&req, &stream_ids, 9));
                loads += 1;
            }
            LoadOutcome::AtEdge => break,
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(loads, 1);
    assert_eq!(stream.window(), &stream_ids[..]);

    // The whole stream is loaded exactly once, in order, with no duplicates.
    assert_eq!(stream.loaded_count(), stream_ids.len());

    // =========================================================================
    // Step 4: A reply is pushed while we sit at the tail
    // =========================================================================
    let request = stream.trigger_new_post(213).expect("auto-append fetch");
    stream.apply_new_posts(PostBatchResponse {
        posts: vec![make_post(213, 13, 9)],
        generation: request.generation,
    });
    assert_eq!(stream.last_loaded_id(), Some(213));
    assert_eq!(stream.posts_count(), 13);
    assert_eq!(stream.highest_post_number(), 13);
}

/// Optimistic submission: stage a reply, watch it render immediately, then
/// commit the server's confirmed post in its place.
#[test]
fn test_optimistic_reply_commit() {
    let stream_ids: Vec<i64> = vec![301, 302];
    let mut stream = PostStream::new(4).with_chunk_size(5);
    if let RefreshOutcome::Fetch(req) = stream.begin_refresh(RefreshOptions::default()) {
        stream.apply_refresh(topic_view(&stream_ids, &stream_ids, 4, req.generation));
    }

    let mut reply = Post::staged(4, 0, "codinghorror", "draft reply");
    reply.reply_to_post_number = Some(1);
    assert_eq!(stream.stage_post(reply), StageResult::Staged);

    // Optimistic render: sentinel at the tail, counters already bumped.
    assert_eq!(stream.window().last(), Some(&STAGED_POST_ID));
    assert_eq!(stream.posts_count(), 3);
    assert_eq!(stream.get(301).unwrap().reply_count, 1);

    // Server confirms with the canonical id.
    let mut confirmed = make_post(303, 3, 4);
    confirmed.reply_to_post_number = Some(1);
    stream.commit_post(confirmed);

    assert_eq!(stream.window(), &[301, 302, 303]);
    assert!(stream.get(STAGED_POST_ID).is_none());
    assert!(!stream.is_staging());

    // A new submission may begin once the previous one settled.
    assert_eq!(
        stream.stage_post(Post::staged(4, 0, "codinghorror", "again")),
        StageResult::Staged
    );
}

/// Optimistic submission that the server rejects: everything unwinds before
/// the caller sees the validation error.
#[test]
fn test_optimistic_reply_rejected() {
    let stream_ids: Vec<i64> = vec![301, 302];
    let mut stream = PostStream::new(4).with_chunk_size(5);
    if let RefreshOutcome::Fetch(req) = stream.begin_refresh(RefreshOptions::default()) {
        stream.apply_refresh(topic_view(&stream_ids, &stream_ids, 4, req.generation));
    }

    let mut reply = Post::staged(4, 0, "codinghorror", "too short");
    reply.reply_to_post_number = Some(2);
    stream.stage_post(reply);
    stream.undo_post();

    assert_eq!(stream.window(), &[301, 302]);
    assert_eq!(stream.posts_count(), 2);
    assert_eq!(stream.highest_post_number(), 2);
    assert_eq!(stream.get(302).unwrap().reply_count, 0);
    assert!(stream.get(STAGED_POST_ID).is_none());
}

// =============================================================================
// Failure and Recovery Tests
// =============================================================================

/// A failed refresh is classified without touching the existing window, and
/// the identical refresh succeeds afterwards.
#[test]
fn test_refresh_failure_then_retry() {
    let stream_ids: Vec<i64> = vec![101, 102, 103];
    let mut stream = PostStream::new(2).with_chunk_size(3);
    if let RefreshOutcome::Fetch(req) = stream.begin_refresh(RefreshOptions::default()) {
        stream.apply_refresh(topic_view(&stream_ids, &[101], 2, req.generation));
    }

    assert!(matches!(
        stream.begin_refresh(RefreshOptions::default()),
        RefreshOutcome::Fetch(_)
    ));
    assert_eq!(stream.fail_refresh(404), TopicLoadError::NotFound);
    assert_eq!(stream.fail_refresh(500), TopicLoadError::Generic);
    assert_eq!(stream.window(), &[101]);

    let request = match stream.begin_refresh(RefreshOptions::default()) {
        RefreshOutcome::Fetch(req) => req,
        other => panic!("{other:?}"),
    };
    stream.apply_refresh(topic_view(&stream_ids, &stream_ids, 2, request.generation));
    assert_eq!(stream.window(), &[101, 102, 103]);
}

/// A forced refresh while an append is in flight: the append's late response
/// carries a stale generation and must not corrupt the new window.
#[test]
fn test_stale_append_after_forced_refresh() {
    let old_ids: Vec<i64> = vec![101, 102, 103, 104];
    let mut stream = PostStream::new(2).with_chunk_size(2);
    if let RefreshOutcome::Fetch(req) = stream.begin_refresh(RefreshOptions::default()) {
        stream.apply_refresh(topic_view(&old_ids, &[101, 102], 2, req.generation));
    }

    let stale_request = match stream.begin_append() {
        LoadOutcome::Fetch(req) => req,
        other => panic!("{other:?}"),
    };

    // Force a refresh before the append response lands. Post 103 is gone
    // from the authoritative stream.
    let new_ids: Vec<i64> = vec![101, 102, 104];
    if let RefreshOutcome::Fetch(req) = stream.begin_refresh(RefreshOptions::default()) {
        stream.apply_refresh(topic_view(&new_ids, &new_ids, 2, req.generation));
    }

    // The stale response arrives and is discarded.
    stream.apply_append(answer_batch(&stale_request, &old_ids, 2));
    assert_eq!(stream.window(), &[101, 102, 104]);
    assert!(!stream.stream().contains(&103));
}

/// Gap repair in the middle of a session: a summary-collapsed run is
/// expanded in place and the window stays in stream order.
#[test]
fn test_gap_repair_mid_session() {
    let mut stream = PostStream::new(3).with_chunk_size(10);
    if let RefreshOutcome::Fetch(req) = stream.begin_refresh(RefreshOptions::default()) {
        let mut view = topic_view(&[401, 405, 406], &[401, 405, 406], 3, req.generation);
        let mut gaps = postsync::protocol::GapsPayload::default();
        gaps.before.insert(405, vec![402, 403, 404]);
        view.gaps = Some(gaps);
        view.posts_count = 6;
        view.highest_post_number = 6;
        stream.apply_refresh(view);
    }

    // Ordinal lookup sees through the gap before it is filled.
    assert_eq!(stream.find_post_id_for_post_number(3), Some(403));

    let gap: Vec<i64> = stream.gap_before(405).unwrap().to_vec();
    let request = stream.fill_gap_before(405, &gap).expect("gap fetch");
    let full_stream: Vec<i64> = (401..=406).collect();
    stream.apply_gap_fill(answer_batch(&request, &full_stream, 3));

    assert_eq!(stream.stream(), &full_stream[..]);
    assert_eq!(stream.window(), &full_stream[..]);
    assert_eq!(stream.gap_before(405), None);
}

/// Moderation push messages: delete removes a post everywhere, recovery
/// re-inserts it at the numerically correct position.
#[test]
fn test_delete_then_recover() {
    let stream_ids: Vec<i64> = vec![501, 502, 503];
    let mut stream = PostStream::new(6).with_chunk_size(5);
    if let RefreshOutcome::Fetch(req) = stream.begin_refresh(RefreshOptions::default()) {
        stream.apply_refresh(topic_view(&stream_ids, &stream_ids, 6, req.generation));
    }

    stream.trigger_deleted_post(502);
    assert_eq!(stream.window(), &[501, 503]);
    assert_eq!(stream.posts_count(), 2);

    let request = stream.trigger_recovered_post(502).expect("fetch");
    stream.apply_recovered_post(PostBatchResponse {
        posts: vec![make_post(502, 2, 6)],
        generation: request.generation,
    });
    assert_eq!(stream.stream(), &[501, 502, 503]);
    assert_eq!(stream.window(), &[501, 502, 503]);
    assert_eq!(stream.posts_count(), 3);
}
