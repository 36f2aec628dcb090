//! Per-topic post state: the canonical post store and the windowed stream.

mod identity_map;
mod post;
mod post_stream;

pub use identity_map::IdentityMap;
pub use post::Post;
pub use post_stream::{
    LoadOutcome, PostStream, RefreshOptions, RefreshOutcome, StageResult, StreamFilters,
};
