//! # Postsync - Post Stream and Read-State Synchronization
//!
//! A sans-IO client core for discussion forums: windowed post-stream
//! pagination with optimistic staging, plus session-wide read/unread/new
//! tracking reconciled between bulk snapshots and a best-effort push feed.
//!
//! ## Features
//!
//! - **Identity map**: one canonical in-memory post per id, with
//!   merge-on-duplicate-insert semantics
//! - **Windowed streams**: fixed-size chunked pagination over the full id
//!   sequence, with gap repair for sparsely-known topics
//! - **Optimistic staging**: locally submitted posts render immediately and
//!   commit or fully unwind on the server's verdict
//! - **Read-state tracking**: O(rows) new/unread counts, idempotent push
//!   merges, and a four-step list reconciliation algorithm
//!
//! ## Transport model
//!
//! The engine performs no IO. Operations that need the network return typed
//! request values for the host to send however it likes; responses feed back
//! into the matching `apply_*` method, and failures into `fail_*`. This keeps
//! every state transition synchronous and unit-testable.
//!
//! ## Examples
//!
//! ### Loading a topic window
//!
//! ```rust,no_run
//! use postsync::stream::{PostStream, RefreshOptions, RefreshOutcome};
//! # fn send(_: postsync::protocol::TopicViewRequest) -> postsync::protocol::TopicViewResponse { unimplemented!() }
//! let mut stream = PostStream::new(42);
//! if let RefreshOutcome::Fetch(request) = stream.begin_refresh(RefreshOptions::default()) {
//!     let response = send(request);
//!     stream.apply_refresh(response);
//! }
//! println!("loaded {} of {} posts", stream.window().len(), stream.stream().len());
//! ```
//!
//! ### Tracking read state
//!
//! ```rust
//! use postsync::tracking::TopicTrackingState;
//!
//! let mut tracking = TopicTrackingState::new();
//! tracking.load_states(vec![]);
//! assert_eq!(tracking.count_unread(None), 0);
//! ```

pub mod constants;
pub mod error;
pub mod protocol;
pub mod stream;
pub mod tracking;

pub use error::{Result, SyncError, TopicLoadError};
pub use stream::{IdentityMap, Post, PostStream};
pub use tracking::{TopicTrackingRow, TopicTrackingState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
