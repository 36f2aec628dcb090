//! Session-wide read/unread/new tracking.

mod row;
mod state;

pub use row::{NotificationLevel, TopicTrackingRow};
pub use state::TopicTrackingState;
