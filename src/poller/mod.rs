//! Feed pollers: decide what is new since the previous check.
//!
//! - `change`: orders and sales, paginated and deduplicated by identifier.
//! - `threshold`: the feedback/questions flags, rate-gated and never deduplicated.

pub mod change;
pub mod threshold;

pub use change::ChangeFeedPoller;
pub use threshold::ThresholdFeedPoller;
