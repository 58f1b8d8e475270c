//! Feed aggregation
//!
//! Derives the live views from cached users, posts and comments: the unified
//! post list, the per-post comment count index, the top users ranking and the
//! trending posts set.

mod feed_aggregator;

pub use feed_aggregator::{Aggregator, FeedRefresh, InitSummary, TopUser};
