//! TrendSpotter - cached social activity analytics
//!
//! Aggregates users, posts and comments from the social evaluation service,
//! ranks users by the comments their posts receive and surfaces the posts
//! with the most comments.
//!
//! # Architecture
//!
//! - **source**: `RemoteSource` seam over the evaluation service client
//! - **cache**: time-expiring caches (users 5m, posts 30s, comments 60s)
//! - **aggregator**: unified post list, comment counts, top users, trending posts
//! - **scheduler**: interval-driven refresh of the live views
//! - **config**: YAML configuration with defaults for every field
//! - **metrics**: Prometheus counters for cache and refresh activity

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod scheduler;
pub mod source;

// Re-exports
pub use error::{Result, TrendSpotterError};
pub use social_api::{Comment, Post, User, UserDirectory};
