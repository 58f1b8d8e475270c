//! Refresh scheduler
//!
//! Keeps the derived views live while a consumer is watching them.
//!
//! # Views
//!
//! | View        | Default interval | Work per tick                              |
//! |-------------|------------------|--------------------------------------------|
//! | `TopUsers`  | 30s              | backfill comment counts, re-rank users      |
//! | `Trending`  | 20s              | re-derive trending posts from known counts |
//! | `Feed`      | 30s              | refresh posts for 5 random users           |
//!
//! Views run independently against the same shared [`Aggregator`](crate::aggregator::Aggregator).
//! Background failures are logged and broadcast as [`SchedulerEvent::Error`];
//! the view simply tries again on its next tick.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use trendspotter::aggregator::Aggregator;
//! use trendspotter::config::TrendSpotterConfig;
//! use trendspotter::scheduler::{Scheduler, SchedulerConfig};
//!
//! #[tokio::main]
//! async fn main() -> trendspotter::Result<()> {
//!     let config = TrendSpotterConfig::load_or_default(TrendSpotterConfig::default_path())?;
//!     let aggregator = Arc::new(Aggregator::from_config(&config)?);
//!     aggregator.initialize().await?;
//!
//!     let mut scheduler = Scheduler::new(aggregator, SchedulerConfig::from_refresh(&config.refresh));
//!     let mut events = scheduler.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     scheduler.run().await
//! }
//! ```

mod daemon;

pub use daemon::{
    refresh_view, Scheduler, SchedulerCommand, SchedulerConfig, SchedulerEvent, View,
    DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_FEED_INTERVAL, DEFAULT_FEED_SAMPLE_SIZE,
    DEFAULT_TOP_USERS_INTERVAL, DEFAULT_TRENDING_INTERVAL,
};
