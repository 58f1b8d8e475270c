//! Configuration system
//!
//! Loads ~/.config/trendspotter/config.yaml with support for:
//! - Evaluation service endpoint and request timeout
//! - Per-partition cache TTLs (users, posts, comments)
//! - Aggregation limits (initial load, top users)
//! - Refresh intervals for each view
//! - Synthetic recency stamping

mod trendspotter_config;
pub mod validation;

pub use trendspotter_config::{
    AggregationConfig, ApiConfig, CacheTtlConfig, RecencyConfig, RefreshConfig,
    TrendSpotterConfig,
};
pub use validation::{validate_config, validate_config_result, ValidationError};
