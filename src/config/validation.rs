//! Configuration validation
//!
//! Validates TrendSpotter configuration for correctness:
//! - A usable base URL
//! - Non-zero cache TTLs and refresh intervals
//! - Sensible aggregation limits

use super::trendspotter_config::TrendSpotterConfig;
use crate::TrendSpotterError;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub section: String,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(section: &str, field: &str, message: impl Into<String>) -> Self {
        Self {
            section: section.to_string(),
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.section, self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a TrendSpotter configuration
pub fn validate_config(config: &TrendSpotterConfig) -> ValidationResult {
    let mut errors = Vec::new();

    let base_url = config.api.base_url.trim();
    if base_url.is_empty() {
        errors.push(ValidationError::new("api", "base_url", "must not be empty"));
    } else if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        errors.push(ValidationError::new(
            "api",
            "base_url",
            format!("must be an http(s) URL, got '{}'", base_url),
        ));
    }

    if config.api.request_timeout_ms == Some(0) {
        errors.push(ValidationError::new(
            "api",
            "request_timeout_ms",
            "must be greater than zero when set",
        ));
    }

    for (field, value) in [
        ("users_ttl_ms", config.cache.users_ttl_ms),
        ("posts_ttl_ms", config.cache.posts_ttl_ms),
        ("comments_ttl_ms", config.cache.comments_ttl_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::new("cache", field, "must be greater than zero"));
        }
    }

    for (field, value) in [
        ("top_users_interval_ms", config.refresh.top_users_interval_ms),
        ("trending_interval_ms", config.refresh.trending_interval_ms),
        ("feed_interval_ms", config.refresh.feed_interval_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::new("refresh", field, "must be greater than zero"));
        }
    }

    if config.refresh.feed_sample_size == 0 {
        errors.push(ValidationError::new(
            "refresh",
            "feed_sample_size",
            "must be at least 1",
        ));
    }

    if config.aggregation.top_users_limit == 0 {
        errors.push(ValidationError::new(
            "aggregation",
            "top_users_limit",
            "must be at least 1",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate and convert errors into a single [`TrendSpotterError::Config`]
pub fn validate_config_result(config: &TrendSpotterConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        TrendSpotterError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}
