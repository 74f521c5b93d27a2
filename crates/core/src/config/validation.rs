//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` or a font origin is not an http(s) URL
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` or `architecture_revision` is empty
    /// - a configured path does not start with `/`
    /// - `precache_concurrency` is 0 or exceeds 32
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("origin", &self.origin),
            ("font_stylesheet_origin", &self.font_stylesheet_origin),
            ("font_file_origin", &self.font_file_origin),
        ] {
            let parsed = url::Url::parse(value)
                .map_err(|e| ConfigError::Invalid { field: field.into(), reason: e.to_string() })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must be an http(s) URL".into() });
            }
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.architecture_revision.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "architecture_revision".into(),
                reason: "must not be empty".into(),
            });
        }

        for (field, value) in [
            ("template_path", &self.template_path),
            ("offline_partial_path", &self.offline_partial_path),
            ("default_feed_path", &self.default_feed_path),
        ] {
            if !value.starts_with('/') {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must start with '/'".into() });
            }
        }

        if self.precache_concurrency == 0 || self.precache_concurrency > 32 {
            return Err(ConfigError::Invalid {
                field: "precache_concurrency".into(),
                reason: "must be between 1 and 32".into(),
            });
        }

        if self.site_name.is_empty() {
            tracing::warn!("site_name is empty; untitled pages will render an empty <title>");
        }

        Ok(())
    }
}
