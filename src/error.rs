// src/error.rs

//! Unified error handling for the watcher application.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction or request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Scrape failure surfaced at the application boundary
    #[error(transparent)]
    Scrape(#[from] ScrapeError),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Outcome taxonomy for a single scrape attempt.
///
/// Every variant is expected data for the caller, never a reason to
/// abort a tick. `BackoffActive` in particular is a skip, not a failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScrapeError {
    /// The target (or the whole scraper) is cooling down; no HTTP was issued.
    #[error("in backoff until {until}")]
    BackoffActive { until: DateTime<Utc> },

    /// Network/DNS level failure after the built-in retry.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx response after the built-in retry.
    #[error("HTTP status {code}")]
    HttpStatus { code: u16 },

    /// Response body was not the expected JSON shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The project exists but has no translation set for the locale.
    #[error("no translation set in response")]
    NoTranslationSet,

    /// No candidate API segment matched the (type, slug) pair.
    #[error("no API segment resolved for project")]
    SegmentUnresolved,
}

/// Reason a `watch` request was denied at admission time.
///
/// Deliberately coarse: callers get a stable reason code, never a raw
/// transport error.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchDenied {
    /// The trial scrape found no translation data for the project.
    #[error("no_projects")]
    NoProjects,

    /// The trial scrape failed at the API level.
    #[error("api_error")]
    ApiError,

    /// No enabled webhook channel is configured.
    #[error("slack_not_ready")]
    SlackNotReady,

    /// The confirmation notification could not be delivered.
    #[error("slack_send_error")]
    SlackSendError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrape_error_display_is_stable() {
        assert_eq!(
            ScrapeError::HttpStatus { code: 429 }.to_string(),
            "HTTP status 429"
        );
        assert_eq!(
            ScrapeError::NoTranslationSet.to_string(),
            "no translation set in response"
        );
    }

    #[test]
    fn watch_denied_reason_codes() {
        assert_eq!(WatchDenied::NoProjects.to_string(), "no_projects");
        assert_eq!(WatchDenied::SlackSendError.to_string(), "slack_send_error");
    }
}
