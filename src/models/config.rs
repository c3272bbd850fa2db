// src/models/config.rs

//! Application configuration structures.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

use super::{DeliveryMode, DiffPolicy, DigestPolicy, WebhookConfig};

/// Tick cadences the scheduler collaborator supports, in minutes.
pub const ALLOWED_INTERVALS: [i64; 5] = [5, 15, 30, 60, 120];

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Surveillance loop behavior
    #[serde(default)]
    pub surveillance: SurveillanceConfig,

    /// Remote stats API settings
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// Default change-detection policy
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Per-locale policy overrides, keyed by locale code
    #[serde(default)]
    pub locale_policies: HashMap<String, PolicyConfig>,

    /// Webhook destinations (global and per-locale)
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Effective diff policy for a locale: the per-locale override if one
    /// exists, otherwise the global default.
    pub fn policy_for(&self, locale: &str) -> DiffPolicy {
        self.locale_policies
            .get(locale)
            .unwrap_or(&self.policy)
            .to_diff_policy()
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if !ALLOWED_INTERVALS.contains(&self.surveillance.interval_minutes) {
            return Err(AppError::validation(format!(
                "surveillance.interval_minutes must be one of {ALLOWED_INTERVALS:?}"
            )));
        }
        if self.surveillance.max_projects_per_check == 0 {
            return Err(AppError::validation(
                "surveillance.max_projects_per_check must be > 0",
            ));
        }
        if self.surveillance.max_concurrent == 0 {
            return Err(AppError::validation("surveillance.max_concurrent must be > 0"));
        }
        if self.scraper.user_agent.trim().is_empty() {
            return Err(AppError::validation("scraper.user_agent is empty"));
        }
        if self.scraper.timeout_secs == 0 {
            return Err(AppError::validation("scraper.timeout_secs must be > 0"));
        }
        Url::parse(&self.scraper.base_url)
            .map_err(|e| AppError::validation(format!("scraper.base_url is invalid: {e}")))?;
        for webhook in &self.webhooks {
            if webhook.url.trim().is_empty() {
                return Err(AppError::validation(format!(
                    "webhook for channel '{}' has an empty url",
                    webhook.channel
                )));
            }
            if webhook.mode == DeliveryMode::Digest {
                if let DigestPolicy::Interval { minutes } = webhook.digest {
                    if minutes < 15 {
                        return Err(AppError::validation(format!(
                            "webhook for channel '{}': digest interval must be >= 15 minutes",
                            webhook.channel
                        )));
                    }
                }
                if let DigestPolicy::FixedTime { ref hhmm } = webhook.digest {
                    if chrono::NaiveTime::parse_from_str(hhmm, "%H:%M").is_err() {
                        return Err(AppError::validation(format!(
                            "webhook for channel '{}': digest time '{hhmm}' is not HH:MM",
                            webhook.channel
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Surveillance loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveillanceConfig {
    /// Master switch; a disabled watcher skips scrape ticks entirely
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Minutes between scrape ticks (one of 5, 15, 30, 60, 120)
    #[serde(default = "defaults::interval_minutes")]
    pub interval_minutes: i64,

    /// Upper bound on projects checked per tick
    #[serde(default = "defaults::max_projects_per_check")]
    pub max_projects_per_check: usize,

    /// Upper bound on concurrent HTTP fetches within a tick
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for SurveillanceConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            interval_minutes: defaults::interval_minutes(),
            max_projects_per_check: defaults::max_projects_per_check(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Remote stats API and HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Base URL of the translation stats API
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Translation set name appended to every stats URL
    #[serde(default = "defaults::translation_set")]
    pub translation_set: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Pause before the single retry, in milliseconds
    #[serde(default = "defaults::retry_pause")]
    pub retry_pause_ms: u64,

    /// Cooldown applied after a failed scrape when the response carries no
    /// retry hint, in seconds
    #[serde(default = "defaults::default_cooldown")]
    pub default_cooldown_secs: i64,

    /// Cap on a Retry-After hint, in seconds
    #[serde(default = "defaults::max_retry_after")]
    pub max_retry_after_secs: i64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            translation_set: defaults::translation_set(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            retry_pause_ms: defaults::retry_pause(),
            default_cooldown_secs: defaults::default_cooldown(),
            max_retry_after_secs: defaults::max_retry_after(),
        }
    }
}

/// Change-detection policy knobs, global or per locale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Minimum total-string growth before a new-strings event fires
    #[serde(default = "defaults::new_strings_threshold")]
    pub new_strings_threshold: u64,

    /// Completion milestones in percent
    #[serde(default = "defaults::milestones")]
    pub milestones: Vec<u8>,
}

impl PolicyConfig {
    fn to_diff_policy(&self) -> DiffPolicy {
        DiffPolicy::new(self.new_strings_threshold, self.milestones.clone())
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            new_strings_threshold: defaults::new_strings_threshold(),
            milestones: defaults::milestones(),
        }
    }
}

mod defaults {
    // Surveillance defaults
    pub fn enabled() -> bool {
        true
    }
    pub fn interval_minutes() -> i64 {
        15
    }
    pub fn max_projects_per_check() -> usize {
        10
    }
    pub fn max_concurrent() -> usize {
        4
    }

    // Scraper defaults
    pub fn base_url() -> String {
        "https://translate.wordpress.org/api/projects".into()
    }
    pub fn translation_set() -> String {
        "default".into()
    }
    pub fn user_agent() -> String {
        "glotwatch/0.1 (translation status watcher)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn retry_pause() -> u64 {
        2000
    }
    pub fn default_cooldown() -> i64 {
        300
    }
    pub fn max_retry_after() -> i64 {
        600
    }

    // Policy defaults
    pub fn new_strings_threshold() -> u64 {
        10
    }
    pub fn milestones() -> Vec<u8> {
        vec![25, 50, 75, 90, 100]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Channel;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_odd_interval() {
        let mut config = Config::default();
        config.surveillance.interval_minutes = 7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut config = Config::default();
        config.surveillance.max_projects_per_check = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_short_digest_interval() {
        let mut config = Config::default();
        config.webhooks.push(WebhookConfig {
            channel: Channel::Global,
            enabled: true,
            url: "https://hooks.example.com/x".to_string(),
            allowed_kinds: crate::models::EventKind::ALL.to_vec(),
            scope_locales: Vec::new(),
            scope_projects: Vec::new(),
            new_strings_threshold: 0,
            milestones: Vec::new(),
            mode: DeliveryMode::Digest,
            digest: DigestPolicy::Interval { minutes: 5 },
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn policy_override_wins_for_its_locale() {
        let mut config = Config::default();
        config.locale_policies.insert(
            "fr_FR".to_string(),
            PolicyConfig {
                new_strings_threshold: 50,
                milestones: vec![100],
            },
        );
        assert_eq!(config.policy_for("fr_FR").new_strings_threshold, 50);
        assert_eq!(config.policy_for("de_DE").new_strings_threshold, 10);
    }

    #[test]
    fn config_parses_from_toml() {
        let toml_str = r#"
            [surveillance]
            enabled = true
            interval_minutes = 30
            max_projects_per_check = 5

            [[webhooks]]
            channel = "fr_FR"
            url = "https://hooks.example.com/T/B/x"
            mode = "digest"
            digest = { kind = "interval", minutes = 60 }
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.surveillance.interval_minutes, 30);
        assert_eq!(config.webhooks.len(), 1);
        assert_eq!(config.webhooks[0].channel, Channel::Locale("fr_FR".into()));
        assert_eq!(config.webhooks[0].mode, DeliveryMode::Digest);
        assert!(config.validate().is_ok());
    }
}
