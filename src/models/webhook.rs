// src/models/webhook.rs

//! Webhook channel configuration and digest queue items.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EventKind, ProjectKey};

/// Delivery channel identity: the shared global channel or one locale channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Channel {
    Global,
    Locale(String),
}

impl Channel {
    /// Stable string id, used as the digest queue key.
    pub fn id(&self) -> String {
        match self {
            Channel::Global => "global".to_string(),
            Channel::Locale(code) => code.clone(),
        }
    }

    /// Whether this channel should see events for the given locale.
    pub fn covers_locale(&self, locale: &str) -> bool {
        match self {
            Channel::Global => true,
            Channel::Locale(code) => code == locale,
        }
    }
}

impl From<String> for Channel {
    fn from(s: String) -> Self {
        if s == "global" {
            Channel::Global
        } else {
            Channel::Locale(s)
        }
    }
}

impl From<Channel> for String {
    fn from(c: Channel) -> Self {
        c.id()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// When a surviving event is actually delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Immediate,
    Digest,
}

/// Timing policy for digest channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DigestPolicy {
    /// Flush whenever more than `minutes` have elapsed since the last flush.
    Interval { minutes: i64 },
    /// Flush inside a 15-minute window starting at `hhmm` local time.
    FixedTime { hhmm: String },
}

impl Default for DigestPolicy {
    fn default() -> Self {
        DigestPolicy::Interval { minutes: 60 }
    }
}

/// One webhook destination with its filters and timing policy.
///
/// Read-only per evaluation; the settings collaborator owns the source of
/// truth and hands the URL over already decrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub channel: Channel,

    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Webhook destination URL (a secret; encrypted at rest by the caller).
    pub url: String,

    /// Event kinds this channel accepts. Empty would mean "nothing", so the
    /// default is every kind.
    #[serde(default = "defaults::allowed_kinds")]
    pub allowed_kinds: Vec<EventKind>,

    /// Locales this channel accepts; empty = all locales.
    #[serde(default)]
    pub scope_locales: Vec<String>,

    /// Project-key prefixes this channel accepts; empty = all projects.
    #[serde(default)]
    pub scope_projects: Vec<String>,

    /// Minimum `NewStrings` count this channel cares about.
    #[serde(default)]
    pub new_strings_threshold: u64,

    /// Milestones this channel announces; empty = all milestones.
    #[serde(default)]
    pub milestones: Vec<u8>,

    #[serde(default = "defaults::mode")]
    pub mode: DeliveryMode,

    #[serde(default)]
    pub digest: DigestPolicy,
}

impl WebhookConfig {
    /// Whether an event of `kind` for `key` passes this channel's filters.
    pub fn accepts(&self, kind: EventKind, key: &ProjectKey) -> bool {
        if !self.enabled {
            return false;
        }
        if !self.channel.covers_locale(&key.locale) {
            return false;
        }
        if !self.allowed_kinds.contains(&kind) {
            return false;
        }
        if !self.scope_locales.is_empty() && !self.scope_locales.contains(&key.locale) {
            return false;
        }
        if !self.scope_projects.is_empty() {
            let key_str = key.to_string();
            if !self.scope_projects.iter().any(|p| key_str.starts_with(p.as_str())) {
                return false;
            }
        }
        true
    }
}

mod defaults {
    use super::{DeliveryMode, EventKind};

    pub fn enabled() -> bool {
        true
    }

    pub fn allowed_kinds() -> Vec<EventKind> {
        EventKind::ALL.to_vec()
    }

    pub fn mode() -> DeliveryMode {
        DeliveryMode::Immediate
    }
}

/// One pre-rendered message waiting in a channel's digest queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestQueueItem {
    pub kind: EventKind,
    pub project_key: ProjectKey,
    pub message: String,
    pub enqueued_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectType;

    fn sample_config(channel: Channel) -> WebhookConfig {
        WebhookConfig {
            channel,
            enabled: true,
            url: "https://hooks.example.com/T000/B000/xyz".to_string(),
            allowed_kinds: EventKind::ALL.to_vec(),
            scope_locales: Vec::new(),
            scope_projects: Vec::new(),
            new_strings_threshold: 0,
            milestones: Vec::new(),
            mode: DeliveryMode::Immediate,
            digest: DigestPolicy::default(),
        }
    }

    #[test]
    fn channel_string_round_trip() {
        assert_eq!(Channel::from("global".to_string()), Channel::Global);
        assert_eq!(
            Channel::from("fr_FR".to_string()),
            Channel::Locale("fr_FR".to_string())
        );
        assert_eq!(Channel::Global.id(), "global");
    }

    #[test]
    fn locale_channel_only_covers_its_locale() {
        let config = sample_config(Channel::Locale("de_DE".to_string()));
        let key_de = ProjectKey::new(ProjectType::Core, "dev", "de_DE");
        let key_fr = ProjectKey::new(ProjectType::Core, "dev", "fr_FR");
        assert!(config.accepts(EventKind::Approval, &key_de));
        assert!(!config.accepts(EventKind::Approval, &key_fr));
    }

    #[test]
    fn disabled_channel_accepts_nothing() {
        let mut config = sample_config(Channel::Global);
        config.enabled = false;
        let key = ProjectKey::new(ProjectType::Core, "dev", "fr_FR");
        assert!(!config.accepts(EventKind::NewProject, &key));
    }

    #[test]
    fn project_scope_matches_by_prefix() {
        let mut config = sample_config(Channel::Global);
        config.scope_projects = vec!["plugin/akismet".to_string()];
        let matching = ProjectKey::new(ProjectType::Plugin, "akismet", "fr_FR");
        let other = ProjectKey::new(ProjectType::Plugin, "jetpack", "fr_FR");
        assert!(config.accepts(EventKind::Approval, &matching));
        assert!(!config.accepts(EventKind::Approval, &other));
    }

    #[test]
    fn kind_filter_is_respected() {
        let mut config = sample_config(Channel::Global);
        config.allowed_kinds = vec![EventKind::Milestone];
        let key = ProjectKey::new(ProjectType::Core, "dev", "fr_FR");
        assert!(config.accepts(EventKind::Milestone, &key));
        assert!(!config.accepts(EventKind::Approval, &key));
    }
}
