// src/models/project.rs

//! Project identity and translation snapshot structures.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of project types known to the translation API.
///
/// Each type maps to exactly one API path segment; unknown types are
/// unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Core,
    Plugin,
    Theme,
    Meta,
    App,
}

impl ProjectType {
    /// All known project types, in probe order.
    pub const ALL: [ProjectType; 5] = [
        ProjectType::Core,
        ProjectType::Plugin,
        ProjectType::Theme,
        ProjectType::Meta,
        ProjectType::App,
    ];

    /// API path segment for this project type.
    pub fn segment(&self) -> &'static str {
        match self {
            ProjectType::Core => "wp",
            ProjectType::Plugin => "wp-plugins",
            ProjectType::Theme => "wp-themes",
            ProjectType::Meta => "meta",
            ProjectType::App => "apps",
        }
    }

    /// Human-readable label for notifications and listings.
    pub fn label(&self) -> &'static str {
        match self {
            ProjectType::Core => "WordPress core",
            ProjectType::Plugin => "Plugin",
            ProjectType::Theme => "Theme",
            ProjectType::Meta => "Meta",
            ProjectType::App => "App",
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Core => "core",
            ProjectType::Plugin => "plugin",
            ProjectType::Theme => "theme",
            ProjectType::Meta => "meta",
            ProjectType::App => "app",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "core" => Ok(ProjectType::Core),
            "plugin" => Ok(ProjectType::Plugin),
            "theme" => Ok(ProjectType::Theme),
            "meta" => Ok(ProjectType::Meta),
            "app" => Ok(ProjectType::App),
            other => Err(format!(
                "unknown project type '{other}' (expected core, plugin, theme, meta or app)"
            )),
        }
    }
}

/// Identity of a watched unit: project type + slug + locale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectKey {
    pub project_type: ProjectType,
    pub slug: String,
    pub locale: String,
}

impl ProjectKey {
    pub fn new(
        project_type: ProjectType,
        slug: impl Into<String>,
        locale: impl Into<String>,
    ) -> Self {
        Self {
            project_type,
            slug: slug.into(),
            locale: locale.into(),
        }
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project_type, self.slug, self.locale)
    }
}

/// Normalized translation statistics at one point in time.
///
/// All derived fields are recomputed locally; nothing pre-computed by the
/// remote source is trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub translated: u64,
    pub untranslated: u64,
    pub fuzzy: u64,
    pub waiting: u64,
    /// Always `translated + untranslated + fuzzy + waiting`.
    pub total: u64,
    /// Percentage translated, rounded half-up to two decimals. 0 when total is 0.
    pub completion_pct: f64,
    /// Strings a translation team should look at: waiting + fuzzy.
    pub needs_attention: u64,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    /// Build a snapshot from raw counters, recomputing every derived field.
    pub fn new(
        translated: u64,
        untranslated: u64,
        fuzzy: u64,
        waiting: u64,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let total = translated + untranslated + fuzzy + waiting;
        let completion_pct = if total == 0 {
            0.0
        } else {
            ((translated as f64 / total as f64) * 100.0 * 100.0).round() / 100.0
        };
        Self {
            translated,
            untranslated,
            fuzzy,
            waiting,
            total,
            completion_pct,
            needs_attention: waiting + fuzzy,
            fetched_at,
        }
    }
}

/// A project under surveillance, with its check schedule and last snapshot.
///
/// Owned exclusively by the watch registry and mutated only after a
/// completed scrape + dispatch cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedProject {
    pub key: ProjectKey,
    pub added_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub next_check_at: DateTime<Utc>,
    pub last_snapshot: Option<Snapshot>,
    pub project_type_label: String,
}

impl WatchedProject {
    /// Create a fresh entry that is immediately due for its first check.
    pub fn new(key: ProjectKey, now: DateTime<Utc>) -> Self {
        let project_type_label = key.project_type.label().to_string();
        Self {
            key,
            added_at: now,
            last_checked_at: None,
            next_check_at: now,
            last_snapshot: None,
            project_type_label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_mapping_is_exhaustive() {
        assert_eq!(ProjectType::Core.segment(), "wp");
        assert_eq!(ProjectType::Plugin.segment(), "wp-plugins");
        assert_eq!(ProjectType::Theme.segment(), "wp-themes");
        assert_eq!(ProjectType::Meta.segment(), "meta");
        assert_eq!(ProjectType::App.segment(), "apps");
    }

    #[test]
    fn project_type_round_trips_through_str() {
        for ty in ProjectType::ALL {
            assert_eq!(ty.to_string().parse::<ProjectType>().unwrap(), ty);
        }
        assert!("widget".parse::<ProjectType>().is_err());
    }

    #[test]
    fn snapshot_recomputes_derived_fields() {
        let s = Snapshot::new(40, 60, 0, 0, Utc::now());
        assert_eq!(s.total, 100);
        assert_eq!(s.completion_pct, 40.0);
        assert_eq!(s.needs_attention, 0);

        let s = Snapshot::new(1, 1, 2, 3, Utc::now());
        assert_eq!(s.total, 7);
        assert_eq!(s.needs_attention, 5);
        // 1/7 = 14.2857... -> 14.29 after half-up rounding
        assert_eq!(s.completion_pct, 14.29);
    }

    #[test]
    fn empty_snapshot_is_zero_percent_not_an_error() {
        let s = Snapshot::new(0, 0, 0, 0, Utc::now());
        assert_eq!(s.total, 0);
        assert_eq!(s.completion_pct, 0.0);
    }

    #[test]
    fn key_display_is_stable() {
        let key = ProjectKey::new(ProjectType::Plugin, "akismet", "fr_FR");
        assert_eq!(key.to_string(), "plugin/akismet/fr_FR");
    }
}
