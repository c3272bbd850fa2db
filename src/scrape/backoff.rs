// src/scrape/backoff.rs

//! Cooldown tracking for failing scrape targets.
//!
//! After a failed call the target gets a cooldown deadline; the scraper
//! consults the store before every attempt. A separate global deadline
//! covers systemic outages and blocks all scraping regardless of key.
//! Entries expire by comparison against `now`; no explicit cleanup needed.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ProjectKey;

/// Minimum cooldown applied regardless of what the caller asked for, seconds.
const MIN_COOLDOWN_SECS: i64 = 60;

/// A persisted cooldown deadline for one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffEntry {
    pub key: ProjectKey,
    pub cooldown_until: DateTime<Utc>,
}

/// Thread-safe store of cooldown deadlines.
///
/// Locks are held only for the map mutation itself, never across I/O.
#[derive(Debug, Default)]
pub struct BackoffStore {
    entries: Mutex<HashMap<ProjectKey, DateTime<Utc>>>,
    global_until: Mutex<Option<DateTime<Utc>>>,
}

impl BackoffStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the given target is currently cooling down.
    pub fn is_blocked(&self, key: &ProjectKey, now: DateTime<Utc>) -> bool {
        self.blocked_until(key, now).is_some()
    }

    /// Cooldown deadline for the target, if one is still in the future.
    pub fn blocked_until(&self, key: &ProjectKey, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let entries = self.entries.lock().expect("backoff lock poisoned");
        entries.get(key).copied().filter(|until| now < *until)
    }

    /// Block a single target for `max(60, duration_secs)` seconds.
    pub fn block(&self, key: &ProjectKey, duration_secs: i64, now: DateTime<Utc>) {
        let until = now + Duration::seconds(duration_secs.max(MIN_COOLDOWN_SECS));
        let mut entries = self.entries.lock().expect("backoff lock poisoned");
        entries.insert(key.clone(), until);
    }

    /// Global cooldown deadline, if one is still in the future.
    pub fn blocked_globally_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let global = self.global_until.lock().expect("backoff lock poisoned");
        global.filter(|until| now < *until)
    }

    /// Block all scraping for `max(60, duration_secs)` seconds.
    pub fn block_all(&self, duration_secs: i64, now: DateTime<Utc>) {
        let until = now + Duration::seconds(duration_secs.max(MIN_COOLDOWN_SECS));
        let mut global = self.global_until.lock().expect("backoff lock poisoned");
        *global = Some(until);
    }

    /// Export still-active entries for persistence.
    pub fn to_entries(&self, now: DateTime<Utc>) -> Vec<BackoffEntry> {
        let entries = self.entries.lock().expect("backoff lock poisoned");
        entries
            .iter()
            .filter(|(_, until)| now < **until)
            .map(|(key, until)| BackoffEntry {
                key: key.clone(),
                cooldown_until: *until,
            })
            .collect()
    }

    /// Restore entries from persistence.
    pub fn hydrate(&self, stored: Vec<BackoffEntry>) {
        let mut entries = self.entries.lock().expect("backoff lock poisoned");
        for entry in stored {
            entries.insert(entry.key, entry.cooldown_until);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectType;

    fn key() -> ProjectKey {
        ProjectKey::new(ProjectType::Plugin, "akismet", "fr_FR")
    }

    #[test]
    fn block_respects_simulated_clock() {
        let store = BackoffStore::new();
        let t0 = Utc::now();
        store.block(&key(), 300, t0);

        assert!(store.is_blocked(&key(), t0 + Duration::seconds(299)));
        assert!(!store.is_blocked(&key(), t0 + Duration::seconds(301)));
    }

    #[test]
    fn short_durations_are_raised_to_the_minimum() {
        let store = BackoffStore::new();
        let t0 = Utc::now();
        store.block(&key(), 5, t0);

        assert!(store.is_blocked(&key(), t0 + Duration::seconds(59)));
        assert!(!store.is_blocked(&key(), t0 + Duration::seconds(61)));
    }

    #[test]
    fn unknown_key_is_never_blocked() {
        let store = BackoffStore::new();
        assert!(!store.is_blocked(&key(), Utc::now()));
    }

    #[test]
    fn global_cooldown_is_independent_of_keys() {
        let store = BackoffStore::new();
        let t0 = Utc::now();
        store.block_all(120, t0);

        assert!(store.blocked_globally_until(t0 + Duration::seconds(119)).is_some());
        assert!(store.blocked_globally_until(t0 + Duration::seconds(121)).is_none());
        assert!(!store.is_blocked(&key(), t0));
    }

    #[test]
    fn persistence_round_trip_keeps_active_entries_only() {
        let store = BackoffStore::new();
        let t0 = Utc::now();
        store.block(&key(), 300, t0);
        let expired = ProjectKey::new(ProjectType::Core, "dev", "de_DE");
        store.block(&expired, 60, t0 - Duration::seconds(600));

        let entries = store.to_entries(t0);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, key());

        let restored = BackoffStore::new();
        restored.hydrate(entries);
        assert!(restored.is_blocked(&key(), t0));
    }
}
