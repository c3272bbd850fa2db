// src/pipeline/registry.rs

//! Registry of watched projects and their check schedules.
//!
//! Selection shuffles the due set with an injected RNG so no project is
//! systematically starved, and commits add jitter so future checks spread
//! out instead of stampeding the remote API together.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::models::{ProjectKey, Snapshot, WatchedProject};

/// Minimum seconds between checks of the same project.
const MIN_CHECK_INTERVAL_SECS: i64 = 60;

/// Maximum jitter added to a rescheduled check, seconds.
const JITTER_MAX_SECS: i64 = 300;

/// In-memory registry of watched projects.
///
/// Owns every `WatchedProject`; entries are mutated only through `commit`
/// after a completed scrape + dispatch cycle. Durable storage happens at
/// the engine level through the key-value store.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    projects: HashMap<ProjectKey, WatchedProject>,
    interval_minutes: i64,
}

impl WatchRegistry {
    pub fn new(interval_minutes: i64) -> Self {
        Self {
            projects: HashMap::new(),
            interval_minutes,
        }
    }

    /// Rebuild a registry from persisted entries.
    pub fn from_entries(interval_minutes: i64, entries: Vec<WatchedProject>) -> Self {
        let projects = entries.into_iter().map(|p| (p.key.clone(), p)).collect();
        Self {
            projects,
            interval_minutes,
        }
    }

    /// Export entries for persistence, ordered by key for stable output.
    pub fn entries(&self) -> Vec<WatchedProject> {
        let mut entries: Vec<WatchedProject> = self.projects.values().cloned().collect();
        entries.sort_by_key(|p| p.key.to_string());
        entries
    }

    /// Projects whose check is due, shuffled and truncated to `capacity`.
    pub fn select_due<R: Rng>(
        &self,
        now: DateTime<Utc>,
        capacity: usize,
        rng: &mut R,
    ) -> Vec<ProjectKey> {
        let mut due: Vec<ProjectKey> = self
            .projects
            .values()
            .filter(|p| p.next_check_at <= now)
            .map(|p| p.key.clone())
            .collect();
        due.shuffle(rng);
        due.truncate(capacity);
        due
    }

    /// Store the snapshot from a completed check and reschedule the project.
    pub fn commit<R: Rng>(
        &mut self,
        key: &ProjectKey,
        snapshot: Snapshot,
        checked_at: DateTime<Utc>,
        rng: &mut R,
    ) {
        let Some(project) = self.projects.get_mut(key) else {
            // Unwatched mid-tick; drop the result rather than resurrect it.
            log::debug!("commit for unknown project {key}, ignoring");
            return;
        };
        let interval_secs = (self.interval_minutes * 60).max(MIN_CHECK_INTERVAL_SECS);
        let jitter = rng.gen_range(0..=JITTER_MAX_SECS);
        project.last_snapshot = Some(snapshot);
        project.last_checked_at = Some(checked_at);
        project.next_check_at = checked_at + Duration::seconds(interval_secs + jitter);
    }

    /// Admit a project. The caller has already run the trial scrape.
    pub fn admit(&mut self, project: WatchedProject) {
        self.projects.insert(project.key.clone(), project);
    }

    /// Remove a project. Removing an absent key is not an error.
    pub fn remove(&mut self, key: &ProjectKey) -> bool {
        self.projects.remove(key).is_some()
    }

    pub fn get(&self, key: &ProjectKey) -> Option<&WatchedProject> {
        self.projects.get(key)
    }

    pub fn contains(&self, key: &ProjectKey) -> bool {
        self.projects.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectType;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    fn key(slug: &str) -> ProjectKey {
        ProjectKey::new(ProjectType::Plugin, slug, "fr_FR")
    }

    fn registry_with(slugs: &[&str], now: DateTime<Utc>) -> WatchRegistry {
        let mut registry = WatchRegistry::new(15);
        for slug in slugs {
            registry.admit(WatchedProject::new(key(slug), now));
        }
        registry
    }

    #[test]
    fn select_due_respects_capacity() {
        let now = Utc::now();
        let registry = registry_with(&["a", "b", "c", "d", "e"], now);
        let mut rng = StdRng::seed_from_u64(7);

        let due = registry.select_due(now, 2, &mut rng);
        assert_eq!(due.len(), 2);
    }

    #[test]
    fn select_due_skips_not_yet_due_projects() {
        let now = Utc::now();
        let mut registry = registry_with(&["a", "b"], now);
        let mut rng = StdRng::seed_from_u64(7);

        // Commit "a" so its next check lands in the future.
        registry.commit(&key("a"), Snapshot::new(1, 1, 0, 0, now), now, &mut rng);

        let due = registry.select_due(now, 10, &mut rng);
        assert_eq!(due, vec![key("b")]);
    }

    #[test]
    fn selection_is_roughly_uniform_over_trials() {
        let now = Utc::now();
        let registry = registry_with(&["a", "b", "c", "d", "e"], now);
        let mut rng = StdRng::seed_from_u64(42);

        let mut picks: HashMap<ProjectKey, usize> = HashMap::new();
        for _ in 0..500 {
            for picked in registry.select_due(now, 2, &mut rng) {
                *picks.entry(picked).or_default() += 1;
            }
        }

        // 1000 total picks across 5 projects; nobody starves and nobody
        // dominates.
        assert_eq!(picks.len(), 5);
        for count in picks.values() {
            assert!(*count > 100, "starved project: {count} picks");
            assert!(*count < 300, "dominating project: {count} picks");
        }
    }

    #[test]
    fn commit_reschedules_with_bounded_jitter() {
        let now = Utc::now();
        let mut registry = registry_with(&["a"], now);
        let mut rng = StdRng::seed_from_u64(1);
        let snapshot = Snapshot::new(10, 10, 0, 0, now);

        registry.commit(&key("a"), snapshot.clone(), now, &mut rng);

        let project = registry.get(&key("a")).unwrap();
        assert_eq!(project.last_checked_at, Some(now));
        assert_eq!(project.last_snapshot, Some(snapshot));

        let delay = (project.next_check_at - now).num_seconds();
        assert!((900..=1200).contains(&delay), "delay was {delay}");
    }

    #[test]
    fn commit_for_removed_project_is_a_no_op() {
        let now = Utc::now();
        let mut registry = registry_with(&["a"], now);
        let mut rng = StdRng::seed_from_u64(1);

        registry.remove(&key("a"));
        registry.commit(&key("a"), Snapshot::new(1, 0, 0, 0, now), now, &mut rng);
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let now = Utc::now();
        let mut registry = registry_with(&["a"], now);
        assert!(registry.remove(&key("a")));
        assert!(!registry.remove(&key("a")));
    }

    #[test]
    fn entries_round_trip() {
        let now = Utc::now();
        let registry = registry_with(&["b", "a"], now);
        let entries = registry.entries();
        assert_eq!(entries.len(), 2);

        let restored = WatchRegistry::from_entries(15, entries);
        assert!(restored.contains(&key("a")));
        assert!(restored.contains(&key("b")));
    }
}
