// src/pipeline/tick.rs

//! Tick entry points: the scrape/dispatch cycle and the digest flush cycle.
//!
//! The scheduler collaborator calls `run_scrape_tick` and `run_digest_tick`
//! on its cadence; everything in between (fetch, diff, dispatch, commit,
//! persist) happens here. Per-project failures are recorded and the tick
//! moves on; only the operator abort signal halts a batch early, and work
//! already completed stays committed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrapeError, WatchDenied};
use crate::models::{ChangeEvent, Config, ProjectKey, ProjectType, Snapshot, WatchedProject};
use crate::notify::{Notifier, render_event};
use crate::scrape::{BackoffStore, Scraper};
use crate::storage::{KvStore, get_json, keys, set_json};
use crate::utils::http;

use super::diff::diff_snapshots;
use super::digest::{DigestQueues, DigestScheduler};
use super::registry::WatchRegistry;
use super::router::NotificationRouter;

/// Observability record for one scrape tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub selected: usize,
    pub succeeded: usize,
    pub skipped_backoff: usize,
    pub failed: usize,
    pub aborted: bool,
}

impl TickReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            duration_ms: 0,
            selected: 0,
            succeeded: 0,
            skipped_backoff: 0,
            failed: 0,
            aborted: false,
        }
    }
}

/// The assembled watcher: scraper, registry, router and digest scheduler
/// wired to one key-value store and one notifier.
pub struct Engine {
    config: Arc<Config>,
    scraper: Scraper,
    backoff: Arc<BackoffStore>,
    registry: Mutex<WatchRegistry>,
    router: NotificationRouter,
    scheduler: DigestScheduler,
    queues: Arc<DigestQueues>,
    store: Arc<dyn KvStore>,
    notifier: Arc<dyn Notifier>,
    abort: Arc<AtomicBool>,
    rng: Mutex<StdRng>,
}

impl Engine {
    /// Assemble an engine, hydrating all state from the store.
    pub async fn load(
        config: Arc<Config>,
        store: Arc<dyn KvStore>,
        notifier: Arc<dyn Notifier>,
        rng: StdRng,
    ) -> Result<Self> {
        let client = http::create_async_client(&config.scraper)?;

        let backoff = Arc::new(BackoffStore::new());
        if let Some(entries) = get_json(store.as_ref(), keys::BACKOFF).await? {
            backoff.hydrate(entries);
        }

        let scraper = Scraper::new(client, config.scraper.clone(), Arc::clone(&backoff));
        if let Some(entries) = get_json(store.as_ref(), keys::SEGMENT_CACHE).await? {
            scraper.resolver().hydrate(entries);
        }

        let watched: Vec<WatchedProject> = get_json(store.as_ref(), keys::WATCHED_PROJECTS)
            .await?
            .unwrap_or_default();
        let registry = WatchRegistry::from_entries(config.surveillance.interval_minutes, watched);

        let queues = Arc::new(DigestQueues::new());
        if let Some(stored) = get_json(store.as_ref(), keys::DIGEST_QUEUES).await? {
            queues.hydrate(stored);
        }

        let router = NotificationRouter::new(Arc::clone(&notifier), Arc::clone(&queues));
        let scheduler = DigestScheduler::new(Arc::clone(&queues), Arc::clone(&notifier));
        if let Some(stored) = get_json(store.as_ref(), keys::DIGEST_FLUSHES).await? {
            scheduler.hydrate(stored);
        }

        Ok(Self {
            config,
            scraper,
            backoff,
            registry: Mutex::new(registry),
            router,
            scheduler,
            queues,
            store,
            notifier,
            abort: Arc::new(AtomicBool::new(false)),
            rng: Mutex::new(rng),
        })
    }

    /// Signal checked between projects; setting it stops the current batch
    /// within one item's processing time.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Run one scrape/dispatch cycle over the due projects.
    pub async fn run_scrape_tick(&self, force: bool, now: DateTime<Utc>) -> Result<TickReport> {
        let started = std::time::Instant::now();
        let mut report = TickReport::new(now);

        if !self.config.surveillance.enabled && !force {
            log::info!("surveillance disabled, skipping scrape tick");
            return Ok(report);
        }

        let due = {
            let registry = self.registry.lock().expect("registry lock poisoned");
            let mut rng = self.rng.lock().expect("rng lock poisoned");
            registry.select_due(
                now,
                self.config.surveillance.max_projects_per_check,
                &mut *rng,
            )
        };
        report.selected = due.len();
        log::info!("scrape tick: {} project(s) due", due.len());

        let concurrency = self.config.surveillance.max_concurrent.max(1);
        let scraper = &self.scraper;
        let mut results = stream::iter(due)
            .map(|key| async move {
                let result = scraper.fetch(&key, now).await;
                (key, result)
            })
            .buffer_unordered(concurrency);

        while let Some((key, result)) = results.next().await {
            if self.abort.load(Ordering::Relaxed) {
                // In-flight fetches are dropped with the stream; completed
                // commits stay.
                log::warn!("abort signal received, halting batch");
                report.aborted = true;
                break;
            }
            match result {
                Ok(snapshot) => {
                    self.process_snapshot(&key, snapshot, now).await;
                    report.succeeded += 1;
                }
                Err(ScrapeError::BackoffActive { until }) => {
                    log::debug!("{key} in backoff until {until}, skipped");
                    report.skipped_backoff += 1;
                }
                Err(error) => {
                    log::warn!("check failed for {key}: {error}");
                    report.failed += 1;
                }
            }
        }
        drop(results);

        report.duration_ms = started.elapsed().as_millis() as u64;
        self.persist(now).await?;
        set_json(self.store.as_ref(), keys::LAST_RUN, &report).await?;
        log::info!(
            "scrape tick done: {} ok, {} in backoff, {} failed in {}ms",
            report.succeeded,
            report.skipped_backoff,
            report.failed,
            report.duration_ms
        );
        Ok(report)
    }

    /// Diff one fresh snapshot, dispatch its events and commit it.
    async fn process_snapshot(&self, key: &ProjectKey, snapshot: Snapshot, now: DateTime<Utc>) {
        let prev = {
            let registry = self.registry.lock().expect("registry lock poisoned");
            registry.get(key).and_then(|p| p.last_snapshot.clone())
        };
        let policy = self.config.policy_for(&key.locale);
        let events = diff_snapshots(prev.as_ref(), &snapshot, &policy);
        if !events.is_empty() {
            log::info!("{key}: {} change event(s)", events.len());
        }
        for event in &events {
            self.router
                .dispatch(event, key, &self.config.webhooks, now)
                .await;
        }

        let mut registry = self.registry.lock().expect("registry lock poisoned");
        let mut rng = self.rng.lock().expect("rng lock poisoned");
        registry.commit(key, snapshot, now, &mut *rng);
    }

    /// Flush every digest channel whose window has elapsed.
    pub async fn run_digest_tick(&self, now: DateTime<Utc>) -> Result<usize> {
        let flushed = self.scheduler.tick(now, &self.config.webhooks).await;
        if flushed > 0 {
            log::info!("digest tick: flushed {flushed} channel(s)");
        }
        set_json(self.store.as_ref(), keys::DIGEST_QUEUES, &self.queues.to_entries()).await?;
        set_json(
            self.store.as_ref(),
            keys::DIGEST_FLUSHES,
            &self.scheduler.to_entries(),
        )
        .await?;
        Ok(flushed)
    }

    /// Admit a project after a successful trial scrape and a delivered
    /// confirmation message.
    pub async fn watch(
        &self,
        project_type: ProjectType,
        slug: &str,
        locale: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<Snapshot, WatchDenied> {
        let key = ProjectKey::new(project_type, slug, locale);
        {
            let registry = self.registry.lock().expect("registry lock poisoned");
            if let Some(existing) = registry.get(&key) {
                if let Some(snapshot) = existing.last_snapshot.clone() {
                    // Re-watching must not reset the schedule or history.
                    log::info!("{key} is already watched");
                    return Ok(snapshot);
                }
            }
        }
        let snapshot = match self.scraper.fetch(&key, now).await {
            Ok(snapshot) => snapshot,
            Err(ScrapeError::NoTranslationSet) => return Err(WatchDenied::NoProjects),
            Err(error) => {
                log::warn!("trial scrape for {key} failed: {error}");
                return Err(WatchDenied::ApiError);
            }
        };

        let Some(webhook) = self
            .config
            .webhooks
            .iter()
            .find(|w| w.enabled && w.channel.covers_locale(locale))
        else {
            return Err(WatchDenied::SlackNotReady);
        };

        let confirmation = render_event(
            &ChangeEvent::NewProject {
                snapshot: snapshot.clone(),
            },
            &key,
        );
        if !self
            .notifier
            .send_override(&confirmation.text, &webhook.url, &confirmation.formatted)
            .await
        {
            return Err(WatchDenied::SlackSendError);
        }

        {
            let mut registry = self.registry.lock().expect("registry lock poisoned");
            let mut rng = self.rng.lock().expect("rng lock poisoned");
            let mut project = WatchedProject::new(key.clone(), now);
            // A never-checked entry may already exist; keep its added_at.
            project.added_at = registry.get(&key).map_or(now, |p| p.added_at);
            project.last_snapshot = Some(snapshot.clone());
            project.last_checked_at = Some(now);
            registry.admit(project);
            // Schedule the first periodic check like any other commit.
            registry.commit(&key, snapshot.clone(), now, &mut *rng);
        }
        if let Err(error) = self.persist(now).await {
            log::error!("failed to persist registry after watch: {error}");
        }
        log::info!("now watching {key}");
        Ok(snapshot)
    }

    /// Stop watching a project. Returns whether it was present.
    pub async fn unwatch(&self, key: &ProjectKey, now: DateTime<Utc>) -> Result<bool> {
        let removed = {
            let mut registry = self.registry.lock().expect("registry lock poisoned");
            registry.remove(key)
        };
        self.persist(now).await?;
        if removed {
            log::info!("stopped watching {key}");
        }
        Ok(removed)
    }

    /// Current watched projects, sorted by key.
    pub fn watched(&self) -> Vec<WatchedProject> {
        let registry = self.registry.lock().expect("registry lock poisoned");
        registry.entries()
    }

    /// Last persisted tick report, if any.
    pub async fn last_run(&self) -> Result<Option<TickReport>> {
        get_json(self.store.as_ref(), keys::LAST_RUN).await
    }

    /// Write all mutable state through the key-value store.
    async fn persist(&self, now: DateTime<Utc>) -> Result<()> {
        let watched = {
            let registry = self.registry.lock().expect("registry lock poisoned");
            registry.entries()
        };
        set_json(self.store.as_ref(), keys::WATCHED_PROJECTS, &watched).await?;
        set_json(self.store.as_ref(), keys::DIGEST_QUEUES, &self.queues.to_entries()).await?;
        set_json(
            self.store.as_ref(),
            keys::DIGEST_FLUSHES,
            &self.scheduler.to_entries(),
        )
        .await?;
        set_json(self.store.as_ref(), keys::BACKOFF, &self.backoff.to_entries(now)).await?;
        set_json(
            self.store.as_ref(),
            keys::SEGMENT_CACHE,
            &self.scraper.resolver().to_entries(),
        )
        .await?;
        Ok(())
    }
}
