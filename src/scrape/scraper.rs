// src/scrape/scraper.rs

//! Translation stats scraper.
//!
//! Fetches per-locale statistics for a project from the remote stats API,
//! retries once on server-side failure, honors Retry-After hints through
//! the backoff store, and normalizes the payload into a `Snapshot`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;

use crate::error::ScrapeError;
use crate::models::{ProjectKey, ScraperConfig, Snapshot};

use super::backoff::BackoffStore;
use super::segment::SegmentResolver;

/// Remote payload: a project exposes one or more translation sets and the
/// first entry carries the stats for the requested locale.
#[derive(Debug, Deserialize)]
struct ProjectStatsResponse {
    #[serde(default)]
    translation_sets: Vec<TranslationSetStats>,
}

/// The two core counters are required; a set without them is a malformed
/// payload, not a project with zero strings.
#[derive(Debug, Deserialize)]
struct TranslationSetStats {
    translated: u64,
    untranslated: u64,
    #[serde(default)]
    fuzzy: u64,
    #[serde(default)]
    waiting: u64,
}

/// Result of a single HTTP attempt, before retry classification.
enum Attempt {
    Success(Vec<u8>),
    Failure {
        error: ScrapeError,
        retry_after: Option<i64>,
        /// Status >= 500 or transport failure; eligible for the one retry.
        server_side: bool,
    },
}

/// Scraper for the remote translation stats API.
pub struct Scraper {
    client: Client,
    config: ScraperConfig,
    backoff: Arc<BackoffStore>,
    resolver: SegmentResolver,
}

impl Scraper {
    pub fn new(client: Client, config: ScraperConfig, backoff: Arc<BackoffStore>) -> Self {
        let resolver = SegmentResolver::new(client.clone(), config.base_url.clone());
        Self {
            client,
            config,
            backoff,
            resolver,
        }
    }

    /// Segment resolver, exposed for cache persistence.
    pub fn resolver(&self) -> &SegmentResolver {
        &self.resolver
    }

    /// Fetch current stats for the given project+locale.
    ///
    /// Every outcome is data: callers must treat `BackoffActive` as a skip
    /// and other errors as per-project failures, never as tick-fatal.
    pub async fn fetch(
        &self,
        key: &ProjectKey,
        now: DateTime<Utc>,
    ) -> Result<Snapshot, ScrapeError> {
        // Backoff guards come first; a blocked target issues no HTTP at all.
        if let Some(until) = self.backoff.blocked_until(key, now) {
            return Err(ScrapeError::BackoffActive { until });
        }
        if let Some(until) = self.backoff.blocked_globally_until(now) {
            return Err(ScrapeError::BackoffActive { until });
        }

        // The declared type may be wrong; fall back to it when no candidate
        // segment answers so the real request still produces a typed error.
        let resolved = match self
            .resolver
            .resolve(
                key.project_type,
                &key.slug,
                &key.locale,
                &self.config.translation_set,
            )
            .await
        {
            Ok(ty) => ty,
            Err(ScrapeError::SegmentUnresolved) => key.project_type,
            Err(other) => return Err(other),
        };

        let url = format!(
            "{}/{}/{}/{}/{}/",
            self.config.base_url,
            resolved.segment(),
            key.slug,
            key.locale,
            self.config.translation_set
        );

        let mut outcome = self.attempt(&url).await;
        if matches!(outcome, Attempt::Failure { server_side: true, .. }) {
            tokio::time::sleep(Duration::from_millis(self.config.retry_pause_ms)).await;
            outcome = self.attempt(&url).await;
        }

        match outcome {
            Attempt::Success(bytes) => parse_snapshot(&bytes, now),
            Attempt::Failure {
                error, retry_after, ..
            } => {
                self.record_failure(key, &error, retry_after, now);
                Err(error)
            }
        }
    }

    /// Apply the cooldown for a failed attempt. Rate limiting and service
    /// unavailability block all scraping; everything else blocks the key.
    fn record_failure(
        &self,
        key: &ProjectKey,
        error: &ScrapeError,
        retry_after: Option<i64>,
        now: DateTime<Utc>,
    ) {
        let cooldown = retry_after
            .map(|secs| secs.min(self.config.max_retry_after_secs))
            .unwrap_or(self.config.default_cooldown_secs);
        if is_systemic(error) {
            self.backoff.block_all(cooldown, now);
            log::warn!("scrape failed for {key}: {error} (global cooldown {cooldown}s)");
        } else {
            self.backoff.block(key, cooldown, now);
            log::warn!("scrape failed for {key}: {error} (cooldown {cooldown}s)");
        }
    }

    async fn attempt(&self, url: &str) -> Attempt {
        match self.client.get(url).send().await {
            Err(e) => Attempt::Failure {
                error: ScrapeError::Transport(e.to_string()),
                retry_after: None,
                server_side: true,
            },
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    match resp.bytes().await {
                        Ok(bytes) => Attempt::Success(bytes.to_vec()),
                        Err(e) => Attempt::Failure {
                            error: ScrapeError::Transport(e.to_string()),
                            retry_after: None,
                            server_side: true,
                        },
                    }
                } else {
                    Attempt::Failure {
                        error: ScrapeError::HttpStatus {
                            code: status.as_u16(),
                        },
                        retry_after: retry_after_secs(resp.headers()),
                        server_side: status.is_server_error(),
                    }
                }
            }
        }
    }
}

/// Parse a stats payload into a normalized snapshot.
///
/// Derived fields are recomputed locally; any percentage the remote side
/// pre-computed is ignored.
fn parse_snapshot(bytes: &[u8], fetched_at: DateTime<Utc>) -> Result<Snapshot, ScrapeError> {
    let response: ProjectStatsResponse =
        serde_json::from_slice(bytes).map_err(|e| ScrapeError::Decode(e.to_string()))?;
    let set = response
        .translation_sets
        .first()
        .ok_or(ScrapeError::NoTranslationSet)?;
    Ok(Snapshot::new(
        set.translated,
        set.untranslated,
        set.fuzzy,
        set.waiting,
        fetched_at,
    ))
}

/// Rate limiting and service-wide unavailability affect every target, so
/// their cooldown applies globally instead of per key.
fn is_systemic(error: &ScrapeError) -> bool {
    matches!(
        error,
        ScrapeError::HttpStatus { code: 429 } | ScrapeError::HttpStatus { code: 503 }
    )
}

/// Parse a Retry-After header given in seconds.
fn retry_after_secs(headers: &HeaderMap) -> Option<i64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|secs| *secs > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectType;
    use reqwest::header::HeaderValue;

    fn key() -> ProjectKey {
        ProjectKey::new(ProjectType::Plugin, "akismet", "fr_FR")
    }

    fn offline_scraper(backoff: Arc<BackoffStore>) -> Scraper {
        let config = ScraperConfig {
            base_url: "http://127.0.0.1:9/api/projects".to_string(),
            retry_pause_ms: 1,
            ..ScraperConfig::default()
        };
        Scraper::new(Client::new(), config, backoff)
    }

    #[test]
    fn parse_snapshot_recomputes_fields() {
        let body = br#"{
            "translation_sets": [
                {"translated": 85, "untranslated": 15, "fuzzy": 0, "waiting": 0,
                 "name": "French (France)", "locale": "fr", "percent_translated": 12}
            ]
        }"#;
        let snap = parse_snapshot(body, Utc::now()).unwrap();
        assert_eq!(snap.total, 100);
        // Remote percent_translated (12) is ignored.
        assert_eq!(snap.completion_pct, 85.0);
    }

    #[test]
    fn parse_snapshot_without_sets_is_typed() {
        let body = br#"{"translation_sets": []}"#;
        assert_eq!(
            parse_snapshot(body, Utc::now()),
            Err(ScrapeError::NoTranslationSet)
        );
    }

    #[test]
    fn parse_snapshot_rejects_malformed_json() {
        let result = parse_snapshot(b"not json", Utc::now());
        assert!(matches!(result, Err(ScrapeError::Decode(_))));
    }

    #[test]
    fn parse_snapshot_rejects_set_without_counters() {
        // A set object missing the core counters must not decode as an
        // all-zero snapshot; that would look like a completion drop.
        let body = br#"{"translation_sets": [{"name": "French (France)", "locale": "fr"}]}"#;
        let result = parse_snapshot(body, Utc::now());
        assert!(matches!(result, Err(ScrapeError::Decode(_))));
    }

    #[test]
    fn rate_limit_and_unavailable_are_systemic() {
        assert!(is_systemic(&ScrapeError::HttpStatus { code: 429 }));
        assert!(is_systemic(&ScrapeError::HttpStatus { code: 503 }));
        assert!(!is_systemic(&ScrapeError::HttpStatus { code: 500 }));
        assert!(!is_systemic(&ScrapeError::Transport("refused".to_string())));
    }

    #[test]
    fn rate_limit_failure_blocks_all_scraping() {
        let backoff = Arc::new(BackoffStore::new());
        let scraper = offline_scraper(Arc::clone(&backoff));
        let now = Utc::now();

        scraper.record_failure(
            &key(),
            &ScrapeError::HttpStatus { code: 429 },
            Some(120),
            now,
        );
        assert!(backoff.blocked_globally_until(now).is_some());

        let other = ProjectKey::new(ProjectType::Core, "dev", "de_DE");
        let backoff = Arc::new(BackoffStore::new());
        let scraper = offline_scraper(Arc::clone(&backoff));
        scraper.record_failure(&other, &ScrapeError::HttpStatus { code: 500 }, None, now);
        assert!(backoff.blocked_globally_until(now).is_none());
        assert!(backoff.is_blocked(&other, now));
    }

    #[test]
    fn retry_after_parses_positive_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("120"));
        assert_eq!(retry_after_secs(&headers), Some(120));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("0"));
        assert_eq!(retry_after_secs(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(retry_after_secs(&headers), None);
    }

    #[tokio::test]
    async fn blocked_key_skips_without_http() {
        let backoff = Arc::new(BackoffStore::new());
        let scraper = offline_scraper(Arc::clone(&backoff));
        let now = Utc::now();
        backoff.block(&key(), 300, now);

        // The base URL is unroutable, so reaching the network would surface
        // Transport, not BackoffActive.
        let result = scraper.fetch(&key(), now).await;
        assert!(matches!(result, Err(ScrapeError::BackoffActive { .. })));
    }

    #[tokio::test]
    async fn global_cooldown_blocks_every_key() {
        let backoff = Arc::new(BackoffStore::new());
        let scraper = offline_scraper(Arc::clone(&backoff));
        let now = Utc::now();
        backoff.block_all(300, now);

        let result = scraper.fetch(&key(), now).await;
        assert!(matches!(result, Err(ScrapeError::BackoffActive { .. })));
    }

    #[tokio::test]
    async fn transport_failure_sets_cooldown() {
        let backoff = Arc::new(BackoffStore::new());
        let scraper = offline_scraper(Arc::clone(&backoff));
        let now = Utc::now();

        let result = scraper.fetch(&key(), now).await;
        assert!(matches!(result, Err(ScrapeError::Transport(_))));
        assert!(backoff.is_blocked(&key(), now));
    }
}
