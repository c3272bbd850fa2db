// src/scrape/segment.rs

//! API segment resolution for ambiguous project types.
//!
//! The stats API nests projects under per-type path segments (`wp`,
//! `wp-plugins`, ...). A watched project may have been registered with the
//! wrong type, so on a cache miss every known type is probed in order and
//! the first one that answers is memoized for the process lifetime.

use std::collections::HashMap;
use std::sync::Mutex;

use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::ScrapeError;
use crate::models::ProjectType;

/// A persisted resolution: (declared type, slug) -> type that answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentCacheEntry {
    pub project_type: ProjectType,
    pub slug: String,
    pub resolved: ProjectType,
}

/// Resolves and memoizes the correct API segment for a (type, slug) pair.
pub struct SegmentResolver {
    client: Client,
    base_url: String,
    cache: Mutex<HashMap<(ProjectType, String), ProjectType>>,
}

impl SegmentResolver {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the project type whose segment actually serves this slug.
    ///
    /// Cache hit returns immediately. On a miss the declared type is probed
    /// first, then every other known type; the first success is cached.
    /// Failures leave the cache untouched so the next call re-probes.
    pub async fn resolve(
        &self,
        project_type: ProjectType,
        slug: &str,
        locale: &str,
        set: &str,
    ) -> Result<ProjectType, ScrapeError> {
        if let Some(resolved) = self.cached(project_type, slug) {
            return Ok(resolved);
        }

        let mut candidates = vec![project_type];
        for ty in ProjectType::ALL {
            if ty != project_type {
                candidates.push(ty);
            }
        }

        for candidate in candidates {
            let url = format!(
                "{}/{}/{}/{}/{}/",
                self.base_url,
                candidate.segment(),
                slug,
                locale,
                set
            );
            if self.probe(&url).await {
                let mut cache = self.cache.lock().expect("segment cache lock poisoned");
                cache.insert((project_type, slug.to_string()), candidate);
                return Ok(candidate);
            }
        }

        Err(ScrapeError::SegmentUnresolved)
    }

    /// Lightweight existence probe: HEAD, falling back to GET when the
    /// method is rejected. Transport errors count as a non-match.
    async fn probe(&self, url: &str) -> bool {
        let head = self.client.request(Method::HEAD, url).send().await;
        match head {
            Ok(resp) if resp.status() == StatusCode::METHOD_NOT_ALLOWED => {
                match self.client.get(url).send().await {
                    Ok(resp) => resp.status().is_success(),
                    Err(_) => false,
                }
            }
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn cached(&self, project_type: ProjectType, slug: &str) -> Option<ProjectType> {
        let cache = self.cache.lock().expect("segment cache lock poisoned");
        cache.get(&(project_type, slug.to_string())).copied()
    }

    /// Export cached resolutions for persistence.
    pub fn to_entries(&self) -> Vec<SegmentCacheEntry> {
        let cache = self.cache.lock().expect("segment cache lock poisoned");
        cache
            .iter()
            .map(|((ty, slug), resolved)| SegmentCacheEntry {
                project_type: *ty,
                slug: slug.clone(),
                resolved: *resolved,
            })
            .collect()
    }

    /// Restore cached resolutions from persistence.
    pub fn hydrate(&self, entries: Vec<SegmentCacheEntry>) {
        let mut cache = self.cache.lock().expect("segment cache lock poisoned");
        for entry in entries {
            cache.insert((entry.project_type, entry.slug), entry.resolved);
        }
    }
}
