// src/storage/mod.rs

//! Persistence abstractions for watcher state.
//!
//! The core treats durable state as a generic key-value store: the watched
//! project set, per-channel digest queues, backoff entries, the segment
//! cache and last-run reports all round-trip through JSON values under
//! well-known keys.

pub mod local;
pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;

// Re-export for convenience
pub use local::LocalStore;
pub use memory::MemoryStore;

/// Well-known storage keys.
pub mod keys {
    /// Watched project entries (`Vec<WatchedProject>`)
    pub const WATCHED_PROJECTS: &str = "watched_projects.json";
    /// Per-channel digest queues (`HashMap<String, Vec<DigestQueueItem>>`)
    pub const DIGEST_QUEUES: &str = "digest_queues.json";
    /// Per-channel last digest flush times (`HashMap<String, DateTime<Utc>>`)
    pub const DIGEST_FLUSHES: &str = "digest_flushes.json";
    /// Active backoff entries (`Vec<BackoffEntry>`)
    pub const BACKOFF: &str = "backoff.json";
    /// Segment cache entries (`Vec<SegmentCacheEntry>`)
    pub const SEGMENT_CACHE: &str = "segment_cache.json";
    /// Last scrape tick report (`TickReport`)
    pub const LAST_RUN: &str = "last_run.json";
}

/// Trait for key-value storage backends.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read raw bytes for a key, `None` if absent.
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write raw bytes for a key, replacing any previous value.
    async fn set_raw(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Read and deserialize a JSON value from a store.
pub async fn get_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match store.get_raw(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Serialize and write a JSON value to a store.
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    store.set_raw(key, &bytes).await
}
