// src/scrape/mod.rs

//! Scrape/snapshot engine.
//!
//! - `backoff`: per-target and global cooldowns after failed calls
//! - `segment`: resolves the API path segment for ambiguous project types
//! - `scraper`: fetches and normalizes translation statistics

pub mod backoff;
pub mod scraper;
pub mod segment;

pub use backoff::BackoffStore;
pub use scraper::Scraper;
pub use segment::{SegmentCacheEntry, SegmentResolver};
