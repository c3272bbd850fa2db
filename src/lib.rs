// src/lib.rs

//! glotwatch library
//!
//! Tracks the translation completion state of WordPress.org projects
//! (core, plugins, themes, meta, apps) per locale, detects meaningful
//! changes between checks, and routes notifications to webhook channels.

pub mod error;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod scrape;
pub mod storage;
pub mod utils;
