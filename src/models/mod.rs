// src/models/mod.rs

//! Domain models for the watcher application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod event;
mod project;
mod webhook;

// Re-export all public types
pub use config::{Config, PolicyConfig, ScraperConfig, SurveillanceConfig};
pub use event::{ChangeEvent, DiffPolicy, EventKind};
pub use project::{ProjectKey, ProjectType, Snapshot, WatchedProject};
pub use webhook::{Channel, DeliveryMode, DigestPolicy, DigestQueueItem, WebhookConfig};
