// src/pipeline/mod.rs

//! Pipeline stages for watcher operations.
//!
//! - `diff`: pure change detection between two snapshots
//! - `registry`: the set of watched projects and their schedules
//! - `router`: webhook filter evaluation and delivery/enqueue decisions
//! - `digest`: time-boxed digest queues and their flush scheduler
//! - `tick`: the scrape and digest tick entry points

pub mod diff;
pub mod digest;
pub mod registry;
pub mod router;
pub mod tick;

pub use diff::diff_snapshots;
pub use digest::{DigestQueues, DigestScheduler};
pub use registry::WatchRegistry;
pub use router::NotificationRouter;
pub use tick::{Engine, TickReport};
