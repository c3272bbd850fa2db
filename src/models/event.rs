// src/models/event.rs

//! Change events produced by the diff engine.

use serde::{Deserialize, Serialize};

use super::Snapshot;

/// Discriminant for change events, used by webhook filters and digest items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewProject,
    CompletionUpdate,
    Milestone,
    NewStrings,
    Approval,
    NeedsAttention,
}

impl EventKind {
    /// All event kinds; the default `allowed_kinds` for a webhook.
    pub const ALL: [EventKind; 6] = [
        EventKind::NewProject,
        EventKind::CompletionUpdate,
        EventKind::Milestone,
        EventKind::NewStrings,
        EventKind::Approval,
        EventKind::NeedsAttention,
    ];
}

/// One observable difference between two consecutive snapshots.
///
/// Produced once per diff call, immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// First snapshot ever taken for a project.
    NewProject { snapshot: Snapshot },
    /// Completion percentage moved by at least one point.
    CompletionUpdate {
        prev: Snapshot,
        curr: Snapshot,
        delta_pct: f64,
    },
    /// Completion crossed a configured milestone (ascending).
    Milestone { curr: Snapshot, threshold: u8 },
    /// The source project gained enough new strings to matter.
    NewStrings {
        curr: Snapshot,
        prev: Snapshot,
        count: u64,
    },
    /// Translations were approved since the last check.
    Approval { curr: Snapshot, count: u64 },
    /// The waiting+fuzzy backlog changed and is non-zero.
    NeedsAttention {
        curr: Snapshot,
        prev: Snapshot,
        count: u64,
    },
}

impl ChangeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChangeEvent::NewProject { .. } => EventKind::NewProject,
            ChangeEvent::CompletionUpdate { .. } => EventKind::CompletionUpdate,
            ChangeEvent::Milestone { .. } => EventKind::Milestone,
            ChangeEvent::NewStrings { .. } => EventKind::NewStrings,
            ChangeEvent::Approval { .. } => EventKind::Approval,
            ChangeEvent::NeedsAttention { .. } => EventKind::NeedsAttention,
        }
    }
}

/// Per-locale policy consulted by the diff engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffPolicy {
    /// Minimum total-string growth before a `NewStrings` event fires.
    pub new_strings_threshold: u64,
    /// Completion milestones in percent, kept sorted ascending.
    pub milestones: Vec<u8>,
}

impl DiffPolicy {
    pub fn new(new_strings_threshold: u64, mut milestones: Vec<u8>) -> Self {
        milestones.sort_unstable();
        milestones.dedup();
        Self {
            new_strings_threshold,
            milestones,
        }
    }
}

impl Default for DiffPolicy {
    fn default() -> Self {
        Self::new(10, vec![25, 50, 75, 90, 100])
    }
}
