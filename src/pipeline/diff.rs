// src/pipeline/diff.rs

//! Change detection between consecutive snapshots.
//!
//! Pure and I/O free: (previous | none, current, policy) -> ordered events.
//! The evaluation order is fixed so dispatch and tests are deterministic.

use crate::models::{ChangeEvent, DiffPolicy, Snapshot};

/// Completion delta below which no `CompletionUpdate` fires, in points.
const COMPLETION_DELTA_MIN: f64 = 1.0;

/// Compute the ordered list of change events between two observations.
///
/// Rules, in order:
/// 1. no previous snapshot -> `NewProject`, nothing else
/// 2. completion moved by >= 1 point -> `CompletionUpdate`
/// 3. each milestone crossed, ascending -> `Milestone`
/// 4. total grew by at least the policy threshold -> `NewStrings`
/// 5. translated count grew -> `Approval`
/// 6. non-zero waiting+fuzzy backlog changed -> `NeedsAttention`
pub fn diff_snapshots(
    prev: Option<&Snapshot>,
    curr: &Snapshot,
    policy: &DiffPolicy,
) -> Vec<ChangeEvent> {
    let Some(prev) = prev else {
        return vec![ChangeEvent::NewProject {
            snapshot: curr.clone(),
        }];
    };

    let mut events = Vec::new();

    let delta_pct = curr.completion_pct - prev.completion_pct;
    if delta_pct.abs() >= COMPLETION_DELTA_MIN {
        events.push(ChangeEvent::CompletionUpdate {
            prev: prev.clone(),
            curr: curr.clone(),
            delta_pct,
        });
    }

    for &milestone in &policy.milestones {
        let m = f64::from(milestone);
        if prev.completion_pct < m && m <= curr.completion_pct {
            events.push(ChangeEvent::Milestone {
                curr: curr.clone(),
                threshold: milestone,
            });
        }
    }

    if curr.total > prev.total {
        let count = curr.total - prev.total;
        if count >= policy.new_strings_threshold {
            events.push(ChangeEvent::NewStrings {
                curr: curr.clone(),
                prev: prev.clone(),
                count,
            });
        }
    }

    if curr.translated > prev.translated {
        events.push(ChangeEvent::Approval {
            curr: curr.clone(),
            count: curr.translated - prev.translated,
        });
    }

    if curr.needs_attention > 0 && curr.needs_attention != prev.needs_attention {
        events.push(ChangeEvent::NeedsAttention {
            curr: curr.clone(),
            prev: prev.clone(),
            count: curr.needs_attention,
        });
    }

    events
}
