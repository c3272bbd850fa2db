// src/notify/render.rs

//! Message rendering for change events and digests.
//!
//! Each event is rendered once into a plain-text line plus a
//! Slack-compatible block structure; digest flushes group the queued lines
//! into a single bulk message.

use serde_json::{Value, json};

use crate::models::{ChangeEvent, DigestQueueItem, EventKind, ProjectKey};

/// A rendered message: plain text plus a formatted payload.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub text: String,
    pub formatted: Value,
}

impl Rendered {
    fn from_text(text: String) -> Self {
        let formatted = json!({
            "blocks": [
                {
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": text }
                }
            ]
        });
        Self { text, formatted }
    }
}

/// Render one change event for a project into a message.
pub fn render_event(event: &ChangeEvent, key: &ProjectKey) -> Rendered {
    let text = match event {
        ChangeEvent::NewProject { snapshot } => format!(
            "Now watching {key} ({label}): {pct}% translated ({translated}/{total})",
            label = key.project_type.label(),
            pct = snapshot.completion_pct,
            translated = snapshot.translated,
            total = snapshot.total,
        ),
        ChangeEvent::CompletionUpdate {
            prev,
            curr,
            delta_pct,
        } => format!(
            "{key} moved from {from}% to {to}% ({delta_pct:+.2})",
            from = prev.completion_pct,
            to = curr.completion_pct,
        ),
        ChangeEvent::Milestone { curr, threshold } => format!(
            "{key} crossed the {threshold}% milestone (now {pct}%)",
            pct = curr.completion_pct,
        ),
        ChangeEvent::NewStrings { curr, count, .. } => format!(
            "{count} new strings to translate in {key} (total now {total})",
            total = curr.total,
        ),
        ChangeEvent::Approval { curr, count } => format!(
            "{count} strings approved in {key} (now {pct}%)",
            pct = curr.completion_pct,
        ),
        ChangeEvent::NeedsAttention { curr, count, .. } => format!(
            "{key} has {count} strings needing attention ({waiting} waiting, {fuzzy} fuzzy)",
            waiting = curr.waiting,
            fuzzy = curr.fuzzy,
        ),
    };
    Rendered::from_text(text)
}

/// Render a drained digest queue into one bulk message, grouped by kind.
pub fn render_digest(channel_id: &str, items: &[DigestQueueItem]) -> Rendered {
    let mut lines = vec![format!(
        "Translation digest for {channel_id} ({} update{}):",
        items.len(),
        if items.len() == 1 { "" } else { "s" }
    )];

    for kind in EventKind::ALL {
        let group: Vec<&DigestQueueItem> = items.iter().filter(|i| i.kind == kind).collect();
        if group.is_empty() {
            continue;
        }
        lines.push(format!("{}:", kind_heading(kind)));
        for item in group {
            lines.push(format!("  - {}", item.message));
        }
    }

    Rendered::from_text(lines.join("\n"))
}

fn kind_heading(kind: EventKind) -> &'static str {
    match kind {
        EventKind::NewProject => "New projects",
        EventKind::CompletionUpdate => "Completion updates",
        EventKind::Milestone => "Milestones",
        EventKind::NewStrings => "New strings",
        EventKind::Approval => "Approvals",
        EventKind::NeedsAttention => "Needs attention",
    }
}
