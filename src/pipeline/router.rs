// src/pipeline/router.rs

//! Webhook evaluation and delivery routing for change events.
//!
//! Each event is checked against every applicable webhook configuration
//! (the global channel plus the event locale's channel), rendered once,
//! and then either sent immediately or parked in the channel's digest
//! queue. Delivery failures never propagate into the scrape pipeline.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::{ChangeEvent, DeliveryMode, DigestQueueItem, ProjectKey, WebhookConfig};
use crate::notify::{Notifier, render_event};

use super::digest::DigestQueues;

/// Routes change events to webhook channels.
pub struct NotificationRouter {
    notifier: Arc<dyn Notifier>,
    queues: Arc<DigestQueues>,
}

impl NotificationRouter {
    pub fn new(notifier: Arc<dyn Notifier>, queues: Arc<DigestQueues>) -> Self {
        Self { notifier, queues }
    }

    /// Evaluate one event against all webhook configs and deliver/enqueue.
    ///
    /// Returns the number of channels that accepted the event.
    pub async fn dispatch(
        &self,
        event: &ChangeEvent,
        key: &ProjectKey,
        configs: &[WebhookConfig],
        now: DateTime<Utc>,
    ) -> usize {
        let kind = event.kind();
        // Rendered once, shared by every surviving channel.
        let rendered = render_event(event, key);
        let mut accepted = 0;

        for config in configs {
            if !config.accepts(kind, key) {
                continue;
            }
            if let ChangeEvent::NewStrings { count, .. } = event {
                if *count < config.new_strings_threshold {
                    continue;
                }
            }
            if let ChangeEvent::Milestone { threshold, .. } = event {
                if !config.milestones.is_empty() && !config.milestones.contains(threshold) {
                    continue;
                }
            }

            accepted += 1;
            match config.mode {
                DeliveryMode::Digest => {
                    self.queues.enqueue(
                        &config.channel.id(),
                        DigestQueueItem {
                            kind,
                            project_key: key.clone(),
                            message: rendered.text.clone(),
                            enqueued_at: now,
                        },
                    );
                }
                DeliveryMode::Immediate => {
                    let delivered = self
                        .notifier
                        .send(&rendered.text, &config.url, &rendered.formatted)
                        .await;
                    if !delivered {
                        // Swallowed: a delivery failure must not block the
                        // registry commit for this project.
                        log::warn!(
                            "immediate delivery to channel '{}' failed for {key}",
                            config.channel
                        );
                    }
                }
            }
        }

        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Channel, DigestPolicy, EventKind, ProjectType, Snapshot, WebhookConfig,
    };
    use crate::notify::testing::RecordingNotifier;

    fn key() -> ProjectKey {
        ProjectKey::new(ProjectType::Plugin, "akismet", "fr_FR")
    }

    fn config(channel: Channel, mode: DeliveryMode) -> WebhookConfig {
        WebhookConfig {
            channel,
            enabled: true,
            url: "https://hooks.example.com/T/B/x".to_string(),
            allowed_kinds: EventKind::ALL.to_vec(),
            scope_locales: Vec::new(),
            scope_projects: Vec::new(),
            new_strings_threshold: 0,
            milestones: Vec::new(),
            mode,
            digest: DigestPolicy::default(),
        }
    }

    fn router() -> (NotificationRouter, Arc<RecordingNotifier>, Arc<DigestQueues>) {
        let notifier = Arc::new(RecordingNotifier::new());
        let queues = Arc::new(DigestQueues::new());
        let router = NotificationRouter::new(notifier.clone(), Arc::clone(&queues));
        (router, notifier, queues)
    }

    fn approval() -> ChangeEvent {
        ChangeEvent::Approval {
            curr: Snapshot::new(50, 50, 0, 0, Utc::now()),
            count: 5,
        }
    }

    #[tokio::test]
    async fn immediate_mode_sends_to_both_applicable_channels() {
        let (router, notifier, _) = router();
        let configs = vec![
            config(Channel::Global, DeliveryMode::Immediate),
            config(Channel::Locale("fr_FR".to_string()), DeliveryMode::Immediate),
            config(Channel::Locale("de_DE".to_string()), DeliveryMode::Immediate),
        ];

        let accepted = router.dispatch(&approval(), &key(), &configs, Utc::now()).await;
        assert_eq!(accepted, 2);
        assert_eq!(notifier.messages().len(), 2);
    }

    #[tokio::test]
    async fn digest_mode_enqueues_instead_of_sending() {
        let (router, notifier, queues) = router();
        let configs = vec![config(
            Channel::Locale("fr_FR".to_string()),
            DeliveryMode::Digest,
        )];

        router.dispatch(&approval(), &key(), &configs, Utc::now()).await;
        assert!(notifier.messages().is_empty());
        assert_eq!(queues.len("fr_FR"), 1);
    }

    #[tokio::test]
    async fn new_strings_below_channel_threshold_is_skipped() {
        let (router, notifier, _) = router();
        let mut cfg = config(Channel::Global, DeliveryMode::Immediate);
        cfg.new_strings_threshold = 20;

        let event = ChangeEvent::NewStrings {
            curr: Snapshot::new(0, 115, 0, 0, Utc::now()),
            prev: Snapshot::new(0, 100, 0, 0, Utc::now()),
            count: 15,
        };
        let accepted = router.dispatch(&event, &key(), &[cfg], Utc::now()).await;
        assert_eq!(accepted, 0);
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn milestone_outside_channel_list_is_skipped() {
        let (router, notifier, _) = router();
        let mut cfg = config(Channel::Global, DeliveryMode::Immediate);
        cfg.milestones = vec![100];

        let event = ChangeEvent::Milestone {
            curr: Snapshot::new(50, 50, 0, 0, Utc::now()),
            threshold: 50,
        };
        assert_eq!(router.dispatch(&event, &key(), &[cfg.clone()], Utc::now()).await, 0);

        cfg.milestones = vec![50, 100];
        assert_eq!(router.dispatch(&event, &key(), &[cfg], Utc::now()).await, 1);
        assert_eq!(notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn send_failure_is_swallowed() {
        let notifier = Arc::new(RecordingNotifier::failing());
        let queues = Arc::new(DigestQueues::new());
        let router = NotificationRouter::new(notifier.clone(), queues);

        let configs = vec![config(Channel::Global, DeliveryMode::Immediate)];
        let accepted = router.dispatch(&approval(), &key(), &configs, Utc::now()).await;
        // The channel accepted the event even though delivery failed.
        assert_eq!(accepted, 1);
    }

    #[tokio::test]
    async fn scoped_locales_filter_applies() {
        let (router, notifier, _) = router();
        let mut cfg = config(Channel::Global, DeliveryMode::Immediate);
        cfg.scope_locales = vec!["de_DE".to_string()];

        let accepted = router.dispatch(&approval(), &key(), &[cfg], Utc::now()).await;
        assert_eq!(accepted, 0);
        assert!(notifier.messages().is_empty());
    }
}
