// src/pipeline/digest.rs

//! Per-channel digest queues and the flush scheduler.
//!
//! Queued items wait until the channel's digest window elapses, then the
//! whole queue is drained in one atomic read-and-clear and sent as a single
//! bulk message. Items older than the retention TTL are discarded unread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Local, NaiveTime, Timelike, Utc};

use crate::models::{DeliveryMode, DigestPolicy, DigestQueueItem, WebhookConfig};
use crate::notify::{Notifier, render_digest};

/// Retention TTL for queued digest items.
const ITEM_TTL_HOURS: i64 = 12;

/// Acceptance window for fixed-time digests, minutes from the target time.
const FIXED_TIME_WINDOW_MINUTES: i64 = 15;

/// Thread-safe per-channel digest queues.
///
/// Shared between the router (producer) and the scheduler (consumer);
/// drains are a single read-and-clear under the lock so a concurrent
/// enqueue is never lost or double-counted.
#[derive(Debug, Default)]
pub struct DigestQueues {
    inner: Mutex<HashMap<String, Vec<DigestQueueItem>>>,
}

impl DigestQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item to a channel's queue, creating the queue if absent.
    pub fn enqueue(&self, channel_id: &str, item: DigestQueueItem) {
        let mut inner = self.inner.lock().expect("digest queue lock poisoned");
        inner.entry(channel_id.to_string()).or_default().push(item);
    }

    /// Atomically take every queued item for a channel.
    pub fn drain(&self, channel_id: &str) -> Vec<DigestQueueItem> {
        let mut inner = self.inner.lock().expect("digest queue lock poisoned");
        inner.remove(channel_id).unwrap_or_default()
    }

    /// Number of items waiting for a channel.
    pub fn len(&self, channel_id: &str) -> usize {
        let inner = self.inner.lock().expect("digest queue lock poisoned");
        inner.get(channel_id).map_or(0, Vec::len)
    }

    /// Drop items enqueued before `cutoff` from every queue and remove
    /// queues left empty. Covers channels whose webhook was removed or
    /// switched away from digest mode; their queues would otherwise never
    /// be drained. Returns the number of discarded items.
    pub fn prune(&self, cutoff: DateTime<Utc>) -> usize {
        let mut inner = self.inner.lock().expect("digest queue lock poisoned");
        let mut discarded = 0;
        inner.retain(|_, items| {
            let before = items.len();
            items.retain(|i| i.enqueued_at >= cutoff);
            discarded += before - items.len();
            !items.is_empty()
        });
        discarded
    }

    /// Export all queues for persistence.
    pub fn to_entries(&self) -> HashMap<String, Vec<DigestQueueItem>> {
        self.inner.lock().expect("digest queue lock poisoned").clone()
    }

    /// Restore queues from persistence.
    pub fn hydrate(&self, stored: HashMap<String, Vec<DigestQueueItem>>) {
        let mut inner = self.inner.lock().expect("digest queue lock poisoned");
        for (channel, items) in stored {
            inner.entry(channel).or_default().extend(items);
        }
    }
}

/// Flush scheduler for digest channels.
///
/// Per channel the state machine is `Idle -> (due) -> Draining -> Idle`;
/// a failed flush returns to Idle without retry and the next window retries
/// naturally. Last-flush times are tracked per channel.
pub struct DigestScheduler {
    queues: Arc<DigestQueues>,
    notifier: Arc<dyn Notifier>,
    last_flush: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl DigestScheduler {
    pub fn new(queues: Arc<DigestQueues>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            queues,
            notifier,
            last_flush: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate every digest channel and flush the due ones.
    ///
    /// Returns the number of channels that produced a bulk send.
    pub async fn tick(&self, now: DateTime<Utc>, configs: &[WebhookConfig]) -> usize {
        let discarded = self.queues.prune(now - Duration::hours(ITEM_TTL_HOURS));
        if discarded > 0 {
            log::info!("discarded {discarded} expired digest item(s)");
        }
        let local_tod = now.with_timezone(&Local).time();
        let mut flushed = 0;
        for config in configs {
            if config.mode != DeliveryMode::Digest || !config.enabled {
                continue;
            }
            let channel_id = config.channel.id();
            if !self.claim_if_due(&channel_id, &config.digest, now, local_tod) {
                continue;
            }
            if self.flush(&channel_id, &config.url, now).await {
                flushed += 1;
            }
        }
        flushed
    }

    /// Drain one channel and send the bulk message.
    ///
    /// An empty queue (or one holding only expired items) is a no-op.
    /// Returns whether a message was sent.
    pub async fn flush(&self, channel_id: &str, url: &str, now: DateTime<Utc>) -> bool {
        let drained = self.queues.drain(channel_id);
        let cutoff = now - Duration::hours(ITEM_TTL_HOURS);
        let stale = drained.iter().filter(|i| i.enqueued_at < cutoff).count();
        if stale > 0 {
            log::info!("discarding {stale} stale digest item(s) for {channel_id}");
        }
        let items: Vec<DigestQueueItem> = drained
            .into_iter()
            .filter(|i| i.enqueued_at >= cutoff)
            .collect();
        if items.is_empty() {
            return false;
        }

        let rendered = render_digest(channel_id, &items);
        let delivered = self
            .notifier
            .send(&rendered.text, url, &rendered.formatted)
            .await;
        if !delivered {
            // No retry; the items are gone and the next window starts clean.
            log::warn!(
                "digest flush for {channel_id} failed to deliver {} item(s)",
                items.len()
            );
        }
        delivered
    }

    /// Check due-ness and, when due, record the flush time in the same
    /// locked section so a concurrent tick cannot double-fire the channel.
    fn claim_if_due(
        &self,
        channel_id: &str,
        policy: &DigestPolicy,
        now: DateTime<Utc>,
        local_tod: NaiveTime,
    ) -> bool {
        let mut last_flush = self.last_flush.lock().expect("digest flush lock poisoned");
        let last = last_flush.get(channel_id).copied();
        let due = match policy {
            DigestPolicy::Interval { minutes } => {
                last.is_none_or(|t| now - t > Duration::minutes(*minutes))
            }
            DigestPolicy::FixedTime { hhmm } => {
                fixed_time_window_contains(local_tod, hhmm)
                    && last.is_none_or(|t| {
                        now - t >= Duration::minutes(FIXED_TIME_WINDOW_MINUTES)
                    })
            }
        };
        if due {
            last_flush.insert(channel_id.to_string(), now);
        }
        due
    }

    /// Export last-flush times for persistence.
    pub fn to_entries(&self) -> HashMap<String, DateTime<Utc>> {
        self.last_flush.lock().expect("digest flush lock poisoned").clone()
    }

    /// Restore last-flush times from persistence.
    pub fn hydrate(&self, stored: HashMap<String, DateTime<Utc>>) {
        let mut last_flush = self.last_flush.lock().expect("digest flush lock poisoned");
        last_flush.extend(stored);
    }
}

/// Whether a time of day falls inside the 15-minute acceptance window
/// starting at `hhmm`. A window crossing midnight wraps.
///
/// If the tick cadence is coarser than the window, a fixed-time digest can
/// be skipped for the day; the window-based check is kept as-is.
fn fixed_time_window_contains(tod: NaiveTime, hhmm: &str) -> bool {
    let Ok(target) = NaiveTime::parse_from_str(hhmm, "%H:%M") else {
        log::warn!("invalid digest time '{hhmm}', expected HH:MM");
        return false;
    };
    let minutes_of_day = i64::from(tod.hour() * 60 + tod.minute());
    let target_minutes = i64::from(target.hour() * 60 + target.minute());
    let offset = (minutes_of_day - target_minutes).rem_euclid(24 * 60);
    offset < FIXED_TIME_WINDOW_MINUTES
}
