// src/notify/mod.rs

//! Notification transport boundary.
//!
//! The contract with a delivery backend is intentionally small:
//! `send(text, url, formatted) -> bool`. Formatting templates beyond the
//! rendered message live on the other side of this boundary.

pub mod render;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

pub use render::{Rendered, render_digest, render_event};

/// Delivery backend for notification messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message to the given webhook URL. Returns delivery
    /// success; implementations must not panic on failure.
    async fn send(&self, text: &str, url: &str, formatted: &Value) -> bool;

    /// Deliver to an explicit URL, bypassing any default channel routing.
    async fn send_override(&self, text: &str, explicit_url: &str, formatted: &Value) -> bool {
        self.send(text, explicit_url, formatted).await
    }
}

/// Webhook notifier posting Slack-compatible JSON payloads.
pub struct WebhookNotifier {
    client: Client,
}

impl WebhookNotifier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, text: &str, url: &str, formatted: &Value) -> bool {
        let mut payload = formatted.clone();
        if let Value::Object(ref mut map) = payload {
            map.insert("text".to_string(), Value::String(text.to_string()));
        } else {
            payload = serde_json::json!({ "text": text });
        }

        match self.client.post(url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                log::warn!("webhook delivery rejected with status {}", resp.status());
                false
            }
            Err(e) => {
                log::warn!("webhook delivery failed: {e}");
                false
            }
        }
    }
}
