//! Fire-and-forget webhook emission on health-state transitions.
//! Delivery is best-effort: failures are logged, never retried, never
//! propagated.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, warn};

use crate::health::HealthSnapshot;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemEventType {
    SystemPaused,
    SystemResumed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: SystemEventType,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub health_state: HealthSnapshot,
}

impl WebhookEvent {
    pub fn paused(reason: &str, health_state: HealthSnapshot) -> Self {
        Self {
            event_type: SystemEventType::SystemPaused,
            reason: Some(reason.to_string()),
            timestamp: Utc::now(),
            health_state,
        }
    }

    pub fn resumed(health_state: HealthSnapshot) -> Self {
        Self {
            event_type: SystemEventType::SystemResumed,
            reason: None,
            timestamp: Utc::now(),
            health_state,
        }
    }
}

#[derive(Clone)]
pub struct WebhookNotifier {
    url: Option<String>,
    secret: Option<String>,
    http: reqwest::Client,
}

impl WebhookNotifier {
    /// Empty url disables emission; empty secret disables signing.
    pub fn new(url: &str, secret: &str) -> Self {
        Self {
            url: (!url.is_empty()).then(|| url.to_string()),
            secret: (!secret.is_empty()).then(|| secret.to_string()),
            http: reqwest::Client::new(),
        }
    }

    /// Emit on a background task and return immediately.
    pub fn emit(&self, event: WebhookEvent) {
        let Some(url) = self.url.clone() else {
            debug!("Webhook not configured, dropping event");
            return;
        };
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.post(&url, &event).await {
                warn!(error = %e, event = ?event.event_type, "Webhook delivery failed");
            }
        });
    }

    async fn post(&self, url: &str, event: &WebhookEvent) -> anyhow::Result<()> {
        let body = serde_json::to_vec(event)?;

        let mut request = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            request = request.header("X-Webhook-Signature", format!("sha256={}", sign(&body, secret)));
        }

        let resp = request.body(body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("webhook returned {status}: {text}");
        }
        Ok(())
    }
}

fn sign(body: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthTracker;

    #[test]
    fn signature_is_stable_hex() {
        let a = sign(b"payload", "secret");
        let b = sign(b"payload", "secret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(sign(b"payload", "other"), a);
    }

    #[test]
    fn event_wire_shape() {
        let tracker = HealthTracker::new(3);
        let event = WebhookEvent::paused("llm outage", tracker.snapshot());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "system_paused");
        assert_eq!(json["reason"], "llm outage");
        assert_eq!(json["healthState"]["systemPaused"], false);
    }

    #[tokio::test]
    async fn unconfigured_notifier_drops_events() {
        let notifier = WebhookNotifier::new("", "secret");
        let tracker = HealthTracker::new(3);
        // Must not panic or spawn anything that fails loudly.
        notifier.emit(WebhookEvent::resumed(tracker.snapshot()));
    }
}
