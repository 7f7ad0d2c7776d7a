//! Pause/resume control surface over the tracker, queue, and notifier.

use std::sync::Arc;

use crate::health::{HealthSnapshot, HealthTracker, ProviderClass};
use crate::queue::RunnerQueue;
use crate::webhook::{WebhookEvent, WebhookNotifier};

pub struct ControlService {
    health: Arc<HealthTracker>,
    queue: Arc<RunnerQueue>,
    notifier: WebhookNotifier,
}

impl ControlService {
    pub fn new(
        health: Arc<HealthTracker>,
        queue: Arc<RunnerQueue>,
        notifier: WebhookNotifier,
    ) -> Self {
        Self {
            health,
            queue,
            notifier,
        }
    }

    /// Pause the system. The webhook fires only on an actual transition —
    /// repeated pauses stay silent, matching the tracker's idempotency.
    pub fn pause(&self, reason: &str) {
        if self.health.pause(reason) {
            self.notifier
                .emit(WebhookEvent::paused(reason, self.health.snapshot()));
        }
    }

    /// Resume the system and kick the queue so waiting jobs start
    /// immediately.
    pub async fn resume(&self) {
        if self.health.resume() {
            self.notifier
                .emit(WebhookEvent::resumed(self.health.snapshot()));
        }
        Arc::clone(&self.queue).spawn_drain();
    }

    /// Move an open circuit to half-open so the next call probes the
    /// provider. Returns whether the transition happened.
    pub fn probe(&self, class: ProviderClass) -> bool {
        self.health.probe(class)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.health.snapshot()
    }
}
