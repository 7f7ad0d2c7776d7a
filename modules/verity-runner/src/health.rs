//! Per-provider-class circuit breakers plus the global pause switch.
//!
//! One `HealthTracker` is constructed at process start and shared by
//! reference. All mutation happens synchronously under a single mutex that
//! is never held across an await point.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderClass {
    Search,
    Llm,
}

impl std::fmt::Display for ProviderClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Search => f.write_str("search"),
            Self::Llm => f.write_str("llm"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure_message: Option<String>,
    pub last_success_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub search: ProviderSnapshot,
    pub llm: ProviderSnapshot,
    pub system_paused: bool,
    pub paused_at: Option<DateTime<Utc>>,
    pub pause_reason: Option<String>,
}

#[derive(Debug, Clone)]
struct ProviderState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_message: Option<String>,
    last_success_time: Option<DateTime<Utc>>,
}

impl ProviderState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_message: None,
            last_success_time: None,
        }
    }

    fn snapshot(&self) -> ProviderSnapshot {
        ProviderSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            last_failure_message: self.last_failure_message.clone(),
            last_success_time: self.last_success_time,
        }
    }
}

#[derive(Debug)]
struct Inner {
    search: ProviderState,
    llm: ProviderState,
    paused_at: Option<DateTime<Utc>>,
    pause_reason: Option<String>,
}

impl Inner {
    fn provider_mut(&mut self, class: ProviderClass) -> &mut ProviderState {
        match class {
            ProviderClass::Search => &mut self.search,
            ProviderClass::Llm => &mut self.llm,
        }
    }
}

pub struct HealthTracker {
    inner: Mutex<Inner>,
    default_threshold: u32,
}

impl HealthTracker {
    pub fn new(default_threshold: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                search: ProviderState::new(),
                llm: ProviderState::new(),
                paused_at: None,
                pause_reason: None,
            }),
            default_threshold: default_threshold.max(1),
        }
    }

    /// Record a provider failure. Returns true exactly when this call newly
    /// opened the circuit, so callers can alert once instead of on every
    /// subsequent failure.
    pub fn record_failure(
        &self,
        class: ProviderClass,
        message: &str,
        threshold: Option<u32>,
    ) -> bool {
        let threshold = threshold.unwrap_or(self.default_threshold);
        let mut inner = self.inner.lock().unwrap();
        let provider = inner.provider_mut(class);
        provider.consecutive_failures += 1;
        provider.last_failure_message = Some(message.to_string());

        match provider.state {
            CircuitState::Closed if provider.consecutive_failures >= threshold => {
                provider.state = CircuitState::Open;
                warn!(
                    provider = %class,
                    failures = provider.consecutive_failures,
                    "Provider circuit opened"
                );
                true
            }
            CircuitState::HalfOpen => {
                // The probe failed; back to open. A fresh alert is warranted.
                provider.state = CircuitState::Open;
                warn!(provider = %class, "Provider probe failed, circuit re-opened");
                true
            }
            _ => false,
        }
    }

    /// Record a provider success: failure count resets, and a half-open
    /// circuit closes.
    pub fn record_success(&self, class: ProviderClass) {
        let mut inner = self.inner.lock().unwrap();
        let provider = inner.provider_mut(class);
        provider.consecutive_failures = 0;
        provider.last_success_time = Some(Utc::now());
        if provider.state == CircuitState::HalfOpen {
            info!(provider = %class, "Provider probe succeeded, circuit closed");
            provider.state = CircuitState::Closed;
        }
    }

    /// Explicit probe transition: open -> half_open. Never automatic.
    /// Returns whether the transition happened.
    pub fn probe(&self, class: ProviderClass) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let provider = inner.provider_mut(class);
        if provider.state == CircuitState::Open {
            provider.state = CircuitState::HalfOpen;
            info!(provider = %class, "Provider circuit half-open for probe");
            true
        } else {
            false
        }
    }

    /// A provider is callable unless its circuit is open. Half-open permits
    /// the probe call.
    pub fn is_healthy(&self, class: ProviderClass) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.provider_mut(class).state != CircuitState::Open
    }

    /// Pause the whole system. Idempotent: a second pause keeps the
    /// original reason and timestamp. Returns whether state changed.
    pub fn pause(&self, reason: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.paused_at.is_some() {
            return false;
        }
        inner.paused_at = Some(Utc::now());
        inner.pause_reason = Some(reason.to_string());
        warn!(reason, "System paused");
        true
    }

    /// Resume and reset every circuit to closed. Resume is an explicit human
    /// action with manual verification behind it, so the whole tracker gets
    /// a fresh start rather than per-provider restoration. Returns whether
    /// state changed.
    pub fn resume(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.paused_at.is_none() {
            return false;
        }
        inner.paused_at = None;
        inner.pause_reason = None;
        inner.search = ProviderState::new();
        inner.llm = ProviderState::new();
        info!("System resumed, provider circuits reset");
        true
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().unwrap().paused_at.is_some()
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let inner = self.inner.lock().unwrap();
        HealthSnapshot {
            search: inner.search.snapshot(),
            llm: inner.llm.snapshot(),
            system_paused: inner.paused_at.is_some(),
            paused_at: inner.paused_at,
            pause_reason: inner.pause_reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_opens_exactly_on_the_threshold() {
        let tracker = HealthTracker::new(3);
        assert!(!tracker.record_failure(ProviderClass::Search, "timeout", None));
        assert!(!tracker.record_failure(ProviderClass::Search, "timeout", None));
        assert!(tracker.record_failure(ProviderClass::Search, "timeout", None));
        // Already open: no duplicate alert.
        assert!(!tracker.record_failure(ProviderClass::Search, "timeout", None));
        assert!(!tracker.is_healthy(ProviderClass::Search));
    }

    #[test]
    fn success_resets_the_failure_count() {
        let tracker = HealthTracker::new(3);
        tracker.record_failure(ProviderClass::Search, "timeout", None);
        tracker.record_failure(ProviderClass::Search, "timeout", None);
        tracker.record_success(ProviderClass::Search);
        assert_eq!(tracker.snapshot().search.consecutive_failures, 0);
        // Three more needed to open again.
        assert!(!tracker.record_failure(ProviderClass::Search, "timeout", None));
        assert!(!tracker.record_failure(ProviderClass::Search, "timeout", None));
        assert!(tracker.record_failure(ProviderClass::Search, "timeout", None));
    }

    #[test]
    fn classes_are_independent() {
        let tracker = HealthTracker::new(2);
        tracker.record_failure(ProviderClass::Search, "down", None);
        tracker.record_failure(ProviderClass::Search, "down", None);
        assert!(!tracker.is_healthy(ProviderClass::Search));
        assert!(tracker.is_healthy(ProviderClass::Llm));
        assert_eq!(tracker.snapshot().llm.consecutive_failures, 0);
    }

    #[test]
    fn probe_then_success_closes() {
        let tracker = HealthTracker::new(1);
        tracker.record_failure(ProviderClass::Llm, "5xx", None);
        assert!(!tracker.is_healthy(ProviderClass::Llm));

        assert!(tracker.probe(ProviderClass::Llm));
        assert_eq!(tracker.snapshot().llm.state, CircuitState::HalfOpen);
        assert!(tracker.is_healthy(ProviderClass::Llm));

        tracker.record_success(ProviderClass::Llm);
        assert_eq!(tracker.snapshot().llm.state, CircuitState::Closed);
    }

    #[test]
    fn probe_then_failure_reopens() {
        let tracker = HealthTracker::new(1);
        tracker.record_failure(ProviderClass::Llm, "5xx", None);
        tracker.probe(ProviderClass::Llm);
        assert!(tracker.record_failure(ProviderClass::Llm, "still 5xx", None));
        assert_eq!(tracker.snapshot().llm.state, CircuitState::Open);
    }

    #[test]
    fn probe_is_a_noop_when_closed() {
        let tracker = HealthTracker::new(3);
        assert!(!tracker.probe(ProviderClass::Search));
        assert_eq!(tracker.snapshot().search.state, CircuitState::Closed);
    }

    #[test]
    fn pause_is_idempotent_and_keeps_the_original_reason() {
        let tracker = HealthTracker::new(3);
        assert!(tracker.pause("llm outage"));
        let first = tracker.snapshot();
        assert!(!tracker.pause("second reason"));
        let second = tracker.snapshot();
        assert_eq!(second.pause_reason.as_deref(), Some("llm outage"));
        assert_eq!(second.paused_at, first.paused_at);
    }

    #[test]
    fn resume_resets_every_circuit() {
        let tracker = HealthTracker::new(1);
        tracker.record_failure(ProviderClass::Search, "down", None);
        tracker.record_failure(ProviderClass::Llm, "down", None);
        tracker.pause("everything is on fire");

        assert!(tracker.resume());
        let snap = tracker.snapshot();
        assert!(!snap.system_paused);
        assert_eq!(snap.search.state, CircuitState::Closed);
        assert_eq!(snap.llm.state, CircuitState::Closed);
        assert_eq!(snap.search.consecutive_failures, 0);

        // Resuming while not paused changes nothing.
        assert!(!tracker.resume());
    }

    #[test]
    fn custom_threshold_overrides_the_default() {
        let tracker = HealthTracker::new(3);
        assert!(!tracker.record_failure(ProviderClass::Search, "down", Some(2)));
        assert!(tracker.record_failure(ProviderClass::Search, "down", Some(2)));
    }
}
