//! Shared health state for the /health endpoint.
//! Updated by the lifecycle controller, read by the API.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;

/// Failure counters and last-success timestamps (unix ms, 0 = never).
#[derive(Default)]
pub struct HealthState {
    last_discovery_at_ms: AtomicU64,
    last_reconcile_at_ms: AtomicU64,
    discovery_failures: AtomicU64,
    fetch_failures: AtomicU64,
    persistence_failures: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub last_discovery_at_ms: u64,
    pub last_reconcile_at_ms: u64,
    pub discovery_failures: u64,
    pub fetch_failures: u64,
    pub persistence_failures: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_discovery(&self) {
        self.last_discovery_at_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn mark_reconcile(&self) {
        self.last_reconcile_at_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn inc_discovery_failures(&self) {
        self.discovery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fetch_failures(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_persistence_failures(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            last_discovery_at_ms: self.last_discovery_at_ms.load(Ordering::Relaxed),
            last_reconcile_at_ms: self.last_reconcile_at_ms.load(Ordering::Relaxed),
            discovery_failures: self.discovery_failures.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
        }
    }
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
