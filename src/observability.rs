use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time copy of the engine's decision counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineMetricsSnapshot {
    pub requests: u64,
    pub allowed: u64,
    pub denied_inactive: u64,
    pub denied_sub_limit: u64,
    pub denied_pool_limit: u64,
    pub grace_bypasses: u64,
    pub store_fail_open: u64,
}

/// Decision counters. Atomics because the engine hands out `&self`.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    requests: AtomicU64,
    allowed: AtomicU64,
    denied_inactive: AtomicU64,
    denied_sub_limit: AtomicU64,
    denied_pool_limit: AtomicU64,
    grace_bypasses: AtomicU64,
    store_fail_open: AtomicU64,
}

impl EngineMetrics {
    pub(crate) fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_allowed(&self) {
        self.allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_denied_inactive(&self) {
        self.denied_inactive.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_denied_sub_limit(&self) {
        self.denied_sub_limit.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_denied_pool_limit(&self) {
        self.denied_pool_limit.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_grace_bypass(&self) {
        self.grace_bypasses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_fail_open(&self) {
        self.store_fail_open.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineMetricsSnapshot {
        EngineMetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            allowed: self.allowed.load(Ordering::Relaxed),
            denied_inactive: self.denied_inactive.load(Ordering::Relaxed),
            denied_sub_limit: self.denied_sub_limit.load(Ordering::Relaxed),
            denied_pool_limit: self.denied_pool_limit.load(Ordering::Relaxed),
            grace_bypasses: self.grace_bypasses.load(Ordering::Relaxed),
            store_fail_open: self.store_fail_open.load(Ordering::Relaxed),
        }
    }
}
