use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::info;

/// Global metrics registry used across the bot.
pub static METRICS: Lazy<Metrics> = Lazy::new(Metrics::default);

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

#[derive(Default)]
struct MetricsInner {
    snapshots_seen: AtomicU64,
    ticks: AtomicU64,
    bids_submitted: AtomicU64,
    bids_failed: AtomicU64,
    last_event_ts: AtomicU64,
}

/// Lightweight metrics handle backed by atomics so it can be cloned cheaply.
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

impl Metrics {
    pub fn record_snapshot(&self, auction_slug: &str) {
        self.inner.snapshots_seen.fetch_add(1, Ordering::Relaxed);
        self.inner
            .last_event_ts
            .store(now_unix_secs(), Ordering::Relaxed);

        info!(
            target: "metrics",
            event = "snapshot",
            auction = %auction_slug,
            total_snapshots = self.inner.snapshots_seen.load(Ordering::Relaxed),
            "snapshot received"
        );
    }

    pub fn record_tick(&self) {
        self.inner.ticks.fetch_add(1, Ordering::Relaxed);
        self.inner
            .last_event_ts
            .store(now_unix_secs(), Ordering::Relaxed);
    }

    pub fn record_bid_submitted(&self, auction_slug: &str, strategy: &str) {
        self.inner.bids_submitted.fetch_add(1, Ordering::Relaxed);
        self.inner
            .last_event_ts
            .store(now_unix_secs(), Ordering::Relaxed);

        info!(
            target: "metrics",
            event = "bid_submitted",
            auction = %auction_slug,
            strategy = %strategy,
            total_bids = self.inner.bids_submitted.load(Ordering::Relaxed),
            "bid submitted"
        );
    }

    pub fn record_bid_failed(&self, auction_slug: &str, reason: &str) {
        self.inner.bids_failed.fetch_add(1, Ordering::Relaxed);
        self.inner
            .last_event_ts
            .store(now_unix_secs(), Ordering::Relaxed);

        info!(
            target: "metrics",
            event = "bid_failed",
            auction = %auction_slug,
            reason = %reason,
            total_failures = self.inner.bids_failed.load(Ordering::Relaxed),
            "bid failed"
        );
    }

    pub fn heartbeat(&self) {
        self.inner
            .last_event_ts
            .store(now_unix_secs(), Ordering::Relaxed);
    }

    pub fn is_healthy(&self, max_staleness: Duration) -> bool {
        let last = self.inner.last_event_ts.load(Ordering::Relaxed);
        if last == 0 {
            // No events yet; treat as healthy immediately after startup.
            return true;
        }
        let now = now_unix_secs();
        now.saturating_sub(last) <= max_staleness.as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            snapshots_seen: self.inner.snapshots_seen.load(Ordering::Relaxed),
            ticks: self.inner.ticks.load(Ordering::Relaxed),
            bids_submitted: self.inner.bids_submitted.load(Ordering::Relaxed),
            bids_failed: self.inner.bids_failed.load(Ordering::Relaxed),
            last_event_ts: self.inner.last_event_ts.load(Ordering::Relaxed),
        }
    }
}

/// Serializable view of current metrics used by dashboards and health checks.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub snapshots_seen: u64,
    pub ticks: u64,
    pub bids_submitted: u64,
    pub bids_failed: u64,
    pub last_event_ts: u64,
}

pub fn log_metrics_snapshot(snapshot: &MetricsSnapshot) {
    info!(
        target: "metrics",
        event = "metrics_snapshot",
        snapshots_seen = snapshot.snapshots_seen,
        ticks = snapshot.ticks,
        bids_submitted = snapshot.bids_submitted,
        bids_failed = snapshot.bids_failed,
        last_event_ts = snapshot.last_event_ts,
        "metrics snapshot"
    );
}
