//! Detector traffic counters.
//!
//! Counters accumulate between reports and are reset by each snapshot, so every
//! report line covers exactly one interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Per-detector traffic counters, reset on every report
#[derive(Debug, Default)]
pub struct DetectorStats {
    bytes_total: AtomicU64,
    v4_packets: AtomicU64,
    v6_packets: AtomicU64,
}

/// Counter values taken at one report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub bytes_total: u64,
    pub v4_packets: u64,
    pub v6_packets: u64,
}

impl DetectorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes_total.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_v4(&self) {
        self.v4_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_v6(&self) {
        self.v6_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values without resetting
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_total: self.bytes_total.load(Ordering::Relaxed),
            v4_packets: self.v4_packets.load(Ordering::Relaxed),
            v6_packets: self.v6_packets.load(Ordering::Relaxed),
        }
    }

    /// Take the current values and zero the counters.
    ///
    /// Each counter is swapped individually; a frame counted concurrently
    /// lands in either this report or the next, never in both.
    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_total: self.bytes_total.swap(0, Ordering::Relaxed),
            v4_packets: self.v4_packets.swap(0, Ordering::Relaxed),
            v6_packets: self.v6_packets.swap(0, Ordering::Relaxed),
        }
    }
}

fn log_snapshot(snap: StatsSnapshot, interval: Duration) {
    info!(
        bytes_total = snap.bytes_total,
        v4_packets = snap.v4_packets,
        v6_packets = snap.v6_packets,
        interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        "Detector stats"
    );
}

/// Report and reset `stats` every `interval`, with a final report on cancel.
pub async fn report_stats(stats: Arc<DetectorStats>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log_snapshot(stats.snapshot_and_reset(), interval);
                return;
            }
            _ = ticker.tick() => log_snapshot(stats.snapshot_and_reset(), interval),
        }
    }
}
