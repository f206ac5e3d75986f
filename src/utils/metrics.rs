//! Station metrics
//!
//! Atomic counters shared by the ingest loop, the dispatcher's connection
//! tasks and the detector. One [`StationMetrics`] is created at startup and
//! handed to each component as an `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Counters for the station's three paths
#[derive(Debug)]
pub struct StationMetrics {
    /// Messages pulled off the registration channel
    pub messages_received: AtomicU64,
    /// Messages rejected by the wire decoder
    pub decode_errors: AtomicU64,
    /// Messages whose secret could not be expanded
    pub derivation_errors: AtomicU64,
    /// Registrations inserted into the table
    pub registrations_admitted: AtomicU64,
    /// Registrations dropped because the phantom was already live
    pub registrations_duplicate: AtomicU64,
    /// Registrations dropped by the capacity limit
    pub registrations_rejected: AtomicU64,
    /// Registrations dropped because the phantom answered a probe
    pub probe_rejections: AtomicU64,
    /// Connections accepted by the dispatcher
    pub connections_total: AtomicU64,
    /// Connections currently being handled
    pub connections_active: AtomicU64,
    /// Connections whose original destination matched a registration
    pub connections_matched: AtomicU64,
    /// Connection-level failures
    pub connection_errors: AtomicU64,
    /// Frames handed to the forwarding channel
    pub frames_forwarded: AtomicU64,
    /// Matched frames dropped because the forwarding channel was full
    pub frames_dropped: AtomicU64,
    /// Tag sightings on the capture path
    pub tag_sightings: AtomicU64,
    start_time: Instant,
}

impl StationMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            derivation_errors: AtomicU64::new(0),
            registrations_admitted: AtomicU64::new(0),
            registrations_duplicate: AtomicU64::new(0),
            registrations_rejected: AtomicU64::new(0),
            probe_rejections: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_matched: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            frames_forwarded: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            tag_sightings: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn derivation_error(&self) {
        self.derivation_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn registration_admitted(&self) {
        self.registrations_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn registration_duplicate(&self) {
        self.registrations_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn registration_rejected(&self) {
        self.registrations_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn probe_rejection(&self) {
        self.probe_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted connection
    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_matched(&self) {
        self.connections_matched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_forwarded(&self) {
        self.frames_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tag_sighting(&self) {
        self.tag_sightings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            derivation_errors: self.derivation_errors.load(Ordering::Relaxed),
            registrations_admitted: self.registrations_admitted.load(Ordering::Relaxed),
            registrations_duplicate: self.registrations_duplicate.load(Ordering::Relaxed),
            registrations_rejected: self.registrations_rejected.load(Ordering::Relaxed),
            probe_rejections: self.probe_rejections.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_matched: self.connections_matched.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            frames_forwarded: self.frames_forwarded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            tag_sightings: self.tag_sightings.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn log_metrics(&self) {
        let s = self.snapshot();
        info!(
            messages_received = s.messages_received,
            decode_errors = s.decode_errors,
            derivation_errors = s.derivation_errors,
            registrations_admitted = s.registrations_admitted,
            registrations_duplicate = s.registrations_duplicate,
            registrations_rejected = s.registrations_rejected,
            probe_rejections = s.probe_rejections,
            connections_total = s.connections_total,
            connections_active = s.connections_active,
            connections_matched = s.connections_matched,
            connection_errors = s.connection_errors,
            frames_forwarded = s.frames_forwarded,
            frames_dropped = s.frames_dropped,
            tag_sightings = s.tag_sightings,
            uptime_seconds = s.uptime_seconds,
            "Station metrics snapshot"
        );
    }

    /// Log a snapshot every `interval` until `cancel` fires.
    pub async fn report_every(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.log_metrics(),
            }
        }
        debug!("Metrics reporter stopped");
    }
}

impl Default for StationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`StationMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub decode_errors: u64,
    pub derivation_errors: u64,
    pub registrations_admitted: u64,
    pub registrations_duplicate: u64,
    pub registrations_rejected: u64,
    pub probe_rejections: u64,
    pub connections_total: u64,
    pub connections_active: u64,
    pub connections_matched: u64,
    pub connection_errors: u64,
    pub frames_forwarded: u64,
    pub frames_dropped: u64,
    pub tag_sightings: u64,
    pub uptime_seconds: u64,
}

/// Logs how long a scope took when dropped
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!(
            operation = self.operation,
            duration_ms = u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_gauge() {
        let metrics = StationMetrics::new();
        metrics.connection_opened();
        metrics.connection_opened();
        metrics.connection_closed();

        let snap = metrics.snapshot();
        assert_eq!(snap.connections_total, 2);
        assert_eq!(snap.connections_active, 1);
    }

    #[test]
    fn test_ingest_counters() {
        let metrics = StationMetrics::new();
        metrics.message_received();
        metrics.decode_error();
        metrics.message_received();
        metrics.registration_admitted();

        let snap = metrics.snapshot();
        assert_eq!(snap.messages_received, 2);
        assert_eq!(snap.decode_errors, 1);
        assert_eq!(snap.registrations_admitted, 1);
        assert_eq!(snap.registrations_duplicate, 0);
    }
}
