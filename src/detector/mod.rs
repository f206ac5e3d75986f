//! # Detector
//!
//! Passive path: inspects captured frames and picks out the ones addressed to
//! a registered phantom.
//!
//! ## Pipeline
//! ```text
//! Capture → Classify → TagScan → MatchCheck → Drop | Forward
//! ```
//! - **Classify** counts bytes and address families. A destination that is
//!   neither 4 nor 16 bytes is logged and skips the family counters only.
//! - Frames without a TCP header stop after classification.
//! - **TagScan** logs configured tags found in the payload.
//! - **MatchCheck** asks the registration table about the destination.
//! - **Forward** hands matched frames to the forwarding channel without
//!   waiting; a full channel drops the frame.

pub mod capture;
pub mod frame;
pub mod stats;

pub use capture::{device_exists, generate_filter, CaptureSource};
pub use frame::{CapturedFrame, TransportHeader};
pub use stats::{report_stats, DetectorStats, StatsSnapshot};

use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::registration::RegistrationLookup;
use crate::utils::metrics::StationMetrics;

/// Where a frame left the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameVerdict {
    /// No TCP header
    NoTransport,
    /// Not addressed to a registered phantom
    Unmatched,
    /// Handed to the forwarding channel
    Forwarded,
    /// Matched but the forwarding channel was full or closed
    Dropped,
}

/// Per-frame classifier and matcher
pub struct Detector {
    lookup: Arc<dyn RegistrationLookup>,
    tags: Vec<Vec<u8>>,
    stats: Arc<DetectorStats>,
    forward: mpsc::Sender<CapturedFrame>,
    metrics: Arc<StationMetrics>,
}

impl Detector {
    pub fn new(
        lookup: Arc<dyn RegistrationLookup>,
        tags: &[String],
        forward: mpsc::Sender<CapturedFrame>,
        metrics: Arc<StationMetrics>,
    ) -> Self {
        Self {
            lookup,
            tags: tags
                .iter()
                .filter(|t| !t.is_empty())
                .map(|t| t.as_bytes().to_vec())
                .collect(),
            stats: Arc::new(DetectorStats::new()),
            forward,
            metrics,
        }
    }

    /// Counters for this detector's reporting task
    pub fn stats(&self) -> Arc<DetectorStats> {
        Arc::clone(&self.stats)
    }

    /// Run one frame through the pipeline.
    pub fn handle_frame(&self, frame: CapturedFrame) -> FrameVerdict {
        self.stats.add_bytes(u64::from(frame.caplen));
        match frame.dst.len() {
            4 => self.stats.add_v4(),
            16 => self.stats.add_v6(),
            len => warn!(len, frame = %frame, "Destination is neither IPv4 nor IPv6"),
        }

        let Some(dst_port) = frame.tcp_dst_port() else {
            return FrameVerdict::NoTransport;
        };

        self.scan_tags(&frame);

        let registered = match (frame.src_ip(), frame.dst_ip()) {
            (Some(src), Some(dst)) => self.lookup.is_registered(src, dst, dst_port),
            _ => false,
        };
        if !registered {
            return FrameVerdict::Unmatched;
        }

        match self.forward.try_send(frame) {
            Ok(()) => {
                self.metrics.frame_forwarded();
                FrameVerdict::Forwarded
            }
            Err(TrySendError::Full(frame)) => {
                self.metrics.frame_dropped();
                debug!(frame = %frame, "Forwarding channel full, dropping frame");
                FrameVerdict::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.frame_dropped();
                FrameVerdict::Dropped
            }
        }
    }

    /// Account for a frame with no parseable IP layer.
    ///
    /// Its bytes still count towards the traffic total; nothing else runs.
    pub fn handle_unparsed(&self, caplen: u32) {
        self.stats.add_bytes(u64::from(caplen));
        trace!(caplen, "Frame without an IP layer");
    }

    fn scan_tags(&self, frame: &CapturedFrame) {
        if self.tags.iter().any(|tag| contains(&frame.payload, tag)) {
            self.metrics.tag_sighting();
            info!(flow = %frame, "confirmed");
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Forwarding stage for matched frames.
///
/// Matched flows are also seen by the dispatcher as redirected connections,
/// so this stage records the flow and releases the frame.
pub async fn forward_frames(mut frames: mpsc::Receiver<CapturedFrame>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => info!(flow = %frame, port = ?frame.tcp_dst_port(), "Forwarding registered flow"),
                None => break,
            },
        }
    }
    debug!("Frame forwarder stopped");
}
