//! Capture device boundary.
//!
//! Opening the device and compiling the filter happen once at startup and are
//! fatal on failure. Reading happens on a blocking thread; a short read timeout
//! lets the loop notice cancellation between frames.

use pcap::{Active, Capture, Device, Linktype};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::frame::CapturedFrame;
use super::Detector;
use crate::config::DetectorConfig;
use crate::error::{constants, Result, StationError};

/// Build the capture filter excluding `excluded` sources.
///
/// An empty list produces an empty filter, which captures everything.
pub fn generate_filter(excluded: &[String]) -> String {
    match excluded.split_first() {
        None => String::new(),
        Some((first, rest)) => {
            let mut out = format!("tcp and not src {first}");
            for entry in rest {
                out.push_str(" and not src ");
                out.push_str(entry);
            }
            out
        }
    }
}

/// Whether the system has a capture device called `name`
pub fn device_exists(name: &str) -> Result<bool> {
    let devices = Device::list()
        .map_err(|e| StationError::DeviceUnavailable(format!("cannot list devices: {e}")))?;
    Ok(devices.iter().any(|d| d.name == name))
}

/// An open, filtered capture handle
pub struct CaptureSource {
    capture: Capture<Active>,
    linktype: Linktype,
    device: String,
}

impl CaptureSource {
    /// Open the configured device and apply the exclusion filter.
    ///
    /// # Errors
    /// - `DeviceUnavailable` if the device is missing or cannot be opened
    /// - `FilterCompile` if the filter is rejected
    pub fn open(config: &DetectorConfig) -> Result<Self> {
        if !device_exists(&config.device)? {
            return Err(StationError::DeviceUnavailable(format!(
                "{}: {}",
                constants::ERR_DEVICE_NOT_FOUND,
                config.device
            )));
        }

        let read_timeout = i32::try_from(config.read_timeout.as_millis()).unwrap_or(i32::MAX);
        let mut capture = Capture::from_device(config.device.as_str())
            .and_then(|c| {
                c.snaplen(config.snaplen)
                    .promisc(false)
                    .timeout(read_timeout)
                    .open()
            })
            .map_err(|e| StationError::DeviceUnavailable(format!("{}: {e}", config.device)))?;

        let filter = generate_filter(&config.excluded_sources);
        if !filter.is_empty() {
            capture
                .filter(&filter, true)
                .map_err(|e| StationError::FilterCompile {
                    filter: filter.clone(),
                    reason: e.to_string(),
                })?;
        }

        let linktype = capture.get_datalink();
        info!(
            device = %config.device,
            filter = %filter,
            linktype = ?linktype,
            "Capture device opened"
        );

        Ok(Self {
            capture,
            linktype,
            device: config.device.clone(),
        })
    }

    /// Feed frames to `detector` in capture order until cancelled.
    ///
    /// Blocks the calling thread; run it under `spawn_blocking`.
    ///
    /// # Errors
    /// `Capture` if the device fails while reading.
    pub fn run(self, detector: Arc<Detector>, cancel: CancellationToken) -> Result<()> {
        let Self {
            mut capture,
            linktype,
            device,
        } = self;

        while !cancel.is_cancelled() {
            let (caplen, frame) = match capture.next_packet() {
                Ok(packet) => (
                    packet.header.caplen,
                    parse(linktype, packet.header.caplen, packet.data),
                ),
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(pcap::Error::NoMorePackets) => {
                    return Err(StationError::Capture(format!(
                        "{}: {}",
                        constants::ERR_CAPTURE_CLOSED,
                        device
                    )))
                }
                Err(e) => return Err(StationError::from(e)),
            };

            match frame {
                Some(frame) => {
                    detector.handle_frame(frame);
                }
                None => detector.handle_unparsed(caplen),
            }
        }

        debug!(device = %device, "Capture loop stopped");
        Ok(())
    }
}

fn parse(linktype: Linktype, caplen: u32, data: &[u8]) -> Option<CapturedFrame> {
    if linktype == Linktype::ETHERNET {
        CapturedFrame::from_ethernet(caplen, data)
    } else {
        CapturedFrame::from_ip(caplen, data)
    }
}
