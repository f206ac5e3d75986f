//! # Error Types
//!
//! Error handling for the station core.
//!
//! Every failure the station can observe is a variant of [`StationError`]. The
//! variants fall into two groups:
//!
//! - **Per-unit errors**: a single wire message or a single client connection is
//!   bad (`ShortMessage`, `MalformedPayload`, `DerivationError`,
//!   `SocketQueryFailure`, `UnsupportedProtocol`, `TransportTagMismatch`).
//!   The owning loop logs them and moves on.
//! - **Startup errors**: the process cannot do its job at all
//!   (`DeviceUnavailable`, `FilterCompile`, `PubSub` bind failures, listener bind
//!   failures surfacing as `Io`, `ConfigError`). These abort startup.
//!
//! A duplicate phantom and a lookup miss are *outcomes*, not errors; see
//! [`crate::registration::AdmissionOutcome`] and
//! [`crate::registration::RegistrationManager::check_registration`].
//!
//! ## Example Usage
//! ```rust
//! use phantom_station::core::wire::WireMessage;
//! use phantom_station::error::StationError;
//! use tracing::warn;
//!
//! match WireMessage::decode(&[0u8; 39]) {
//!     Err(StationError::ShortMessage { len, .. }) => warn!(len, "short registration message"),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Static error messages shared by log lines and error payloads.
pub mod constants {
    /// Wire decoding
    pub const ERR_MISSING_COVERT: &str = "client request carries no covert address";
    pub const ERR_INVALID_PHANTOM: &str = "phantom address is unspecified";

    /// Capture device
    pub const ERR_DEVICE_NOT_FOUND: &str = "capture device not found";
    pub const ERR_CAPTURE_CLOSED: &str = "capture source closed";

    /// Pub/sub
    pub const ERR_PUBSUB_BIND: &str = "failed to bind registration endpoint";
    pub const ERR_PUBSUB_SUBSCRIBE: &str = "failed to subscribe registration socket";

    /// Dispatch
    pub const ERR_NO_ORIGINAL_DST: &str = "no original destination recorded for socket";
    pub const ERR_TAG_MISMATCH: &str = "transport tag does not match registration";
}

/// Primary error type for all station operations
#[derive(Error, Debug)]
pub enum StationError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Short message: {len} bytes, need at least {needed}")]
    ShortMessage { len: usize, needed: usize },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Payload too large: {0} bytes")]
    OversizedPayload(usize),

    #[error("Key derivation failed: {0}")]
    DerivationError(String),

    #[error("Socket query failed: {0}")]
    SocketQueryFailure(String),

    #[error("Unsupported covert protocol: {0}")]
    UnsupportedProtocol(u32),

    #[error("Transport tag mismatch")]
    TransportTagMismatch,

    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Filter compile failed for '{filter}': {reason}")]
    FilterCompile { filter: String, reason: String },

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Pub/sub error: {0}")]
    PubSub(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StationError {
    /// Whether the error is confined to one message or connection.
    ///
    /// The ingest loop and the dispatcher use this to pick how loudly a
    /// failure is logged. Neither loop stops on a per-unit error.
    pub fn is_per_unit(&self) -> bool {
        matches!(
            self,
            StationError::ShortMessage { .. }
                | StationError::MalformedPayload(_)
                | StationError::OversizedPayload(_)
                | StationError::DerivationError(_)
                | StationError::SocketQueryFailure(_)
                | StationError::UnsupportedProtocol(_)
                | StationError::TransportTagMismatch
                | StationError::Timeout
        )
    }
}

impl From<prost::DecodeError> for StationError {
    fn from(err: prost::DecodeError) -> Self {
        StationError::MalformedPayload(err.to_string())
    }
}

impl From<pcap::Error> for StationError {
    fn from(err: pcap::Error) -> Self {
        StationError::Capture(err.to_string())
    }
}

impl From<zeromq::ZmqError> for StationError {
    fn from(err: zeromq::ZmqError) -> Self {
        StationError::PubSub(err.to_string())
    }
}

/// Type alias for Results using StationError
pub type Result<T> = std::result::Result<T, StationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_display() {
        let err = StationError::ShortMessage { len: 39, needed: 55 };
        assert_eq!(err.to_string(), "Short message: 39 bytes, need at least 55");
    }

    #[test]
    fn test_per_unit_classification() {
        assert!(StationError::MalformedPayload("x".into()).is_per_unit());
        assert!(StationError::UnsupportedProtocol(7).is_per_unit());
        assert!(!StationError::DeviceUnavailable("eth9".into()).is_per_unit());
        assert!(!StationError::ConfigError("bad".into()).is_per_unit());
    }
}
