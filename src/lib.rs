//! # Phantom Station
//!
//! Registration and matching core of a refraction networking station.
//!
//! Clients register out of band through a registrar, which publishes one
//! message per registration to the station. The station derives the
//! registration's keys, reserves the client's chosen phantom address, and
//! later recognises connections to that phantom, either as redirected TCP
//! connections or as frames on a capture device, and forwards them to the
//! client's covert destination. Everything else is left alone.
//!
//! ## Components
//! - **core**: wire codec, client request record, key derivation
//! - **registration**: the concurrent registration table
//! - **protocol**: ingest loop, connection dispatcher, covert protocols
//! - **detector**: passive capture pipeline
//! - **transport**: pub/sub socket and original-destination recovery
//! - **station**: startup and task ownership
//!
//! ## Security
//! - Registration messages are untrusted; decoding is bounds-checked and
//!   all-or-nothing
//! - Shared secrets and derived keys are zeroized on drop and never logged
//! - Connections that match no registration are closed without a response

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod core;
pub mod detector;
pub mod error;
pub mod protocol;
pub mod registration;
pub mod station;
pub mod transport;
pub mod utils;

pub use config::StationConfig;
pub use error::{Result, StationError};
pub use registration::{Registration, RegistrationLookup, RegistrationManager};
