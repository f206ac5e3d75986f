//! # Core Registration Components
//!
//! Wire decoding, the structured client request record, registration flags and
//! key derivation.
//!
//! Everything in this module is synchronous and free of I/O so it can be
//! exercised directly from tests, benches and the fuzzer.
//!
//! ## Components
//! - **Wire**: fixed header + variable payload message delivered over pub/sub
//! - **Request**: `ClientToStation` protobuf record carried in the payload
//! - **Flags**: registration behaviour bits
//! - **Keys**: HKDF expansion of the per-client shared secret
//!
//! ## Wire Format
//! ```text
//! [Secret(32)] [PayloadLen(2)] [PhantomPort(2)] [Reserved(2)] [Phantom(16)] [Flags(1)] [Payload(N)]
//! ```
//!
//! ## Security
//! - Every length is checked against the real buffer before slicing
//! - Messages shorter than 55 bytes are rejected before any field is read
//! - The payload length is a u16, so a single payload never exceeds 64 KiB

pub mod flags;
pub mod keys;
pub mod request;
pub mod wire;

pub use flags::RegistrationFlags;
pub use keys::{derive_keys, DerivedKeys, SharedSecret};
pub use request::ClientToStation;
pub use wire::{FixedFields, WireMessage};
