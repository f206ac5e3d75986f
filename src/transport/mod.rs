//! # Transport
//!
//! Boundaries between the station and the operating system.
//!
//! ## Components
//! - **Pub/Sub**: ZeroMQ SUB socket delivering registration messages
//! - **Original destination**: recovery of the pre-redirect address of an
//!   accepted connection

pub mod original_dst;
pub mod pubsub;

pub use original_dst::{DestinationResolver, LocalAddrResolver, SockOptResolver};
pub use pubsub::RegistrationSubscriber;
