//! # Protocol
//!
//! The station's two consumers of the registration table.
//!
//! ## Components
//! - **Ingest**: turns registration messages into table entries
//! - **Dispatcher**: routes redirected connections to covert handlers
//! - **Proxy**: the closed set of covert protocols a connection can use
//!
//! ## Security
//! - Every registration message is untrusted and parsed with bounds checks
//! - Unregistered connections are closed without any bytes written
//! - Min transport tags are compared in constant time

pub mod dispatcher;
pub mod ingest;
pub mod proxy;

pub use dispatcher::{ConnectionDispatcher, DispatchOutcome};
pub use ingest::{IngestOutcome, LivenessProbe, RegistrationIngest};
pub use proxy::{ConnectionInfo, ProxyProtocol, ProxySettings};
