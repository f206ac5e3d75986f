//! # Utility Modules
//!
//! Supporting utilities shared by the station components.
//!
//! ## Components
//! - **Logging**: tracing subscriber setup from configuration
//! - **Metrics**: atomic counters with periodic snapshots
//! - **Timeout**: async deadline helpers and default durations

pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{MetricsSnapshot, StationMetrics};
