//! Registration ingest loop.
//!
//! Consumes raw registration messages in channel order and feeds the
//! [`RegistrationManager`]. Every message is attacker-reachable, so no single
//! message can end the loop: failures are logged, counted and skipped.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Level};

use crate::config::LivenessConfig;
use crate::core::WireMessage;
use crate::error::{Result, StationError};
use crate::registration::{AdmissionOutcome, RegistrationManager};
use crate::utils::metrics::StationMetrics;

/// What happened to one well-formed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Inserted into the table
    Admitted(IpAddr),
    /// A live registration already owns the phantom
    Duplicate(IpAddr),
    /// The table is full, or the registration aged out before admission
    Rejected(IpAddr),
    /// The phantom answered a liveness probe, so it is a real host
    LiveHost(IpAddr),
}

/// Checks whether a phantom address is actually in use by a real host.
#[derive(Debug, Clone)]
pub struct LivenessProbe {
    ports: Vec<u16>,
    timeout: Duration,
}

impl LivenessProbe {
    pub fn new(ports: Vec<u16>, timeout: Duration) -> Self {
        Self { ports, timeout }
    }

    /// Probe built from config, `None` when probing is disabled
    pub fn from_config(config: &LivenessConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.probe_ports.clone(), config.probe_timeout))
    }

    /// True if any probe port accepts a TCP connection within the timeout.
    pub async fn answers(&self, phantom: IpAddr) -> bool {
        for &port in &self.ports {
            let addr = SocketAddr::new(phantom, port);
            if let Ok(Ok(_)) = tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
                debug!(%addr, "Phantom answered liveness probe");
                return true;
            }
        }
        false
    }
}

/// Sequential consumer of registration messages
pub struct RegistrationIngest {
    manager: Arc<RegistrationManager>,
    metrics: Arc<StationMetrics>,
    probe: Option<LivenessProbe>,
}

impl RegistrationIngest {
    pub fn new(manager: Arc<RegistrationManager>, metrics: Arc<StationMetrics>) -> Self {
        Self {
            manager,
            metrics,
            probe: None,
        }
    }

    pub fn with_probe(mut self, probe: Option<LivenessProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Run one message through decode, derive, liveness and admission.
    ///
    /// # Errors
    /// Per-message errors only: `ShortMessage`, `MalformedPayload` and
    /// `DerivationError`. The table is untouched when an error is returned.
    pub async fn ingest_message(&self, msg: &[u8]) -> Result<IngestOutcome> {
        self.metrics.message_received();

        let WireMessage {
            secret,
            fixed,
            flags,
            request,
        } = WireMessage::decode(msg).inspect_err(|_| self.metrics.decode_error())?;

        let keys = secret
            .into_keys()
            .inspect_err(|_| self.metrics.derivation_error())?;

        let reg = self.manager.new_registration(&request, &fixed, keys, flags);
        let phantom = reg.phantom();

        if self.manager.phantom_is_live(phantom) {
            debug!(%phantom, "Dropping registration for live phantom");
            self.metrics.registration_duplicate();
            return Ok(IngestOutcome::Duplicate(phantom));
        }

        if let Some(probe) = &self.probe {
            if probe.answers(phantom).await {
                warn!(%phantom, "Phantom is a live host, dropping registration");
                self.metrics.probe_rejection();
                return Ok(IngestOutcome::LiveHost(phantom));
            }
        }

        let summary = reg.to_string();
        match self.manager.admit(reg, std::time::Instant::now()) {
            AdmissionOutcome::Admitted | AdmissionOutcome::Replaced => {
                info!(registration = %summary, "New registration");
                self.metrics.registration_admitted();
                Ok(IngestOutcome::Admitted(phantom))
            }
            AdmissionOutcome::Duplicate => {
                // Lost a race with another admission after the liveness check
                debug!(%phantom, "Dropping registration for live phantom");
                self.metrics.registration_duplicate();
                Ok(IngestOutcome::Duplicate(phantom))
            }
            AdmissionOutcome::Full | AdmissionOutcome::Expired => {
                self.metrics.registration_rejected();
                Ok(IngestOutcome::Rejected(phantom))
            }
        }
    }

    /// Consume `messages` until the stream ends or `cancel` fires.
    #[instrument(skip_all, name = "ingest")]
    pub async fn run<S>(&self, messages: S, cancel: CancellationToken)
    where
        S: Stream<Item = Bytes> + Unpin,
    {
        let mut messages = messages;
        info!("Registration ingest started");

        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break,
                next = messages.next() => match next {
                    Some(msg) => msg,
                    None => {
                        warn!("Registration channel closed");
                        break;
                    }
                },
            };

            if let Err(e) = self.ingest_message(&msg).await {
                log_rejected(&e, msg.len());
            }
        }

        info!("Registration ingest stopped");
    }
}

/// Log level for a message the loop discards.
///
/// Short reads are routine noise. Other per-message failures are worth a
/// warning, and anything wider than the message is an error.
fn rejection_level(err: &StationError) -> Level {
    match err {
        StationError::ShortMessage { .. } => Level::DEBUG,
        e if e.is_per_unit() => Level::WARN,
        _ => Level::ERROR,
    }
}

fn log_rejected(err: &StationError, len: usize) {
    match rejection_level(err) {
        Level::DEBUG => debug!(len, error = %err, "Discarding registration message"),
        Level::WARN => warn!(len, error = %err, "Discarding registration message"),
        _ => error!(len, error = %err, "Registration ingest failed on message"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_level() {
        let short = StationError::ShortMessage { len: 3, needed: 40 };
        assert_eq!(rejection_level(&short), Level::DEBUG);
        assert_eq!(
            rejection_level(&StationError::MalformedPayload("x".into())),
            Level::WARN
        );
        assert_eq!(
            rejection_level(&StationError::DerivationError("x".into())),
            Level::WARN
        );
        assert_eq!(
            rejection_level(&StationError::PubSub("closed".into())),
            Level::ERROR
        );
    }
}
