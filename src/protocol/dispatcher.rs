//! Connection dispatcher.
//!
//! Every connection redirected to the station's listener goes through
//! [`ConnectionDispatcher::handle_connection`]: recover the original
//! destination, look it up, and hand matched connections to the registration's
//! covert protocol. Anything that is not registration traffic is closed
//! without a response.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::DispatcherConfig;
use crate::error::{Result, StationError};
use crate::protocol::proxy::{ConnectionInfo, ProxyProtocol, ProxySettings};
use crate::registration::RegistrationLookup;
use crate::transport::original_dst::{DestinationResolver, SockOptResolver};
use crate::utils::metrics::{StationMetrics, Timer};
use crate::utils::timeout::SHUTDOWN_TIMEOUT;

/// How a single connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Original destination has no live registration
    NotRegistered(SocketAddr),
    /// Relayed through a covert protocol until one side closed
    Relayed {
        protocol: ProxyProtocol,
        to_covert: u64,
        to_client: u64,
    },
}

/// Accepts redirected connections and routes them to covert handlers
pub struct ConnectionDispatcher {
    lookup: Arc<dyn RegistrationLookup>,
    resolver: Arc<dyn DestinationResolver>,
    metrics: Arc<StationMetrics>,
    settings: ProxySettings,
}

impl ConnectionDispatcher {
    pub fn new(lookup: Arc<dyn RegistrationLookup>, metrics: Arc<StationMetrics>) -> Self {
        Self {
            lookup,
            resolver: Arc::new(SockOptResolver),
            metrics,
            settings: ProxySettings::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn DestinationResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_settings(mut self, settings: ProxySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_config(self, config: &DispatcherConfig) -> Self {
        self.with_settings(ProxySettings {
            connect_timeout: config.connect_timeout,
            preamble_timeout: config.preamble_timeout,
        })
    }

    /// Bind the listener. Failure here is fatal to startup.
    pub async fn bind(addr: &str) -> Result<TcpListener> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!(%addr, error = %e, "Failed to bind listener");
            StationError::Io(e)
        })?;
        info!(addr = %listener.local_addr()?, "Dispatcher listening");
        Ok(listener)
    }

    /// Accept until `cancel` fires, spawning one task per connection.
    ///
    /// On cancellation, waits up to the shutdown timeout for in-flight
    /// connections to finish before returning.
    #[instrument(skip_all, name = "dispatcher")]
    pub async fn serve(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let dispatcher = Arc::clone(&self);
                        tokio::spawn(async move {
                            // Outcome and errors are logged inside
                            let _ = dispatcher.handle_connection(stream, peer).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        // Back off so descriptor exhaustion does not spin the loop
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
            }
        }

        self.drain().await;
        Ok(())
    }

    async fn drain(&self) {
        let deadline = tokio::time::Instant::now() + SHUTDOWN_TIMEOUT;
        loop {
            let active = self.metrics.snapshot().connections_active;
            if active == 0 {
                info!("All connections closed, dispatcher stopped");
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(active, "Shutdown timeout reached, abandoning connections");
                return;
            }
            debug!(active, "Waiting for connections to close");
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    /// Serve one accepted connection to completion.
    ///
    /// Errors are logged and counted here and also returned so callers can
    /// observe them; they never affect other connections.
    pub async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> Result<DispatchOutcome> {
        self.metrics.connection_opened();
        let result = self.dispatch(stream, peer).await;
        self.metrics.connection_closed();

        match &result {
            Ok(DispatchOutcome::NotRegistered(_)) => {}
            Ok(DispatchOutcome::Relayed {
                protocol,
                to_covert,
                to_client,
            }) => {
                debug!(%peer, protocol = protocol.name(), to_covert, to_client, "Connection finished");
            }
            Err(e) if e.is_per_unit() => {
                self.metrics.connection_error();
                debug!(%peer, error = %e, "Connection closed with error");
            }
            Err(e) => {
                self.metrics.connection_error();
                warn!(%peer, error = %e, "Connection failed");
            }
        }
        result
    }

    async fn dispatch(&self, mut stream: TcpStream, peer: SocketAddr) -> Result<DispatchOutcome> {
        let original_dst = self.resolver.original_dst(&stream)?;

        let Some(reg) = self.lookup.lookup(original_dst.ip(), original_dst.port()) else {
            return Ok(DispatchOutcome::NotRegistered(original_dst));
        };
        self.metrics.connection_matched();

        let protocol = ProxyProtocol::from_id(reg.transport())?;
        info!(%peer, %original_dst, covert = reg.covert(), protocol = protocol.name(), "Dispatching registered connection");

        let _timer = Timer::start("covert_relay");
        let conn = ConnectionInfo {
            client: peer,
            original_dst,
        };
        let (to_covert, to_client) = protocol
            .handle(&reg, &mut stream, &conn, &self.settings)
            .await?;

        Ok(DispatchOutcome::Relayed {
            protocol,
            to_covert,
            to_client,
        })
    }
}
