//! Covert protocol handlers.
//!
//! A matched connection is handed to exactly one [`ProxyProtocol`] variant,
//! chosen by the transport id the client put in its registration. Each
//! variant owns the client stream until either side closes.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use subtle::ConstantTimeEq;
use tokio::io::{copy_bidirectional, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, instrument};

use crate::core::RegistrationFlags;
use crate::error::{constants, Result, StationError};
use crate::registration::Registration;
use crate::utils::timeout::{with_timeout_error, DEFAULT_TIMEOUT};

/// Length of the tag a Min client sends before any payload
pub const MIN_TAG_LEN: usize = 32;

/// Supported covert protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyProtocol {
    /// Relay bytes unchanged
    Null,
    /// Client proves knowledge of the registration keys, then relay
    Min,
}

impl ProxyProtocol {
    /// Map a registration's transport id to a handler.
    ///
    /// # Errors
    /// `UnsupportedProtocol` for any id this station does not implement.
    pub fn from_id(id: u32) -> Result<Self> {
        match id {
            0 => Ok(ProxyProtocol::Null),
            1 => Ok(ProxyProtocol::Min),
            other => Err(StationError::UnsupportedProtocol(other)),
        }
    }

    pub fn id(self) -> u32 {
        match self {
            ProxyProtocol::Null => 0,
            ProxyProtocol::Min => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProxyProtocol::Null => "null",
            ProxyProtocol::Min => "min",
        }
    }

    /// Serve one client connection for `reg`.
    ///
    /// Returns the byte counts relayed client→covert and covert→client.
    #[instrument(skip_all, fields(protocol = self.name(), phantom = %reg.phantom()))]
    pub async fn handle<S>(
        self,
        reg: &Registration,
        client: &mut S,
        conn: &ConnectionInfo,
        settings: &ProxySettings,
    ) -> Result<(u64, u64)>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if self == ProxyProtocol::Min {
            verify_transport_tag(reg, client, settings.preamble_timeout).await?;
        }

        let mut covert = with_timeout_error(
            async { Ok(TcpStream::connect(reg.covert()).await?) },
            settings.connect_timeout,
        )
        .await?;
        debug!(covert = reg.covert(), "Connected to covert target");

        if reg.flags().contains(RegistrationFlags::PROXY_HEADER) {
            covert
                .write_all(proxy_v1_header(conn.client, conn.original_dst).as_bytes())
                .await?;
        }

        let counts = copy_bidirectional(client, &mut covert).await?;
        Ok(counts)
    }
}

/// Addresses of one accepted connection
#[derive(Debug, Clone, Copy)]
pub struct ConnectionInfo {
    /// Remote end of the accepted socket
    pub client: SocketAddr,
    /// Destination before transparent redirection
    pub original_dst: SocketAddr,
}

/// Deadlines applied by every handler
#[derive(Debug, Clone, Copy)]
pub struct ProxySettings {
    pub connect_timeout: Duration,
    pub preamble_timeout: Duration,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            preamble_timeout: DEFAULT_TIMEOUT,
        }
    }
}

async fn verify_transport_tag<S>(reg: &Registration, client: &mut S, deadline: Duration) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    let mut tag = [0u8; MIN_TAG_LEN];
    with_timeout_error(
        async {
            client.read_exact(&mut tag).await?;
            Ok(())
        },
        deadline,
    )
    .await?;

    if bool::from(tag.ct_eq(&reg.keys().transport_tag)) {
        Ok(())
    } else {
        debug!("{}", constants::ERR_TAG_MISMATCH);
        Err(StationError::TransportTagMismatch)
    }
}

/// PROXY protocol v1 line describing the client and its original destination
pub fn proxy_v1_header(client: SocketAddr, original_dst: SocketAddr) -> String {
    match (client.ip().to_canonical(), original_dst.ip().to_canonical()) {
        (IpAddr::V4(src), IpAddr::V4(dst)) => format!(
            "PROXY TCP4 {src} {dst} {} {}\r\n",
            client.port(),
            original_dst.port()
        ),
        (src, dst) => format!(
            "PROXY TCP6 {} {} {} {}\r\n",
            as_v6(src),
            as_v6(dst),
            client.port(),
            original_dst.port()
        ),
    }
}

fn as_v6(ip: IpAddr) -> std::net::Ipv6Addr {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    }
}
