//! Original destination recovery for transparently redirected sockets.
//!
//! Traffic for phantom addresses is redirected to the station's listener by
//! netfilter. The kernel keeps the pre-redirect destination on the socket,
//! readable through `SO_ORIGINAL_DST` for IPv4 and `IP6T_SO_ORIGINAL_DST`
//! for IPv6.

use std::net::SocketAddr;
use tokio::net::TcpStream;

use crate::error::Result;
#[cfg(not(target_os = "linux"))]
use crate::error::StationError;

/// Recovers where an accepted connection was originally headed
pub trait DestinationResolver: Send + Sync {
    fn original_dst(&self, stream: &TcpStream) -> Result<SocketAddr>;
}

/// Reads the netfilter socket options, trying IPv4 first
#[derive(Debug, Default, Clone, Copy)]
pub struct SockOptResolver;

#[cfg(target_os = "linux")]
impl DestinationResolver for SockOptResolver {
    fn original_dst(&self, stream: &TcpStream) -> Result<SocketAddr> {
        use crate::error::{constants, StationError};
        use socket2::SockRef;

        let sock = SockRef::from(stream);
        let addr = match sock.original_dst() {
            Ok(addr) => addr,
            Err(v4_err) => sock.original_dst_ipv6().map_err(|v6_err| {
                StationError::SocketQueryFailure(format!(
                    "{}: v4: {v4_err}, v6: {v6_err}",
                    constants::ERR_NO_ORIGINAL_DST
                ))
            })?,
        };

        addr.as_socket().ok_or_else(|| {
            StationError::SocketQueryFailure(constants::ERR_NO_ORIGINAL_DST.to_string())
        })
    }
}

#[cfg(not(target_os = "linux"))]
impl DestinationResolver for SockOptResolver {
    fn original_dst(&self, _stream: &TcpStream) -> Result<SocketAddr> {
        Err(StationError::SocketQueryFailure(
            "original destination lookup requires Linux".to_string(),
        ))
    }
}

/// Uses the socket's local address, for listeners bound directly on phantoms
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalAddrResolver;

impl DestinationResolver for LocalAddrResolver {
    fn original_dst(&self, stream: &TcpStream) -> Result<SocketAddr> {
        Ok(stream.local_addr()?)
    }
}
