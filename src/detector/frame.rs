//! Captured frame model.
//!
//! Addresses are kept as raw bytes, exactly as long as the network header
//! made them, so the classifier can see malformed lengths instead of having
//! them normalised away.
//!
//! Parsing is lax: a capture cut short by the snapshot length still yields
//! its network and transport headers, with whatever payload was captured.

use etherparse::{LaxNetSlice, LaxSlicedPacket, TransportSlice};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Transport header fields the detector cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportHeader {
    Tcp { src_port: u16, dst_port: u16 },
    Udp { src_port: u16, dst_port: u16 },
}

/// One frame off the capture device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    /// Bytes captured, which may be fewer than were on the wire
    pub caplen: u32,
    pub src: Vec<u8>,
    pub dst: Vec<u8>,
    pub transport: Option<TransportHeader>,
    /// Application payload above the transport header
    pub payload: Vec<u8>,
}

impl CapturedFrame {
    /// Parse a frame captured on an Ethernet link.
    ///
    /// Returns `None` for frames without an IP layer. Frames truncated by
    /// the snapshot length are still parsed.
    pub fn from_ethernet(caplen: u32, data: &[u8]) -> Option<Self> {
        LaxSlicedPacket::from_ethernet(data)
            .ok()
            .and_then(|packet| Self::from_sliced(caplen, &packet))
    }

    /// Parse a frame captured on a raw IP link.
    pub fn from_ip(caplen: u32, data: &[u8]) -> Option<Self> {
        LaxSlicedPacket::from_ip(data)
            .ok()
            .and_then(|packet| Self::from_sliced(caplen, &packet))
    }

    fn from_sliced(caplen: u32, packet: &LaxSlicedPacket<'_>) -> Option<Self> {
        let (src, dst) = match packet.net.as_ref()? {
            LaxNetSlice::Ipv4(ip) => (
                ip.header().source().to_vec(),
                ip.header().destination().to_vec(),
            ),
            LaxNetSlice::Ipv6(ip) => (
                ip.header().source().to_vec(),
                ip.header().destination().to_vec(),
            ),
            #[allow(unreachable_patterns)]
            _ => return None,
        };

        let (transport, payload) = match packet.transport.as_ref() {
            Some(TransportSlice::Tcp(tcp)) => (
                Some(TransportHeader::Tcp {
                    src_port: tcp.source_port(),
                    dst_port: tcp.destination_port(),
                }),
                tcp.payload().to_vec(),
            ),
            Some(TransportSlice::Udp(udp)) => (
                Some(TransportHeader::Udp {
                    src_port: udp.source_port(),
                    dst_port: udp.destination_port(),
                }),
                udp.payload().to_vec(),
            ),
            _ => (None, Vec::new()),
        };

        Some(Self {
            caplen,
            src,
            dst,
            transport,
            payload,
        })
    }

    /// TCP destination port, if this is a TCP frame
    pub fn tcp_dst_port(&self) -> Option<u16> {
        match self.transport {
            Some(TransportHeader::Tcp { dst_port, .. }) => Some(dst_port),
            _ => None,
        }
    }

    pub fn src_ip(&self) -> Option<IpAddr> {
        raw_to_ip(&self.src)
    }

    /// Destination as an address, `None` unless it is 4 or 16 bytes
    pub fn dst_ip(&self) -> Option<IpAddr> {
        raw_to_ip(&self.dst)
    }
}

fn raw_to_ip(raw: &[u8]) -> Option<IpAddr> {
    if let Ok(v4) = <[u8; 4]>::try_from(raw) {
        return Some(IpAddr::V4(Ipv4Addr::from(v4)));
    }
    <[u8; 16]>::try_from(raw)
        .ok()
        .map(|v6| IpAddr::V6(Ipv6Addr::from(v6)))
}

/// Formats one side of a flow, falling back to hex for odd lengths
struct Endpoint<'a>(&'a [u8]);

impl fmt::Display for Endpoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match raw_to_ip(self.0) {
            Some(ip) => write!(f, "{ip}"),
            None => {
                for b in self.0 {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for CapturedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", Endpoint(&self.src), Endpoint(&self.dst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;

    fn tcp_frame(payload: &[u8]) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4([192, 0, 2, 10], [10, 0, 0, 5], 64)
            .tcp(50000, 443, 1, 65535);
        let mut out = Vec::with_capacity(builder.size(payload.len()));
        #[allow(clippy::expect_used)]
        builder.write(&mut out, payload).expect("build frame");
        out
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_parse_ethernet_tcp() {
        let data = tcp_frame(b"hello");
        let frame = CapturedFrame::from_ethernet(data.len() as u32, &data).expect("parse");
        assert_eq!(frame.src, vec![192, 0, 2, 10]);
        assert_eq!(frame.dst_ip(), Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))));
        assert_eq!(frame.tcp_dst_port(), Some(443));
        assert_eq!(frame.payload, b"hello");
        assert_eq!(frame.to_string(), "192.0.2.10 -> 10.0.0.5");
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_parse_raw_ipv6_udp() {
        let builder = PacketBuilder::ipv6([0x20; 16], [0x30; 16], 64).udp(5353, 53);
        let mut data = Vec::new();
        builder.write(&mut data, b"q").expect("build frame");

        let frame = CapturedFrame::from_ip(data.len() as u32, &data).expect("parse");
        assert_eq!(frame.dst.len(), 16);
        assert_eq!(frame.tcp_dst_port(), None);
        assert!(matches!(frame.transport, Some(TransportHeader::Udp { dst_port: 53, .. })));
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_snaplen_truncated_frame_parses() {
        let data = tcp_frame(&[0xAB; 2000]);
        let frame = CapturedFrame::from_ethernet(1600, &data[..1600]).expect("parse");
        assert_eq!(frame.dst_ip(), Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))));
        assert_eq!(frame.tcp_dst_port(), Some(443));
        // Ethernet 14 + IPv4 20 + TCP 20 bytes of headers precede the payload
        assert_eq!(frame.payload.len(), 1600 - 54);
    }

    #[test]
    fn test_garbage_is_not_a_frame() {
        assert!(CapturedFrame::from_ethernet(3, &[0, 1, 2]).is_none());
    }

    #[test]
    fn test_odd_length_address_display() {
        let frame = CapturedFrame {
            caplen: 0,
            src: vec![1, 2, 3, 4],
            dst: vec![0xde, 0xad, 0xbe, 0xef, 0, 1],
            transport: None,
            payload: Vec::new(),
        };
        assert_eq!(frame.dst_ip(), None);
        assert_eq!(frame.to_string(), "1.2.3.4 -> deadbeef0001");
    }
}
