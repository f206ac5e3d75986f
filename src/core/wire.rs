//! Registration message codec.
//!
//! One message per registration event arrives on the pub/sub channel. The
//! layout is a fixed-width prefix followed by a protobuf payload:
//!
//! ```text
//! offset  size  field
//! 0       32    shared secret
//! 32      2     payload length (u16, big-endian)
//! 34      2     phantom port (u16, big-endian, 0 = any)
//! 36      2     reserved
//! 38      16    phantom address (IPv6, or IPv4-mapped)
//! 54      1     flags
//! 55      N     ClientToStation payload
//! ```
//!
//! The whole buffer is untrusted. Decoding never slices past what the length
//! checks have proven is present, and returns either a complete message or an
//! error.

use prost::Message;
use std::net::{IpAddr, Ipv6Addr};

use crate::core::flags::RegistrationFlags;
use crate::core::keys::{SharedSecret, SHARED_SECRET_LEN};
use crate::core::request::ClientToStation;
use crate::error::{constants, Result, StationError};

/// Width of the fixed field block following the secret
pub const FIXED_BLOCK_LEN: usize = 22;

/// Width of the flags field
pub const FLAGS_LEN: usize = 1;

/// Smallest buffer that can hold a message with an empty payload
pub const MIN_MESSAGE_LEN: usize = SHARED_SECRET_LEN + FIXED_BLOCK_LEN + FLAGS_LEN;

/// Largest payload the u16 length prefix can describe
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

const PAYLOAD_LEN_OFFSET: usize = 0;
const PHANTOM_PORT_OFFSET: usize = 2;
const PHANTOM_OFFSET: usize = 6;

/// Decoded fixed field block.
///
/// The payload length is not kept here: it describes the encoded request and
/// is recomputed on every encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedFields {
    /// Address the client will connect to, in canonical form (IPv4-mapped
    /// addresses decode as IPv4)
    pub phantom: IpAddr,
    /// Destination port restriction, `None` when any port matches. Encoded as
    /// 0, so `Some(0)` is written the same as `None`.
    pub phantom_port: Option<u16>,
}

impl FixedFields {
    /// Parse the block, returning the declared payload length alongside it
    fn parse(block: &[u8; FIXED_BLOCK_LEN]) -> Result<(u16, Self)> {
        let payload_len = u16::from_be_bytes([
            block[PAYLOAD_LEN_OFFSET],
            block[PAYLOAD_LEN_OFFSET + 1],
        ]);
        let port = u16::from_be_bytes([block[PHANTOM_PORT_OFFSET], block[PHANTOM_PORT_OFFSET + 1]]);

        let mut octets = [0u8; 16];
        octets.copy_from_slice(&block[PHANTOM_OFFSET..]);
        let phantom = Ipv6Addr::from(octets).to_canonical();
        if phantom.is_unspecified() {
            return Err(StationError::MalformedPayload(
                constants::ERR_INVALID_PHANTOM.to_string(),
            ));
        }

        Ok((
            payload_len,
            Self {
                phantom,
                phantom_port: (port != 0).then_some(port),
            },
        ))
    }

    fn write(&self, payload_len: u16, out: &mut Vec<u8>) {
        out.extend_from_slice(&payload_len.to_be_bytes());
        out.extend_from_slice(&self.phantom_port.unwrap_or(0).to_be_bytes());
        out.extend_from_slice(&[0, 0]);
        let mapped = match self.phantom {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        out.extend_from_slice(&mapped.octets());
    }
}

/// A complete registration message
#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    pub secret: SharedSecret,
    pub fixed: FixedFields,
    pub flags: RegistrationFlags,
    pub request: ClientToStation,
}

impl WireMessage {
    /// Assemble a message, normalizing the phantom and port the way decode
    /// reports them.
    pub fn new(
        secret: SharedSecret,
        phantom: IpAddr,
        phantom_port: Option<u16>,
        flags: RegistrationFlags,
        request: ClientToStation,
    ) -> Self {
        Self {
            secret,
            fixed: FixedFields {
                phantom: phantom.to_canonical(),
                phantom_port: phantom_port.filter(|p| *p != 0),
            },
            flags,
            request,
        }
    }

    /// Decode one message from an untrusted buffer.
    ///
    /// # Errors
    /// - `ShortMessage` if the buffer is below [`MIN_MESSAGE_LEN`] or the
    ///   declared payload runs past the end of the buffer
    /// - `MalformedPayload` if the phantom is unspecified or the payload is not
    ///   a usable `ClientToStation` record
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < MIN_MESSAGE_LEN {
            return Err(StationError::ShortMessage {
                len: buf.len(),
                needed: MIN_MESSAGE_LEN,
            });
        }

        let (secret_bytes, rest) = buf.split_at(SHARED_SECRET_LEN);
        let (block, rest) = rest.split_at(FIXED_BLOCK_LEN);
        let (flag_byte, body) = rest.split_at(FLAGS_LEN);

        let block: &[u8; FIXED_BLOCK_LEN] = block
            .try_into()
            .map_err(|_| StationError::MalformedPayload("fixed block width".to_string()))?;
        let (declared_len, fixed) = FixedFields::parse(block)?;

        let payload_len = usize::from(declared_len);
        if payload_len > body.len() {
            return Err(StationError::ShortMessage {
                len: buf.len(),
                needed: MIN_MESSAGE_LEN + payload_len,
            });
        }

        // Trailing bytes past the declared payload are ignored
        let request = ClientToStation::from_payload(&body[..payload_len])?;
        let secret = SharedSecret::from_slice(secret_bytes)?;

        Ok(Self {
            secret,
            fixed,
            flags: RegistrationFlags::from_wire(flag_byte[0]),
            request,
        })
    }

    /// Encode to wire bytes.
    ///
    /// # Errors
    /// Returns `OversizedPayload` if the encoded request does not fit the u16
    /// length prefix.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = self.request.encode_to_vec();
        let payload_len = u16::try_from(payload.len())
            .map_err(|_| StationError::OversizedPayload(payload.len()))?;

        let mut out = Vec::with_capacity(MIN_MESSAGE_LEN + payload.len());
        out.extend_from_slice(self.secret.as_bytes());
        self.fixed.write(payload_len, &mut out);
        out.push(self.flags.bits());
        out.extend_from_slice(&payload);
        Ok(out)
    }
}
