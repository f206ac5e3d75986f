//! Client-to-station request record.
//!
//! The schema is owned by the registration clients; the station only reads the
//! fields below. Tags match the deployed protobuf definition, so unknown fields
//! sent by newer clients are skipped by the decoder.

use prost::Message;

use crate::error::{constants, Result, StationError};

/// Registration request the client sends through a registrar.
#[derive(Clone, PartialEq, Message)]
pub struct ClientToStation {
    #[prost(uint32, optional, tag = "1")]
    pub protocol_version: Option<u32>,

    /// Generation of the decoy/phantom list the client selected from
    #[prost(uint32, optional, tag = "2")]
    pub decoy_list_generation: Option<u32>,

    /// Where the client wants to go, as `host:port`
    #[prost(string, optional, tag = "20")]
    pub covert_address: Option<String>,

    /// Decoy server name used to shape masking traffic
    #[prost(string, optional, tag = "21")]
    pub masked_decoy_server_name: Option<String>,

    #[prost(bool, optional, tag = "22")]
    pub v6_support: Option<bool>,

    /// Covert protocol id, see [`crate::protocol::proxy::ProxyProtocol`]
    #[prost(uint32, optional, tag = "24")]
    pub transport: Option<u32>,

    #[prost(bytes = "vec", optional, tag = "100")]
    pub padding: Option<Vec<u8>>,
}

impl ClientToStation {
    /// Decode a record from the variable-length segment of a wire message.
    ///
    /// A record without a covert address cannot become a registration and is
    /// treated the same as bytes that do not parse.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let request = Self::decode(payload)?;
        match request.covert_address.as_deref() {
            Some(addr) if !addr.is_empty() => Ok(request),
            _ => Err(StationError::MalformedPayload(
                constants::ERR_MISSING_COVERT.to_string(),
            )),
        }
    }

    /// Covert target, empty when absent
    pub fn covert(&self) -> &str {
        self.covert_address.as_deref().unwrap_or_default()
    }

    /// Mask, `None` when absent or empty
    pub fn mask(&self) -> Option<&str> {
        self.masked_decoy_server_name
            .as_deref()
            .filter(|name| !name.is_empty())
    }
}
