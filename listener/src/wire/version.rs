//! Payload of the `version` handshake message.
//!
//! See the [protocol documentation](https://en.bitcoin.it/wiki/Protocol_documentation#version).
//!
//! Older peers omit fields which were added to the message over time, so every
//! field after the receiver address is optional on decode. Decoding stops at
//! the end of the input and leaves the missing fields at their zero value.

use super::address::{AddressFormat, NetworkAddress};
use super::{PayloadReader, WireError};
use bitcoin::p2p::ServiceFlags;
use std::net::SocketAddr;

/// Minimum protocol version that carries the trailing relay flag (BIP-37).
pub const RELAY_MIN_PROTOCOL_VERSION: u32 = 70001;

/// Longest user agent that fits the single byte length prefix.
///
/// Lengths of 253 and above collide with the multi-byte CompactSize markers
/// used by other implementations, so they are never written.
pub const MAX_USER_AGENT_LENGTH: usize = 252;

/// The `version` message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPayload {
    /// Highest protocol version understood by the sender.
    pub protocol_version: u32,
    /// Services supported by the sender.
    pub services: ServiceFlags,
    /// Sender's unix timestamp in seconds.
    pub timestamp: u64,
    /// Address of the node receiving the message.
    pub addr_receiver: NetworkAddress,
    /// Address of the node sending the message.
    pub addr_from: NetworkAddress,
    /// Random value used to detect connections to self.
    pub nonce: u64,
    /// Software identifier of the sender, may be empty.
    pub user_agent: String,
    /// Height of the sender's best block.
    pub start_height: i32,
    /// Whether the receiver should announce transactions to the sender.
    pub relay: bool,
}

impl Default for VersionPayload {
    fn default() -> Self {
        Self {
            protocol_version: 0,
            services: ServiceFlags::NONE,
            timestamp: 0,
            addr_receiver: NetworkAddress::default(),
            addr_from: NetworkAddress::default(),
            nonce: 0,
            user_agent: String::new(),
            start_height: 0,
            relay: false,
        }
    }
}

impl VersionPayload {
    /// Version payload introducing a non-listening node to the peer at `peer`.
    ///
    /// The sender address is left unspecified and no services are advertised.
    pub fn for_peer(
        protocol_version: u32,
        peer: SocketAddr,
        timestamp: u64,
        nonce: u64,
        user_agent: &str,
    ) -> Self {
        Self {
            protocol_version,
            services: ServiceFlags::NONE,
            timestamp,
            addr_receiver: NetworkAddress::new(peer, ServiceFlags::NONE),
            addr_from: NetworkAddress::default(),
            nonce,
            user_agent: user_agent.to_string(),
            start_height: 0,
            relay: false,
        }
    }

    /// Serialize the payload.
    ///
    /// User agents longer than [`MAX_USER_AGENT_LENGTH`] bytes are truncated.
    /// The relay flag is only written for protocol versions that know it.
    pub fn encode(&self) -> Vec<u8> {
        let user_agent = self.user_agent.as_bytes();
        let user_agent = &user_agent[..user_agent.len().min(MAX_USER_AGENT_LENGTH)];

        let mut buf = Vec::with_capacity(4 + 8 + 8 + 26 + 26 + 8 + 1 + user_agent.len() + 4 + 1);
        buf.extend_from_slice(&self.protocol_version.to_le_bytes());
        buf.extend_from_slice(&self.services.to_u64().to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        self.addr_receiver.encode(AddressFormat::Version, &mut buf);
        self.addr_from.encode(AddressFormat::Version, &mut buf);
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.push(user_agent.len() as u8);
        buf.extend_from_slice(user_agent);
        buf.extend_from_slice(&self.start_height.to_le_bytes());
        if self.protocol_version >= RELAY_MIN_PROTOCOL_VERSION {
            buf.push(u8::from(self.relay));
        }

        buf
    }

    /// Deserialize a payload.
    ///
    /// # Errors
    ///
    /// [`WireError::TruncatedInput`] if a mandatory field (protocol version, services,
    /// timestamp, receiver address) is missing, or if an optional field is cut short.
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut reader = PayloadReader::new(payload);

        let mut version = VersionPayload {
            protocol_version: reader.read_u32_le()?,
            services: ServiceFlags::from(reader.read_u64_le()?),
            timestamp: reader.read_u64_le()?,
            addr_receiver: NetworkAddress::decode(&mut reader, AddressFormat::Version)?,
            ..VersionPayload::default()
        };

        if reader.is_empty() {
            return Ok(version);
        }
        version.addr_from = NetworkAddress::decode(&mut reader, AddressFormat::Version)?;

        if reader.is_empty() {
            return Ok(version);
        }
        version.nonce = reader.read_u64_le()?;

        if reader.is_empty() {
            return Ok(version);
        }
        let user_agent_len = reader.read_u8()? as usize;
        version.user_agent = String::from_utf8_lossy(reader.read_bytes(user_agent_len)?).into_owned();

        if reader.is_empty() {
            return Ok(version);
        }
        version.start_height = reader.read_i32_le()?;

        if reader.is_empty() {
            return Ok(version);
        }
        version.relay = reader.read_u8()? != 0;

        Ok(version)
    }
}
