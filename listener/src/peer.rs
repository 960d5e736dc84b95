//! Bitcoin peer information structures and utilities.

use crate::wire::VersionPayload;
use bitcoin::p2p::ServiceFlags;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Protocol version advertised when none is configured.
///
/// Bitcoin Core 0.13.2 and later speak 70015 (BIP-141/143/147, SegWit).
pub const DEFAULT_PROTOCOL_VERSION: u32 = 70015;

/// Represents the service state of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerServices {
    /// Known services with specific ServiceFlags.
    Known(ServiceFlags),
    /// Unknown services state.
    Unknown,
}

/// Represents the protocol version of a peer.
///
/// * **106** - Added the sender address, nonce and user agent to `version`.
/// * **209** - Added the message checksum.
/// * **60002** - BIP 0035, added mempool message.
/// * **70001** - BIP 0037, added the relay flag to `version`.
/// * **70015** - BIP 0141/BIP 0143/BIP 0147, SegWit support.
/// * **70016** - BIP 0155/BIP 0339, addrv2 and wtxid relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerProtocolVersion {
    /// Known protocol version.
    Known(u32),
    /// Unknown protocol version.
    Unknown,
}

impl PeerProtocolVersion {
    /// Returns the protocol version value if known, or a default value if unknown.
    pub fn unwrap_or(self, default: u32) -> u32 {
        match self {
            PeerProtocolVersion::Known(v) => v,
            PeerProtocolVersion::Unknown => default,
        }
    }
}

impl fmt::Display for PeerProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerProtocolVersion::Known(v) => write!(f, "{v}"),
            PeerProtocolVersion::Unknown => write!(f, "unknown"),
        }
    }
}

/// The remote end of a session.
///
/// Address and port come from the connection's remote endpoint. The rest is
/// unknown until the peer's `version` message has been received.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Peer {
    /// The peer's IP address.
    pub address: IpAddr,
    /// The port number of the connection.
    pub port: u16,
    /// The service flags advertised by the peer.
    pub services: PeerServices,
    /// The protocol version of the peer.
    pub version: PeerProtocolVersion,
    /// Software identifier advertised by the peer.
    pub user_agent: Option<String>,
    /// Best block height advertised by the peer.
    pub start_height: Option<i32>,
}

impl Peer {
    /// Create a new peer with unknown services and version.
    pub fn new(address: IpAddr, port: u16) -> Self {
        Peer {
            address,
            port,
            services: PeerServices::Unknown,
            version: PeerProtocolVersion::Unknown,
            user_agent: None,
            start_height: None,
        }
    }

    /// Socket address of the peer.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Checks if the peer advertises the specified service.
    pub fn has_service(&self, service: ServiceFlags) -> bool {
        match self.services {
            PeerServices::Known(flags) => flags.has(service),
            PeerServices::Unknown => false,
        }
    }

    /// Returns a new Peer updated with what the peer announced in its `version` message.
    pub fn with_version_payload(&self, version: &VersionPayload) -> Self {
        Peer {
            address: self.address,
            port: self.port,
            services: PeerServices::Known(version.services),
            version: PeerProtocolVersion::Known(version.protocol_version),
            user_agent: Some(version.user_agent.clone()),
            start_height: Some(version.start_height),
        }
    }
}

impl From<SocketAddr> for Peer {
    fn from(addr: SocketAddr) -> Self {
        Peer::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ([peer] services: {}, version: {}, user agent: {})",
            self.socket_addr(),
            match self.services {
                PeerServices::Known(flags) => flags.to_string(),
                PeerServices::Unknown => "unknown".to_string(),
            },
            self.version,
            self.user_agent.as_deref().unwrap_or("unknown"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_peer_from_socket_addr() {
        let socket = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 8333);
        let peer = Peer::from(socket);

        assert_eq!(peer.socket_addr(), socket);
        assert_eq!(peer.services, PeerServices::Unknown);
        assert_eq!(peer.version, PeerProtocolVersion::Unknown);
        assert!(!peer.has_service(ServiceFlags::NETWORK));
    }

    #[test]
    fn test_with_version_payload() {
        let peer = Peer::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 18444);
        let version = VersionPayload {
            protocol_version: 70016,
            services: ServiceFlags::NETWORK | ServiceFlags::WITNESS,
            user_agent: "/Satoshi:27.0.0/".to_string(),
            start_height: 12,
            ..VersionPayload::default()
        };

        let updated = peer.with_version_payload(&version);

        assert_eq!(updated.version, PeerProtocolVersion::Known(70016));
        assert!(updated.has_service(ServiceFlags::WITNESS));
        assert_eq!(updated.user_agent.as_deref(), Some("/Satoshi:27.0.0/"));
        assert_eq!(updated.start_height, Some(12));
        assert_eq!(updated.socket_addr(), peer.socket_addr());
    }

    #[test]
    fn test_protocol_version_unwrap_or() {
        assert_eq!(PeerProtocolVersion::Known(70001).unwrap_or(1), 70001);
        assert_eq!(
            PeerProtocolVersion::Unknown.unwrap_or(DEFAULT_PROTOCOL_VERSION),
            DEFAULT_PROTOCOL_VERSION
        );
    }
}
