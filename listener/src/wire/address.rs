//! Network address record.
//!
//! See the [protocol documentation](https://en.bitcoin.it/wiki/Protocol_documentation#Network_address).

use super::{PayloadReader, WireError};
use bitcoin::p2p::ServiceFlags;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

/// Layout variants of a network address record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFormat {
    /// Used inside the `version` payload, no leading time field (26 bytes).
    Version,
    /// Used in address list contexts, prefixed with a 4 byte time field (30 bytes).
    Timestamped,
}

impl AddressFormat {
    /// Encoded size of a record in this format.
    pub fn size(self) -> usize {
        match self {
            AddressFormat::Version => 26,
            AddressFormat::Timestamped => 30,
        }
    }
}

/// A peer address as it appears on the wire.
///
/// IPv4 addresses are stored in their IPv4-mapped IPv6 form (`::ffff:a.b.c.d`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkAddress {
    /// Last time the address was seen, only present in [`AddressFormat::Timestamped`] records.
    pub time: u32,
    /// Service flags advertised for the address.
    pub services: ServiceFlags,
    /// IPv6 or IPv4-mapped address.
    pub ip: Ipv6Addr,
    /// Port number.
    pub port: u16,
}

impl Default for NetworkAddress {
    fn default() -> Self {
        Self {
            time: 0,
            services: ServiceFlags::NONE,
            ip: Ipv6Addr::UNSPECIFIED,
            port: 0,
        }
    }
}

impl NetworkAddress {
    /// Create an address record from a socket address.
    pub fn new(socket: SocketAddr, services: ServiceFlags) -> Self {
        let ip = match socket.ip() {
            IpAddr::V4(ipv4) => ipv4.to_ipv6_mapped(),
            IpAddr::V6(ipv6) => ipv6,
        };

        Self {
            time: 0,
            services,
            ip,
            port: socket.port(),
        }
    }

    /// Socket address of the record, IPv4-mapped addresses are returned as IPv4.
    pub fn socket_addr(&self) -> SocketAddr {
        match self.ip.to_ipv4_mapped() {
            Some(ipv4) => SocketAddr::new(IpAddr::V4(ipv4), self.port),
            None => SocketAddr::new(IpAddr::V6(self.ip), self.port),
        }
    }

    /// Append the encoded record to `buf`.
    pub fn encode(&self, format: AddressFormat, buf: &mut Vec<u8>) {
        if format == AddressFormat::Timestamped {
            buf.extend_from_slice(&self.time.to_le_bytes());
        }
        buf.extend_from_slice(&self.services.to_u64().to_le_bytes());
        // IP and port are the only big-endian fields of the protocol.
        buf.extend_from_slice(&self.ip.octets());
        buf.extend_from_slice(&self.port.to_be_bytes());
    }

    /// Decode a record, failing with [`WireError::TruncatedInput`] if the
    /// reader holds less than [`AddressFormat::size`] bytes.
    pub(crate) fn decode(
        reader: &mut PayloadReader<'_>,
        format: AddressFormat,
    ) -> Result<Self, WireError> {
        // Check up front so a short record consumes nothing.
        if reader.remaining() < format.size() {
            return Err(WireError::TruncatedInput);
        }

        let time = match format {
            AddressFormat::Timestamped => reader.read_u32_le()?,
            AddressFormat::Version => 0,
        };
        let services = ServiceFlags::from(reader.read_u64_le()?);
        let ip = Ipv6Addr::from(reader.read_array::<16>()?);
        let port = reader.read_u16_be()?;

        Ok(Self {
            time,
            services,
            ip,
            port,
        })
    }

    /// Decode a record from a byte slice, trailing bytes are ignored.
    pub fn from_bytes(bytes: &[u8], format: AddressFormat) -> Result<Self, WireError> {
        Self::decode(&mut PayloadReader::new(bytes), format)
    }
}
