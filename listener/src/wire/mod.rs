//! Bitcoin p2p wire format.
//!
//! This module implements the byte level encoding of the plaintext (v1) bitcoin
//! p2p protocol pieces needed to handshake with a peer and listen to it.
//!
//! * [`address`] - The fixed layout network address record.
//! * [`envelope`] - The message frame, a 24 byte header followed by the payload.
//! * [`version`] - The payload of the `version` handshake message.
//!
//! # Byte Order
//!
//! Every multi-byte integer on the wire is little-endian, with the exception of
//! the IP address and port of a network address which are big-endian (network order).
//!
//! # Design
//!
//! Framing and interpretation are kept separate. The [`EnvelopeReader`] only
//! frames bytes into an [`Envelope`], it does not verify the checksum or the network
//! magic. Whichever layer interprets a payload is responsible for validating it,
//! see [`Envelope::verify_checksum`].

pub mod address;
pub mod envelope;
pub mod version;

pub use address::{AddressFormat, NetworkAddress};
pub use envelope::{
    checksum, Command, Envelope, EnvelopeReader, EnvelopeWriter, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use version::VersionPayload;

use std::fmt;
use std::io;

/// Errors that can occur while encoding or decoding wire data.
#[derive(Debug)]
pub enum WireError {
    /// IO error during read/write operations.
    Io(io::Error),
    /// Input ended before a fixed size or length-declared field was complete.
    TruncatedInput,
    /// Declared payload length exceeds [`MAX_PAYLOAD_SIZE`].
    MessageTooLarge(u32),
    /// Peer closed the connection cleanly between two messages.
    ConnectionClosed,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Io(e) => write!(f, "IO error: {e}"),
            WireError::TruncatedInput => write!(f, "Input ended before the message was complete"),
            WireError::MessageTooLarge(len) => write!(
                f,
                "Declared payload length {len} exceeds maximum of {MAX_PAYLOAD_SIZE} bytes"
            ),
            WireError::ConnectionClosed => write!(f, "Connection closed by peer"),
        }
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WireError::Io(e) => Some(e),
            WireError::TruncatedInput => None,
            WireError::MessageTooLarge(_) => None,
            WireError::ConnectionClosed => None,
        }
    }
}

impl From<io::Error> for WireError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => WireError::TruncatedInput,
            _ => WireError::Io(e),
        }
    }
}

/// Cursor over an in-memory payload.
///
/// All reads are all-or-nothing, a read that cannot be satisfied
/// returns [`WireError::TruncatedInput`] and consumes nothing.
#[derive(Debug, Clone)]
pub(crate) struct PayloadReader<'a> {
    data: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Number of unread bytes.
    pub(crate) fn remaining(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if self.data.len() < len {
            return Err(WireError::TruncatedInput);
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    pub(crate) fn read_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub(crate) fn read_u16_be(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub(crate) fn read_u32_le(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_i32_le(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub(crate) fn read_u64_le(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }
}
