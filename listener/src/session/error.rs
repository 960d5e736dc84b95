//! Error types for session handling.

use super::handshake::HandshakeState;
use crate::wire::{Command, WireError};
use bitcoin::p2p::Magic;
use std::error::Error;
use std::fmt;

/// The peer broke the rules of the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A message arrived out of the order the handshake requires.
    UnexpectedCommand {
        /// Command the handshake was waiting for.
        expected: Command,
        /// Command that arrived instead.
        received: Command,
    },
    /// Declared checksum does not match the payload.
    ChecksumMismatch {
        /// Checksum from the message header.
        declared: [u8; 4],
        /// Checksum computed over the received payload.
        computed: [u8; 4],
    },
    /// Message belongs to a different network.
    MagicMismatch {
        /// Configured network magic.
        expected: Magic,
        /// Magic from the message header.
        received: Magic,
    },
    /// Detected a connection loop (connected to ourselves).
    ///
    /// The peer's version nonce matches the one we just sent.
    ConnectionLoop,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnexpectedCommand { expected, received } => {
                write!(f, "Expected {expected} message, received {received}")
            }
            ProtocolError::ChecksumMismatch { declared, computed } => write!(
                f,
                "Checksum mismatch, declared {declared:02x?} but payload hashes to {computed:02x?}"
            ),
            ProtocolError::MagicMismatch { expected, received } => {
                write!(f, "Network magic mismatch, expected {expected} received {received}")
            }
            ProtocolError::ConnectionLoop => {
                write!(f, "Detected connection to self (matching nonce)")
            }
        }
    }
}

impl Error for ProtocolError {}

/// Why a handshake step failed.
#[derive(Debug)]
pub enum HandshakeErrorKind {
    /// Reading, writing or decoding a message failed.
    Wire(WireError),
    /// The peer violated the handshake protocol.
    Protocol(ProtocolError),
}

/// A failed handshake.
///
/// The handshake is all-or-nothing, once this is returned the session is unusable.
#[derive(Debug)]
pub struct HandshakeError {
    /// State the handshake was in when the failure happened.
    pub state: HandshakeState,
    /// The failure.
    pub kind: HandshakeErrorKind,
}

impl HandshakeError {
    pub(crate) fn new(state: HandshakeState, kind: HandshakeErrorKind) -> Self {
        Self { state, kind }
    }

    /// The protocol violation, if this was one.
    pub fn protocol_error(&self) -> Option<&ProtocolError> {
        match &self.kind {
            HandshakeErrorKind::Protocol(e) => Some(e),
            HandshakeErrorKind::Wire(_) => None,
        }
    }

    /// The wire failure, if this was one.
    pub fn wire_error(&self) -> Option<&WireError> {
        match &self.kind {
            HandshakeErrorKind::Wire(e) => Some(e),
            HandshakeErrorKind::Protocol(_) => None,
        }
    }
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            HandshakeErrorKind::Wire(e) => {
                write!(f, "Handshake failed in state {:?}: {e}", self.state)
            }
            HandshakeErrorKind::Protocol(e) => {
                write!(f, "Handshake protocol error in state {:?}: {e}", self.state)
            }
        }
    }
}

impl Error for HandshakeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.kind {
            HandshakeErrorKind::Wire(e) => Some(e),
            HandshakeErrorKind::Protocol(e) => Some(e),
        }
    }
}

impl From<WireError> for HandshakeErrorKind {
    fn from(err: WireError) -> Self {
        HandshakeErrorKind::Wire(err)
    }
}

impl From<ProtocolError> for HandshakeErrorKind {
    fn from(err: ProtocolError) -> Self {
        HandshakeErrorKind::Protocol(err)
    }
}
