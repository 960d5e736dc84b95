//! Listen to a single bitcoin peer.
//!
//! Opens one connection, performs the version handshake and then reports every
//! message the peer sends until told to stop. Message payloads past the
//! handshake are passed along as raw [`Envelope`]s, not interpreted.
//!
//! See more [p2p documentation](https://developer.bitcoin.org/reference/p2p_networking.html) on the p2p protocol.

mod peer;
mod session;
pub mod user_agent;
pub mod wire;

pub use peer::{Peer, PeerProtocolVersion, PeerServices, DEFAULT_PROTOCOL_VERSION};
pub use session::{
    default_user_agent, generate_nonce, stop_channel, unix_timestamp, HandshakeError,
    HandshakeErrorKind, HandshakeState, LogSink, MessageSink, ProtocolError, Session,
    SessionConfiguration, SessionStatus, StopHandle, StopSignal, TcpSession, Termination,
    DEFAULT_CONNECTION_TIMEOUT, NON_LISTENING_ADDRESS, NON_LISTENING_PORT,
};
pub use user_agent::{UserAgent, UserAgentError};
pub use wire::{Command, Envelope, NetworkAddress, VersionPayload, WireError};
