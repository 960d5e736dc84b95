//! A single session with one bitcoin peer.
//!
//! A [`Session`] owns both halves of an established connection. Running it
//! performs the version handshake and then reads envelopes until the peer
//! goes away or the caller raises the stop signal. Every envelope read after
//! the handshake is handed to a [`MessageSink`] without being interpreted.
//!
//! # Example
//!
//! ```
//! use bitcoin::Network;
//! use bitcoin_peers_listener::{stop_channel, LogSink, Session, SessionConfiguration};
//! use std::net::SocketAddr;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfiguration::non_listening(Network::Bitcoin, None, None);
//! let addr: SocketAddr = "127.0.0.1:8333".parse()?;
//! let session = Session::connect(addr, config).await?;
//!
//! let (handle, signal) = stop_channel();
//! let task = tokio::spawn(session.run(signal, LogSink));
//!
//! // Later, from anywhere.
//! handle.stop();
//! let termination = task.await?;
//! println!("Session ended: {termination}");
//! # Ok(())
//! # }
//! ```

mod configuration;
mod error;
mod handshake;
mod sink;
mod stop;
mod tcp;

pub use configuration::{
    default_user_agent, SessionConfiguration, DEFAULT_CONNECTION_TIMEOUT, NON_LISTENING_ADDRESS,
    NON_LISTENING_PORT,
};
pub use error::{HandshakeError, HandshakeErrorKind, ProtocolError};
pub use handshake::{generate_nonce, unix_timestamp, HandshakeState};
pub use sink::{LogSink, MessageSink};
pub use stop::{stop_channel, SessionStatus, StopHandle, StopSignal};
pub use tcp::TcpSession;

use crate::peer::Peer;
use crate::wire::{
    Command, EnvelopeReader, EnvelopeWriter, NetworkAddress, VersionPayload, WireError,
};
use log::{debug, error, info};
use std::fmt;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};

/// Why a session ended.
#[derive(Debug)]
pub enum Termination {
    /// The caller raised the stop signal.
    StoppedByCaller,
    /// The peer closed the connection between two messages.
    ConnectionClosed,
    /// The handshake failed, no messages were read.
    HandshakeFailed(HandshakeError),
    /// A message after the handshake could not be read.
    DecodeFailed(WireError),
}

impl Termination {
    /// Whether the session ended without an error.
    pub fn is_clean(&self) -> bool {
        matches!(
            self,
            Termination::StoppedByCaller | Termination::ConnectionClosed
        )
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::StoppedByCaller => write!(f, "Stopped by caller"),
            Termination::ConnectionClosed => write!(f, "Connection closed by peer"),
            Termination::HandshakeFailed(e) => write!(f, "{e}"),
            Termination::DecodeFailed(e) => write!(f, "Failed to read message: {e}"),
        }
    }
}

/// One connection to one peer.
///
/// Only one task drives a session, reads and writes never overlap.
#[derive(Debug)]
pub struct Session<R, W> {
    configuration: SessionConfiguration,
    /// Remote end, filled in from its version message.
    peer: Peer,
    reader: EnvelopeReader<R>,
    writer: EnvelopeWriter<W>,
    state: HandshakeState,
    negotiated_version: Option<u32>,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Create a session over an already established connection.
    ///
    /// # Arguments
    ///
    /// * `reader` - Read half of the connection.
    /// * `writer` - Write half of the connection.
    /// * `remote` - The connection's remote endpoint, advertised back to the peer.
    /// * `configuration` - Network and local node details for the handshake.
    pub fn new(
        reader: R,
        writer: W,
        remote: SocketAddr,
        configuration: SessionConfiguration,
    ) -> Self {
        Self {
            reader: EnvelopeReader::new(reader),
            writer: EnvelopeWriter::new(configuration.magic, writer),
            peer: Peer::from(remote),
            configuration,
            state: HandshakeState::Idle,
            negotiated_version: None,
        }
    }

    /// The peer, with whatever it announced during the handshake.
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Current handshake state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Lower of the local and remote protocol versions, once the peer's version is known.
    pub fn negotiated_version(&self) -> Option<u32> {
        self.negotiated_version
    }

    /// Run the session to completion.
    ///
    /// Performs the handshake, then reads envelopes and delivers them to `sink`
    /// until the peer disconnects, a read fails, or `stop` is raised. The stop
    /// signal is only checked between reads, so a raised signal takes effect
    /// once the read in flight finishes. There is no read timeout.
    ///
    /// The stop channel is marked finished when this returns.
    pub async fn run<S: MessageSink>(mut self, stop: StopSignal, mut sink: S) -> Termination {
        let termination = match self.handshake().await {
            Ok(()) => self.listen(&stop, &mut sink).await,
            Err(e) => Termination::HandshakeFailed(e),
        };

        info!(
            "Session with {} ended: {termination}",
            self.peer.socket_addr()
        );
        stop.finish();

        termination
    }

    async fn listen<S: MessageSink>(&mut self, stop: &StopSignal, sink: &mut S) -> Termination {
        loop {
            if stop.is_raised() {
                return Termination::StoppedByCaller;
            }

            match self.reader.read().await {
                Ok(envelope) => {
                    debug!("Received {envelope} from {}", self.peer.socket_addr());
                    sink.deliver(envelope);
                }
                Err(WireError::ConnectionClosed) => return Termination::ConnectionClosed,
                Err(e) => return Termination::DecodeFailed(e),
            }
        }
    }

    /// Exchange version and verack messages with the peer.
    ///
    /// On failure the session moves to [`HandshakeState::Failed`] and the error
    /// records the state the failure happened in.
    pub(crate) async fn handshake(&mut self) -> Result<(), HandshakeError> {
        let nonce = generate_nonce();

        match self.exchange(nonce).await {
            Ok(()) => {
                info!("Handshake completed with {}", self.peer);
                Ok(())
            }
            Err(kind) => {
                let err = HandshakeError::new(self.state, kind);
                error!("Handshake with {} failed: {err}", self.peer.socket_addr());
                self.state = HandshakeState::Failed;
                Err(err)
            }
        }
    }

    async fn exchange(&mut self, nonce: u64) -> Result<(), HandshakeErrorKind> {
        let magic = self.configuration.magic;

        let local = self.local_version(nonce);
        self.writer.send(Command::VERSION, local.encode()).await?;
        debug!("Sent version message to peer, nonce {nonce}");
        self.advance();

        let envelope = self.reader.read().await?;
        handshake::expect_command(&envelope, magic, Command::VERSION)?;
        handshake::verify_checksum(&envelope)?;
        let remote = VersionPayload::decode(envelope.payload())?;
        handshake::check_connection_loop(remote.nonce, nonce)?;
        debug!(
            "Received version message from peer, protocol {} user agent {:?}",
            remote.protocol_version, remote.user_agent
        );
        self.peer = self.peer.with_version_payload(&remote);
        self.negotiated_version = Some(local.protocol_version.min(remote.protocol_version));
        self.advance();

        self.writer.send(Command::VERACK, Vec::new()).await?;
        debug!("Sent verack message to peer");
        self.advance();

        let envelope = self.reader.read().await?;
        handshake::expect_command(&envelope, magic, Command::VERACK)?;
        handshake::verify_checksum(&envelope)?;
        debug!("Received verack message from peer");
        self.advance();

        Ok(())
    }

    fn advance(&mut self) {
        self.state = self.state.next();
    }

    fn local_version(&self, nonce: u64) -> VersionPayload {
        let config = &self.configuration;
        let user_agent = config.effective_user_agent();

        VersionPayload {
            services: config.services,
            addr_from: NetworkAddress::new(config.sender_socket(), config.services),
            start_height: config.start_height,
            relay: config.relay,
            ..VersionPayload::for_peer(
                config.protocol_version,
                self.peer.socket_addr(),
                unix_timestamp(),
                nonce,
                user_agent.as_str(),
            )
        }
    }
}

impl<R, W> fmt::Display for Session<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session with {} ({:?})", self.peer, self.state)
    }
}
