//! TCP-specific sessions.

use super::{Session, SessionConfiguration};
use log::info;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// A session over a TCP stream.
///
/// This is a convenience type alias for [`Session`] with Tokio's TCP stream halves.
pub type TcpSession = Session<OwnedReadHalf, OwnedWriteHalf>;

/// Establish a TCP connection with timeout and nodelay.
pub async fn connect(socket_addr: SocketAddr, timeout: Duration) -> Result<TcpStream, io::Error> {
    match tokio::time::timeout(timeout, TcpStream::connect(socket_addr)).await {
        Ok(Ok(stream)) => {
            // No delay is helpful for the small packets of the bitcoin p2p protocol.
            stream.set_nodelay(true)?;
            Ok(stream)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "Connection attempt timed out",
        )),
    }
}

impl TcpSession {
    /// Create a session over an established TCP stream.
    ///
    /// The peer is the stream's remote endpoint.
    pub fn tcp(stream: TcpStream, configuration: SessionConfiguration) -> Result<Self, io::Error> {
        let remote = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();

        Ok(Session::new(reader, writer, remote, configuration))
    }

    /// Open a TCP connection to `socket_addr` and create a session over it.
    ///
    /// Gives up after the configured connection timeout. The handshake is not
    /// performed until the session is run.
    pub async fn connect(
        socket_addr: SocketAddr,
        configuration: SessionConfiguration,
    ) -> Result<Self, io::Error> {
        let stream = connect(socket_addr, configuration.connection_timeout).await?;
        info!("Connected to {socket_addr}");

        Self::tcp(stream, configuration)
    }
}
