//! Session configuration types and constants.

use crate::peer::DEFAULT_PROTOCOL_VERSION;
use crate::user_agent::UserAgent;
use bitcoin::p2p::{Magic, ServiceFlags};
use bitcoin::Network;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default user agent for bitcoin-peers-listener sessions.
///
/// Format follows Bitcoin Core's convention: "/$NAME:$VERSION/".
pub fn default_user_agent() -> UserAgent {
    UserAgent::from_name_version(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Non-listening address used in version messages.
///
/// This address signals to peers that we are not accepting incoming connections
/// and should not be advertised to other nodes.
pub const NON_LISTENING_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
/// Port paired with [`NON_LISTENING_ADDRESS`].
pub const NON_LISTENING_PORT: u16 = 0;

/// Default timeout for TCP connection establishment.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration used to build a session.
///
/// Everything the handshake advertises about the local node lives here,
/// the codecs and state machine hold no global protocol state.
#[derive(Debug, Clone)]
pub struct SessionConfiguration {
    /// Network magic stamped on every outgoing message and expected during the handshake.
    pub magic: Magic,
    /// Local protocol version advertised in the version message.
    pub protocol_version: u32,
    /// Custom user agent advertised for the session. Defaults to the crate user agent if None.
    pub user_agent: Option<UserAgent>,
    /// Service flags advertised by this node.
    pub services: ServiceFlags,
    /// Address advertised as the sender in version messages.
    pub sender_address: IpAddr,
    /// Port for the sender address.
    pub sender_port: u16,
    /// Block height advertised in version messages.
    pub start_height: i32,
    /// Whether the peer should relay transactions to us.
    pub relay: bool,
    /// Timeout for TCP connection establishment.
    pub connection_timeout: Duration,
}

impl SessionConfiguration {
    /// Creates a new configuration for a non-listening node.
    ///
    /// This configuration advertises no services, uses a non-listening address,
    /// and doesn't ask for transaction relay. It's suitable for a listener that
    /// just wants to observe a peer without accepting incoming connections.
    ///
    /// # Arguments
    ///
    /// * `network` - The bitcoin network, selects the message magic.
    /// * `protocol_version` - The protocol version to advertise, [`DEFAULT_PROTOCOL_VERSION`] if None.
    /// * `user_agent` - Optional custom user agent. Defaults to the crate user agent if None.
    pub fn non_listening(
        network: Network,
        protocol_version: Option<u32>,
        user_agent: Option<UserAgent>,
    ) -> Self {
        Self {
            magic: network.magic(),
            protocol_version: protocol_version.unwrap_or(DEFAULT_PROTOCOL_VERSION),
            user_agent,
            services: ServiceFlags::NONE,
            sender_address: NON_LISTENING_ADDRESS,
            sender_port: NON_LISTENING_PORT,
            start_height: 0,
            relay: false,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }

    /// Override the message magic, for networks not known to [`Network`].
    pub fn with_magic(mut self, magic: Magic) -> Self {
        self.magic = magic;
        self
    }

    /// Set the block height advertised in the version message.
    pub fn with_start_height(mut self, start_height: i32) -> Self {
        self.start_height = start_height;
        self
    }

    /// Ask the peer to relay transactions.
    pub fn with_relay(mut self, relay: bool) -> Self {
        self.relay = relay;
        self
    }

    /// Set the timeout for TCP connection establishment.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use bitcoin::Network;
    /// use bitcoin_peers_listener::SessionConfiguration;
    ///
    /// let config = SessionConfiguration::non_listening(Network::Bitcoin, None, None)
    ///     .with_connection_timeout(Duration::from_secs(30));
    /// assert_eq!(config.connection_timeout, Duration::from_secs(30));
    /// ```
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// The user agent to advertise.
    pub fn effective_user_agent(&self) -> UserAgent {
        match &self.user_agent {
            Some(ua) => ua.clone(),
            None => default_user_agent(),
        }
    }

    /// Socket address advertised as the sender.
    pub fn sender_socket(&self) -> SocketAddr {
        SocketAddr::new(self.sender_address, self.sender_port)
    }
}

impl fmt::Display for SessionConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SessionConfiguration {{ magic: {}, protocol: {}, user_agent: \"{}\", services: {}, start_height: {}, relay: {} }}",
            self.magic,
            self.protocol_version,
            self.effective_user_agent(),
            self.services,
            self.start_height,
            self.relay
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_listening_defaults() {
        let config = SessionConfiguration::non_listening(Network::Bitcoin, None, None);

        assert_eq!(config.magic, Magic::BITCOIN);
        assert_eq!(config.protocol_version, DEFAULT_PROTOCOL_VERSION);
        assert_eq!(config.services, ServiceFlags::NONE);
        assert_eq!(config.sender_socket(), "0.0.0.0:0".parse::<SocketAddr>().unwrap());
        assert_eq!(config.start_height, 0);
        assert!(!config.relay);
        assert_eq!(config.connection_timeout, DEFAULT_CONNECTION_TIMEOUT);
        assert_eq!(
            config.effective_user_agent().as_str(),
            format!("/bitcoin-peers-listener:{}/", env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn test_network_selects_magic() {
        let config = SessionConfiguration::non_listening(Network::Regtest, Some(70016), None);
        assert_eq!(config.magic, Magic::REGTEST);
        assert_eq!(config.protocol_version, 70016);

        let custom = Magic::from_bytes([0xF9, 0xBE, 0xB4, 0xFE]);
        let config = config.with_magic(custom);
        assert_eq!(config.magic, custom);
    }

    #[test]
    fn test_builder_methods() {
        let user_agent = UserAgent::new("/test:1.0/").unwrap();
        let config =
            SessionConfiguration::non_listening(Network::Signet, None, Some(user_agent.clone()))
                .with_start_height(-1)
                .with_relay(true)
                .with_connection_timeout(Duration::from_secs(30));

        assert_eq!(config.effective_user_agent(), user_agent);
        assert_eq!(config.start_height, -1);
        assert!(config.relay);
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
    }
}
