//! User agent validation and utilities for Bitcoin p2p protocol.
//!
//! This module provides validation for Bitcoin Core-style user agent strings
//! and a [`UserAgent`] type which is guaranteed to fit the `version` payload.

use crate::wire::version::MAX_USER_AGENT_LENGTH;
use std::fmt;

/// Errors that can occur during user agent validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAgentError {
    /// The user agent format is invalid (must be `/name:version/`).
    InvalidFormat,
    /// The name component is missing or empty.
    MissingName,
    /// The version component is missing or empty.
    MissingVersion,
    /// The user agent does not fit the single byte length prefix.
    TooLong(usize),
}

impl fmt::Display for UserAgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserAgentError::InvalidFormat => {
                write!(f, "User agent must follow format '/name:version/'")
            }
            UserAgentError::MissingName => {
                write!(f, "User agent name component cannot be empty")
            }
            UserAgentError::MissingVersion => {
                write!(f, "User agent version component cannot be empty")
            }
            UserAgentError::TooLong(len) => {
                write!(
                    f,
                    "User agent is {len} bytes, maximum is {MAX_USER_AGENT_LENGTH}"
                )
            }
        }
    }
}

impl std::error::Error for UserAgentError {}

/// Validates Bitcoin Core-style user agent format: `/name:version/`.
///
/// # Example
///
/// ```
/// use bitcoin_peers_listener::user_agent::validate_bitcoin_core_format;
///
/// assert!(validate_bitcoin_core_format("/bitcoin-peers-listener:0.1.0/").is_ok());
/// assert!(validate_bitcoin_core_format("bitcoin-peers-listener:0.1.0").is_err());
/// assert!(validate_bitcoin_core_format("/:0.1.0/").is_err());
/// ```
pub fn validate_bitcoin_core_format(user_agent: &str) -> Result<(), UserAgentError> {
    if user_agent.len() > MAX_USER_AGENT_LENGTH {
        return Err(UserAgentError::TooLong(user_agent.len()));
    }

    // Check basic format: must start and end with '/' and contain ':'.
    if user_agent.len() < 2 || !user_agent.starts_with('/') || !user_agent.ends_with('/') {
        return Err(UserAgentError::InvalidFormat);
    }

    let contents = &user_agent[1..user_agent.len() - 1];
    let parts: Vec<&str> = contents.split(':').collect();

    if parts.len() != 2 {
        return Err(UserAgentError::InvalidFormat);
    }

    if parts[0].is_empty() {
        return Err(UserAgentError::MissingName);
    }

    if parts[1].is_empty() {
        return Err(UserAgentError::MissingVersion);
    }

    Ok(())
}

/// Creates a Bitcoin Core-style user agent string, `/name:version/`.
pub fn bitcoin_core_format(name: &str, version: &str) -> String {
    format!("/{name}:{version}/")
}

/// A validated user agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserAgent(String);

impl UserAgent {
    /// Validate and wrap a user agent string.
    pub fn new(user_agent: impl Into<String>) -> Result<Self, UserAgentError> {
        let user_agent = user_agent.into();
        validate_bitcoin_core_format(&user_agent)?;
        Ok(UserAgent(user_agent))
    }

    /// Build a user agent from an application name and version.
    ///
    /// Panics if the result is not a valid user agent, intended for
    /// compile time known names such as `env!("CARGO_PKG_NAME")`.
    pub fn from_name_version(name: &str, version: &str) -> Self {
        match UserAgent::new(bitcoin_core_format(name, version)) {
            Ok(user_agent) => user_agent,
            Err(e) => panic!("Invalid user agent components {name:?} {version:?}: {e}"),
        }
    }

    /// The user agent string, slashes included.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserAgent {
    type Error = UserAgentError;

    fn try_from(user_agent: String) -> Result<Self, Self::Error> {
        UserAgent::new(user_agent)
    }
}
