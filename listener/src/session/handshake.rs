//! Bitcoin p2p protocol version handshake.
//!
//! When a node opens a connection it immediately advertises its version, the
//! remote node answers with its own. No further communication is meaningful
//! until both peers have exchanged and acknowledged versions.
//!
//! ```text
//!  local                      remote
//!    | ------- version -------> |   Idle -> VersionSent
//!    | <------ version -------- |   VersionSent -> VersionReceived
//!    | ------- verack --------> |   VersionReceived -> Acked
//!    | <------ verack --------- |   Acked -> Complete
//! ```
//!
//! This module holds the state and the pure validation steps, the I/O driving
//! them runs at the start of [`Session::run`](super::Session::run).

use super::error::ProtocolError;
use crate::wire::{checksum, Command, Envelope};
use bitcoin::p2p::Magic;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Gets the current Unix timestamp (seconds since January 1, 1970 00:00:00 UTC).
///
/// # Panics
///
/// If the system clock is set to a time before the Unix epoch
/// (January 1, 1970), which is extremely unlikely on modern systems.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System time is before the Unix epoch")
        .as_secs()
}

/// Generates a 64-bit nonce for use in version messages.
///
/// This function creates a reasonably unique nonce without requiring a `rand` crate.
/// While *not* cryptographically secure, this nonce is suitable for the bitcoin p2p
/// protocol's connection loop detection mechanism. A process wide counter makes
/// sure two handshakes never share a nonce, even within the same clock tick.
///
/// The value is unique, not random. A remote party able to guess the clock and
/// process ID can predict it.
pub fn generate_nonce() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();

    // Mix in the process ID for additional entropy.
    let pid = process::id() as u64;
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);

    // Odd multiplier spreads consecutive counts across all bits.
    now ^ pid.rotate_left(32) ^ count.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// State machine for tracking handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent yet.
    Idle,
    /// Sent version message, waiting for the peer's version.
    VersionSent,
    /// Received and validated the peer's version message.
    VersionReceived,
    /// Sent verack, waiting for the peer's verack.
    Acked,
    /// Both version and verack exchanged, the session is usable.
    Complete,
    /// Terminal, the handshake aborted.
    Failed,
}

impl HandshakeState {
    /// The state reached when the current step succeeds.
    pub fn next(self) -> Self {
        match self {
            HandshakeState::Idle => HandshakeState::VersionSent,
            HandshakeState::VersionSent => HandshakeState::VersionReceived,
            HandshakeState::VersionReceived => HandshakeState::Acked,
            HandshakeState::Acked => HandshakeState::Complete,
            HandshakeState::Complete => HandshakeState::Complete,
            HandshakeState::Failed => HandshakeState::Failed,
        }
    }

    /// Whether the handshake has finished, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(self, HandshakeState::Complete | HandshakeState::Failed)
    }
}

/// Checks that a handshake message is the expected command on the expected network.
pub fn expect_command(
    envelope: &Envelope,
    magic: Magic,
    expected: Command,
) -> Result<(), ProtocolError> {
    if envelope.magic() != magic {
        return Err(ProtocolError::MagicMismatch {
            expected: magic,
            received: envelope.magic(),
        });
    }

    if envelope.command() != expected {
        return Err(ProtocolError::UnexpectedCommand {
            expected,
            received: envelope.command(),
        });
    }

    Ok(())
}

/// Checks the declared checksum against the payload, must pass before the payload is parsed.
pub fn verify_checksum(envelope: &Envelope) -> Result<(), ProtocolError> {
    let computed = checksum(envelope.payload());
    if computed != envelope.checksum() {
        return Err(ProtocolError::ChecksumMismatch {
            declared: envelope.checksum(),
            computed,
        });
    }

    Ok(())
}

/// Checks the peer's nonce against ours.
pub fn check_connection_loop(their_nonce: u64, our_nonce: u64) -> Result<(), ProtocolError> {
    if their_nonce == our_nonce {
        return Err(ProtocolError::ConnectionLoop);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_progression() {
        let mut state = HandshakeState::Idle;
        let mut visited = vec![state];
        while !state.is_terminal() {
            state = state.next();
            visited.push(state);
        }

        assert_eq!(
            visited,
            vec![
                HandshakeState::Idle,
                HandshakeState::VersionSent,
                HandshakeState::VersionReceived,
                HandshakeState::Acked,
                HandshakeState::Complete,
            ]
        );
        assert_eq!(HandshakeState::Failed.next(), HandshakeState::Failed);
    }

    #[test]
    fn test_nonces_are_fresh() {
        let nonces: Vec<u64> = (0..64).map(|_| generate_nonce()).collect();
        for (i, a) in nonces.iter().enumerate() {
            for b in &nonces[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_expect_command() {
        let verack = Envelope::new(Magic::BITCOIN, Command::VERACK, Vec::new());

        assert!(expect_command(&verack, Magic::BITCOIN, Command::VERACK).is_ok());
        assert_eq!(
            expect_command(&verack, Magic::BITCOIN, Command::VERSION),
            Err(ProtocolError::UnexpectedCommand {
                expected: Command::VERSION,
                received: Command::VERACK,
            })
        );
        assert_eq!(
            expect_command(&verack, Magic::REGTEST, Command::VERACK),
            Err(ProtocolError::MagicMismatch {
                expected: Magic::REGTEST,
                received: Magic::BITCOIN,
            })
        );
    }

    #[test]
    fn test_verify_checksum() {
        let envelope = Envelope::new(Magic::BITCOIN, Command::VERSION, vec![1, 2, 3]);
        assert!(verify_checksum(&envelope).is_ok());
    }

    #[test]
    fn test_connection_loop() {
        assert!(check_connection_loop(1, 2).is_ok());
        assert_eq!(
            check_connection_loop(7, 7),
            Err(ProtocolError::ConnectionLoop)
        );
    }
}
