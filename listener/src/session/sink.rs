//! Destinations for envelopes received after the handshake.

use crate::wire::Envelope;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Receives each envelope the session reads after the handshake.
///
/// Delivery is best effort. The session never waits on a sink, so
/// implementations must not block.
pub trait MessageSink {
    /// Hand over one envelope.
    fn deliver(&mut self, envelope: Envelope);
}

impl<S: MessageSink + ?Sized> MessageSink for &mut S {
    fn deliver(&mut self, envelope: Envelope) {
        (**self).deliver(envelope)
    }
}

impl MessageSink for Vec<Envelope> {
    fn deliver(&mut self, envelope: Envelope) {
        self.push(envelope);
    }
}

impl MessageSink for mpsc::UnboundedSender<Envelope> {
    fn deliver(&mut self, envelope: Envelope) {
        if let Err(e) = self.send(envelope) {
            debug!("Sink receiver dropped, discarding {}", e.0);
        }
    }
}

/// Bounded channels drop the envelope when full rather than stall the session.
impl MessageSink for mpsc::Sender<Envelope> {
    fn deliver(&mut self, envelope: Envelope) {
        match self.try_send(envelope) {
            Ok(()) => {}
            Err(TrySendError::Full(envelope)) => {
                warn!("Sink channel full, dropping {envelope}");
            }
            Err(TrySendError::Closed(envelope)) => {
                debug!("Sink receiver dropped, discarding {envelope}");
            }
        }
    }
}

/// Logs every envelope at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MessageSink for LogSink {
    fn deliver(&mut self, envelope: Envelope) {
        info!("Received {envelope}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Command;
    use bitcoin::p2p::Magic;

    fn ping() -> Envelope {
        Envelope::new(Magic::BITCOIN, Command::new("ping"), vec![0; 8])
    }

    #[test]
    fn test_unbounded_sender() {
        let (mut tx, mut rx) = mpsc::unbounded_channel();
        tx.deliver(ping());

        assert_eq!(rx.try_recv().unwrap(), ping());
    }

    #[test]
    fn test_bounded_sender_drops_when_full() {
        let (mut tx, mut rx) = mpsc::channel(1);
        tx.deliver(ping());
        tx.deliver(Envelope::new(Magic::BITCOIN, Command::new("pong"), vec![]));

        assert_eq!(rx.try_recv().unwrap(), ping());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (mut tx, rx) = mpsc::channel::<Envelope>(1);
        drop(rx);
        tx.deliver(ping());

        let (mut tx, rx) = mpsc::unbounded_channel::<Envelope>();
        drop(rx);
        tx.deliver(ping());
    }

    #[test]
    fn test_borrowed_sink() {
        fn feed<S: MessageSink>(mut sink: S) {
            sink.deliver(ping());
        }

        let mut collected = Vec::new();
        feed(&mut collected);
        feed(LogSink);

        assert_eq!(collected, vec![ping()]);
    }
}
