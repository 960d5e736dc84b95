//! Cooperative shutdown for a running session.
//!
//! The caller keeps a [`StopHandle`] and hands the paired [`StopSignal`] to
//! [`Session::run`](super::Session::run). Raising the handle is observed by the
//! session between envelope reads, a read already in flight finishes first.
//! When the session exits for any reason it marks the channel finished, so the
//! caller can tell the session is gone.

use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle of the session as seen through the stop channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No stop requested.
    Running,
    /// Caller asked the session to stop, not yet observed.
    StopRequested,
    /// Session has exited.
    Finished,
}

/// Create a linked stop handle and stop signal.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (sender, _) = watch::channel(SessionStatus::Running);
    let status = Arc::new(sender);

    (
        StopHandle {
            status: status.clone(),
        },
        StopSignal { status },
    )
}

/// Caller side of the stop channel.
///
/// Can be cloned and moved to other tasks or threads.
#[derive(Debug, Clone)]
pub struct StopHandle {
    status: Arc<watch::Sender<SessionStatus>>,
}

impl StopHandle {
    /// Ask the session to stop. Calling this more than once has no further effect.
    pub fn stop(&self) {
        self.status.send_if_modified(|status| {
            if *status == SessionStatus::Running {
                *status = SessionStatus::StopRequested;
                true
            } else {
                false
            }
        });
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Whether the session has exited.
    pub fn is_finished(&self) -> bool {
        self.status() == SessionStatus::Finished
    }

    /// Wait until the session has exited.
    pub async fn finished(&self) {
        let mut receiver = self.status.subscribe();
        // The handle holds the sender, so the channel cannot close while waiting.
        let _ = receiver
            .wait_for(|status| *status == SessionStatus::Finished)
            .await;
    }
}

/// Session side of the stop channel.
///
/// Dropping the signal marks the session finished.
#[derive(Debug)]
pub struct StopSignal {
    status: Arc<watch::Sender<SessionStatus>>,
}

impl StopSignal {
    /// Non-blocking check whether a stop was requested.
    pub fn is_raised(&self) -> bool {
        *self.status.borrow() == SessionStatus::StopRequested
    }

    /// Tell the caller the session has exited.
    pub fn finish(self) {
        drop(self);
    }
}

impl Drop for StopSignal {
    fn drop(&mut self) {
        self.status.send_replace(SessionStatus::Finished);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_stop_is_idempotent() {
        let (handle, signal) = stop_channel();
        assert!(!signal.is_raised());
        assert_eq!(handle.status(), SessionStatus::Running);

        handle.stop();
        handle.stop();

        assert!(signal.is_raised());
        assert_eq!(handle.status(), SessionStatus::StopRequested);
        assert!(!handle.is_finished());
    }

    #[test]
    fn test_stop_after_finish_is_ignored() {
        let (handle, signal) = stop_channel();
        signal.finish();

        handle.stop();
        assert!(handle.is_finished());
    }

    #[test]
    fn test_stop_from_another_thread() {
        let (handle, signal) = stop_channel();
        let remote = handle.clone();

        std::thread::spawn(move || remote.stop())
            .join()
            .unwrap();

        assert!(signal.is_raised());
    }

    #[tokio::test]
    async fn test_finished_wakes_on_drop() {
        let (handle, signal) = stop_channel();

        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(signal);
        });

        tokio::time::timeout(Duration::from_secs(5), handle.finished())
            .await
            .unwrap();
        assert!(handle.is_finished());
        task.await.unwrap();
    }
}
