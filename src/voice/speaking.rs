//! Shared "agent is speaking" flag
//!
//! The flag has exactly one writer, the speech queue consumer, which owns the
//! [`SpeakingWriter`]. Everything else holds a read-only [`SpeakingState`].

use chrono::{DateTime, Utc};
use tokio::sync::watch;

/// Snapshot of the speaking flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeakingStatus {
    pub speaking: bool,
    /// When the flag last changed
    pub since: DateTime<Utc>,
}

/// Write half of the speaking flag
#[derive(Debug)]
pub struct SpeakingWriter {
    tx: watch::Sender<SpeakingStatus>,
}

/// Read half of the speaking flag
#[derive(Debug, Clone)]
pub struct SpeakingState {
    rx: watch::Receiver<SpeakingStatus>,
}

/// Create a speaking flag, initially silent
#[must_use]
pub fn speaking_state() -> (SpeakingWriter, SpeakingState) {
    let (tx, rx) = watch::channel(SpeakingStatus {
        speaking: false,
        since: Utc::now(),
    });
    (SpeakingWriter { tx }, SpeakingState { rx })
}

impl SpeakingWriter {
    /// Set the flag; the timestamp only moves when the value changes
    pub fn set(&self, speaking: bool) {
        self.tx.send_if_modified(|status| {
            if status.speaking == speaking {
                return false;
            }
            *status = SpeakingStatus {
                speaking,
                since: Utc::now(),
            };
            true
        });
    }

    /// A new reader
    #[must_use]
    pub fn subscribe(&self) -> SpeakingState {
        SpeakingState {
            rx: self.tx.subscribe(),
        }
    }
}

impl SpeakingState {
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.rx.borrow().speaking
    }

    #[must_use]
    pub fn status(&self) -> SpeakingStatus {
        *self.rx.borrow()
    }

    /// Wait until the flag is false
    ///
    /// Returns immediately when nothing is being spoken, or when the writer
    /// is gone.
    pub async fn wait_until_silent(&mut self) {
        let _ = self.rx.wait_for(|status| !status.speaking).await;
    }
}
