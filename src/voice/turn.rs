//! Turn detection over a live transcript stream
//!
//! Final fragments accumulate in a pending buffer. When enough consecutive
//! idle polls pass, the buffer is emitted as one user turn. Nothing is
//! emitted while the agent is speaking.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::speaking::SpeakingState;
use super::transcript::{TranscriptEvent, TranscriptFragment, TranscriptionBackend};
use crate::config::TurnConfig;

/// What one poll of the transcript stream produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// A fragment arrived
    Fragment(TranscriptFragment),
    /// A polling interval passed without results
    Idle,
}

/// Finalized text since the last emitted turn, plus the idle counter
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PendingTurnBuffer {
    fragments: Vec<String>,
    idle_ticks: u32,
}

impl PendingTurnBuffer {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    #[must_use]
    pub const fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    /// Buffered fragments joined with spaces
    #[must_use]
    pub fn text(&self) -> String {
        self.fragments.join(" ")
    }

    fn take(&mut self) -> String {
        let text = self.text();
        self.fragments.clear();
        self.idle_ticks = 0;
        text
    }
}

/// Converts transcript fragments into discrete user turns
///
/// The detector is the only owner of its buffer; ingestion and idle
/// evaluation both go through [`TurnDetector::observe`] on one task.
#[derive(Debug)]
pub struct TurnDetector {
    max_idle_ticks: u32,
    tick_interval: Duration,
    reconnect_delay: Duration,
    speaking: SpeakingState,
    buffer: PendingTurnBuffer,
}

impl TurnDetector {
    /// Create a detector gated by the speaking flag
    #[must_use]
    pub fn new(config: &TurnConfig, speaking: SpeakingState) -> Self {
        Self {
            max_idle_ticks: config.max_idle_ticks.max(1),
            tick_interval: config.tick_interval,
            reconnect_delay: config.reconnect_delay,
            speaking,
            buffer: PendingTurnBuffer::default(),
        }
    }

    /// Current pending buffer
    #[must_use]
    pub const fn buffer(&self) -> &PendingTurnBuffer {
        &self.buffer
    }

    /// Feed one poll result; returns a completed turn if one is due
    pub fn observe(&mut self, observation: Observation) -> Option<String> {
        let speaking = self.speaking.is_speaking();

        match observation {
            Observation::Fragment(fragment) if fragment.is_final => {
                self.buffer.idle_ticks = 0;
                let text = fragment.text.trim();
                if speaking {
                    // Most likely an echo of our own voice
                    tracing::trace!(text, "dropping fragment heard while speaking");
                } else if !text.is_empty() {
                    tracing::debug!(text, "final fragment buffered");
                    self.buffer.fragments.push(text.to_string());
                }
                None
            }
            // The user is still talking
            Observation::Fragment(fragment) => {
                self.buffer.idle_ticks = 0;
                tracing::trace!(text = %fragment.text, "interim fragment");
                None
            }
            Observation::Idle => {
                if speaking {
                    // The threshold has to be met again once speaking ends
                    self.buffer.idle_ticks = 0;
                    return None;
                }

                self.buffer.idle_ticks += 1;
                if self.buffer.idle_ticks < self.max_idle_ticks {
                    return None;
                }

                if self.buffer.is_empty() {
                    self.buffer.idle_ticks = 0;
                    return None;
                }

                let turn = self.buffer.take();
                tracing::info!(turn = %turn, "user turn complete");
                Some(turn)
            }
        }
    }

    /// Consume transcript streams until cancelled, sending completed turns
    ///
    /// A failed or ended stream is reopened after the reconnect delay; the
    /// pending buffer survives the reconnect.
    pub async fn run(
        mut self,
        backend: Arc<dyn TranscriptionBackend>,
        turns: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) {
        while !cancel.is_cancelled() {
            match backend.open().await {
                Ok(mut events) => {
                    tracing::debug!("transcription stream opened");
                    if !self.consume(&mut events, &turns, &cancel).await {
                        return;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to open transcription stream"),
            }

            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(self.reconnect_delay) => {}
            }
            tracing::info!(pending = !self.buffer.is_empty(), "reopening transcription stream");
        }
    }

    /// Drain one stream; false when the session should stop
    async fn consume(
        &mut self,
        events: &mut mpsc::Receiver<TranscriptEvent>,
        turns: &mpsc::Sender<String>,
        cancel: &CancellationToken,
    ) -> bool {
        loop {
            let polled = tokio::select! {
                () = cancel.cancelled() => return false,
                polled = tokio::time::timeout(self.tick_interval, events.recv()) => polled,
            };

            let observation = match polled {
                Err(_) | Ok(Some(TranscriptEvent::NoResult)) => Observation::Idle,
                Ok(Some(TranscriptEvent::Fragment(fragment))) => Observation::Fragment(fragment),
                Ok(Some(TranscriptEvent::Failed(e))) => {
                    tracing::warn!(error = %e, "transcription stream failed");
                    return true;
                }
                Ok(None) => {
                    tracing::debug!("transcription stream ended");
                    return true;
                }
            };

            if let Some(turn) = self.observe(observation)
                && turns.send(turn).await.is_err()
            {
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::speaking::speaking_state;

    fn detector(max_idle_ticks: u32) -> (TurnDetector, crate::voice::SpeakingWriter) {
        let (writer, reader) = speaking_state();
        let config = TurnConfig {
            max_idle_ticks,
            ..TurnConfig::default()
        };
        (TurnDetector::new(&config, reader), writer)
    }

    fn final_text(text: &str) -> Observation {
        Observation::Fragment(TranscriptFragment::final_text(text))
    }

    #[test]
    fn emits_after_idle_threshold() {
        let (mut detector, _writer) = detector(3);
        assert_eq!(detector.observe(final_text("What items")), None);
        assert_eq!(detector.observe(Observation::Idle), None);
        assert_eq!(detector.observe(Observation::Idle), None);
        assert_eq!(detector.observe(final_text("should I build")), None);
        assert_eq!(detector.observe(Observation::Idle), None);
        assert_eq!(detector.observe(Observation::Idle), None);
        assert_eq!(
            detector.observe(Observation::Idle),
            Some("What items should I build".to_string())
        );
        assert!(detector.buffer().is_empty());
        assert_eq!(detector.buffer().idle_ticks(), 0);
    }

    #[test]
    fn empty_buffer_resets_counter() {
        let (mut detector, _writer) = detector(2);
        assert_eq!(detector.observe(Observation::Idle), None);
        assert_eq!(detector.observe(Observation::Idle), None);
        assert_eq!(detector.buffer().idle_ticks(), 0);
    }

    #[test]
    fn interim_resets_counter() {
        let (mut detector, _writer) = detector(3);
        detector.observe(final_text("hello"));
        detector.observe(Observation::Idle);
        detector.observe(Observation::Idle);
        detector.observe(Observation::Fragment(TranscriptFragment::interim("th")));
        assert_eq!(detector.buffer().idle_ticks(), 0);
        assert_eq!(detector.buffer().text(), "hello");
    }

    #[test]
    fn no_emission_while_speaking() {
        let (mut detector, writer) = detector(2);
        detector.observe(final_text("tell me about Jax"));

        writer.set(true);
        for _ in 0..50 {
            assert_eq!(detector.observe(Observation::Idle), None);
        }
        // Echo of the agent's own voice is not buffered
        detector.observe(final_text("Jax is a fighter"));

        writer.set(false);
        assert_eq!(detector.observe(Observation::Idle), None);
        assert_eq!(
            detector.observe(Observation::Idle),
            Some("tell me about Jax".to_string())
        );
    }

    #[test]
    fn blank_finals_are_ignored() {
        let (mut detector, _writer) = detector(1);
        detector.observe(final_text("   "));
        assert_eq!(detector.observe(Observation::Idle), None);
    }
}
