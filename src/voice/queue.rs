//! Serialized, interruptible speech output
//!
//! Producers enqueue [`SpeechSegment`]s through a cloneable [`SpeechHandle`]
//! without blocking. One dedicated thread consumes them in order: it waits out
//! the minimum gap since the previous utterance, synthesizes, and writes the
//! audio to the sink chunk by chunk, checking for cancellation between chunks.
//!
//! Cancellation bumps an epoch. Segments from an older epoch are discarded
//! unplayed, and the segment in flight stops at the next chunk boundary.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use super::markup::SpeechSegment;
use super::playback::{AudioSink, decode};
use super::speaking::SpeakingWriter;
use super::tts::{SpeechSynthesizer, SynthesizedAudio};
use crate::config::SpeechConfig;
use crate::{Error, Result};

/// Longest single sleep while waiting out the inter-utterance gap
const GAP_SLICE: Duration = Duration::from_millis(20);

/// How one segment ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Played to the end
    Completed,
    /// Stopped by an interrupt; a normal path, not an error
    Interrupted,
    /// Synthesis or playback failed; the queue moves on
    Failed,
}

/// Builds the audio sink on the consumer thread
pub type SinkFactory = Box<dyn FnOnce() -> Result<Box<dyn AudioSink>> + Send>;

/// Queue timing settings
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Minimum silence between the end of one utterance and the next
    pub min_gap: Duration,
    /// Bytes of 16-bit PCM written per chunk
    pub chunk_bytes: usize,
}

impl From<&SpeechConfig> for QueueSettings {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            min_gap: config.min_gap,
            chunk_bytes: config.chunk_bytes,
        }
    }
}

enum Command {
    Speak { segment: SpeechSegment, epoch: u64 },
    Close,
}

struct Shared {
    /// Segments enqueued but not yet finished
    outstanding: watch::Sender<usize>,
    epoch: watch::Sender<u64>,
    /// Outcome of the most recently finished segment
    last_outcome: watch::Sender<Option<PlaybackOutcome>>,
}

impl Shared {
    fn current_epoch(&self) -> u64 {
        *self.epoch.borrow()
    }

    fn finish_one(&self) {
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Producer side of the speech queue
#[derive(Clone)]
pub struct SpeechHandle {
    tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SpeechHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechHandle")
            .field("outstanding", &*self.shared.outstanding.borrow())
            .finish_non_exhaustive()
    }
}

impl SpeechHandle {
    /// Add a segment to the tail of the queue; never blocks
    ///
    /// # Errors
    ///
    /// Returns `Stopped` if the queue has been closed
    pub fn enqueue(&self, segment: SpeechSegment) -> Result<()> {
        let epoch = self.shared.current_epoch();
        self.shared.outstanding.send_modify(|n| *n += 1);

        if self.tx.send(Command::Speak { segment, epoch }).is_err() {
            self.shared.finish_one();
            return Err(Error::Stopped);
        }
        Ok(())
    }

    /// Enqueue model text, detecting SSML
    ///
    /// # Errors
    ///
    /// Returns `Stopped` if the queue has been closed
    pub fn speak(&self, text: &str) -> Result<()> {
        self.enqueue(SpeechSegment::detect(text))
    }

    /// Silence the segment in flight and drop everything queued
    pub fn cancel(&self) {
        self.shared.epoch.send_modify(|e| *e += 1);
        tracing::debug!(epoch = self.shared.current_epoch(), "speech cancelled");
    }

    /// True when nothing is queued or playing
    #[must_use]
    pub fn is_idle(&self) -> bool {
        *self.shared.outstanding.borrow() == 0
    }

    /// Outcome of the most recently finished segment
    #[must_use]
    pub fn last_outcome(&self) -> Option<PlaybackOutcome> {
        *self.shared.last_outcome.borrow()
    }

    /// Wait until the queue is empty and no segment is in flight
    pub async fn wait_until_done(&self) {
        let mut rx = self.shared.outstanding.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

/// Owner of the speech consumer thread
pub struct SpeechQueue {
    handle: SpeechHandle,
    thread: Option<JoinHandle<()>>,
}

impl SpeechQueue {
    /// Start the consumer thread
    ///
    /// Must be called inside a tokio runtime; synthesis runs on it.
    ///
    /// # Errors
    ///
    /// Returns error if there is no runtime or the thread cannot be spawned
    pub fn spawn(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: SinkFactory,
        settings: QueueSettings,
        speaking: SpeakingWriter,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Audio(format!("speech queue needs a tokio runtime: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            outstanding: watch::channel(0).0,
            epoch: watch::channel(0).0,
            last_outcome: watch::channel(None).0,
        });

        let consumer = Consumer {
            rx,
            shared: Arc::clone(&shared),
            synthesizer,
            speaking,
            runtime,
            settings,
            last_end: None,
        };

        let thread = std::thread::Builder::new()
            .name("speech-queue".to_string())
            .spawn(move || consumer.run(sink))?;

        Ok(Self {
            handle: SpeechHandle { tx, shared },
            thread: Some(thread),
        })
    }

    /// A producer handle
    #[must_use]
    pub fn handle(&self) -> SpeechHandle {
        self.handle.clone()
    }

    /// Play out what is queued, then stop the consumer thread
    pub async fn close(mut self) {
        self.handle.wait_until_done().await;
        let _ = self.handle.tx.send(Command::Close);
        if let Some(thread) = self.thread.take() {
            let _ = tokio::task::spawn_blocking(move || thread.join()).await;
        }
    }
}

impl Drop for SpeechQueue {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.handle.cancel();
            let _ = self.handle.tx.send(Command::Close);
        }
    }
}

struct Consumer {
    rx: mpsc::UnboundedReceiver<Command>,
    shared: Arc<Shared>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    speaking: SpeakingWriter,
    runtime: Handle,
    settings: QueueSettings,
    last_end: Option<Instant>,
}

impl Consumer {
    fn run(mut self, sink: SinkFactory) {
        let mut sink = match sink() {
            Ok(sink) => Some(sink),
            Err(e) => {
                tracing::error!(error = %e, "audio output unavailable, speech will be skipped");
                None
            }
        };

        while let Some(command) = self.rx.blocking_recv() {
            let Command::Speak { segment, epoch } = command else {
                break;
            };

            let outcome = if epoch == self.shared.current_epoch() {
                Some(self.play(segment, epoch, sink.as_deref_mut()))
            } else {
                tracing::debug!(text = %segment.text, "discarding cancelled segment");
                None
            };

            if let Some(outcome) = outcome {
                self.shared.last_outcome.send_replace(Some(outcome));
            }
            self.shared.finish_one();
        }

        tracing::debug!("speech queue closed");
    }

    /// Speak one segment with the speaking flag held
    fn play(
        &mut self,
        segment: SpeechSegment,
        epoch: u64,
        sink: Option<&mut (dyn AudioSink + 'static)>,
    ) -> PlaybackOutcome {
        if !self.wait_gap(epoch) {
            return PlaybackOutcome::Interrupted;
        }

        self.speaking.set(true);
        let outcome = self.speak(segment, epoch, sink);
        self.speaking.set(false);
        self.last_end = Some(Instant::now());

        tracing::debug!(?outcome, "segment finished");
        outcome
    }

    /// Sleep out the remainder of the minimum gap; false if cancelled
    fn wait_gap(&self, epoch: u64) -> bool {
        let Some(last_end) = self.last_end else {
            return true;
        };

        let deadline = last_end + self.settings.min_gap;
        loop {
            if self.shared.current_epoch() != epoch {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(GAP_SLICE));
        }
    }

    fn speak(
        &self,
        segment: SpeechSegment,
        epoch: u64,
        sink: Option<&mut (dyn AudioSink + 'static)>,
    ) -> PlaybackOutcome {
        let segment = segment.validated();
        tracing::info!(text = %segment.text, "speaking");

        let mut epoch_rx = self.shared.epoch.subscribe();
        let synthesized = self.runtime.block_on(async {
            tokio::select! {
                audio = self.synthesizer.synthesize(&segment.text, segment.markup) => Some(audio),
                _ = epoch_rx.wait_for(|e| *e != epoch) => None,
            }
        });

        let audio = match synthesized {
            None => return PlaybackOutcome::Interrupted,
            Some(Err(e)) => {
                tracing::error!(error = %e, "speech synthesis failed");
                return PlaybackOutcome::Failed;
            }
            Some(Ok(audio)) => audio,
        };

        let Some(sink) = sink else {
            return PlaybackOutcome::Failed;
        };

        match self.write_audio(&audio, epoch, &mut *sink) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "playback failed");
                sink.stop();
                PlaybackOutcome::Failed
            }
        }
    }

    fn write_audio(
        &self,
        audio: &SynthesizedAudio,
        epoch: u64,
        sink: &mut (dyn AudioSink + 'static),
    ) -> Result<PlaybackOutcome> {
        let decoded = decode(audio)?;
        let chunk_samples = (self.settings.chunk_bytes / 2).max(1);

        sink.begin(decoded.sample_rate)?;
        for chunk in decoded.samples.chunks(chunk_samples) {
            if self.shared.current_epoch() != epoch {
                sink.stop();
                return Ok(PlaybackOutcome::Interrupted);
            }
            sink.write(chunk)?;
        }

        if self.shared.current_epoch() != epoch {
            sink.stop();
            return Ok(PlaybackOutcome::Interrupted);
        }
        sink.finish()?;
        Ok(PlaybackOutcome::Completed)
    }
}
