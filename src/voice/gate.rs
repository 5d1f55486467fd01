//! Energy-based speech segmentation
//!
//! Splits a microphone stream into utterances using RMS energy: speech starts
//! when a frame is loud enough and ends after half a second of quiet.

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to keep a segment (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration that closes a segment (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// What one frame did to the gate
#[derive(Debug, Clone, PartialEq)]
pub enum GateEvent {
    /// Nothing is being said
    Silence,
    /// A new utterance began with this frame
    SpeechStarted,
    /// The current utterance continues
    Speaking,
    /// The utterance ended; its samples, trailing silence included
    Segment(Vec<f32>),
}

/// Segments audio into utterances
#[derive(Debug, Default)]
pub struct EnergyGate {
    active: bool,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
}

impl EnergyGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one frame of samples
    pub fn process(&mut self, samples: &[f32]) -> GateEvent {
        let energy = calculate_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        if !self.active {
            if !is_speech {
                return GateEvent::Silence;
            }
            self.active = true;
            self.speech_buffer.clear();
            self.speech_buffer.extend_from_slice(samples);
            self.silence_counter = 0;
            tracing::trace!(energy, "speech detected");
            return GateEvent::SpeechStarted;
        }

        self.speech_buffer.extend_from_slice(samples);
        if is_speech {
            self.silence_counter = 0;
        } else {
            self.silence_counter += samples.len();
        }

        if self.silence_counter <= SILENCE_SAMPLES {
            return GateEvent::Speaking;
        }

        let speech_len = self.speech_buffer.len() - self.silence_counter;
        let segment = std::mem::take(&mut self.speech_buffer);
        self.reset();

        if speech_len < MIN_SPEECH_SAMPLES {
            tracing::trace!(samples = speech_len, "discarding short noise burst");
            return GateEvent::Silence;
        }

        tracing::debug!(samples = segment.len(), "speech segment complete");
        GateEvent::Segment(segment)
    }

    /// True while an utterance is open
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Drop any open utterance
    pub fn reset(&mut self) {
        self.active = false;
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
