//! Voice input and output
//!
//! Input: microphone capture, energy segmentation, Whisper transcription and
//! turn detection. Output: speech synthesis and the playback queue, which
//! alone writes the speaking flag.

mod capture;
mod gate;
mod markup;
mod playback;
mod queue;
mod speaking;
mod stt;
mod transcript;
mod tts;
mod turn;

pub use capture::{MicCapture, SAMPLE_RATE, samples_to_wav};
pub use gate::{EnergyGate, GateEvent};
pub use markup::{Markup, SpeechSegment, is_well_formed, strip_tags};
pub use playback::{AudioSink, CpalSink, DecodedAudio, decode};
pub use queue::{PlaybackOutcome, QueueSettings, SinkFactory, SpeechHandle, SpeechQueue};
pub use speaking::{SpeakingState, SpeakingStatus, SpeakingWriter, speaking_state};
pub use stt::{SegmentingTranscriber, WhisperClient};
pub use transcript::{TranscriptEvent, TranscriptFragment, TranscriptionBackend};
pub use tts::{AudioFormat, HttpSynthesizer, SpeechSynthesizer, SynthesizedAudio};
pub use turn::{Observation, PendingTurnBuffer, TurnDetector};
