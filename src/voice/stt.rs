//! Speech-to-text (STT) processing
//!
//! Live transcription is built from a batch API: the microphone stream is cut
//! into utterances by the energy gate and each utterance is sent to Whisper.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;

use super::capture::{MicCapture, SAMPLE_RATE, samples_to_wav};
use super::gate::{EnergyGate, GateEvent};
use super::transcript::{TranscriptEvent, TranscriptFragment, TranscriptionBackend};
use crate::error::TranscriptionError;
use crate::{Error, Result};

/// Silent samples reported as one empty result (100ms)
const SILENCE_REPORT_SAMPLES: usize = 1600;

/// Interim liveness cadence while an utterance is being transcribed
const TRANSCRIBING_LIVENESS: Duration = Duration::from_millis(100);

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcribes recorded speech with `OpenAI` Whisper
pub struct WhisperClient {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    language: Option<String>,
}

impl std::fmt::Debug for WhisperClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperClient")
            .field("model", &self.model)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl WhisperClient {
    /// Create a Whisper client
    ///
    /// `language` accepts a locale such as `en-US`; only the language part
    /// is sent.
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: Option<&SecretString>, model: String, language: &str) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.expose_secret().is_empty())
            .ok_or_else(|| Error::Config("OpenAI API key required for Whisper".to_string()))?;

        let language = language
            .split(['-', '_'])
            .next()
            .map(str::to_ascii_lowercase)
            .filter(|l| !l.is_empty());

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: SecretString::from(api_key.expose_secret().to_owned()),
            model,
            language,
        })
    }

    /// Transcribe WAV audio to text
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    pub async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await?;
        tracing::debug!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }
}

/// Live transcription from the microphone, one final fragment per utterance
///
/// Emits an interim fragment when speech starts and while it continues, a
/// final fragment for each transcribed utterance, and one empty result per
/// 100ms of silence. Interims keep coming while an utterance is with Whisper,
/// so a slow request never reads as the user going quiet.
#[derive(Debug, Clone)]
pub struct SegmentingTranscriber {
    stt: Arc<WhisperClient>,
}

impl SegmentingTranscriber {
    #[must_use]
    pub const fn new(stt: Arc<WhisperClient>) -> Self {
        Self { stt }
    }
}

#[async_trait]
impl TranscriptionBackend for SegmentingTranscriber {
    async fn open(&self) -> std::result::Result<mpsc::Receiver<TranscriptEvent>, TranscriptionError> {
        let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<f32>>(256);
        let capture =
            MicCapture::start(frame_tx).map_err(|e| TranscriptionError::Connect(e.to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        let stt = Arc::clone(&self.stt);

        tokio::spawn(async move {
            // Capture stops when this task ends
            let _capture = capture;
            let mut gate = EnergyGate::new();
            let mut silent_samples = 0usize;

            while let Some(frame) = frame_rx.recv().await {
                let event = match gate.process(&frame) {
                    GateEvent::Silence => {
                        silent_samples += frame.len();
                        if silent_samples < SILENCE_REPORT_SAMPLES {
                            continue;
                        }
                        silent_samples = 0;
                        TranscriptEvent::NoResult
                    }
                    GateEvent::SpeechStarted | GateEvent::Speaking => {
                        silent_samples = 0;
                        TranscriptEvent::Fragment(TranscriptFragment::interim(""))
                    }
                    GateEvent::Segment(samples) => {
                        let Some(outcome) = with_liveness(transcribe(&stt, &samples), &tx).await
                        else {
                            break;
                        };
                        match outcome {
                            Ok(text) if text.trim().is_empty() => TranscriptEvent::NoResult,
                            Ok(text) => {
                                TranscriptEvent::Fragment(TranscriptFragment::final_text(text))
                            }
                            Err(e) => {
                                TranscriptEvent::Failed(TranscriptionError::Stream(e.to_string()))
                            }
                        }
                    }
                };

                let failed = matches!(event, TranscriptEvent::Failed(_));
                if tx.send(event).await.is_err() || failed {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

/// Await `work`, sending an interim fragment every liveness interval
///
/// Returns `None` if the receiver went away first.
async fn with_liveness<F: Future>(work: F, tx: &mpsc::Sender<TranscriptEvent>) -> Option<F::Output> {
    tokio::pin!(work);
    let mut liveness = tokio::time::interval(TRANSCRIBING_LIVENESS);

    loop {
        tokio::select! {
            output = &mut work => return Some(output),
            _ = liveness.tick() => {
                let interim = TranscriptEvent::Fragment(TranscriptFragment::interim(""));
                if tx.send(interim).await.is_err() {
                    return None;
                }
            }
        }
    }
}

async fn transcribe(stt: &WhisperClient, samples: &[f32]) -> Result<String> {
    let wav = samples_to_wav(samples, SAMPLE_RATE)?;
    stt.transcribe(&wav).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_is_reduced_to_language() {
        let key = SecretString::from("sk-test".to_string());
        let client = WhisperClient::new(Some(&key), "whisper-1".to_string(), "en-US").unwrap();
        assert_eq!(client.language.as_deref(), Some("en"));
    }

    #[test]
    fn missing_key_is_rejected() {
        assert!(WhisperClient::new(None, "whisper-1".to_string(), "en").is_err());
    }

    #[tokio::test]
    async fn slow_transcription_sends_interims() {
        let (tx, mut rx) = mpsc::channel(64);
        let output = with_liveness(
            async {
                tokio::time::sleep(Duration::from_millis(350)).await;
                "done"
            },
            &tx,
        )
        .await;
        assert_eq!(output, Some("done"));

        drop(tx);
        let mut interims = 0;
        while let Some(event) = rx.recv().await {
            assert!(matches!(event, TranscriptEvent::Fragment(ref f) if !f.is_final));
            interims += 1;
        }
        // One right away, then one per 100ms
        assert!(interims >= 3);
    }

    #[tokio::test]
    async fn closed_receiver_abandons_transcription() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let output = with_liveness(std::future::pending::<()>(), &tx).await;
        assert_eq!(output, None);
    }
}
