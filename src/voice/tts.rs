//! Text-to-speech (TTS) backends

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::markup::{Markup, strip_tags};
use crate::config::{SpeechConfig, TtsProvider};
use crate::{Error, Result};

/// Encoding of synthesized audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    /// Raw little-endian 16-bit mono PCM
    Pcm16 { sample_rate: u32 },
}

/// Synthesized utterance
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub format: AudioFormat,
    pub bytes: Vec<u8>,
}

/// Turns text into audio
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize one segment
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str, markup: Markup) -> Result<SynthesizedAudio>;
}

/// Synthesizes speech over HTTP (`OpenAI` or `ElevenLabs`)
pub struct HttpSynthesizer {
    client: reqwest::Client,
    api_key: SecretString,
    voice: String,
    speed: f32,
    model: String,
    provider: TtsProvider,
}

impl std::fmt::Debug for HttpSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSynthesizer")
            .field("provider", &self.provider)
            .field("voice", &self.voice)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl HttpSynthesizer {
    /// Create a synthesizer for the configured provider
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(config: &SpeechConfig, api_key: Option<&SecretString>) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.expose_secret().is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "API key required for TTS provider {:?}",
                    config.tts_provider
                ))
            })?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: SecretString::from(api_key.expose_secret().to_owned()),
            voice: config.tts_voice.clone(),
            speed: config.tts_speed,
            model: config.tts_model.clone(),
            provider: config.tts_provider,
        })
    }

    /// Synthesize using `OpenAI` TTS
    ///
    /// The speech endpoint has no SSML support, so tags are stripped.
    async fn synthesize_openai(&self, text: &str, markup: Markup) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let input = match markup {
            Markup::Plain => text.to_string(),
            Markup::Structured => strip_tags(text),
        };

        let request = TtsRequest {
            model: &self.model,
            input: &input,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }

    /// Synthesize using ElevenLabs TTS
    async fn synthesize_elevenlabs(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}",
            self.voice
        );

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", self.api_key.expose_secret())
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, markup: Markup) -> Result<SynthesizedAudio> {
        tracing::debug!(provider = ?self.provider, chars = text.len(), "synthesizing speech");

        let bytes = match self.provider {
            TtsProvider::OpenAi => self.synthesize_openai(text, markup).await?,
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text).await?,
        };

        Ok(SynthesizedAudio {
            format: AudioFormat::Mp3,
            bytes,
        })
    }
}
