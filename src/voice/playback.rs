//! Audio playback to speakers

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream};

use super::tts::{AudioFormat, SynthesizedAudio};
use crate::{Error, Result};

/// Samples queued ahead of the device before `write` blocks
const MAX_BUFFERED_SAMPLES: usize = 4096;

/// Mono 16-bit PCM ready for playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

/// Destination for PCM audio
///
/// A sink is created and used on the speech consumer thread only.
pub trait AudioSink {
    /// Prepare for an utterance at the given sample rate
    ///
    /// # Errors
    ///
    /// Returns error if the output device cannot be opened
    fn begin(&mut self, sample_rate: u32) -> Result<()>;

    /// Queue one chunk, blocking while the device is far behind
    ///
    /// # Errors
    ///
    /// Returns error if the output stream failed
    fn write(&mut self, samples: &[i16]) -> Result<()>;

    /// Wait for queued audio to play out, then release the device
    ///
    /// # Errors
    ///
    /// Returns error if the output stream failed
    fn finish(&mut self) -> Result<()>;

    /// Drop queued audio and release the device immediately
    fn stop(&mut self);
}

/// Plays audio on the default output device
pub struct CpalSink {
    device: Device,
    stream: Option<Stream>,
    buffer: Arc<Mutex<VecDeque<f32>>>,
    sample_rate: u32,
}

impl CpalSink {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );

        Ok(Self {
            device,
            stream: None,
            buffer: Arc::new(Mutex::new(VecDeque::new())),
            sample_rate: 24000,
        })
    }

    fn buffered(&self) -> usize {
        self.buffer.lock().map(|buf| buf.len()).unwrap_or(0)
    }
}

impl AudioSink for CpalSink {
    fn begin(&mut self, sample_rate: u32) -> Result<()> {
        self.stop();

        let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        };

        let supported_config = self
            .device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports(c, 1))
            .or_else(|| {
                // Fallback: try stereo
                self.device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports(c, 2))
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();
        let channels = usize::from(config.channels);
        let buffer = Arc::clone(&self.buffer);

        let stream = self
            .device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut queued) = buffer.lock() else {
                        data.fill(0.0);
                        return;
                    };
                    for frame in data.chunks_mut(channels) {
                        let sample = queued.pop_front().unwrap_or(0.0);
                        frame.fill(sample);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);
        self.sample_rate = sample_rate;
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        if self.stream.is_none() {
            return Err(Error::Audio("playback not started".to_string()));
        }

        while self.buffered() > MAX_BUFFERED_SAMPLES {
            std::thread::sleep(Duration::from_millis(5));
        }

        let mut queued = self
            .buffer
            .lock()
            .map_err(|_| Error::Audio("playback buffer poisoned".to_string()))?;
        queued.extend(samples.iter().map(|&s| f32::from(s) / 32768.0));
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let remaining = self.buffered() as u64;
        let timeout =
            Duration::from_millis(remaining * 1000 / u64::from(self.sample_rate.max(1)) + 500);
        let start = Instant::now();

        while self.buffered() > 0 {
            if start.elapsed() > timeout {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        // Let the device drain its own buffer
        std::thread::sleep(Duration::from_millis(100));
        self.stream = None;
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut queued) = self.buffer.lock() {
            queued.clear();
        }
        if self.stream.take().is_some() {
            tracing::debug!("playback stopped");
        }
    }
}

/// Decode synthesized audio to mono PCM
///
/// # Errors
///
/// Returns error if MP3 decoding fails
pub fn decode(audio: &SynthesizedAudio) -> Result<DecodedAudio> {
    match audio.format {
        AudioFormat::Mp3 => decode_mp3(&audio.bytes),
        AudioFormat::Pcm16 { sample_rate } => Ok(DecodedAudio {
            samples: audio
                .bytes
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]))
                .collect(),
            sample_rate,
        }),
    }
}

/// Decode MP3 bytes to mono samples
fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = None;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate.is_none() {
                    sample_rate = u32::try_from(frame.sample_rate).ok();
                }

                if frame.channels == 2 {
                    // Stereo: average channels
                    #[allow(clippy::cast_possible_truncation)]
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = i32::from(chunk[0]);
                        let right = i32::from(chunk.get(1).copied().unwrap_or(chunk[0]));
                        ((left + right) / 2) as i16
                    }));
                } else {
                    samples.extend_from_slice(&frame.data);
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(DecodedAudio {
        samples,
        sample_rate: sample_rate.unwrap_or(24000),
    })
}
