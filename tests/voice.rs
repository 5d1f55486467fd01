//! Audio pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;

use summoner_voice::voice::{
    AudioFormat, EnergyGate, GateEvent, SAMPLE_RATE, SynthesizedAudio, decode, samples_to_wav,
};

/// Frame size delivered by the capture thread in these tests (100ms)
const FRAME: usize = 1600;

/// Generate sine wave audio samples
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

fn feed(gate: &mut EnergyGate, samples: &[f32]) -> Vec<GateEvent> {
    samples.chunks(FRAME).map(|frame| gate.process(frame)).collect()
}

#[test]
fn test_utterance_is_segmented() {
    let mut gate = EnergyGate::new();

    let events = feed(&mut gate, &generate_silence(0.5));
    assert!(events.iter().all(|e| *e == GateEvent::Silence));

    let events = feed(&mut gate, &generate_sine_samples(220.0, 1.0, 0.5));
    assert_eq!(events[0], GateEvent::SpeechStarted);
    assert!(events[1..].iter().all(|e| *e == GateEvent::Speaking));
    assert!(gate.is_active());

    let events = feed(&mut gate, &generate_silence(1.0));
    let segments: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            GateEvent::Segment(samples) => Some(samples.len()),
            _ => None,
        })
        .collect();
    assert_eq!(segments.len(), 1);
    // One second of speech plus the trailing silence that closed it
    assert!(segments[0] > SAMPLE_RATE as usize);
    assert!(!gate.is_active());
}

#[test]
fn test_quiet_audio_never_starts_speech() {
    let mut gate = EnergyGate::new();
    let events = feed(&mut gate, &generate_sine_samples(220.0, 2.0, 0.01));
    assert!(events.iter().all(|e| *e == GateEvent::Silence));
}

#[test]
fn test_two_utterances_give_two_segments() {
    let mut gate = EnergyGate::new();
    let mut audio = generate_sine_samples(220.0, 0.6, 0.4);
    audio.extend(generate_silence(0.8));
    audio.extend(generate_sine_samples(330.0, 0.6, 0.4));
    audio.extend(generate_silence(0.8));

    let segments = feed(&mut gate, &audio)
        .into_iter()
        .filter(|e| matches!(e, GateEvent::Segment(_)))
        .count();
    assert_eq!(segments, 2);
}

#[test]
fn test_reset_drops_open_utterance() {
    let mut gate = EnergyGate::new();
    feed(&mut gate, &generate_sine_samples(220.0, 0.5, 0.5));
    assert!(gate.is_active());

    gate.reset();
    assert!(!gate.is_active());
    let events = feed(&mut gate, &generate_silence(1.0));
    assert!(events.iter().all(|e| *e == GateEvent::Silence));
}

#[test]
fn test_samples_to_wav() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    // Check WAV header magic
    assert_eq!(&wav_data[0..4], b"RIFF");
    assert_eq!(&wav_data[8..12], b"WAVE");

    // WAV header is 44 bytes
    assert!(wav_data.len() >= 44 + samples.len() * 2);
}

#[test]
fn test_wav_readback() {
    let original_samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.25];
    let wav_data = samples_to_wav(&original_samples, SAMPLE_RATE).unwrap();

    let mut reader = hound::WavReader::new(Cursor::new(wav_data)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.channels, 1);

    let read_samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(read_samples, [0, 16383, -16383, 32767, -32767, 8191]);
}

#[test]
fn test_pcm_passthrough_decode() {
    let audio = SynthesizedAudio {
        format: AudioFormat::Pcm16 { sample_rate: 22050 },
        bytes: vec![0x01, 0x00, 0xff, 0xff, 0x00, 0x80, 0x7f],
    };
    let decoded = decode(&audio).unwrap();
    assert_eq!(decoded.sample_rate, 22050);
    // Trailing odd byte is ignored
    assert_eq!(decoded.samples, [1, -1, i16::MIN]);
}

#[test]
fn test_garbage_mp3_decodes_to_error_or_silence() {
    let audio = SynthesizedAudio {
        format: AudioFormat::Mp3,
        bytes: b"definitely not an mp3 stream".to_vec(),
    };
    if let Ok(decoded) = decode(&audio) {
        assert!(decoded.samples.is_empty());
    }
}
