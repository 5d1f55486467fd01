//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use summoner_voice::agent::{LoopSettings, SamplingParams};
use summoner_voice::config::TurnConfig;
use summoner_voice::context::ContentBlock;
use summoner_voice::tools::ToolDefinition;
use summoner_voice::voice::{
    AudioFormat, AudioSink, Markup, QueueSettings, SinkFactory, SpeechSynthesizer,
    SynthesizedAudio, TranscriptEvent, TranscriptFragment, TranscriptionBackend,
};
use summoner_voice::{
    LookupStore, ModelBackend, ModelRequest, ModelResponse, OrchestratorSettings, StopReason,
    ToolDispatcher, ToolError, TranscriptionError, TurnError, db,
};

/// Set up an in-memory lookup database with a few champions
#[must_use]
pub fn seeded_store() -> LookupStore {
    let pool = db::init_memory().expect("failed to init test db");
    pool.get()
        .expect("failed to get connection")
        .execute_batch(
            r"
            INSERT INTO champion_stat VALUES ('Jax', 665, 339, 36, 32, 68, 0.638, 350);
            INSERT INTO champion_spells VALUES
                ('Jax', 'Passive', 'Relentless Assault', 'Attacks grant attack speed.', NULL, ''),
                ('Jax', 'Q', 'Leap Strike', 'Jax leaps toward a unit.', '8/7.5/7/6.5/6', '65 Mana'),
                ('Jax', 'E', 'Counter Strike', 'Jax dodges attacks.', '17/15/13/11/9', '50 Mana');
            INSERT INTO champions_background VALUES
                ('Jax', 'Grandmaster at Arms', 'Come on!', 'A legend of Icathia.', 'Fighter', 'Runeterra');
            INSERT INTO champion_build VALUES
                ('Jax', 1, 3078, 'Trinity Force'),
                ('Jax', 2, 3053, 'Sterak''s Gage'),
                ('Jax', 3, 3153, 'Blade of the Ruined King');
            ",
        )
        .expect("failed to seed test db");
    LookupStore::new(pool)
}

/// A tool-use response asking for the given invocations
pub fn tool_use(text: &str, calls: &[(&str, &str, Value)]) -> ModelResponse {
    let mut content = Vec::new();
    if !text.is_empty() {
        content.push(ContentBlock::text(text));
    }
    content.extend(calls.iter().map(|(id, name, input)| ContentBlock::ToolUse {
        id: (*id).to_string(),
        name: (*name).to_string(),
        input: input.clone(),
    }));
    ModelResponse {
        content,
        stop_reason: StopReason::ToolUse,
    }
}

/// A final answer
pub fn answer(text: &str) -> ModelResponse {
    ModelResponse::text_only(text, StopReason::EndTurn)
}

/// Model backend that replays scripted responses and records requests
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<ModelResponse, TurnError>>>,
    requests: Mutex<Vec<ModelRequest>>,
    delay: Duration,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<ModelResponse, TurnError>>) -> Arc<Self> {
        Self::with_delay(script, Duration::ZERO)
    }

    pub fn with_delay(script: Vec<Result<ModelResponse, TurnError>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            delay,
        })
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, TurnError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TurnError::BackendUnavailable("script exhausted".to_string())));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        next
    }
}

/// Dispatcher with canned results per tool name; records every call
#[derive(Default)]
pub struct FakeDispatcher {
    results: Vec<(String, Result<Value, ToolError>)>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl FakeDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, result: Result<Value, ToolError>) -> Self {
        self.results.push((name.to_string(), result));
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolDispatcher for FakeDispatcher {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.results
            .iter()
            .map(|(name, _)| ToolDefinition {
                name: name.clone(),
                description: format!("test tool {name}"),
                input_schema: json!({"type": "object"}),
            })
            .collect()
    }

    async fn dispatch(&self, name: &str, input: &Value) -> Result<Value, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), input.clone()));
        self.results
            .iter()
            .find(|(n, _)| n == name)
            .map_or_else(|| Err(ToolError::NotFound(name.to_string())), |(_, r)| r.clone())
    }
}

/// Synthesizer producing silent PCM; records the text of each segment
#[derive(Default)]
pub struct RecordingSynthesizer {
    spoken: Mutex<Vec<(String, Markup)>>,
}

/// Sample rate of synthesized test audio
pub const TEST_SAMPLE_RATE: u32 = 16000;

impl RecordingSynthesizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|(text, _)| text.clone())
            .collect()
    }

    pub fn markups(&self) -> Vec<Markup> {
        self.spoken.lock().unwrap().iter().map(|(_, m)| *m).collect()
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        markup: Markup,
    ) -> summoner_voice::Result<SynthesizedAudio> {
        self.spoken.lock().unwrap().push((text.to_string(), markup));
        // 100ms of silence
        Ok(SynthesizedAudio {
            format: AudioFormat::Pcm16 {
                sample_rate: TEST_SAMPLE_RATE,
            },
            bytes: vec![0; 3200],
        })
    }
}

/// Something that happened to a [`RecordingSink`]
#[derive(Debug, Clone, Copy)]
pub enum SinkEvent {
    Begin(Instant),
    Write(usize),
    Finish(Instant),
    Stop,
}

/// Shared log of sink events
pub type SinkLog = Arc<Mutex<Vec<SinkEvent>>>;

/// Audio sink that records calls and paces writes like a slow device
pub struct RecordingSink {
    log: SinkLog,
    per_chunk: Duration,
}

impl AudioSink for RecordingSink {
    fn begin(&mut self, _sample_rate: u32) -> summoner_voice::Result<()> {
        self.log.lock().unwrap().push(SinkEvent::Begin(Instant::now()));
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> summoner_voice::Result<()> {
        std::thread::sleep(self.per_chunk);
        self.log.lock().unwrap().push(SinkEvent::Write(samples.len()));
        Ok(())
    }

    fn finish(&mut self) -> summoner_voice::Result<()> {
        self.log.lock().unwrap().push(SinkEvent::Finish(Instant::now()));
        Ok(())
    }

    fn stop(&mut self) {
        self.log.lock().unwrap().push(SinkEvent::Stop);
    }
}

/// A sink factory and the log its sink writes to
pub fn recording_sink(per_chunk: Duration) -> (SinkFactory, SinkLog) {
    let log = SinkLog::default();
    let sink_log = Arc::clone(&log);
    let factory: SinkFactory = Box::new(move || {
        Ok(Box::new(RecordingSink {
            log: sink_log,
            per_chunk,
        }) as Box<dyn AudioSink>)
    });
    (factory, log)
}

/// Number of utterances the sink started
pub fn begins(log: &SinkLog) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, SinkEvent::Begin(_)))
        .count()
}

/// Transcription backend that replays fixed events once and then stays open
#[derive(Default)]
pub struct ScriptedTranscription {
    events: Mutex<Vec<TranscriptEvent>>,
    /// Senders kept alive so streams never end on their own
    open: Mutex<Vec<mpsc::Sender<TranscriptEvent>>>,
}

impl ScriptedTranscription {
    pub fn finals(texts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(
                texts
                    .iter()
                    .map(|t| TranscriptEvent::Fragment(TranscriptFragment::final_text(*t)))
                    .collect(),
            ),
            open: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TranscriptionBackend for ScriptedTranscription {
    async fn open(&self) -> Result<mpsc::Receiver<TranscriptEvent>, TranscriptionError> {
        let events = std::mem::take(&mut *self.events.lock().unwrap());
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.try_send(event).expect("channel sized for script");
        }
        self.open.lock().unwrap().push(tx);
        Ok(rx)
    }
}

/// Orchestrator settings with short timings and no persistence
pub fn test_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        tool_loop: LoopSettings {
            system_prompt: "You are a test companion.".to_string(),
            sampling: SamplingParams {
                max_tokens: 300,
                temperature: 1.0,
                top_p: 0.999,
                top_k: Some(250),
                stop_sequences: Vec::new(),
            },
            tools_enabled: true,
            max_rounds: 8,
            repeat_limit: 3,
            max_concurrency: 4,
        },
        queue: QueueSettings {
            min_gap: Duration::from_millis(50),
            chunk_bytes: 640,
        },
        turn: TurnConfig {
            max_idle_ticks: 3,
            tick_interval: Duration::from_millis(10),
            reconnect_delay: Duration::from_millis(10),
            ..TurnConfig::default()
        },
        context_capacity: 20,
        history_turns: 5,
        apology: "Sorry, something went wrong.".to_string(),
        farewell: String::new(),
        context_path: None,
    }
}
