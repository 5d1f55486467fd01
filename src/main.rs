use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use summoner_voice::config::TtsProvider;
use summoner_voice::orchestrator::load_context;
use summoner_voice::voice::{
    AudioSink, CpalSink, HttpSynthesizer, MicCapture, SAMPLE_RATE, SegmentingTranscriber,
    SinkFactory, SpeechSynthesizer, WhisperClient, decode,
};
use summoner_voice::{
    Config, LookupTool, Orchestrator, OrchestratorSettings, ToolRegistry, agent,
};

/// Summoner - spoken League of Legends companion
#[derive(Parser)]
#[command(name = "summoner", version, about)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "SUMMONER_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Read turns from stdin instead of the microphone
    #[arg(long)]
    text: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Ask one question and speak the answer
    Ask {
        /// The question
        question: String,
    },
    /// Show the persisted conversation
    History {
        /// Number of most recent turns (defaults to `context.history_turns`)
        #[arg(short, long)]
        turns: Option<usize>,
    },
    /// Print the lookup tool definitions offered to the model as JSON
    Tools,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,summoner_voice=info,summoner=info",
        1 => "info,summoner_voice=debug,summoner=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Ask { question } => ask(cli.config, &question).await,
            Command::History { turns } => history(cli.config, turns),
            Command::Tools => list_tools(),
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(cli.config, &text).await,
        };
    }

    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    let orchestrator = Arc::new(build_orchestrator(&config)?);

    if cli.text {
        run_text(&orchestrator).await;
    } else {
        run_voice(&orchestrator, &config).await?;
    }

    match Arc::try_unwrap(orchestrator) {
        Ok(orchestrator) => orchestrator.shutdown().await,
        Err(_) => tracing::warn!("orchestrator still in use, skipping farewell"),
    }
    Ok(())
}

fn build_orchestrator(config: &Config) -> anyhow::Result<Orchestrator> {
    let backend = agent::build_backend(config)?;
    let tools = ToolRegistry::open(
        &config.tools.database_path,
        config.tools.max_concurrency,
        config.tools.call_timeout,
    )?;
    let synthesizer = build_synthesizer(config)?;
    let sink: SinkFactory = Box::new(|| Ok(Box::new(CpalSink::new()?) as Box<dyn AudioSink>));

    Ok(Orchestrator::new(
        backend,
        Arc::new(tools),
        synthesizer,
        sink,
        OrchestratorSettings::from_config(config),
    )?)
}

fn build_synthesizer(config: &Config) -> anyhow::Result<Arc<dyn SpeechSynthesizer>> {
    let key = match config.speech.tts_provider {
        TtsProvider::OpenAi => config.api_keys.openai.as_ref(),
        TtsProvider::ElevenLabs => config.api_keys.elevenlabs.as_ref(),
    };
    Ok(Arc::new(HttpSynthesizer::new(&config.speech, key)?))
}

/// Listen on the microphone until Ctrl-C; ENTER interrupts the assistant
async fn run_voice(orchestrator: &Arc<Orchestrator>, config: &Config) -> anyhow::Result<()> {
    let whisper = WhisperClient::new(
        config.api_keys.openai.as_ref(),
        config.turn.stt_model.clone(),
        &config.turn.language,
    )?;
    let transcription = Arc::new(SegmentingTranscriber::new(Arc::new(whisper)));

    let interrupter = Arc::clone(orchestrator);
    let stdin_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            interrupter.interrupt();
        }
    });

    let stopper = Arc::clone(orchestrator);
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received interrupt signal");
            stopper.stop();
        }
    });

    println!("Listening. Press ENTER to interrupt, Ctrl-C to quit.");
    orchestrator.run_session(transcription).await;

    stdin_task.abort();
    signal_task.abort();
    let _ = stdin_task.await;
    let _ = signal_task.await;
    Ok(())
}

/// One turn per stdin line until EOF or Ctrl-C
async fn run_text(orchestrator: &Orchestrator) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Type a question per line. Ctrl-D to quit.");

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "failed to read stdin");
                    break;
                }
            },
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match orchestrator.submit_turn(line).await {
            Ok(answer) => println!("{answer}"),
            Err(e) => eprintln!("({e})"),
        }
    }
}

async fn ask(config_path: Option<PathBuf>, question: &str) -> anyhow::Result<()> {
    let config = Config::load(config_path.as_deref())?;
    let orchestrator = build_orchestrator(&config)?;

    let answer = orchestrator.submit_turn(question).await?;
    println!("{answer}");
    Ok(())
}

fn history(config_path: Option<PathBuf>, turns: Option<usize>) -> anyhow::Result<()> {
    let config = Config::load(config_path.as_deref())?;
    let turns = turns.unwrap_or(config.context.history_turns);
    let context = load_context(&config.context_path(), config.context.capacity)?;

    if context.is_empty() {
        println!("No conversation yet");
    } else {
        println!("{}", context.recent_history(turns));
    }
    Ok(())
}

fn list_tools() -> anyhow::Result<()> {
    let definitions: Vec<_> = LookupTool::ALL.into_iter().map(LookupTool::definition).collect();
    println!("{}", serde_json::to_string_pretty(&definitions)?);
    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<f32>>(256);
    let capture = MicCapture::start(frame_tx)?;

    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    for i in 0..duration {
        let mut samples = Vec::new();
        let second = tokio::time::sleep(Duration::from_secs(1));
        tokio::pin!(second);
        loop {
            tokio::select! {
                () = &mut second => break,
                frame = frame_rx.recv() => match frame {
                    Some(frame) => samples.extend(frame),
                    None => break,
                },
            }
        }

        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    drop(capture);

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let samples: Vec<i16> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            // 30% volume
            ((2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 * f32::from(i16::MAX)) as i16
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);
    play_blocking(samples, sample_rate).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Test TTS output
async fn test_tts(config_path: Option<PathBuf>, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load(config_path.as_deref())?;
    let synthesizer = build_synthesizer(&config)?;

    println!("Synthesizing speech...");
    let segment = summoner_voice::SpeechSegment::detect(text).validated();
    let audio = synthesizer.synthesize(&segment.text, segment.markup).await?;
    println!("Got {} bytes of audio data", audio.bytes.len());

    let decoded = decode(&audio)?;
    println!("Playing audio...");
    play_blocking(decoded.samples, decoded.sample_rate).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// Play samples on the default output device from a blocking thread
async fn play_blocking(samples: Vec<i16>, sample_rate: u32) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || -> summoner_voice::Result<()> {
        let mut sink = CpalSink::new()?;
        sink.begin(sample_rate)?;
        for chunk in samples.chunks(512) {
            sink.write(chunk)?;
        }
        sink.finish()
    })
    .await??;
    Ok(())
}
