//! Configuration management for Summoner voice
//!
//! Precedence, lowest to highest: built-in defaults, the TOML file, then
//! environment variables.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::{Error, Result};

use self::file::SummonerConfigFile;

/// Default system prompt for the game companion
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly League of Legends voice companion. \
Answer in short spoken sentences without lists or formatting. \
Use the lookup tools for champion stats, spells, stories, backgrounds and builds \
instead of guessing. If you call a tool, first say a brief acknowledgement.";

/// Summoner configuration
#[derive(Debug)]
pub struct Config {
    /// Turn detection settings
    pub turn: TurnConfig,

    /// Conversation context settings
    pub context: ContextConfig,

    /// Model backend settings
    pub llm: LlmConfig,

    /// Speech output settings
    pub speech: SpeechConfig,

    /// Lookup tool settings
    pub tools: ToolsConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// Path to data directory (database, persisted context)
    pub data_dir: PathBuf,
}

/// Turn detection configuration
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Consecutive idle polls before a buffered turn is emitted
    pub max_idle_ticks: u32,

    /// Length of one polling interval
    pub tick_interval: Duration,

    /// Transcription language code (e.g. "en-US")
    pub language: String,

    /// STT model for the segmenting transcriber
    pub stt_model: String,

    /// Delay before reopening a failed transcription stream
    pub reconnect_delay: Duration,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_idle_ticks: 20,
            tick_interval: Duration::from_millis(100),
            language: "en-US".to_string(),
            stt_model: "whisper-1".to_string(),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

/// Conversation context configuration
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Maximum retained turns
    pub capacity: usize,

    /// Turns shown by `recent_history` consumers
    pub history_turns: usize,

    /// Load and save the context across runs
    pub persist: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            history_turns: 5,
            persist: true,
        }
    }
}

/// Model backend family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// Anthropic Messages API
    Anthropic,
    /// `OpenAI`-compatible chat completions
    OpenAi,
}

impl LlmProvider {
    /// Parse a provider name
    ///
    /// # Errors
    ///
    /// Returns error for unknown provider names
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" | "openrouter" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown LLM provider: {other}"))),
        }
    }
}

/// Model backend configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,

    /// API base URL override (e.g. an `OpenAI`-compatible gateway)
    pub base_url: Option<String>,

    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub stop_sequences: Vec<String>,
    pub request_timeout: Duration,

    /// Hard cap on tool rounds per turn
    pub max_tool_rounds: usize,

    /// Rounds in which an identical tool invocation may reappear before the turn stops
    pub repeat_limit: usize,

    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Anthropic,
            model: "claude-3-5-sonnet-20240620".to_string(),
            base_url: None,
            max_tokens: 300,
            temperature: 1.0,
            top_p: 0.999,
            top_k: 250,
            stop_sequences: Vec::new(),
            request_timeout: Duration::from_secs(60),
            max_tool_rounds: 8,
            repeat_limit: 3,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// TTS backend family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProvider {
    OpenAi,
    ElevenLabs,
}

impl TtsProvider {
    /// Parse a provider name
    ///
    /// # Errors
    ///
    /// Returns error for unknown provider names
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "elevenlabs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Speech output configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Minimum silence between the end of one utterance and the start of the next
    pub min_gap: Duration,

    /// Bytes written to the audio sink per chunk; bounds interrupt latency
    pub chunk_bytes: usize,

    pub tts_provider: TtsProvider,
    pub tts_model: String,
    pub tts_voice: String,
    pub tts_speed: f32,

    /// Spoken when a turn fails
    pub apology: String,

    /// Spoken on shutdown
    pub farewell: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            min_gap: Duration::from_secs(1),
            chunk_bytes: 1024,
            tts_provider: TtsProvider::OpenAi,
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.1,
            apology: "Sorry, something went wrong on my side. Could you ask that again?"
                .to_string(),
            farewell: "If you have any other questions, please don't hesitate to ask. Have a great day!"
                .to_string(),
        }
    }
}

/// Lookup tool configuration
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    /// Advertise tools to the model
    pub enabled: bool,

    /// `SQLite` lookup database
    pub database_path: PathBuf,

    /// Tool calls allowed to run at once
    pub max_concurrency: usize,

    /// Per-call timeout
    pub call_timeout: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database_path: default_data_dir().join("service.db"),
            max_concurrency: 4,
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// API keys for external services
#[derive(Debug, Default)]
pub struct ApiKeys {
    /// Anthropic API key (model backend)
    pub anthropic: Option<SecretString>,

    /// `OpenAI` API key (model backend, Whisper, TTS)
    pub openai: Option<SecretString>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<SecretString>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            turn: TurnConfig::default(),
            context: ContextConfig::default(),
            llm: LlmConfig::default(),
            speech: SpeechConfig::default(),
            tools: ToolsConfig::default(),
            api_keys: ApiKeys::default(),
            data_dir: default_data_dir(),
        }
    }
}

/// Return the data directory (`~/.local/share/summoner` on Linux)
#[must_use]
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "summoner", "summoner")
        .map_or_else(|| PathBuf::from(".summoner"), |d| d.data_dir().to_path_buf())
}

impl Config {
    /// Load configuration from defaults, the TOML file and the environment
    ///
    /// # Errors
    ///
    /// Returns error if the config file or an environment value is invalid
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let file = file::load_config_file(config_path)?;

        let mut config = Self::default();
        config.apply_file(file)?;
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;

        if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
            tracing::warn!(
                path = %config.data_dir.display(),
                error = %e,
                "failed to create data directory"
            );
        }

        Ok(config)
    }

    /// Overlay values from a parsed config file
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is unknown
    pub fn apply_file(&mut self, file: SummonerConfigFile) -> Result<()> {
        if let Some(v) = file.turn.max_idle_ticks {
            self.turn.max_idle_ticks = v;
        }
        if let Some(v) = file.turn.tick_interval_ms {
            self.turn.tick_interval = Duration::from_millis(v);
        }
        if let Some(v) = file.turn.language {
            self.turn.language = v;
        }
        if let Some(v) = file.turn.stt_model {
            self.turn.stt_model = v;
        }

        if let Some(v) = file.context.capacity {
            self.context.capacity = v;
        }
        if let Some(v) = file.context.history_turns {
            self.context.history_turns = v;
        }
        if let Some(v) = file.context.persist {
            self.context.persist = v;
        }

        let llm = file.llm;
        if let Some(v) = llm.provider {
            self.llm.provider = LlmProvider::parse(&v)?;
        }
        if let Some(v) = llm.model {
            self.llm.model = v;
        }
        if llm.base_url.is_some() {
            self.llm.base_url = llm.base_url;
        }
        if let Some(v) = llm.max_tokens {
            self.llm.max_tokens = v;
        }
        if let Some(v) = llm.temperature {
            self.llm.temperature = v;
        }
        if let Some(v) = llm.top_p {
            self.llm.top_p = v;
        }
        if let Some(v) = llm.top_k {
            self.llm.top_k = v;
        }
        if let Some(v) = llm.stop_sequences {
            self.llm.stop_sequences = v;
        }
        if let Some(v) = llm.request_timeout_secs {
            self.llm.request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = llm.max_tool_rounds {
            self.llm.max_tool_rounds = v;
        }
        if let Some(v) = llm.repeat_limit {
            self.llm.repeat_limit = v;
        }
        if let Some(v) = llm.system_prompt {
            self.llm.system_prompt = v;
        }

        let speech = file.speech;
        if let Some(v) = speech.min_gap_ms {
            self.speech.min_gap = Duration::from_millis(v);
        }
        if let Some(v) = speech.chunk_bytes {
            self.speech.chunk_bytes = v;
        }
        if let Some(v) = speech.tts_provider {
            self.speech.tts_provider = TtsProvider::parse(&v)?;
        }
        if let Some(v) = speech.tts_model {
            self.speech.tts_model = v;
        }
        if let Some(v) = speech.tts_voice {
            self.speech.tts_voice = v;
        }
        if let Some(v) = speech.tts_speed {
            self.speech.tts_speed = v;
        }
        if let Some(v) = speech.apology {
            self.speech.apology = v;
        }
        if let Some(v) = speech.farewell {
            self.speech.farewell = v;
        }

        if let Some(v) = file.tools.enabled {
            self.tools.enabled = v;
        }
        if let Some(v) = file.tools.database_path {
            self.tools.database_path = PathBuf::from(v);
        }
        if let Some(v) = file.tools.max_concurrency {
            self.tools.max_concurrency = v;
        }
        if let Some(v) = file.tools.call_timeout_secs {
            self.tools.call_timeout = Duration::from_secs(v);
        }

        if let Some(v) = file.api_keys.anthropic {
            self.api_keys.anthropic = Some(SecretString::from(v));
        }
        if let Some(v) = file.api_keys.openai {
            self.api_keys.openai = Some(SecretString::from(v));
        }
        if let Some(v) = file.api_keys.elevenlabs {
            self.api_keys.elevenlabs = Some(SecretString::from(v));
        }

        if let Some(v) = file.data_dir {
            self.data_dir = PathBuf::from(v);
        }

        Ok(())
    }

    /// Overlay values from environment variables, looked up through `get`
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an unparseable value
    pub fn apply_env_with<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("SUMMONER_MAX_IDLE_TICKS") {
            self.turn.max_idle_ticks = parse_env("SUMMONER_MAX_IDLE_TICKS", &v)?;
        }
        if let Some(v) = get("SUMMONER_TICK_MS") {
            self.turn.tick_interval = Duration::from_millis(parse_env("SUMMONER_TICK_MS", &v)?);
        }
        if let Some(v) = get("SUMMONER_LANGUAGE") {
            self.turn.language = v;
        }
        if let Some(v) = get("SUMMONER_STT_MODEL") {
            self.turn.stt_model = v;
        }
        if let Some(v) = get("SUMMONER_CONTEXT_CAPACITY") {
            self.context.capacity = parse_env("SUMMONER_CONTEXT_CAPACITY", &v)?;
        }
        if let Some(v) = get("SUMMONER_LLM_PROVIDER") {
            self.llm.provider = LlmProvider::parse(&v)?;
        }
        if let Some(v) = get("SUMMONER_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("SUMMONER_LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Some(v) = get("SUMMONER_TTS_PROVIDER") {
            self.speech.tts_provider = TtsProvider::parse(&v)?;
        }
        if let Some(v) = get("SUMMONER_TTS_VOICE") {
            self.speech.tts_voice = v;
        }
        if let Some(v) = get("SUMMONER_MIN_GAP_MS") {
            self.speech.min_gap = Duration::from_millis(parse_env("SUMMONER_MIN_GAP_MS", &v)?);
        }
        if let Some(v) = get("SUMMONER_TOOLS_ENABLED") {
            self.tools.enabled = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = get("SUMMONER_DB_PATH") {
            self.tools.database_path = PathBuf::from(v);
        }
        if let Some(v) = get("SUMMONER_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }

        if let Some(v) = get("ANTHROPIC_API_KEY") {
            self.api_keys.anthropic = Some(SecretString::from(v));
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.api_keys.openai = Some(SecretString::from(v));
        }
        if let Some(v) = get("ELEVENLABS_API_KEY") {
            self.api_keys.elevenlabs = Some(SecretString::from(v));
        }

        Ok(())
    }

    /// Check structural constraints
    ///
    /// # Errors
    ///
    /// Returns error if a value would make the orchestrator unusable
    pub fn validate(&self) -> Result<()> {
        if self.turn.max_idle_ticks == 0 {
            return Err(Error::Config("turn.max_idle_ticks must be at least 1".to_string()));
        }
        if self.turn.tick_interval.is_zero() {
            return Err(Error::Config("turn.tick_interval_ms must be positive".to_string()));
        }
        if self.context.capacity == 0 {
            return Err(Error::Config("context.capacity must be at least 1".to_string()));
        }
        if self.tools.max_concurrency == 0 {
            return Err(Error::Config("tools.max_concurrency must be at least 1".to_string()));
        }
        if self.speech.chunk_bytes < 2 {
            return Err(Error::Config("speech.chunk_bytes must be at least 2".to_string()));
        }
        if self.llm.max_tool_rounds == 0 {
            return Err(Error::Config("llm.max_tool_rounds must be at least 1".to_string()));
        }
        Ok(())
    }

    /// API key for the configured model backend
    ///
    /// # Errors
    ///
    /// Returns error if the key for the chosen provider is missing
    pub fn llm_api_key(&self) -> Result<&SecretString> {
        let key = match self.llm.provider {
            LlmProvider::Anthropic => self.api_keys.anthropic.as_ref(),
            LlmProvider::OpenAi => self.api_keys.openai.as_ref(),
        };
        key.ok_or_else(|| {
            Error::Config(format!(
                "API key required for LLM provider {:?}",
                self.llm.provider
            ))
        })
    }

    /// Path of the persisted conversation context
    #[must_use]
    pub fn context_path(&self) -> PathBuf {
        self.data_dir.join("context.json")
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value for {key}: {value}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.turn.max_idle_ticks, 20);
        assert_eq!(config.context.capacity, 20);
        assert_eq!(config.speech.min_gap, Duration::from_secs(1));
        assert_eq!(config.llm.max_tokens, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_file() {
        let mut config = Config::default();
        let file: SummonerConfigFile =
            toml::from_str("[turn]\nmax_idle_ticks = 5\n[llm]\nprovider = \"openai\"\n").unwrap();
        config.apply_file(file).unwrap();
        assert_eq!(config.turn.max_idle_ticks, 5);
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);

        config
            .apply_env_with(env(&[
                ("SUMMONER_MAX_IDLE_TICKS", "7"),
                ("OPENAI_API_KEY", "sk-test"),
            ]))
            .unwrap();
        assert_eq!(config.turn.max_idle_ticks, 7);
        assert_eq!(config.llm_api_key().unwrap().expose_secret(), "sk-test");
    }

    #[test]
    fn invalid_env_value_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env_with(env(&[("SUMMONER_CONTEXT_CAPACITY", "lots")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn missing_llm_key_is_reported() {
        let config = Config::default();
        assert!(config.llm_api_key().is_err());
    }

    #[test]
    fn zero_capacity_fails_validation() {
        let mut config = Config::default();
        config.context.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(LlmProvider::parse("bedrock").is_err());
        assert_eq!(LlmProvider::parse("Claude").unwrap(), LlmProvider::Anthropic);
        assert_eq!(TtsProvider::parse("elevenlabs").unwrap(), TtsProvider::ElevenLabs);
    }
}
