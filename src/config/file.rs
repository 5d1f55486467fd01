//! TOML configuration file loading
//!
//! Supports `~/.config/summoner/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct SummonerConfigFile {
    /// Turn detection settings
    #[serde(default)]
    pub turn: TurnFileConfig,

    /// Conversation context settings
    #[serde(default)]
    pub context: ContextFileConfig,

    /// LLM configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Speech output configuration
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Lookup tool configuration
    #[serde(default)]
    pub tools: ToolsFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Data directory override
    pub data_dir: Option<String>,
}

/// Turn detection configuration
#[derive(Debug, Default, Deserialize)]
pub struct TurnFileConfig {
    pub max_idle_ticks: Option<u32>,
    pub tick_interval_ms: Option<u64>,
    pub language: Option<String>,
    pub stt_model: Option<String>,
}

/// Conversation context configuration
#[derive(Debug, Default, Deserialize)]
pub struct ContextFileConfig {
    pub capacity: Option<usize>,
    pub history_turns: Option<usize>,
    pub persist: Option<bool>,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Backend family ("anthropic" or "openai")
    pub provider: Option<String>,

    /// Model identifier (e.g. "claude-sonnet-4-20250514")
    pub model: Option<String>,

    /// API base URL override
    pub base_url: Option<String>,

    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub stop_sequences: Option<Vec<String>>,
    pub request_timeout_secs: Option<u64>,
    pub max_tool_rounds: Option<usize>,
    pub repeat_limit: Option<usize>,
    pub system_prompt: Option<String>,
}

/// Speech output configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    pub min_gap_ms: Option<u64>,
    pub chunk_bytes: Option<usize>,

    /// TTS backend ("openai" or "elevenlabs")
    pub tts_provider: Option<String>,
    pub tts_model: Option<String>,
    pub tts_voice: Option<String>,
    pub tts_speed: Option<f32>,

    pub apology: Option<String>,
    pub farewell: Option<String>,
}

/// Lookup tool configuration
#[derive(Debug, Default, Deserialize)]
pub struct ToolsFileConfig {
    pub enabled: Option<bool>,
    pub database_path: Option<String>,
    pub max_concurrency: Option<usize>,
    pub call_timeout_secs: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub anthropic: Option<String>,
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Load the TOML config file from an explicit path or the standard location
///
/// A missing file at the standard location yields defaults. An explicit path
/// that cannot be read or parsed is an error.
///
/// # Errors
///
/// Returns error if an explicitly requested file is unreadable or invalid
pub fn load_config_file(explicit: Option<&Path>) -> Result<SummonerConfigFile> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(SummonerConfigFile::default());
    };

    if !path.exists() {
        return Ok(SummonerConfigFile::default());
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                Ok(SummonerConfigFile::default())
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            Ok(SummonerConfigFile::default())
        }
    }
}

/// Return the config file path: `~/.config/summoner/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "summoner", "summoner")
        .map(|d| d.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let file: SummonerConfigFile = toml::from_str(
            r#"
            [turn]
            max_idle_ticks = 12

            [llm]
            provider = "openai"
            stop_sequences = ["\n\nHuman:"]
            "#,
        )
        .unwrap();

        assert_eq!(file.turn.max_idle_ticks, Some(12));
        assert_eq!(file.llm.provider.as_deref(), Some("openai"));
        assert_eq!(file.llm.stop_sequences.unwrap().len(), 1);
        assert!(file.speech.tts_voice.is_none());
    }

    #[test]
    fn explicit_missing_file_is_error() {
        let result = load_config_file(Some(Path::new("/nonexistent/summoner.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[speech]\nmin_gap_ms = 250\n").unwrap();

        let file = load_config_file(Some(&path)).unwrap();
        assert_eq!(file.speech.min_gap_ms, Some(250));
    }
}
