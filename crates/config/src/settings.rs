//! Resolves [`EngineConfig`] from CLI flags, environment variables and an
//! optional stdin bootstrap payload.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::cli::CliArgs;

pub const DEFAULT_MODEL_ID: &str = "qwen3-tts-12hz-0.6b-base";
pub const DEFAULT_SYNTH_BACKEND: &str = "auto";
pub const DEFAULT_QWEN_MODEL_NAME: &str = "Qwen/Qwen3-TTS-12Hz-0.6B-CustomVoice";
pub const DEFAULT_QWEN_DEVICE_MAP: &str = "cuda:0";
pub const DEFAULT_QWEN_DTYPE: &str = "bfloat16";
pub const DEFAULT_QWEN_ATTN: &str = "flash_attention_2";
pub const DEFAULT_QWEN_SPEAKER: &str = "Ryan";
pub const DEFAULT_KYUTAI_MODEL_NAME: &str = "Verylicious/pocket-tts-ungated";
pub const DEFAULT_KYUTAI_VOICE_PROMPT: &str = "alba";
pub const DEFAULT_KYUTAI_SAMPLE_RATE: u32 = 24_000;
pub const DEFAULT_WARMUP_ON_STARTUP: bool = true;
pub const DEFAULT_WARMUP_TEXT: &str = "Engine warmup sentence.";
pub const DEFAULT_WARMUP_LANGUAGE: &str = "auto";

/// Fully resolved, immutable engine configuration. Cheap to clone and share
/// across the job manager, voice store and server state.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub token: String,
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub active_model_id: String,
    pub engine_version: String,
    pub synth_backend: String,
    pub qwen_model_name: String,
    pub qwen_device_map: String,
    pub qwen_dtype: String,
    pub qwen_attn_implementation: String,
    pub qwen_default_speaker: String,
    pub kyutai_model_name: String,
    pub kyutai_voice_prompt: String,
    pub kyutai_sample_rate: u32,
    pub warmup_on_startup: bool,
    pub warmup_text: String,
    pub warmup_language: String,
}

impl EngineConfig {
    /// The coarse device family (`cuda`, `cpu`, `mps`, or whatever prefix
    /// precedes a `:` in `qwen_device_map`), used for logging and for
    /// `candle_core::Device` selection.
    pub fn device(&self) -> String {
        let lower = self.qwen_device_map.trim().to_ascii_lowercase();
        if lower.starts_with("cuda") {
            "cuda".to_string()
        } else if lower.starts_with("cpu") {
            "cpu".to_string()
        } else if lower.starts_with("mps") {
            "mps".to_string()
        } else if let Some((prefix, _)) = lower.split_once(':') {
            prefix.to_string()
        } else if lower.is_empty() {
            "unknown".to_string()
        } else {
            lower
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "Engine token is required. Pass --token, set token in --bootstrap-stdin payload, or set ${token_env}."
    )]
    MissingToken { token_env: String },

    #[error("Invalid --bootstrap-stdin payload: {0}")]
    MalformedBootstrap(String),

    #[error("Invalid --bootstrap-stdin payload: expected a JSON object")]
    BootstrapNotAnObject,
}

/// The subset of fields a `--bootstrap-stdin` JSON payload may override.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct BootstrapPayload {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub data_dir: Option<String>,
}

impl BootstrapPayload {
    /// Parse a raw stdin payload. An empty or whitespace-only payload is
    /// treated as "no overrides", matching the original daemon's behavior
    /// when `--bootstrap-stdin` is passed but nothing is piped in.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let value: serde_json::Value = serde_json::from_str(trimmed)
            .map_err(|e| ConfigError::MalformedBootstrap(e.to_string()))?;
        if !value.is_object() {
            return Err(ConfigError::BootstrapNotAnObject);
        }
        serde_json::from_value(value).map_err(|e| ConfigError::MalformedBootstrap(e.to_string()))
    }
}

/// Resolve the full [`EngineConfig`] from CLI args, the process environment,
/// and a parsed bootstrap payload (empty if `--bootstrap-stdin` was not
/// passed or stdin was empty).
pub fn resolve_config(
    args: &CliArgs,
    bootstrap: &BootstrapPayload,
) -> Result<EngineConfig, ConfigError> {
    let token = first_non_empty(&[
        args.token.as_deref(),
        bootstrap.token.as_deref(),
        std::env::var(&args.token_env).ok().as_deref(),
    ])
    .ok_or_else(|| ConfigError::MissingToken {
        token_env: args.token_env.clone(),
    })?;

    let port = bootstrap.port.unwrap_or(args.port);

    let data_dir_raw = bootstrap
        .data_dir
        .as_deref()
        .or(args.data_dir.as_deref());
    let data_dir = resolve_data_dir(data_dir_raw);

    Ok(EngineConfig {
        token,
        host: args.host.clone(),
        port,
        data_dir,
        active_model_id: DEFAULT_MODEL_ID.to_string(),
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
        synth_backend: load_env_config_value("VOICEREADER_SYNTH_BACKEND", DEFAULT_SYNTH_BACKEND),
        qwen_model_name: load_env_config_value("VOICEREADER_QWEN_MODEL", DEFAULT_QWEN_MODEL_NAME),
        qwen_device_map: load_env_config_value(
            "VOICEREADER_QWEN_DEVICE_MAP",
            DEFAULT_QWEN_DEVICE_MAP,
        ),
        qwen_dtype: load_env_config_value("VOICEREADER_QWEN_DTYPE", DEFAULT_QWEN_DTYPE),
        qwen_attn_implementation: load_env_config_value(
            "VOICEREADER_QWEN_ATTN_IMPLEMENTATION",
            DEFAULT_QWEN_ATTN,
        ),
        qwen_default_speaker: load_env_config_value("VOICEREADER_QWEN_SPEAKER", DEFAULT_QWEN_SPEAKER),
        kyutai_model_name: load_env_config_value(
            "VOICEREADER_KYUTAI_MODEL",
            DEFAULT_KYUTAI_MODEL_NAME,
        ),
        kyutai_voice_prompt: load_env_config_value(
            "VOICEREADER_KYUTAI_VOICE_PROMPT",
            DEFAULT_KYUTAI_VOICE_PROMPT,
        ),
        kyutai_sample_rate: DEFAULT_KYUTAI_SAMPLE_RATE,
        warmup_on_startup: load_env_bool(
            "VOICEREADER_WARMUP_ON_STARTUP",
            DEFAULT_WARMUP_ON_STARTUP,
        ),
        warmup_text: DEFAULT_WARMUP_TEXT.to_string(),
        warmup_language: DEFAULT_WARMUP_LANGUAGE.to_string(),
    })
}

fn first_non_empty<'a>(candidates: &[Option<&'a str>]) -> Option<String> {
    candidates
        .iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn load_env_config_value(env_name: &str, default: &str) -> String {
    std::env::var(env_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn load_env_bool(env_name: &str, default: bool) -> bool {
    let Ok(raw) = std::env::var(env_name) else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => true,
        "0" | "false" | "no" | "n" | "off" => false,
        _ => default,
    }
}

/// Resolve the engine's data directory: an explicit path (with leading `~`
/// expanded against `$HOME`), or `<cwd>/.data` when none is given.
fn resolve_data_dir(raw: Option<&str>) -> PathBuf {
    match raw {
        Some(raw) if !raw.trim().is_empty() => expand_home(raw.trim()),
        _ => std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".data"),
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return Path::new(&home).join(rest);
        }
    }
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(token: Option<&str>) -> CliArgs {
        CliArgs {
            server: true,
            host: "127.0.0.1".into(),
            port: 8765,
            token: token.map(String::from),
            token_env: "VOICEREADER_TEST_TOKEN_UNSET".into(),
            data_dir: None,
            bootstrap_stdin: false,
        }
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = resolve_config(&args(None), &BootstrapPayload::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingToken { .. }));
    }

    #[test]
    fn cli_token_wins_when_bootstrap_is_empty() {
        let config = resolve_config(&args(Some("cli-token")), &BootstrapPayload::default()).unwrap();
        assert_eq!(config.token, "cli-token");
    }

    #[test]
    fn bootstrap_token_overrides_cli_token() {
        let bootstrap = BootstrapPayload {
            token: Some("bootstrap-token".into()),
            ..Default::default()
        };
        let config = resolve_config(&args(Some("cli-token")), &bootstrap).unwrap();
        assert_eq!(config.token, "bootstrap-token");
    }

    #[test]
    fn bootstrap_port_overrides_cli_port() {
        let bootstrap = BootstrapPayload {
            port: Some(9999),
            ..Default::default()
        };
        let config = resolve_config(&args(Some("t")), &bootstrap).unwrap();
        assert_eq!(config.port, 9999);
    }

    #[test]
    fn empty_bootstrap_payload_parses_to_default() {
        assert_eq!(BootstrapPayload::parse("").unwrap(), BootstrapPayload::default());
        assert_eq!(BootstrapPayload::parse("   \n").unwrap(), BootstrapPayload::default());
    }

    #[test]
    fn non_object_bootstrap_payload_is_rejected() {
        let err = BootstrapPayload::parse("[1,2,3]").unwrap_err();
        assert_eq!(err, ConfigError::BootstrapNotAnObject);
    }

    #[test]
    fn malformed_json_bootstrap_payload_is_rejected() {
        let err = BootstrapPayload::parse("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::MalformedBootstrap(_)));
    }

    #[test]
    fn device_normalizes_cuda_prefix() {
        let mut config = resolve_config(&args(Some("t")), &BootstrapPayload::default()).unwrap();
        config.qwen_device_map = "cuda:1".into();
        assert_eq!(config.device(), "cuda");
        config.qwen_device_map = "cpu".into();
        assert_eq!(config.device(), "cpu");
    }

    #[test]
    fn data_dir_defaults_to_cwd_dot_data() {
        let config = resolve_config(&args(Some("t")), &BootstrapPayload::default()).unwrap();
        assert!(config.data_dir.ends_with(".data"));
    }
}
