//! Request and response bodies for the `/v1/*` surface, decoupled from the
//! internal domain types so the wire shape can be reasoned about in one
//! place.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use voicereader_core::error::{EngineError, ErrorCode};
use voicereader_core::types::{PlaybackSettings, VoiceSummary, WarmupState};

fn default_voice_id() -> String {
    voicereader_core::types::DEFAULT_VOICE_ID.to_string()
}

fn default_true() -> bool {
    true
}

/// Accepts the literal string `"0"`, the integer `0`, or any other string
/// (validated as a UUID downstream, not here).
pub fn deserialize_voice_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) if n.as_u64() == Some(0) => Ok("0".to_string()),
        other => Err(serde::de::Error::custom(format!(
            "voice_id must be a string or 0, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingSettingsDto {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

fn default_max_chars() -> usize {
    400
}

impl Default for ChunkingSettingsDto {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackSettingsDto {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub chunking: ChunkingSettingsDto,
}

impl Default for PlaybackSettingsDto {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            chunking: ChunkingSettingsDto::default(),
        }
    }
}

impl PlaybackSettingsDto {
    /// Range-checks every field, returning `INVALID_REQUEST` on the first
    /// violation.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0.25..=4.0).contains(&self.rate) {
            return Err(EngineError::new(
                ErrorCode::InvalidRequest,
                format!("settings.rate must be in [0.25, 4.0], got {}", self.rate),
            ));
        }
        if !(0.5..=2.0).contains(&self.pitch) {
            return Err(EngineError::new(
                ErrorCode::InvalidRequest,
                format!("settings.pitch must be in [0.5, 2.0], got {}", self.pitch),
            ));
        }
        if !(0.0..=2.0).contains(&self.volume) {
            return Err(EngineError::new(
                ErrorCode::InvalidRequest,
                format!("settings.volume must be in [0.0, 2.0], got {}", self.volume),
            ));
        }
        if !(100..=2000).contains(&self.chunking.max_chars) {
            return Err(EngineError::new(
                ErrorCode::InvalidRequest,
                format!(
                    "settings.chunking.max_chars must be in [100, 2000], got {}",
                    self.chunking.max_chars
                ),
            ));
        }
        Ok(())
    }

    pub fn to_core(&self) -> PlaybackSettings {
        PlaybackSettings {
            rate: self.rate,
            pitch: self.pitch,
            volume: self.volume,
            max_chars: self.chunking.max_chars,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeakRequest {
    #[serde(default = "default_voice_id", deserialize_with = "deserialize_voice_id")]
    pub voice_id: String,
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub settings: PlaybackSettingsDto,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpeakResponse {
    pub job_id: Uuid,
    pub ws_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelRequest {
    pub job_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub canceled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarmupRequest {
    pub wait: bool,
    pub force: bool,
    pub reason: Option<String>,
}

impl Default for WarmupRequest {
    fn default() -> Self {
        Self {
            wait: false,
            force: false,
            reason: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WarmupResponse {
    pub accepted: bool,
    pub warmup: WarmupState,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActivateRequestDto {
    pub synth_backend: Option<String>,
    pub active_model_id: Option<String>,
    pub qwen_model_name: Option<String>,
    pub qwen_device_map: Option<String>,
    pub qwen_dtype: Option<String>,
    pub qwen_attn_implementation: Option<String>,
    pub qwen_default_speaker: Option<String>,
    pub kyutai_model_name: Option<String>,
    pub kyutai_voice_prompt: Option<String>,
    pub warmup_wait: bool,
    pub warmup_force: bool,
    pub reason: Option<String>,
}

impl Default for ActivateRequestDto {
    fn default() -> Self {
        Self {
            synth_backend: None,
            active_model_id: None,
            qwen_model_name: None,
            qwen_device_map: None,
            qwen_dtype: None,
            qwen_attn_implementation: None,
            qwen_default_speaker: None,
            kyutai_model_name: None,
            kyutai_voice_prompt: None,
            warmup_wait: true,
            warmup_force: true,
            reason: None,
        }
    }
}

impl ActivateRequestDto {
    pub fn into_core(self) -> voicereader_jobs::ActivateRequest {
        voicereader_jobs::ActivateRequest {
            synth_backend: self.synth_backend,
            active_model_id: self.active_model_id,
            qwen_model_name: self.qwen_model_name,
            qwen_device_map: self.qwen_device_map,
            qwen_dtype: self.qwen_dtype,
            qwen_attn_implementation: self.qwen_attn_implementation,
            qwen_default_speaker: self.qwen_default_speaker,
            kyutai_model_name: self.kyutai_model_name,
            kyutai_voice_prompt: self.kyutai_voice_prompt,
            warmup_wait: self.warmup_wait,
            warmup_force: self.warmup_force,
            reason: self.reason,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeStatusDto {
    pub backend: String,
    pub model_loaded: bool,
    pub fallback_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub supports_default_voice: bool,
    pub supports_cloned_voices: bool,
    pub warmup: WarmupState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivateResponse {
    pub reloaded: bool,
    pub warmup_accepted: bool,
    pub active_model_id: String,
    pub runtime: RuntimeStatusDto,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilitiesDto {
    pub supports_voice_clone: bool,
    pub supports_audio_chunk_stream: bool,
    pub supports_true_streaming_inference: bool,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub engine_version: String,
    pub active_model_id: String,
    pub device: String,
    pub capabilities: CapabilitiesDto,
    pub runtime: RuntimeStatusDto,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoicesResponse {
    pub voices: Vec<VoiceSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefAudioDto {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub wav_base64: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CloneOptionsDto {
    pub normalize_audio: bool,
}

impl Default for CloneOptionsDto {
    fn default() -> Self {
        Self { normalize_audio: default_true() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloneVoiceRequest {
    pub display_name: String,
    pub ref_audio: RefAudioDto,
    #[serde(default)]
    pub ref_text: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub options: CloneOptionsDto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateVoiceRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteVoiceResponse {
    pub deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefetchMode {
    QwenAll,
    QwenCustom,
    QwenBase,
    All,
}

impl Default for PrefetchMode {
    fn default() -> Self {
        PrefetchMode::QwenAll
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrefetchRequest {
    pub mode: PrefetchMode,
}

impl Default for PrefetchRequest {
    fn default() -> Self {
        Self { mode: PrefetchMode::default() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PrefetchResponse {
    pub mode: PrefetchMode,
    pub downloaded: Vec<String>,
    pub saved_to: std::collections::HashMap<String, String>,
    pub data_dir: String,
    pub models_dir: String,
    pub hf_cache_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuitRequest {}

#[derive(Debug, Clone, Serialize)]
pub struct QuitResponse {
    pub quitting: bool,
}
