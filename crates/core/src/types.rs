//! Plain domain value types shared across the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Interleaved little-endian signed 16-bit PCM, mono.
///
/// Invariant: `buffer.len() == frame_count * channels as usize * 2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub buffer: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl SynthesizedAudio {
    pub fn new(buffer: Vec<u8>, sample_rate: u32, channels: u16) -> Self {
        Self {
            buffer,
            sample_rate,
            channels,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.buffer.len() / (self.channels as usize * 2)
    }

    /// Decode the buffer to i16 samples. Panics only if the invariant above
    /// has already been violated by a caller, which would be a bug in this
    /// crate rather than bad input.
    pub fn samples_i16(&self) -> Vec<i16> {
        self.buffer
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    pub fn from_samples_i16(samples: &[i16], sample_rate: u32, channels: u16) -> Self {
        let mut buffer = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            buffer.extend_from_slice(&s.to_le_bytes());
        }
        Self::new(buffer, sample_rate, channels)
    }
}

/// Rate/pitch/volume playback controls plus the chunker's character cap,
/// bundled because every layer between the HTTP handler and the job worker
/// threads them through together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSettings {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub max_chars: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            max_chars: 400,
        }
    }
}

impl PlaybackSettings {
    pub fn is_identity(&self) -> bool {
        self.rate == 1.0 && self.pitch == 1.0 && self.volume == 1.0
    }
}

/// A persisted or synthetic voice record, as returned by the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceSummary {
    pub voice_id: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub tts_model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_hint: Option<String>,
}

/// The literal id of the built-in, immutable, never-on-disk default voice.
pub const DEFAULT_VOICE_ID: &str = "0";

/// Which concrete synthesizer implementation is (or was requested to be)
/// loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Auto,
    Qwen,
    Kyutai,
    Mock,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BackendKind::Auto => "auto",
            BackendKind::Qwen => "qwen",
            BackendKind::Kyutai => "kyutai",
            BackendKind::Mock => "mock",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(BackendKind::Auto),
            "qwen" => Ok(BackendKind::Qwen),
            "kyutai" => Ok(BackendKind::Kyutai),
            "mock" => Ok(BackendKind::Mock),
            other => Err(format!(
                "synth_backend must be one of: auto, qwen, kyutai, mock (got {other:?})"
            )),
        }
    }
}

/// Reports which backend is loaded and which operations are meaningful.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendStatus {
    pub backend: String,
    pub model_loaded: bool,
    pub fallback_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub supports_voice_clone: bool,
    pub supports_default_voice: bool,
    pub supports_cloned_voices: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmupStatusValue {
    NotStarted,
    Running,
    Ready,
    Error,
}

/// Lifecycle state of the warmup controller. Reset to `not_started` on every
/// activation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WarmupState {
    pub status: WarmupStatusValue,
    pub runs: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Default for WarmupState {
    fn default() -> Self {
        Self {
            status: WarmupStatusValue::NotStarted,
            runs: 0,
            last_reason: None,
            last_started_at: None,
            last_completed_at: None,
            last_duration_ms: None,
            last_error: None,
        }
    }
}
