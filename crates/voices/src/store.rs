use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use voicereader_core::types::{VoiceSummary, DEFAULT_VOICE_ID};

#[derive(Error, Debug)]
pub enum VoiceStoreError {
    #[error("failed to access voice data directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("voice id {0:?} is not a valid uuid")]
    InvalidVoiceId(String),

    #[error("voice metadata for {voice_id} is corrupt: {source}")]
    CorruptMetadata {
        voice_id: String,
        source: serde_json::Error,
    },
}

/// On-disk metadata for a non-default voice. Carries two fields
/// (`description`, `ref_text`) that are stored for bookkeeping but never
/// surfaced through [`VoiceSummary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VoiceMeta {
    voice_id: String,
    display_name: String,
    created_at: DateTime<Utc>,
    tts_model_id: String,
    #[serde(default)]
    language_hint: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    ref_text: Option<String>,
}

impl VoiceMeta {
    fn into_summary(self) -> VoiceSummary {
        VoiceSummary {
            voice_id: self.voice_id,
            display_name: self.display_name,
            created_at: self.created_at,
            tts_model_id: self.tts_model_id,
            language_hint: self.language_hint,
        }
    }
}

/// Which fields an `update_voice` call should touch. Mirrors a PATCH
/// request's "only set what was explicitly provided" semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateVoiceFields {
    pub display_name: bool,
    pub language_hint: bool,
    pub description: bool,
}

pub struct VoiceStore {
    data_dir: PathBuf,
    voices_dir: PathBuf,
    active_model_id: String,
}

impl VoiceStore {
    pub async fn new(data_dir: PathBuf, active_model_id: String) -> Result<Self, VoiceStoreError> {
        let voices_dir = data_dir.join("voices");
        let store = Self {
            data_dir,
            voices_dir,
            active_model_id,
        };
        store.ensure_layout().await?;
        Ok(store)
    }

    /// Create `models/`, `voices/`, `hf-cache/` and `logs/` under the data
    /// directory if they don't already exist.
    pub async fn ensure_layout(&self) -> Result<(), VoiceStoreError> {
        for folder in ["models", "voices", "hf-cache", "logs"] {
            tokio::fs::create_dir_all(self.data_dir.join(folder)).await?;
        }
        Ok(())
    }

    pub async fn list_voices(&self) -> Result<Vec<VoiceSummary>, VoiceStoreError> {
        let mut voices = vec![self.default_voice_summary()];

        if !self.voices_dir.exists() {
            return Ok(voices);
        }

        let mut entries = tokio::fs::read_dir(&self.voices_dir).await?;
        let mut dirs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();

        for voice_dir in dirs {
            let meta_path = voice_dir.join("meta.json");
            let Ok(raw) = tokio::fs::read_to_string(&meta_path).await else {
                continue;
            };
            let Ok(meta) = serde_json::from_str::<VoiceMeta>(&raw) else {
                continue;
            };
            voices.push(meta.into_summary());
        }

        voices.sort_by_key(|v| v.created_at);
        Ok(voices)
    }

    pub async fn voice_exists(&self, voice_id: &str) -> bool {
        if voice_id == DEFAULT_VOICE_ID {
            return true;
        }
        let Ok(id) = parse_voice_id(voice_id) else {
            return false;
        };
        tokio::fs::metadata(self.voice_dir(id).join("meta.json"))
            .await
            .is_ok()
    }

    pub async fn create_voice(
        &self,
        display_name: String,
        language_hint: Option<String>,
        ref_text: Option<String>,
        description: Option<String>,
    ) -> Result<VoiceSummary, VoiceStoreError> {
        let voice_id = Uuid::new_v4();
        let created_at = Utc::now();
        let voice_dir = self.voice_dir(voice_id);

        tokio::fs::create_dir(&voice_dir).await?;

        let meta = VoiceMeta {
            voice_id: voice_id.to_string(),
            display_name,
            created_at,
            tts_model_id: self.active_model_id.clone(),
            language_hint,
            description,
            ref_text,
        };
        self.write_meta(&voice_dir, &meta).await?;

        Ok(meta.into_summary())
    }

    pub async fn update_voice(
        &self,
        voice_id: Uuid,
        display_name: Option<String>,
        language_hint: Option<String>,
        description: Option<String>,
        fields_to_update: UpdateVoiceFields,
    ) -> Result<Option<VoiceSummary>, VoiceStoreError> {
        let voice_dir = self.voice_dir(voice_id);
        let meta_path = voice_dir.join("meta.json");

        let raw = match tokio::fs::read_to_string(&meta_path).await {
            Ok(raw) => raw,
            Err(_) => return Ok(None),
        };
        let mut meta: VoiceMeta = match serde_json::from_str(&raw) {
            Ok(meta) => meta,
            Err(_) => return Ok(None),
        };

        if fields_to_update.display_name {
            if let Some(name) = display_name {
                meta.display_name = name;
            }
        }
        if fields_to_update.language_hint {
            meta.language_hint = language_hint;
        }
        if fields_to_update.description {
            meta.description = description;
        }

        self.write_meta(&voice_dir, &meta).await?;
        Ok(Some(meta.into_summary()))
    }

    pub async fn delete_voice(&self, voice_id: Uuid) -> Result<bool, VoiceStoreError> {
        let voice_dir = self.voice_dir(voice_id);
        if tokio::fs::metadata(&voice_dir).await.is_err() {
            return Ok(false);
        }
        tokio::fs::remove_dir_all(&voice_dir).await?;
        Ok(true)
    }

    pub fn voice_prompt_path(&self, voice_id: Uuid) -> PathBuf {
        self.voice_dir(voice_id).join("prompt.safetensors")
    }

    pub fn reference_audio_path(&self, voice_id: Uuid, suffix: &str) -> PathBuf {
        let normalized = if suffix.starts_with('.') {
            suffix.to_string()
        } else {
            format!(".{suffix}")
        };
        self.voice_dir(voice_id)
            .join(format!("reference_audio{normalized}"))
    }

    fn voice_dir(&self, voice_id: Uuid) -> PathBuf {
        self.voices_dir.join(voice_id.to_string())
    }

    async fn write_meta(&self, voice_dir: &Path, meta: &VoiceMeta) -> Result<(), VoiceStoreError> {
        let serialized =
            serde_json::to_string_pretty(meta).map_err(|source| VoiceStoreError::CorruptMetadata {
                voice_id: meta.voice_id.clone(),
                source,
            })?;
        tokio::fs::write(voice_dir.join("meta.json"), serialized).await?;
        Ok(())
    }

    fn default_voice_summary(&self) -> VoiceSummary {
        VoiceSummary {
            voice_id: DEFAULT_VOICE_ID.to_string(),
            display_name: "Default Built-in Voice".to_string(),
            created_at: Utc.timestamp_opt(0, 0).single().expect("epoch is valid"),
            tts_model_id: self.active_model_id.clone(),
            language_hint: Some("auto".to_string()),
        }
    }
}

pub fn parse_voice_id(raw: &str) -> Result<Uuid, VoiceStoreError> {
    Uuid::parse_str(raw).map_err(|_| VoiceStoreError::InvalidVoiceId(raw.to_string()))
}
