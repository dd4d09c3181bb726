//! Filesystem-backed voice registry.
//!
//! Voices live at `<data_dir>/voices/<voice_id>/{meta.json, reference_audio.*,
//! prompt.safetensors}`. The default voice (`"0"`) is synthetic: it is never
//! written to disk and always sorts first in [`VoiceStore::list_voices`].

mod store;

pub use store::{parse_voice_id, UpdateVoiceFields, VoiceStore, VoiceStoreError};
