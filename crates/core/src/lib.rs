//! Shared types, traits and error envelope for the voicereader engine.
//!
//! Everything in this crate is pure domain vocabulary: no filesystem access,
//! no process spawning, no model loading. Downstream crates depend on this
//! one for a common language, not for behavior.

pub mod chunking;
pub mod error;
pub mod events;
pub mod synth_trait;
pub mod types;

pub use chunking::{split_text_into_chunks, ChunkingError, TextChunk};
pub use error::{EngineError, ErrorCode};
pub use events::{AudioFrame, JobEvent, TextRange};
pub use synth_trait::Synthesizer;
pub use types::{
    BackendKind, BackendStatus, PlaybackSettings, SynthesizedAudio, VoiceSummary, WarmupState,
    WarmupStatusValue,
};
