//! The capability interface every speech backend implements.

use async_trait::async_trait;

use crate::error::EngineError;
use crate::types::{BackendStatus, PlaybackSettings, SynthesizedAudio};

/// A speech backend: something that can turn one text chunk into PCM audio,
/// optionally after preparing a cloned voice from reference audio.
///
/// Implementations:
/// - `MockSynthesizer` - deterministic sine-tone generator, no model
/// - `QwenSynthesizer` - default-voice-only neural backend
/// - `KyutaiSynthesizer` - clone-capable neural backend
///
/// A backend that cannot support an operation returns an [`EngineError`]
/// with the appropriate code rather than panicking; the job worker and HTTP
/// layer translate that directly into a response or `JOB_ERROR` event.
#[async_trait]
pub trait Synthesizer: Send + Sync + 'static {
    /// Synthesize one chunk of text for `voice_id` under the given playback
    /// settings. `voice_id` is `"0"` for the default voice. `language` is an
    /// optional ISO hint; each backend normalizes it to whatever form its
    /// own model expects (see `resolve_qwen_language`/`resolve_kyutai_language`).
    async fn synthesize_chunk(
        &self,
        text: &str,
        voice_id: &str,
        language: Option<&str>,
        settings: &PlaybackSettings,
    ) -> Result<SynthesizedAudio, EngineError>;

    /// Build and cache whatever voice-conditioning state this backend needs
    /// from `reference_audio` so that later `synthesize_chunk` calls for
    /// `voice_id` use it. Backends without clone support return
    /// `ErrorCode::VoiceCloneFailed`.
    async fn prepare_cloned_voice(
        &self,
        voice_id: &str,
        reference_audio: &[u8],
    ) -> Result<(), EngineError>;

    /// Drop any cached conditioning state for `voice_id`. Idempotent.
    async fn forget_voice(&self, voice_id: &str);

    /// Run the backend's model-loading and first-inference warmup path by
    /// synthesizing `text` (the configured warmup phrase) once. Called at
    /// most once per activation; errors are recorded in
    /// [`WarmupState`](crate::types::WarmupState) rather than propagated to
    /// a caller.
    async fn warmup(&self, text: &str, language: Option<&str>) -> Result<(), EngineError>;

    /// Current backend identity and capability flags, as surfaced on
    /// `/v1/health`.
    fn status(&self) -> BackendStatus;

    /// Whether `voice_id` can be synthesized right now without a prior
    /// `prepare_cloned_voice` call. True for the default voice on every
    /// backend and for already-prepared cloned voices.
    fn supports_voice_id(&self, voice_id: &str) -> bool {
        voice_id == crate::types::DEFAULT_VOICE_ID
    }
}
