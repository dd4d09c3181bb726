//! Deterministic sine-tone backend. No model, no filesystem, no GPU — this
//! is the engine's guaranteed fallback and the backbone of its test suite.

use async_trait::async_trait;
use voicereader_core::error::EngineError;
use voicereader_core::synth_trait::Synthesizer;
use voicereader_core::types::{BackendStatus, PlaybackSettings, SynthesizedAudio};

const FREQUENCY_HZ: f64 = 220.0;
const AMPLITUDE_FRACTION: f64 = 0.18;

pub struct MockSynthesizer {
    sample_rate: u32,
    detail: Option<String>,
    fallback_active: bool,
}

impl MockSynthesizer {
    pub fn new(sample_rate: u32, detail: Option<String>, fallback_active: bool) -> Self {
        Self {
            sample_rate,
            detail,
            fallback_active,
        }
    }

    /// The backend selected when nothing else was requested or available.
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self::new(24_000, Some(reason.into()), true)
    }

    /// The backend selected because the caller asked for it explicitly.
    pub fn explicit() -> Self {
        Self::new(
            24_000,
            Some("Selected explicitly via VOICEREADER_SYNTH_BACKEND=mock".to_string()),
            false,
        )
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize_chunk(
        &self,
        text: &str,
        _voice_id: &str,
        _language: Option<&str>,
        _settings: &PlaybackSettings,
    ) -> Result<SynthesizedAudio, EngineError> {
        let duration_seconds = (text.chars().count() as f64 / 90.0).clamp(0.18, 1.2);
        let sample_count = (duration_seconds * self.sample_rate as f64) as usize;
        let amplitude = (32767.0 * AMPLITUDE_FRACTION) as i32;

        let mut samples = Vec::with_capacity(sample_count);
        for idx in 0..sample_count {
            let phase = 2.0 * std::f64::consts::PI * FREQUENCY_HZ * (idx as f64 / self.sample_rate as f64);
            samples.push((amplitude as f64 * phase.sin()) as i16);
        }

        Ok(SynthesizedAudio::from_samples_i16(&samples, self.sample_rate, 1))
    }

    async fn prepare_cloned_voice(
        &self,
        _voice_id: &str,
        _reference_audio: &[u8],
    ) -> Result<(), EngineError> {
        Ok(())
    }

    async fn forget_voice(&self, _voice_id: &str) {}

    async fn warmup(&self, _text: &str, _language: Option<&str>) -> Result<(), EngineError> {
        Ok(())
    }

    fn status(&self) -> BackendStatus {
        BackendStatus {
            backend: "mock".to_string(),
            model_loaded: true,
            fallback_active: self.fallback_active,
            detail: self.detail.clone(),
            supports_voice_clone: true,
            supports_default_voice: true,
            supports_cloned_voices: true,
        }
    }

    fn supports_voice_id(&self, _voice_id: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duration_is_clamped_to_the_documented_range() {
        let synth = MockSynthesizer::new(24_000, None, false);
        let short = synth
            .synthesize_chunk("hi", "0", None, &PlaybackSettings::default())
            .await
            .unwrap();
        let min_frames = (0.18 * 24_000.0) as usize;
        assert_eq!(short.frame_count(), min_frames);

        let long_text = "x".repeat(500);
        let long = synth
            .synthesize_chunk(&long_text, "0", None, &PlaybackSettings::default())
            .await
            .unwrap();
        let max_frames = (1.2 * 24_000.0) as usize;
        assert_eq!(long.frame_count(), max_frames);
    }

    #[tokio::test]
    async fn any_voice_id_is_accepted() {
        let synth = MockSynthesizer::new(24_000, None, false);
        assert!(synth.supports_voice_id("0"));
        assert!(synth.supports_voice_id("not-a-uuid"));
    }

    #[tokio::test]
    async fn fallback_constructor_marks_status_accordingly() {
        let synth = MockSynthesizer::fallback("qwen unavailable");
        let status = synth.status();
        assert!(status.fallback_active);
        assert_eq!(status.detail.as_deref(), Some("qwen unavailable"));
    }
}
