//! Backend selection policy.

use std::sync::Arc;

use voicereader_config::EngineConfig;
use voicereader_core::synth_trait::Synthesizer;
use voicereader_core::types::BackendKind;

use crate::backends::kyutai::KyutaiSynthesizer;
use crate::backends::mock::MockSynthesizer;
use crate::backends::qwen::QwenSynthesizer;

/// Errors from `kyutai`/`qwen` (named explicitly) propagate; `auto` never
/// fails, falling back to [`MockSynthesizer`] instead.
#[derive(thiserror::Error, Debug)]
pub enum SynthesizerConstructionError {
    #[error("{0}")]
    Qwen(#[from] crate::backends::qwen::QwenConstructionError),

    #[error("{0}")]
    Kyutai(#[from] crate::backends::kyutai::KyutaiConstructionError),
}

/// Build the synthesizer named by `config.synth_backend`.
pub fn create_synthesizer(
    config: &EngineConfig,
) -> Result<Arc<dyn Synthesizer>, SynthesizerConstructionError> {
    let backend_choice: BackendKind = config
        .synth_backend
        .parse()
        .unwrap_or(BackendKind::Auto);

    match backend_choice {
        BackendKind::Mock => Ok(Arc::new(MockSynthesizer::explicit())),
        BackendKind::Qwen => Ok(Arc::new(QwenSynthesizer::new(config)?)),
        BackendKind::Kyutai => Ok(Arc::new(KyutaiSynthesizer::new(config)?)),
        BackendKind::Auto => Ok(try_kyutai_then_qwen_then_mock(config)),
    }
}

fn try_kyutai_then_qwen_then_mock(config: &EngineConfig) -> Arc<dyn Synthesizer> {
    let kyutai_error = match KyutaiSynthesizer::new(config) {
        Ok(synth) => return Arc::new(synth),
        Err(e) => e,
    };

    let qwen_error = match QwenSynthesizer::new(config) {
        Ok(synth) => return Arc::new(synth),
        Err(e) => e,
    };

    Arc::new(MockSynthesizer::fallback(format!(
        "Fell back from auto backend selection: kyutai failed ({kyutai_error}); qwen failed ({qwen_error})"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> EngineConfig {
        voicereader_config::resolve_config(
            &voicereader_config::CliArgs {
                server: true,
                host: "127.0.0.1".into(),
                port: 8765,
                token: Some("t".into()),
                token_env: "VOICEREADER_TEST_TOKEN_UNSET".into(),
                data_dir: None,
                bootstrap_stdin: false,
            },
            &voicereader_config::settings::BootstrapPayload::default(),
        )
        .unwrap()
    }

    #[test]
    fn mock_backend_is_always_constructible() {
        let mut config = base_config();
        config.synth_backend = "mock".to_string();
        let synth = create_synthesizer(&config).unwrap();
        assert_eq!(synth.status().backend, "mock");
    }

    #[test]
    fn auto_backend_selection_always_yields_a_usable_synthesizer() {
        let mut config = base_config();
        config.synth_backend = "auto".to_string();
        let synth = create_synthesizer(&config).unwrap();
        assert!(synth.status().model_loaded);
    }

    #[test]
    fn auto_falls_back_to_mock_when_both_named_backends_fail() {
        let mut config = base_config();
        config.synth_backend = "auto".to_string();
        config.kyutai_voice_prompt = "/definitely/not/a/real/prompt/path".to_string();
        config.qwen_dtype = "fp8-does-not-exist".to_string();
        let synth = try_kyutai_then_qwen_then_mock(&config);
        let status = synth.status();
        assert_eq!(status.backend, "mock");
        assert!(status.fallback_active);
    }
}
