//! The hot-swappable bundle of everything a request needs, and the
//! quiesce-and-rebuild protocol that replaces it wholesale on activation.

use std::sync::Arc;

use voicereader_config::EngineConfig;
use voicereader_core::synth_trait::Synthesizer;
use voicereader_voices::VoiceStore;

use crate::manager::JobManager;
use crate::warmup::WarmupController;

/// Everything `synthesize_chunk`, `list_voices`, `start_job` and friends
/// need, moved together on every activation so no request ever observes a
/// synthesizer paired with a stale voice store or job manager.
pub struct Runtime {
    pub synthesizer: Arc<dyn Synthesizer>,
    pub voice_store: Arc<VoiceStore>,
    pub jobs: Arc<JobManager>,
    pub config: EngineConfig,
    pub model_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ActivateError {
    #[error("a job is currently in progress")]
    JobInProgress,
    #[error("failed to construct the requested backend: {0}")]
    ModelNotReady(String),
}

/// The subset of `/v1/models/activate`'s request body this layer acts on.
/// `None` fields leave the corresponding `EngineConfig` field untouched.
#[derive(Debug, Clone, Default)]
pub struct ActivateRequest {
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

impl Runtime {
    /// Builds the process's first `Runtime` directly from a resolved
    /// config, with no prior runtime to quiesce.
    pub async fn bootstrap(config: EngineConfig) -> Result<Arc<Runtime>, ActivateError> {
        build_runtime(config).await
    }
}

/// Overlays every `Some` field of `request` onto `config`, leaving `None`
/// fields untouched.
fn apply_overlay(config: &mut EngineConfig, request: &ActivateRequest) {
    if let Some(v) = &request.synth_backend {
        config.synth_backend = v.clone();
    }
    if let Some(v) = &request.qwen_model_name {
        config.qwen_model_name = v.clone();
    }
    if let Some(v) = &request.qwen_device_map {
        config.qwen_device_map = v.clone();
    }
    if let Some(v) = &request.qwen_dtype {
        config.qwen_dtype = v.clone();
    }
    if let Some(v) = &request.qwen_attn_implementation {
        config.qwen_attn_implementation = v.clone();
    }
    if let Some(v) = &request.qwen_default_speaker {
        config.qwen_default_speaker = v.clone();
    }
    if let Some(v) = &request.kyutai_model_name {
        config.kyutai_model_name = v.clone();
    }
    if let Some(v) = &request.kyutai_voice_prompt {
        config.kyutai_voice_prompt = v.clone();
    }
    if let Some(v) = &request.active_model_id {
        config.active_model_id = v.clone();
    }
}

async fn build_runtime(config: EngineConfig) -> Result<Arc<Runtime>, ActivateError> {
    let synthesizer = voicereader_synth::create_synthesizer(&config)
        .map_err(|e| ActivateError::ModelNotReady(e.to_string()))?;

    let voice_store = Arc::new(
        VoiceStore::new(config.data_dir.clone(), config.active_model_id.clone())
            .await
            .map_err(|e| ActivateError::ModelNotReady(e.to_string()))?,
    );

    let jobs = Arc::new(JobManager::new(synthesizer.clone()));
    let model_id = config.active_model_id.clone();

    Ok(Arc::new(Runtime {
        synthesizer,
        voice_store,
        jobs,
        config,
        model_id,
    }))
}

/// Implements §4.6's quiesce-and-rebuild protocol:
/// 1. Reject with `JobInProgress` if a job is in flight.
/// 2. Await any warmup already running.
/// 3. Overlay the request onto the current config.
/// 4. Construct a new synthesizer (and, from it, voice store + job manager).
/// 5. Swap all of it into `runtime_lock` together.
/// 6. Reset and re-trigger warmup.
pub struct Activation {
    pub runtime: Arc<Runtime>,
    pub warmup_accepted: bool,
}

pub async fn activate_model(
    runtime_lock: &tokio::sync::RwLock<Arc<Runtime>>,
    warmup: &WarmupController,
    request: ActivateRequest,
) -> Result<Activation, ActivateError> {
    // Held for the whole check-build-swap sequence: `start_job` only ever
    // runs while holding its own read guard on this same lock, so no job can
    // be admitted onto the runtime being replaced between the active-job
    // check below and the swap.
    let mut guard = runtime_lock.write().await;

    if guard.jobs.has_active_job().await {
        return Err(ActivateError::JobInProgress);
    }

    warmup.await_in_flight().await;

    let mut new_config = guard.config.clone();
    apply_overlay(&mut new_config, &request);

    let new_runtime = build_runtime(new_config).await?;

    *guard = new_runtime.clone();
    drop(guard);

    warmup.reset();
    let warmup_language = if new_runtime.config.warmup_language == "auto" {
        None
    } else {
        Some(new_runtime.config.warmup_language.clone())
    };
    let outcome = warmup
        .trigger(
            new_runtime.synthesizer.clone(),
            new_runtime.config.warmup_text.clone(),
            warmup_language,
            request.warmup_wait,
            request.warmup_force,
            request.reason.clone(),
        )
        .await;

    Ok(Activation {
        runtime: new_runtime,
        warmup_accepted: outcome.accepted,
    })
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

    async fn temp_runtime() -> (tempfile::TempDir, Arc<Runtime>) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = base_config();
        config.synth_backend = "mock".into();
        config.data_dir = dir.path().to_path_buf();
        let runtime = Runtime::bootstrap(config).await.unwrap();
        (dir, runtime)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn activation_replaces_model_id() {
        let (_dir, runtime) = temp_runtime().await;
        let lock = tokio::sync::RwLock::new(runtime);
        let warmup = WarmupController::new();

        let request = ActivateRequest {
            synth_backend: Some("mock".into()),
            active_model_id: Some("mock-model-v2".into()),
            warmup_wait: true,
            warmup_force: true,
            ..Default::default()
        };

        let activation = activate_model(&lock, &warmup, request).await.unwrap();
        assert_eq!(activation.runtime.model_id, "mock-model-v2");
        assert_eq!(activation.runtime.config.active_model_id, "mock-model-v2");
        assert!(activation.warmup_accepted);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn activation_is_rejected_while_a_job_is_in_progress() {
        let (_dir, runtime) = temp_runtime().await;

        let handle = runtime
            .jobs
            .start_job(crate::manager::StartJobParams {
                voice_id: "0".into(),
                text: "Hello there, this keeps the worker briefly busy.".into(),
                language: None,
                settings: voicereader_core::types::PlaybackSettings::default(),
            })
            .await;
        let _ = handle;

        let lock = tokio::sync::RwLock::new(runtime);
        let warmup = WarmupController::new();
        let request = ActivateRequest {
            synth_backend: Some("mock".into()),
            ..Default::default()
        };

        let err = activate_model(&lock, &warmup, request).await.unwrap_err();
        assert!(matches!(err, ActivateError::JobInProgress));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unconstructible_backend_surfaces_as_model_not_ready() {
        let (_dir, runtime) = temp_runtime().await;
        let lock = tokio::sync::RwLock::new(runtime);
        let warmup = WarmupController::new();

        let request = ActivateRequest {
            synth_backend: Some("kyutai".into()),
            kyutai_voice_prompt: Some("/definitely/not/a/real/prompt/path".into()),
            ..Default::default()
        };

        let err = activate_model(&lock, &warmup, request).await.unwrap_err();
        assert!(matches!(err, ActivateError::ModelNotReady(_)));
    }
}
