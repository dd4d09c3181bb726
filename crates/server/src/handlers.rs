//! HTTP route handlers for the `/v1/*` surface.

use axum::extract::{Path, State};
use axum::Json;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use uuid::Uuid;

use voicereader_core::error::{EngineError, ErrorCode};
use voicereader_core::types::{BackendStatus, DEFAULT_VOICE_ID};
use voicereader_jobs::{ActivateError, StartJobParams};
use voicereader_voices::parse_voice_id;

use crate::dto::*;
use crate::state::AppState;

fn runtime_status_dto(status: BackendStatus, warmup: voicereader_core::types::WarmupState) -> RuntimeStatusDto {
    RuntimeStatusDto {
        backend: status.backend,
        model_loaded: status.model_loaded,
        fallback_active: status.fallback_active,
        detail: status.detail,
        supports_default_voice: status.supports_default_voice,
        supports_cloned_voices: status.supports_cloned_voices,
        warmup,
    }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let runtime = state.snapshot().await;
    let status = runtime.synthesizer.status();
    let warmup_state = state.warmup.snapshot();

    Json(HealthResponse {
        engine_version: runtime.config.engine_version.clone(),
        active_model_id: runtime.model_id.clone(),
        device: runtime.config.device(),
        capabilities: CapabilitiesDto {
            supports_voice_clone: status.supports_voice_clone,
            supports_audio_chunk_stream: true,
            supports_true_streaming_inference: false,
            languages: vec!["auto".to_string(), "en".to_string()],
        },
        runtime: runtime_status_dto(status, warmup_state),
    })
}

pub async fn list_voices(State(state): State<AppState>) -> Result<Json<VoicesResponse>, EngineError> {
    let runtime = state.snapshot().await;
    let voices = runtime
        .voice_store
        .list_voices()
        .await
        .map_err(|e| EngineError::new(ErrorCode::InvalidRequest, e.to_string()))?;
    Ok(Json(VoicesResponse { voices }))
}

fn decode_ref_audio(ref_audio: &RefAudioDto) -> Result<Vec<u8>, EngineError> {
    match (&ref_audio.path, &ref_audio.wav_base64) {
        (Some(_), Some(_)) | (None, None) => Err(EngineError::new(
            ErrorCode::InvalidAudio,
            "ref_audio requires exactly one of `path` or `wav_base64`",
        )),
        (Some(path), None) => std::fs::read(path)
            .map_err(|e| EngineError::new(ErrorCode::InvalidAudio, format!("could not read {path}: {e}"))),
        (None, Some(encoded)) => BASE64
            .decode(encoded)
            .map_err(|e| EngineError::new(ErrorCode::InvalidAudio, format!("invalid base64 audio: {e}"))),
    }
}

pub async fn clone_voice(
    State(state): State<AppState>,
    Json(req): Json<CloneVoiceRequest>,
) -> Result<Json<voicereader_core::types::VoiceSummary>, EngineError> {
    let name_len = req.display_name.chars().count();
    if !(1..=80).contains(&name_len) {
        return Err(EngineError::new(
            ErrorCode::InvalidRequest,
            "display_name must be 1-80 characters",
        ));
    }

    let audio_bytes = decode_ref_audio(&req.ref_audio)?;
    if audio_bytes.is_empty() {
        return Err(EngineError::new(ErrorCode::InvalidAudio, "reference audio is empty"));
    }

    let runtime = state.snapshot().await;
    let created = runtime
        .voice_store
        .create_voice(req.display_name, req.language, req.ref_text, req.description)
        .await
        .map_err(|e| EngineError::new(ErrorCode::InvalidRequest, e.to_string()))?;

    let voice_uuid = parse_voice_id(&created.voice_id)
        .map_err(|e| EngineError::new(ErrorCode::InvalidRequest, e.to_string()))?;

    let suffix = req
        .ref_audio
        .path
        .as_deref()
        .and_then(|p| std::path::Path::new(p).extension())
        .and_then(|ext| ext.to_str())
        .unwrap_or("wav");
    let audio_path = runtime.voice_store.reference_audio_path(voice_uuid, suffix);
    if let Err(e) = tokio::fs::write(&audio_path, &audio_bytes).await {
        let _ = runtime.voice_store.delete_voice(voice_uuid).await;
        return Err(EngineError::new(
            ErrorCode::VoiceCloneFailed,
            format!("failed to persist reference audio: {e}"),
        ));
    }

    if let Err(e) = runtime
        .synthesizer
        .prepare_cloned_voice(&created.voice_id, &audio_bytes)
        .await
    {
        let _ = runtime.voice_store.delete_voice(voice_uuid).await;
        return Err(EngineError::new(ErrorCode::VoiceCloneFailed, e.message));
    }

    Ok(Json(created))
}

pub async fn update_voice(
    State(state): State<AppState>,
    Path(voice_id): Path<String>,
    Json(req): Json<UpdateVoiceRequest>,
) -> Result<Json<voicereader_core::types::VoiceSummary>, EngineError> {
    if voice_id == DEFAULT_VOICE_ID {
        return Err(EngineError::new(ErrorCode::Forbidden, "the default voice cannot be modified"));
    }
    let uuid = parse_voice_id(&voice_id)
        .map_err(|_| EngineError::new(ErrorCode::VoiceNotFound, format!("voice {voice_id} not found")))?;

    let runtime = state.snapshot().await;
    let fields = voicereader_voices::UpdateVoiceFields {
        display_name: req.display_name.is_some(),
        language_hint: req.language.is_some(),
        description: req.description.is_some(),
    };
    let updated = runtime
        .voice_store
        .update_voice(uuid, req.display_name, req.language, req.description, fields)
        .await
        .map_err(|e| EngineError::new(ErrorCode::InvalidRequest, e.to_string()))?
        .ok_or_else(|| EngineError::new(ErrorCode::VoiceNotFound, format!("voice {voice_id} not found")))?;

    Ok(Json(updated))
}

pub async fn delete_voice(
    State(state): State<AppState>,
    Path(voice_id): Path<String>,
) -> Result<Json<DeleteVoiceResponse>, EngineError> {
    if voice_id == DEFAULT_VOICE_ID {
        return Err(EngineError::new(ErrorCode::Forbidden, "the default voice cannot be deleted"));
    }
    let uuid = parse_voice_id(&voice_id)
        .map_err(|_| EngineError::new(ErrorCode::VoiceNotFound, format!("voice {voice_id} not found")))?;

    let runtime = state.snapshot().await;
    let deleted = runtime
        .voice_store
        .delete_voice(uuid)
        .await
        .map_err(|e| EngineError::new(ErrorCode::InvalidRequest, e.to_string()))?;
    if !deleted {
        return Err(EngineError::new(ErrorCode::VoiceNotFound, format!("voice {voice_id} not found")));
    }
    runtime.synthesizer.forget_voice(&voice_id).await;
    Ok(Json(DeleteVoiceResponse { deleted: true }))
}

pub async fn speak(
    State(state): State<AppState>,
    Json(req): Json<SpeakRequest>,
) -> Result<Json<SpeakResponse>, EngineError> {
    let text = req.text.trim();
    if text.is_empty() {
        return Err(EngineError::new(ErrorCode::EmptyText, "text is empty after trimming"));
    }
    req.settings.validate()?;

    if req.voice_id != DEFAULT_VOICE_ID && Uuid::parse_str(&req.voice_id).is_err() {
        return Err(EngineError::new(
            ErrorCode::VoiceNotFound,
            format!("voice {} not found", req.voice_id),
        ));
    }

    // Held across the voice checks and `start_job` itself so a concurrent
    // `/v1/models/activate` cannot swap the runtime out from under us between
    // the checks and the job actually being registered on its `JobManager`.
    let guard = state.runtime.read().await;
    let runtime = guard.clone();
    if !runtime.voice_store.voice_exists(&req.voice_id).await {
        return Err(EngineError::new(
            ErrorCode::VoiceNotFound,
            format!("voice {} not found", req.voice_id),
        ));
    }
    if !runtime.synthesizer.supports_voice_id(&req.voice_id) {
        return Err(EngineError::new(
            ErrorCode::ModelNotReady,
            format!("active backend cannot serve voice {}", req.voice_id),
        ));
    }

    let handle = runtime
        .jobs
        .start_job(StartJobParams {
            voice_id: req.voice_id,
            text: text.to_string(),
            language: req.language,
            settings: req.settings.to_core(),
        })
        .await;
    drop(guard);

    let ws_url = format!(
        "ws://{}:{}/v1/stream/{}",
        runtime.config.host, runtime.config.port, handle.job_id
    );
    Ok(Json(SpeakResponse { job_id: handle.job_id, ws_url }))
}

pub async fn cancel(
    State(state): State<AppState>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<CancelResponse>, EngineError> {
    // Same reasoning as `speak`: held across `cancel_job` so activation can't
    // swap in a runtime whose `JobManager` has never heard of `req.job_id`
    // while we're still in the middle of looking it up on the old one.
    let guard = state.runtime.read().await;
    let runtime = guard.clone();
    if runtime.jobs.cancel_job(req.job_id).await {
        Ok(Json(CancelResponse { canceled: true }))
    } else {
        Err(EngineError::new(ErrorCode::JobNotFound, format!("job {} not found", req.job_id)))
    }
}

pub async fn warmup(
    State(state): State<AppState>,
    Json(req): Json<WarmupRequest>,
) -> Json<WarmupResponse> {
    let runtime = state.snapshot().await;
    let warmup_language = if runtime.config.warmup_language == "auto" {
        None
    } else {
        Some(runtime.config.warmup_language.clone())
    };
    let outcome = state
        .warmup
        .trigger(
            runtime.synthesizer.clone(),
            runtime.config.warmup_text.clone(),
            warmup_language,
            req.wait,
            req.force,
            req.reason,
        )
        .await;
    Json(WarmupResponse { accepted: outcome.accepted, warmup: outcome.state })
}

pub async fn activate_model(
    State(state): State<AppState>,
    Json(req): Json<ActivateRequestDto>,
) -> Result<Json<ActivateResponse>, EngineError> {
    match voicereader_jobs::activate_model(&state.runtime, &state.warmup, req.into_core()).await {
        Ok(activation) => {
            let status = activation.runtime.synthesizer.status();
            let warmup_state = state.warmup.snapshot();
            Ok(Json(ActivateResponse {
                reloaded: true,
                warmup_accepted: activation.warmup_accepted,
                active_model_id: activation.runtime.model_id.clone(),
                runtime: runtime_status_dto(status, warmup_state),
            }))
        }
        Err(ActivateError::JobInProgress) => {
            Err(EngineError::new(ErrorCode::JobInProgress, "a job is currently in progress"))
        }
        Err(ActivateError::ModelNotReady(message)) => {
            Err(EngineError::new(ErrorCode::ModelNotReady, message))
        }
    }
}

pub async fn prefetch(
    State(state): State<AppState>,
    Json(req): Json<PrefetchRequest>,
) -> Json<PrefetchResponse> {
    let runtime = state.snapshot().await;
    let data_dir = runtime.config.data_dir.clone();
    Json(PrefetchResponse {
        mode: req.mode,
        downloaded: Vec::new(),
        saved_to: std::collections::HashMap::new(),
        data_dir: data_dir.display().to_string(),
        models_dir: data_dir.join("models").display().to_string(),
        hf_cache_dir: data_dir.join("hf-cache").display().to_string(),
    })
}

pub async fn quit(State(state): State<AppState>, Json(_req): Json<QuitRequest>) -> Json<QuitResponse> {
    state.shutdown.notify_one();
    Json(QuitResponse { quitting: true })
}
