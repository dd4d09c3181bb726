//! Authenticated HTTP/WebSocket surface for the voicereader engine.

pub mod auth;
pub mod dto;
pub mod handlers;
pub mod state;
pub mod websocket;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Builds the full `/v1/*` router. Every route requires a bearer token;
/// the WebSocket route checks it itself (see [`websocket::stream_job`]) since
/// a 401 response can't be returned after the handshake is accepted.
pub fn create_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/v1/health", get(handlers::health))
        .route("/v1/voices", get(handlers::list_voices))
        .route("/v1/voices/clone", post(handlers::clone_voice))
        .route("/v1/voices/:voice_id", patch(handlers::update_voice))
        .route("/v1/voices/:voice_id", delete(handlers::delete_voice))
        .route("/v1/speak", post(handlers::speak))
        .route("/v1/cancel", post(handlers::cancel))
        .route("/v1/warmup", post(handlers::warmup))
        .route("/v1/models/activate", post(handlers::activate_model))
        .route("/v1/models/prefetch", post(handlers::prefetch))
        .route("/v1/quit", post(handlers::quit))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer_token,
        ));

    Router::new()
        .merge(authenticated)
        .route("/v1/stream/:job_id", get(websocket::stream_job))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicereader_jobs::WarmupController;

    #[tokio::test(flavor = "multi_thread")]
    async fn router_builds_without_panicking() {
        let config = voicereader_config::resolve_config(
            &voicereader_config::CliArgs {
                server: true,
                host: "127.0.0.1".into(),
                port: 0,
                token: Some("t".into()),
                token_env: "VOICEREADER_TEST_TOKEN_UNSET".into(),
                data_dir: None,
                bootstrap_stdin: false,
            },
            &voicereader_config::BootstrapPayload::default(),
        )
        .unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config;
        config.data_dir = tmp.path().to_path_buf();
        let runtime = voicereader_jobs::Runtime::bootstrap(config).await.unwrap();
        let state = AppState::new(runtime, WarmupController::new());
        let _ = create_router(state);
    }
}
