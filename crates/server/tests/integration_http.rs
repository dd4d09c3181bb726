//! End-to-end HTTP/WS coverage for the `/v1/*` surface: binds a real
//! loopback listener (mirroring the pack's `gglib-axum` integration style)
//! and drives it with `reqwest`/`tokio-tungstenite` rather than calling
//! handlers directly, so auth middleware, routing and serialization are all
//! exercised together.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use voicereader_config::{resolve_config, BootstrapPayload, CliArgs};
use voicereader_jobs::{Runtime, WarmupController};
use voicereader_server::{create_router, AppState};

const TOKEN: &str = "integration-test-token";

struct TestServer {
    base_url: String,
    ws_base: String,
    _data_dir: tempfile::TempDir,
}

async fn spawn_server() -> TestServer {
    let data_dir = tempfile::tempdir().unwrap();
    let args = CliArgs {
        server: true,
        host: "127.0.0.1".into(),
        port: 0,
        token: Some(TOKEN.into()),
        token_env: "VOICEREADER_TEST_TOKEN_UNSET".into(),
        data_dir: None,
        bootstrap_stdin: false,
    };
    let mut config = resolve_config(&args, &BootstrapPayload::default()).unwrap();
    config.synth_backend = "mock".into();
    config.data_dir = data_dir.path().to_path_buf();
    config.warmup_on_startup = false;

    let runtime = Runtime::bootstrap(config).await.unwrap();
    let state = AppState::new(runtime, WarmupController::new());
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{addr}"),
        ws_base: format!("ws://{addr}"),
        _data_dir: data_dir,
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

#[tokio::test(flavor = "multi_thread")]
async fn health_requires_a_bearer_token() {
    let server = spawn_server().await;

    let unauthorized = client()
        .get(format!("{}/v1/health", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), reqwest::StatusCode::UNAUTHORIZED);
    let body: Value = unauthorized.json().await.unwrap();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let authorized = client()
        .get(format!("{}/v1/health", server.base_url))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(authorized.status(), reqwest::StatusCode::OK);
    let body: Value = authorized.json().await.unwrap();
    assert_eq!(body["runtime"]["backend"], "mock");
    assert_eq!(body["capabilities"]["supports_audio_chunk_stream"], true);
    assert_eq!(body["capabilities"]["supports_true_streaming_inference"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn default_voice_is_always_listed_first() {
    let server = spawn_server().await;
    let resp = client()
        .get(format!("{}/v1/voices", server.base_url))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["voices"][0]["voice_id"], "0");
}

#[tokio::test(flavor = "multi_thread")]
async fn patch_and_delete_on_default_voice_are_forbidden() {
    let server = spawn_server().await;

    let patch = client()
        .patch(format!("{}/v1/voices/0", server.base_url))
        .bearer_auth(TOKEN)
        .json(&json!({"display_name": "New Name"}))
        .send()
        .await
        .unwrap();
    assert_eq!(patch.status(), reqwest::StatusCode::FORBIDDEN);
    let body: Value = patch.json().await.unwrap();
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let delete = client()
        .delete(format!("{}/v1/voices/0", server.base_url))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(delete.status(), reqwest::StatusCode::FORBIDDEN);
}

#[tokio::test(flavor = "multi_thread")]
async fn speak_empty_text_is_rejected() {
    let server = spawn_server().await;
    let resp = client()
        .post(format!("{}/v1/speak", server.base_url))
        .bearer_auth(TOKEN)
        .json(&json!({"text": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "EMPTY_TEXT");
}

#[tokio::test(flavor = "multi_thread")]
async fn speak_rejects_out_of_range_rate() {
    let server = spawn_server().await;
    let resp = client()
        .post(format!("{}/v1/speak", server.base_url))
        .bearer_auth(TOKEN)
        .json(&json!({"text": "Hello.", "settings": {"rate": 0.24}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test(flavor = "multi_thread")]
async fn speak_unknown_voice_returns_404() {
    let server = spawn_server().await;
    let resp = client()
        .post(format!("{}/v1/speak", server.base_url))
        .bearer_auth(TOKEN)
        .json(&json!({"text": "Hello.", "voice_id": "00000000-0000-0000-0000-000000000000"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VOICE_NOT_FOUND");
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_unknown_job_is_not_found() {
    let server = spawn_server().await;
    let resp = client()
        .post(format!("{}/v1/cancel", server.base_url))
        .bearer_auth(TOKEN)
        .json(&json!({"job_id": "00000000-0000-0000-0000-000000000000"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}

/// Scenario 1 from the spec's seed list: default voice, short speak, full
/// `JOB_STARTED` → `AUDIO_CHUNK` → `JOB_DONE` sequence over the WS.
#[tokio::test(flavor = "multi_thread")]
async fn default_voice_short_speak_streams_started_chunk_done() {
    let server = spawn_server().await;

    let speak = client()
        .post(format!("{}/v1/speak", server.base_url))
        .bearer_auth(TOKEN)
        .json(&json!({"text": "Hello world."}))
        .send()
        .await
        .unwrap();
    assert_eq!(speak.status(), reqwest::StatusCode::OK);
    let body: Value = speak.json().await.unwrap();
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let ws_url = format!("{}/v1/stream/{}", server.ws_base, job_id);
    let mut request = ws_url.into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Authorization", format!("Bearer {TOKEN}").parse().unwrap());

    let (mut ws, _response) = tokio::time::timeout(
        Duration::from_secs(5),
        tokio_tungstenite::connect_async(request),
    )
    .await
    .expect("ws connect timed out")
    .expect("ws connect failed");

    let mut events = Vec::new();
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended before a terminal event")
            .unwrap();
        let WsMessage::Text(text) = msg else { continue };
        let event: Value = serde_json::from_str(&text).unwrap();
        let is_terminal = matches!(
            event["type"].as_str(),
            Some("JOB_DONE" | "JOB_CANCELED" | "JOB_ERROR")
        );
        events.push(event);
        if is_terminal {
            break;
        }
    }

    assert_eq!(events[0]["type"], "JOB_STARTED");
    let chunk = events
        .iter()
        .find(|e| e["type"] == "AUDIO_CHUNK")
        .expect("expected at least one AUDIO_CHUNK");
    assert_eq!(chunk["seq"], 1);
    assert_eq!(chunk["text_range"]["chunk_index"], 0);
    assert_eq!(events.last().unwrap()["type"], "JOB_DONE");
}

/// Scenario 2: subprotocol-pair auth with no `Authorization` header.
#[tokio::test(flavor = "multi_thread")]
async fn subprotocol_auth_is_accepted_and_echoed() {
    let server = spawn_server().await;

    let speak = client()
        .post(format!("{}/v1/speak", server.base_url))
        .bearer_auth(TOKEN)
        .json(&json!({"text": "Hi."}))
        .send()
        .await
        .unwrap();
    let body: Value = speak.json().await.unwrap();
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let ws_url = format!("{}/v1/stream/{}", server.ws_base, job_id);
    let mut request = ws_url.into_client_request().unwrap();
    request.headers_mut().insert(
        "Sec-WebSocket-Protocol",
        format!("auth.bearer.v1, {TOKEN}").parse().unwrap(),
    );

    let (mut ws, response) = tokio::time::timeout(
        Duration::from_secs(5),
        tokio_tungstenite::connect_async(request),
    )
    .await
    .expect("ws connect timed out")
    .expect("ws connect failed");

    let negotiated = response
        .headers()
        .get("Sec-WebSocket-Protocol")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert_eq!(negotiated, "auth.bearer.v1");

    let first = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    if let WsMessage::Text(text) = first {
        let event: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(event["type"], "JOB_STARTED");
    } else {
        panic!("expected a text frame first");
    }
}

/// Scenario 5 repeated over HTTP: activation round-trips a new model id.
#[tokio::test(flavor = "multi_thread")]
async fn activation_replaces_model_id_and_health_reflects_it() {
    let server = spawn_server().await;

    let activate = client()
        .post(format!("{}/v1/models/activate", server.base_url))
        .bearer_auth(TOKEN)
        .json(&json!({
            "synth_backend": "mock",
            "active_model_id": "mock-model-v2",
            "warmup_wait": true,
            "warmup_force": true,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(activate.status(), reqwest::StatusCode::OK);
    let body: Value = activate.json().await.unwrap();
    assert_eq!(body["reloaded"], true);
    assert_eq!(body["active_model_id"], "mock-model-v2");

    let health = client()
        .get(format!("{}/v1/health", server.base_url))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    let health_body: Value = health.json().await.unwrap();
    assert_eq!(health_body["active_model_id"], "mock-model-v2");
    let warmup_status = health_body["runtime"]["warmup"]["status"].as_str().unwrap();
    assert!(matches!(warmup_status, "ready" | "error"));
}

#[tokio::test(flavor = "multi_thread")]
async fn quit_notifies_the_shutdown_signal() {
    let server = spawn_server().await;
    let resp = client()
        .post(format!("{}/v1/quit", server.base_url))
        .bearer_auth(TOKEN)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["quitting"], true);
}
