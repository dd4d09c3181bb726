//! `/v1/stream/{job_id}`: replays a job's event history, then forwards live
//! events as they are published, until a terminal event closes the socket.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use uuid::Uuid;

use crate::auth::{auth_subprotocol, authenticate_stream};
use crate::state::AppState;

const CLOSE_UNAUTHORIZED: u16 = 4401;
const CLOSE_UNKNOWN_JOB: u16 = 4404;

pub async fn stream_job(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    request: axum::extract::Request,
) -> Response {
    let expected_token = state.snapshot().await.config.token.clone();
    let authorized = authenticate_stream(&request, &expected_token);
    let subprotocol_requested = request
        .headers()
        .get(axum::http::header::SEC_WEBSOCKET_PROTOCOL)
        .is_some();

    let mut upgrade = ws;
    if subprotocol_requested {
        upgrade = upgrade.protocols([auth_subprotocol()]);
    }

    let parsed = Uuid::parse_str(&job_id);
    upgrade.on_upgrade(move |socket| handle_socket(socket, state, parsed, authorized))
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

async fn handle_socket(
    mut socket: WebSocket,
    state: AppState,
    job_id: Result<Uuid, uuid::Error>,
    authorized: bool,
) {
    if !authorized {
        close_with(&mut socket, CLOSE_UNAUTHORIZED, "missing or invalid bearer token").await;
        return;
    }

    let Ok(job_id) = job_id else {
        close_with(&mut socket, CLOSE_UNKNOWN_JOB, "unknown or expired job").await;
        return;
    };

    let runtime = state.snapshot().await;
    let Some((subscription_id, mut rx, history)) = runtime.jobs.subscribe(job_id).await else {
        close_with(&mut socket, CLOSE_UNKNOWN_JOB, "unknown or expired job").await;
        return;
    };

    for event in &history {
        if send_event(&mut socket, event).await.is_err() {
            runtime.jobs.unsubscribe(job_id, subscription_id).await;
            return;
        }
        if event.is_terminal() {
            runtime.jobs.unsubscribe(job_id, subscription_id).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    }

    while let Some(maybe_event) = rx.recv().await {
        let Some(event) = maybe_event else {
            break;
        };
        let terminal = event.is_terminal();
        if send_event(&mut socket, &event).await.is_err() {
            break;
        }
        if terminal {
            let _ = socket.send(Message::Close(None)).await;
            break;
        }
    }

    runtime.jobs.unsubscribe(job_id, subscription_id).await;
}

async fn send_event(socket: &mut WebSocket, event: &voicereader_core::events::JobEvent) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).expect("JobEvent always serializes");
    socket.send(Message::Text(text)).await
}
