//! Bearer-token auth gate: a constant-time check on HTTP, with a
//! subprotocol-pair fallback for WebSocket clients that cannot set headers.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

const AUTH_SUBPROTOCOL: &str = "auth.bearer.v1";

/// Constant-time comparison so token mismatches don't leak timing
/// information proportional to the matching prefix length.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// HTTP middleware: every `/v1/*` route requires `Authorization: Bearer <token>`
/// matching the currently active config's token.
pub async fn require_bearer_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let expected = state.snapshot().await.config.token.clone();
    match bearer_token(&request) {
        Some(provided) if constant_time_compare(provided.as_bytes(), expected.as_bytes()) => {
            next.run(request).await
        }
        _ => (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({
                "error": {
                    "code": "UNAUTHORIZED",
                    "message": "missing or invalid bearer token",
                    "details": {},
                }
            })),
        )
            .into_response(),
    }
}

/// Parses the `Sec-WebSocket-Protocol` header for the pair
/// `auth.bearer.v1, <token>` (consecutive entries, in either order the spec
/// fixes: the marker always comes first).
pub fn token_from_subprotocol_header(raw: &str, expected: &str) -> bool {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    parts
        .windows(2)
        .any(|pair| pair[0] == AUTH_SUBPROTOCOL && constant_time_compare(pair[1].as_bytes(), expected.as_bytes()))
}

/// Whether the connecting client has proven the token, either via the
/// `Authorization` header or the subprotocol-pair fallback. Returns `true`
/// also when matched by subprotocol, in which case the caller must echo
/// [`AUTH_SUBPROTOCOL`] back to the client on accept.
pub fn authenticate_stream(request: &Request, expected: &str) -> bool {
    if let Some(token) = bearer_token(request) {
        if constant_time_compare(token.as_bytes(), expected.as_bytes()) {
            return true;
        }
    }
    request
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|raw| token_from_subprotocol_header(raw, expected))
}

pub fn auth_subprotocol() -> &'static str {
    AUTH_SUBPROTOCOL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_compare_matches_equal_slices() {
        assert!(constant_time_compare(b"secret", b"secret"));
        assert!(!constant_time_compare(b"secret", b"secre"));
        assert!(!constant_time_compare(b"secret", b"secreX"));
    }

    #[test]
    fn subprotocol_pair_is_found_among_other_entries() {
        assert!(token_from_subprotocol_header(
            "auth.bearer.v1, s3cr3t",
            "s3cr3t"
        ));
        assert!(!token_from_subprotocol_header(
            "auth.bearer.v1, wrong-token",
            "s3cr3t"
        ));
        assert!(!token_from_subprotocol_header("unrelated.protocol", "s3cr3t"));
    }
}
