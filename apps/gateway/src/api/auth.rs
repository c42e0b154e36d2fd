//! Node authentication middleware (§6 "Authentication").
//!
//! Every node-facing endpoint requires `X-Node-Token: <shared secret>`.
//! The expected value is read **once at startup** (`node.shared_token`)
//! and cached as a SHA-256 digest in `AppState`; comparisons are
//! constant-time so the header can't be brute-forced via timing.
//!
//! If no token is configured, the server logs a warning at startup and
//! allows unauthenticated access (dev mode) — same posture as the
//! teacher's `require_api_token`.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

pub async fn require_node_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let expected_hash = match &state.node_token_hash {
        Some(h) => h,
        None => return next.run(req).await,
    };

    let provided = req
        .headers()
        .get("x-node-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let provided_hash = Sha256::digest(provided.as_bytes());

    if !bool::from(provided_hash.ct_eq(expected_hash.as_slice())) {
        return (
            axum::http::StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({ "error": "invalid or missing node token" })),
        )
            .into_response();
    }

    next.run(req).await
}
