//! The MCP streamable-HTTP transport.
//!
//! - `POST /mcp` — one JSON-RPC envelope in; the response comes back as
//!   plain JSON or as a short SSE stream, depending on the `Accept`
//!   header.  Notifications get `202` with an empty body.
//! - `GET /mcp` — long-lived keep-alive stream: a `ping` event every 30
//!   seconds until the client disconnects.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_util::FutureExt;
use serde_json::Value;

use cg_mcp::protocol::{INTERNAL_ERROR, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR};
use cg_mcp::{Envelope, JsonRpcResponse};

use crate::state::AppState;

const SESSION_ID_HEADER: &str = "mcp-session-id";
const KEEPALIVE_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Error envelope for faults that happen before a request id is known.
fn transport_error(code: i64, message: impl Into<String>) -> JsonRpcResponse {
    JsonRpcResponse::err(Value::String("server-error".into()), code, message)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /mcp
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn mcp_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let accept = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let wants_json = accept.contains("application/json");
    let wants_sse = accept.contains("text/event-stream");

    if !wants_json && !wants_sse {
        return (
            StatusCode::NOT_ACCEPTABLE,
            Json(transport_error(
                INVALID_REQUEST,
                "Not Acceptable: client must accept application/json or text/event-stream",
            )),
        )
            .into_response();
    }

    let envelope: Envelope = match serde_json::from_slice(&body) {
        Ok(env) => env,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(transport_error(PARSE_ERROR, format!("parse error: {e}"))),
            )
                .into_response();
        }
    };

    let header_session_id = headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    // Unexpected faults inside dispatch become a 500 with an
    // internal-error envelope instead of tearing down the connection.
    let dispatched = std::panic::AssertUnwindSafe(
        state.dispatcher.dispatch(envelope, header_session_id.as_deref()),
    )
    .catch_unwind()
    .await;

    let outcome = match dispatched {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::error!("dispatch panicked");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(transport_error(INTERNAL_ERROR, "internal error")),
            )
                .into_response();
        }
    };

    // Notifications: no body, ever.
    let Some(response) = outcome.response else {
        return StatusCode::ACCEPTED.into_response();
    };

    let mut extra_headers = HeaderMap::new();
    if let Some(sid) = &outcome.session_id {
        if let Ok(value) = HeaderValue::from_str(sid) {
            // Header names are lowercased on the wire; clients match
            // `Mcp-Session-Id` case-insensitively.
            extra_headers.insert(SESSION_ID_HEADER, value);
        }
    }

    // Prefer plain JSON for compatibility; fall back to a short SSE
    // stream only when the client accepts nothing else.
    if wants_json {
        (extra_headers, Json(response)).into_response()
    } else {
        let payload = serde_json::to_string(&response).unwrap_or_default();
        let stream = futures_util::stream::iter([
            Ok::<_, Infallible>(Event::default().event("message").data(payload)),
            Ok(Event::default().event("done").data("{}")),
        ]);
        (extra_headers, Sse::new(stream)).into_response()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /mcp
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn mcp_get(headers: HeaderMap) -> Response {
    let accept = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !accept.contains("text/event-stream") {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(transport_error(
                METHOD_NOT_FOUND,
                "Method Not Allowed: GET requires Accept: text/event-stream",
            )),
        )
            .into_response();
    }

    // Unbounded ping stream; ends when the client hangs up (the write
    // side fails and axum drops the stream).
    let stream = async_stream::stream! {
        loop {
            yield Ok::<_, Infallible>(Event::default().event("ping").data("{}"));
            tokio::time::sleep(KEEPALIVE_PING_INTERVAL).await;
        }
    };

    Sse::new(stream).into_response()
}
