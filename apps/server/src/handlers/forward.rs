//! Public HTTP surface
//!
//! Every request whose Host is not the bare hostname is candidate tunnel
//! traffic: resolve the leading label against the registry, dispatch over
//! the control channel, and wait on the correlator for the matching
//! response or the deadline.

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use http::{StatusCode, header};
use relay_common::constants::MAX_BODY_SIZE_BYTES;
use relay_common::{
    Message, TunnelRequest, TunnelResponse, encode_body, generate_request_id, headers_to_map,
    map_to_headers, scrub_response_headers,
};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::correlator::RequestOutcome;
use crate::{AppState, host_label, strip_port};

pub async fn forward_handler(State(state): State<AppState>, req: Request) -> Response {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let host = strip_port(host).to_string();
    let label = host_label(&host).to_string();

    // Liveness probe on the bare hostname; never reaches the correlator
    if host == state.config.hostname || label == state.config.hostname_label() {
        return health(&state);
    }

    let Some(connection) = state.registry.lookup(&label) else {
        return not_found();
    };
    if !connection.is_open() {
        return not_found();
    }

    let id = generate_request_id();
    let method = req.method().as_str().to_string();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let headers = headers_to_map(req.headers());

    let body = match to_bytes(req.into_body(), MAX_BODY_SIZE_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let mut request = TunnelRequest::new(id.clone(), method, path);
    request.headers = headers;
    if !body.is_empty() {
        request.body = Some(encode_body(&body));
    }

    let (responder, outcome) = oneshot::channel();
    state
        .correlator
        .register(id.clone(), responder, state.config.request_timeout);

    if connection.forward(Message::Request(request)).await.is_err() {
        // the channel went down between lookup and dispatch
        state.correlator.discard(&id);
        return not_found();
    }
    debug!(id = %id, subdomain = %label, "request forwarded");

    match outcome.await {
        Ok(RequestOutcome::Completed(response)) => relay_response(response),
        Ok(RequestOutcome::TimedOut) => {
            (StatusCode::GATEWAY_TIMEOUT, "Gateway timeout").into_response()
        }
        // the correlator dropped the responder without an outcome
        Err(_) => StatusCode::BAD_GATEWAY.into_response(),
    }
}

/// Turn a tunneled response back into the caller's HTTP response.
/// Framing headers were scrubbed by the sender; content-length comes from
/// the decoded body's actual byte length.
fn relay_response(response: TunnelResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let body = match response.body_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "client sent undecodable response body");
            return (StatusCode::BAD_GATEWAY, "Bad Gateway: invalid response body")
                .into_response();
        }
    };

    let headers = map_to_headers(&scrub_response_headers(&response.headers));

    let mut reply = Response::new(Body::from(body));
    *reply.status_mut() = status;
    *reply.headers_mut() = headers;
    reply
}

fn health(state: &AppState) -> Response {
    let body = serde_json::json!({
        "status": "ok",
        "activeRelays": state.registry.count(),
        "hostname": state.config.hostname,
    });
    axum::Json(body).into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Relay not found or disconnected").into_response()
}
