//! Security interceptor middleware.
//! Runs every request through the interceptor before it reaches the app.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::http::request::{describe, is_urlencoded_form};
use crate::security::interceptor::{SecurityInterceptor, Verdict};

/// State handed to [`shield_middleware`].
#[derive(Clone)]
pub struct ShieldState {
    pub interceptor: Arc<SecurityInterceptor>,
    pub max_form_bytes: usize,
}

pub async fn shield_middleware(
    State(state): State<ShieldState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = request.into_parts();

    // Forms are buffered so their fields can be inspected, then handed on.
    let (descriptor, body) = if is_urlencoded_form(&parts.headers) {
        match axum::body::to_bytes(body, state.max_form_bytes).await {
            Ok(bytes) => (describe(&parts, remote, Some(&bytes[..])), Body::from(bytes)),
            Err(e) => {
                tracing::warn!(error = %e, path = %parts.uri.path(), "Form body rejected");
                return error_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
            }
        }
    } else {
        (describe(&parts, remote, None), body)
    };

    let verdict = state.interceptor.intercept(&descriptor);
    if verdict.is_allowed() {
        next.run(Request::from_parts(parts, body)).await
    } else {
        denial_response(&verdict)
    }
}

/// JSON error body for a denied request, with `Retry-After` when known.
pub fn denial_response(verdict: &Verdict) -> Response {
    let mut response = error_response(verdict.status(), verdict.public_message());
    if let Some(retry_after) = verdict.retry_after() {
        let secs = retry_after.as_secs().max(1);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
