//! Translation from axum requests to [`RequestDescriptor`].

use std::net::SocketAddr;

use axum::http::{header, request::Parts, HeaderMap};

use crate::security::request::{parse_urlencoded, RequestDescriptor};

/// Header carrying the correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Whether the body is an urlencoded form that should be inspected.
pub fn is_urlencoded_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| {
            mime.trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}

/// Build a descriptor from request parts, the peer address and, for
/// urlencoded forms, the buffered body.
pub fn describe(parts: &Parts, remote: Option<SocketAddr>, form_body: Option<&[u8]>) -> RequestDescriptor {
    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path(), |pq| pq.as_str());

    let mut descriptor = RequestDescriptor::new(parts.method.clone(), path_and_query);
    descriptor.headers = parts.headers.clone();
    descriptor.remote_addr = remote.map(|addr| addr.ip());
    descriptor.request_id = parts
        .headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(body) = form_body {
        descriptor.form_params = parse_urlencoded(&String::from_utf8_lossy(body));
    }
    descriptor
}
