//! Shared utilities for integration tests.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use request_shield::audit::MemorySink;
use request_shield::{ShieldConfig, ShieldServer};

/// A small application standing in for the protected service.
pub fn demo_app() -> Router {
    Router::new()
        .route("/api/health", get(|| async { "ok" }))
        .route("/api/skills", get(|| async { "skills" }))
        .route("/api/users/{id}", get(|| async { "user" }))
        .route(
            "/api/messages",
            post(|body: String| async move { format!("received {} bytes", body.len()) }),
        )
        .fallback(|| async { (StatusCode::OK, "fallback") })
}

/// Build a guarded router recording audit events in memory.
pub fn shield(config: ShieldConfig) -> (ShieldServer, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let server = ShieldServer::new(config, demo_app(), sink.clone()).unwrap();
    (server, sink)
}

/// A browser-like GET from a fixed client address.
pub fn browser_get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("user-agent", "Mozilla/5.0")
        .header("x-forwarded-for", "192.168.1.100")
        .body(Body::empty())
        .unwrap()
}

/// Read a response body as text.
pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Read a JSON response body.
#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}
