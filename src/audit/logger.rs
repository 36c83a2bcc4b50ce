//! Audit logger: builds, chains and emits security events.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::audit::chain::AuditChain;
use crate::audit::event::{AuditChannel, Details, EventDraft, ViolationKind};
use crate::audit::sink::{AuditSink, SinkError};
use crate::observability::metrics;
use crate::security::request::RequestDescriptor;
use crate::security::resolver::{ClientResolver, HeaderClientResolver};

/// Client identity recorded when none can be resolved.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Records security events on the audit channels.
///
/// Logging never fails from the caller's point of view. Sink errors and
/// sink panics are reported through `tracing` and counted, then dropped.
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    resolver: Arc<dyn ClientResolver>,
    chain: Mutex<AuditChain>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>, resolver: Arc<dyn ClientResolver>) -> Self {
        Self {
            sink,
            resolver,
            chain: Mutex::new(AuditChain::new()),
        }
    }

    /// Logger that resolves clients from the usual forwarding headers.
    pub fn with_sink(sink: Arc<dyn AuditSink>) -> Self {
        Self::new(sink, Arc::new(HeaderClientResolver::default()))
    }

    /// A request was rejected as an attack.
    pub fn log_security_violation(
        &self,
        kind: ViolationKind,
        message: &str,
        request: &RequestDescriptor,
        details: Details,
    ) {
        let client = self.client_ip_address(request);
        let draft = request_draft(kind, AuditChannel::Violation, message, &client, request)
            .details(with_user_agent(details, request));
        self.record(draft);
    }

    /// Something looked off about a request from `client`.
    pub fn log_suspicious_activity(
        &self,
        kind: ViolationKind,
        message: &str,
        client: &str,
        request: &RequestDescriptor,
        details: Details,
    ) {
        let draft = request_draft(kind, AuditChannel::Suspicious, message, client, request)
            .details(with_user_agent(details, request));
        self.record(draft);
    }

    /// `client` went over `limit` requests per `window_secs` on `endpoint`.
    pub fn log_rate_limit_exceeded(
        &self,
        endpoint: &str,
        client: &str,
        limit: u32,
        window_secs: u64,
    ) {
        let mut details = Details::new();
        details.insert("endpoint".into(), endpoint.to_string());
        details.insert("limit".into(), limit.to_string());
        details.insert("windowSecs".into(), window_secs.to_string());

        let message = format!("Rate limit of {limit} requests per {window_secs}s exceeded");
        let draft = EventDraft::new(
            ViolationKind::RateLimitExceeded,
            AuditChannel::RateLimit,
            &message,
            client,
        )
        .details(details);
        self.record(draft);
    }

    /// A sensitive resource was accessed.
    pub fn log_sensitive_data_access(
        &self,
        category: &str,
        method: &str,
        resource_id: Option<u64>,
        client: &str,
    ) {
        let mut details = Details::new();
        details.insert("category".into(), category.to_string());

        let message = format!("Access to {category}");
        let draft = EventDraft::new(
            ViolationKind::SensitiveDataAccess,
            AuditChannel::DataAccess,
            &message,
            client,
        )
        .method(method)
        .resource_id(resource_id)
        .details(details);
        self.record(draft);
    }

    /// The interceptor hit an internal error and let the request through.
    ///
    /// The client is taken from the peer address only, because the resolver
    /// may be what failed.
    pub fn log_internal_fault(
        &self,
        component: &str,
        error: &str,
        request: Option<&RequestDescriptor>,
    ) {
        let client = request
            .and_then(|r| r.remote_addr)
            .map_or_else(|| UNKNOWN_CLIENT.to_string(), |addr| addr.to_string());

        let mut details = Details::new();
        details.insert("component".into(), component.to_string());
        details.insert("error".into(), error.to_string());

        let message = format!("Security check failed open in {component}");
        let mut draft = EventDraft::new(
            ViolationKind::InternalFault,
            AuditChannel::Fault,
            &message,
            &client,
        );
        if let Some(request) = request {
            draft = draft
                .method(request.method.as_str())
                .uri(&request.uri())
                .request_id(request.request_id.as_deref());
        }
        self.record(draft.details(details));
    }

    /// Best-effort client address for a request, `"unknown"` if none.
    pub fn client_ip_address(&self, request: &RequestDescriptor) -> String {
        self.resolver
            .resolve(request)
            .unwrap_or_else(|_| UNKNOWN_CLIENT.to_string())
    }

    fn record(&self, draft: EventDraft) {
        // Sealing and emitting under one lock keeps sink order equal to chain order.
        let mut chain = self.chain.lock().unwrap_or_else(|e| e.into_inner());
        let event = chain.seal(draft);
        let emitted = panic::catch_unwind(AssertUnwindSafe(|| self.sink.emit(&event)))
            .unwrap_or_else(|_| Err(SinkError::Unavailable("sink panicked".into())));
        if let Err(e) = emitted {
            tracing::warn!(
                error = %e,
                kind = %event.kind(),
                sequence = event.sequence(),
                "Audit sink rejected event"
            );
            metrics::record_audit_sink_failure();
        }
    }
}

fn request_draft(
    kind: ViolationKind,
    channel: AuditChannel,
    message: &str,
    client: &str,
    request: &RequestDescriptor,
) -> EventDraft {
    EventDraft::new(kind, channel, message, client)
        .method(request.method.as_str())
        .uri(&request.uri())
        .request_id(request.request_id.as_deref())
}

fn with_user_agent(mut details: Details, request: &RequestDescriptor) -> Details {
    if let Some(ua) = request.user_agent() {
        details.entry("userAgent".into()).or_insert_with(|| ua.to_string());
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::chain::verify_chain;
    use crate::audit::sink::{MemorySink, SinkError};
    use crate::audit::event::SecurityEvent;
    use axum::http::Method;

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn emit(&self, _event: &SecurityEvent) -> Result<(), SinkError> {
            Err(SinkError::Unavailable("disk full".into()))
        }
    }

    fn logger() -> (AuditLogger, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (AuditLogger::with_sink(sink.clone()), sink)
    }

    #[test]
    fn test_violation_event_fields() {
        let (logger, sink) = logger();
        let request = RequestDescriptor::new(Method::GET, "/api/search?q=%3Cscript%3E")
            .with_header("X-Forwarded-For", "203.0.113.5")
            .with_header("User-Agent", "Mozilla/5.0");

        logger.log_security_violation(
            ViolationKind::InjectionAttempt,
            "Potential injection attack detected",
            &request,
            Details::new(),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.kind(), ViolationKind::InjectionAttempt);
        assert_eq!(event.channel(), AuditChannel::Violation);
        assert_eq!(event.client(), "203.0.113.5");
        assert_eq!(event.method(), Some("GET"));
        assert_eq!(event.uri(), Some("/api/search?q=%3Cscript%3E"));
        assert_eq!(event.detail("userAgent"), Some("Mozilla/5.0"));
    }

    #[test]
    fn test_rate_limit_event() {
        let (logger, sink) = logger();
        logger.log_rate_limit_exceeded("auth", "10.1.1.1", 5, 60);
        let event = &sink.events()[0];
        assert_eq!(event.kind(), ViolationKind::RateLimitExceeded);
        assert_eq!(event.channel(), AuditChannel::RateLimit);
        assert_eq!(event.detail("endpoint"), Some("auth"));
        assert_eq!(event.detail("limit"), Some("5"));
        assert_eq!(event.detail("windowSecs"), Some("60"));
    }

    #[test]
    fn test_sensitive_access_event() {
        let (logger, sink) = logger();
        logger.log_sensitive_data_access("USER_DATA", "GET", Some(123), "10.1.1.2");
        let event = &sink.events()[0];
        assert_eq!(event.kind(), ViolationKind::SensitiveDataAccess);
        assert_eq!(event.resource_id(), Some(123));
        assert_eq!(event.detail("category"), Some("USER_DATA"));
    }

    #[test]
    fn test_unknown_client() {
        let (logger, _) = logger();
        let request = RequestDescriptor::new(Method::GET, "/");
        assert_eq!(logger.client_ip_address(&request), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_events_are_chained() {
        let (logger, sink) = logger();
        logger.log_rate_limit_exceeded("default", "a", 60, 60);
        logger.log_sensitive_data_access("MESSAGE_DATA", "GET", None, "a");
        logger.log_internal_fault("resolver", "boom", None);
        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert!(verify_chain(&events).is_ok());
    }

    struct PanickingSink;

    impl AuditSink for PanickingSink {
        fn emit(&self, _event: &SecurityEvent) -> Result<(), SinkError> {
            panic!("sink bug")
        }
    }

    #[test]
    fn test_sink_panic_is_contained() {
        let logger = AuditLogger::with_sink(Arc::new(PanickingSink));
        logger.log_internal_fault("interceptor", "boom", None);
        logger.log_rate_limit_exceeded("default", "a", 60, 60);
    }

    #[test]
    fn test_concurrent_emits_follow_chain_order() {
        let (logger, sink) = logger();
        let logger = Arc::new(logger);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let logger = logger.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        logger.log_rate_limit_exceeded("default", &format!("10.0.0.{i}"), 60, 60);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let events = sink.events();
        assert_eq!(events.len(), 200);
        assert!(verify_chain(&events).is_ok());
    }

    #[test]
    fn test_sink_failure_is_swallowed() {
        let logger = AuditLogger::with_sink(Arc::new(FailingSink));
        logger.log_rate_limit_exceeded("default", "a", 60, 60);
        logger.log_internal_fault("interceptor", "boom", None);
    }
}
