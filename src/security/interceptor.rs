//! The per-request security decision.
//!
//! One pass per request: exclusions, client resolution, rate limit, threat
//! classification, header observation, sensitive resource auditing. Rate
//! limit and threat outcomes deny; internal faults allow.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::http::StatusCode;
use thiserror::Error;

use crate::audit::{AuditLogger, AuditSink, Details, ViolationKind};
use crate::config::ShieldConfig;
use crate::observability::metrics;
use crate::security::classifier::PolicyError;
use crate::security::policy::ThreatPolicy;
use crate::security::rate_limit::RateLimiter;
use crate::security::request::RequestDescriptor;
use crate::security::resolver::{ClientResolver, HeaderClientResolver, ResolveError};

/// Outcome of [`SecurityInterceptor::intercept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    allowed: bool,
    status: StatusCode,
    kind: Option<ViolationKind>,
    retry_after: Option<Duration>,
}

impl Verdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            status: StatusCode::OK,
            kind: None,
            retry_after: None,
        }
    }

    pub fn deny(status: StatusCode, kind: ViolationKind) -> Self {
        Self {
            allowed: false,
            status,
            kind: Some(kind),
            retry_after: None,
        }
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::deny(StatusCode::TOO_MANY_REQUESTS, ViolationKind::RateLimitExceeded)
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn kind(&self) -> Option<ViolationKind> {
        self.kind
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Client-facing message. Never includes the offending input.
    pub fn public_message(&self) -> &'static str {
        match self.kind {
            None => "OK",
            Some(ViolationKind::RateLimitExceeded) => "Too many requests. Please try again later.",
            Some(ViolationKind::InjectionAttempt) => "Invalid request parameters",
            Some(ViolationKind::PathTraversal) => "Invalid request path",
            Some(ViolationKind::SuspiciousUserAgent) => "Access denied",
            Some(_) => "Request rejected",
        }
    }
}

#[derive(Debug, Error)]
enum InterceptError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Applies the security pipeline to each request.
pub struct SecurityInterceptor {
    policy: ArcSwap<ThreatPolicy>,
    limiter: Arc<RateLimiter>,
    audit: Arc<AuditLogger>,
    resolver: Arc<dyn ClientResolver>,
}

impl SecurityInterceptor {
    pub fn new(
        policy: ThreatPolicy,
        limiter: Arc<RateLimiter>,
        audit: Arc<AuditLogger>,
        resolver: Arc<dyn ClientResolver>,
    ) -> Self {
        Self {
            policy: ArcSwap::from_pointee(policy),
            limiter,
            audit,
            resolver,
        }
    }

    /// Wire up the default resolver, limiter and audit logger from config.
    pub fn from_config(config: &ShieldConfig, sink: Arc<dyn AuditSink>) -> Result<Self, PolicyError> {
        let policy = ThreatPolicy::compile(config)?;
        let resolver: Arc<dyn ClientResolver> = Arc::new(HeaderClientResolver::new(
            config.interceptor.client_ip_headers.clone(),
        ));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let audit = Arc::new(AuditLogger::new(sink, resolver.clone()));
        Ok(Self::new(policy, limiter, audit, resolver))
    }

    /// Decide whether `request` may proceed.
    pub fn intercept(&self, request: &RequestDescriptor) -> Verdict {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.evaluate(request)));

        let verdict = match outcome {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                tracing::error!(error = %e, path = %request.path, "Security check failed, allowing request");
                self.audit
                    .log_internal_fault("interceptor", &e.to_string(), Some(request));
                Verdict::allow()
            }
            Err(_) => {
                tracing::error!(path = %request.path, "Security check panicked, allowing request");
                self.audit
                    .log_internal_fault("interceptor", "panic during evaluation", Some(request));
                Verdict::allow()
            }
        };

        metrics::record_verdict(verdict.status().as_u16(), verdict.kind());
        verdict
    }

    fn evaluate(&self, request: &RequestDescriptor) -> Result<Verdict, InterceptError> {
        let policy = self.policy.load();
        if !policy.enabled || policy.is_excluded(request) {
            return Ok(Verdict::allow());
        }

        let client = self.resolver.resolve(request)?;

        let endpoint = self.limiter.endpoint_for(&request.path, request.method.as_str());
        let decision = self.limiter.check(&client, endpoint);
        if !decision.is_allowed() {
            let (limit, window) = self.limiter.limit_for(endpoint);
            tracing::warn!(client = %client, endpoint, "Rate limit exceeded");
            metrics::record_rate_limited(endpoint);
            self.audit
                .log_rate_limit_exceeded(endpoint, &client, limit, window.as_secs());
            return Ok(Verdict::rate_limited(decision.retry_after()));
        }

        if let Some(threat) = policy.classifiers.first_threat(request) {
            tracing::warn!(
                client = %client,
                kind = %threat.kind,
                status = threat.status.as_u16(),
                "Request denied"
            );
            match threat.kind {
                ViolationKind::SuspiciousUserAgent => self.audit.log_suspicious_activity(
                    threat.kind,
                    &threat.message,
                    &client,
                    request,
                    threat.details,
                ),
                _ => self.audit.log_security_violation(
                    threat.kind,
                    &threat.message,
                    request,
                    threat.details,
                ),
            }
            return Ok(Verdict::deny(threat.status, threat.kind));
        }

        if let Some(reason) = policy.headers.inspect(request) {
            self.audit.log_suspicious_activity(
                ViolationKind::SuspiciousHeaders,
                &reason,
                &client,
                request,
                Details::new(),
            );
        }

        if let Some(access) = policy.sensitive.classify(&request.decoded_path()) {
            self.audit.log_sensitive_data_access(
                &access.category,
                request.method.as_str(),
                access.resource_id,
                &client,
            );
        }

        Ok(Verdict::allow())
    }

    /// Swap in a policy compiled from `config`. The old one stays on error.
    pub fn reload_policy(&self, config: &ShieldConfig) -> Result<(), PolicyError> {
        let policy = ThreatPolicy::compile(config)?;
        self.policy.store(Arc::new(policy));
        tracing::info!("Threat policy reloaded");
        Ok(())
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }
}
