//! Metrics collection.
//!
//! Recorded through the `metrics` facade; the embedding application installs
//! whichever recorder/exporter it uses.
//!
//! # Metrics
//! - `shield_verdicts_total` (counter): interceptor decisions by status, kind
//! - `shield_rate_limited_total` (counter): rate-limit denials by endpoint class
//! - `shield_rate_limit_buckets` (gauge): live rate-limit buckets
//! - `shield_buckets_evicted_total` (counter): idle buckets removed by the sweeper
//! - `shield_audit_sink_failures_total` (counter): events the audit sink rejected

use metrics::{counter, gauge};

use crate::audit::ViolationKind;

pub fn record_verdict(status: u16, kind: Option<ViolationKind>) {
    let kind = kind.map_or("none", |k| k.as_str());
    counter!("shield_verdicts_total", "status" => status.to_string(), "kind" => kind).increment(1);
}

pub fn record_rate_limited(endpoint: &str) {
    counter!("shield_rate_limited_total", "endpoint" => endpoint.to_string()).increment(1);
}

pub fn record_buckets(count: usize) {
    gauge!("shield_rate_limit_buckets").set(count as f64);
}

pub fn record_evicted(count: usize) {
    counter!("shield_buckets_evicted_total").increment(count as u64);
}

pub fn record_audit_sink_failure() {
    counter!("shield_audit_sink_failures_total").increment(1);
}
