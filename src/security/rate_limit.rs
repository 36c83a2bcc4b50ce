//! Fixed-window rate limiting with lockout escalation.
//!
//! Buckets are keyed by `(client, endpoint class)` and live in a sharded
//! [`DashMap`], so the check-and-increment for one key is serialized by its
//! shard lock while unrelated keys proceed in parallel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::security::clock::{Clock, SystemClock};

/// Name of the endpoint class used when no configured class matches.
pub const DEFAULT_ENDPOINT: &str = "default";

/// Longest lockout or manual block honoured. Longer durations are clamped.
pub const MAX_LOCKOUT_SECS: u64 = 365 * 24 * 60 * 60;

/// `now + duration`, clamped so the deadline always exists.
fn lock_deadline(now: Instant, duration: Duration) -> Instant {
    let duration = duration.min(Duration::from_secs(MAX_LOCKOUT_SECS));
    now.checked_add(duration)
        .or_else(|| now.checked_add(Duration::from_secs(24 * 60 * 60)))
        .unwrap_or(now)
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    /// Over the limit for the current window.
    Limited { retry_after: Duration },
    /// Locked out after repeated violations.
    LockedOut { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RateLimitDecision::Allowed { .. } => None,
            RateLimitDecision::Limited { retry_after }
            | RateLimitDecision::LockedOut { retry_after } => Some(*retry_after),
        }
    }
}

/// A limit applied to a class of endpoints.
#[derive(Debug, Clone)]
struct EndpointLimit {
    name: String,
    path_prefix: String,
    method: Option<String>,
    limit: u32,
    window: Duration,
}

impl EndpointLimit {
    fn matches(&self, path: &str, method: &str) -> bool {
        path.starts_with(&self.path_prefix)
            && self
                .method
                .as_deref()
                .map_or(true, |m| m.eq_ignore_ascii_case(method))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    client: String,
    endpoint: String,
}

#[derive(Debug)]
struct Bucket {
    window_start: Instant,
    count: u32,
    violations: u32,
    locked_until: Option<Instant>,
    last_seen: Instant,
}

impl Bucket {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            violations: 0,
            locked_until: None,
            last_seen: now,
        }
    }

    fn reset_window(&mut self, now: Instant) {
        self.window_start = now;
        self.count = 0;
        self.violations = 0;
    }

    fn is_locked(&self, now: Instant) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// Per-client, per-endpoint-class request counter.
pub struct RateLimiter {
    buckets: DashMap<BucketKey, Bucket>,
    /// Clients blocked across all endpoint classes.
    blocked: DashMap<String, Instant>,
    default_limit: EndpointLimit,
    endpoints: Vec<EndpointLimit>,
    lockout: Duration,
    violations_before_lockout: u32,
    idle_retention: Duration,
    enabled: bool,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a limiter reading time from `clock`.
    pub fn with_clock(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let endpoints = config
            .endpoints
            .iter()
            .map(|e| EndpointLimit {
                name: e.name.clone(),
                path_prefix: e.path_prefix.clone(),
                method: e.method.clone(),
                limit: e.requests_per_window,
                window: Duration::from_secs(e.window_secs),
            })
            .collect();

        Self {
            buckets: DashMap::new(),
            blocked: DashMap::new(),
            default_limit: EndpointLimit {
                name: DEFAULT_ENDPOINT.to_string(),
                path_prefix: "/".to_string(),
                method: None,
                limit: config.requests_per_window,
                window: Duration::from_secs(config.window_secs),
            },
            endpoints,
            lockout: Duration::from_secs(config.lockout_secs.clamp(1, MAX_LOCKOUT_SECS)),
            violations_before_lockout: config.violations_before_lockout.max(1),
            idle_retention: Duration::from_secs(config.idle_retention_secs),
            enabled: config.enabled,
            clock,
        }
    }

    /// Endpoint class for a request. First configured match wins.
    pub fn endpoint_for(&self, path: &str, method: &str) -> &str {
        self.endpoints
            .iter()
            .find(|e| e.matches(path, method))
            .map_or(DEFAULT_ENDPOINT, |e| e.name.as_str())
    }

    /// `(limit, window)` for an endpoint class.
    pub fn limit_for(&self, endpoint: &str) -> (u32, Duration) {
        let limit = self
            .endpoints
            .iter()
            .find(|e| e.name == endpoint)
            .unwrap_or(&self.default_limit);
        (limit.limit, limit.window)
    }

    /// Count one request for `client` against `endpoint`.
    pub fn check(&self, client: &str, endpoint: &str) -> RateLimitDecision {
        if !self.enabled {
            return RateLimitDecision::Allowed {
                remaining: u32::MAX,
            };
        }

        let now = self.clock.now();

        // Copy out before touching the map again; holding a shard guard
        // across a remove on the same shard deadlocks.
        let blocked_until = self.blocked.get(client).map(|until| *until);
        if let Some(until) = blocked_until {
            if until > now {
                return RateLimitDecision::LockedOut {
                    retry_after: until.saturating_duration_since(now),
                };
            }
            self.blocked.remove_if(client, |_, until| *until <= now);
        }

        let (limit, window) = self.limit_for(endpoint);
        let key = BucketKey {
            client: client.to_string(),
            endpoint: endpoint.to_string(),
        };

        let mut bucket = self.buckets.entry(key).or_insert_with(|| Bucket::new(now));
        bucket.last_seen = now;

        if let Some(until) = bucket.locked_until {
            if until > now {
                return RateLimitDecision::LockedOut {
                    retry_after: until.saturating_duration_since(now),
                };
            }
            // Lockout served; start over with a clean window.
            bucket.locked_until = None;
            bucket.reset_window(now);
        }

        let elapsed = now.saturating_duration_since(bucket.window_start);
        if elapsed >= window {
            bucket.reset_window(now);
        }

        if bucket.count < limit {
            bucket.count += 1;
            return RateLimitDecision::Allowed {
                remaining: limit - bucket.count,
            };
        }

        bucket.violations += 1;
        if bucket.violations >= self.violations_before_lockout {
            let until = lock_deadline(now, self.lockout);
            bucket.locked_until = Some(until);
            tracing::warn!(
                client = %client,
                endpoint = %endpoint,
                lockout_secs = self.lockout.as_secs(),
                "Client locked out after repeated rate-limit violations"
            );
            RateLimitDecision::LockedOut {
                retry_after: until.saturating_duration_since(now),
            }
        } else {
            let window_left = window.saturating_sub(now.saturating_duration_since(bucket.window_start));
            RateLimitDecision::Limited {
                retry_after: window_left,
            }
        }
    }

    /// Boolean form of [`check`](Self::check).
    pub fn is_request_allowed(&self, client: &str, endpoint: &str) -> bool {
        self.check(client, endpoint).is_allowed()
    }

    /// Deny every request from `client` for `duration`, on all endpoints.
    pub fn block_client(&self, client: &str, duration: Duration) {
        let now = self.clock.now();
        let until = lock_deadline(now, duration);
        self.blocked.insert(client.to_string(), until);
        tracing::warn!(
            client = %client,
            secs = until.saturating_duration_since(now).as_secs(),
            "Client blocked"
        );
    }

    /// Drop buckets idle longer than the retention period.
    ///
    /// Buckets still under lockout are kept regardless of idleness. Returns the
    /// number of buckets removed.
    pub fn evict_idle(&self) -> usize {
        let now = self.clock.now();
        let retention = self.idle_retention;
        let mut evicted = 0;

        self.buckets.retain(|_, bucket| {
            let idle = now.saturating_duration_since(bucket.last_seen) >= retention;
            let keep = !idle || bucket.is_locked(now);
            if !keep {
                evicted += 1;
            }
            keep
        });
        self.blocked.retain(|_, until| *until > now);

        metrics::record_buckets(self.buckets.len());
        if evicted > 0 {
            metrics::record_evicted(evicted);
        }
        evicted
    }

    /// Number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

/// Run [`RateLimiter::evict_idle`] every `every` until shutdown fires.
pub fn spawn_sweeper(
    limiter: Arc<RateLimiter>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = limiter.evict_idle();
                    if evicted > 0 {
                        tracing::debug!(evicted, "Evicted idle rate-limit buckets");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Bucket sweeper stopping");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointLimitConfig;
    use crate::security::clock::ManualClock;

    fn config(limit: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_window: limit,
            window_secs: 60,
            lockout_secs: 900,
            violations_before_lockout: 1,
            idle_retention_secs: 7200,
            ..RateLimitConfig::default()
        }
    }

    fn limiter(limit: u32) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (RateLimiter::with_clock(&config(limit), clock.clone()), clock)
    }

    #[test]
    fn test_admits_up_to_limit() {
        let (limiter, _) = limiter(3);
        for i in 0..3 {
            assert_eq!(
                limiter.check("1.2.3.4", DEFAULT_ENDPOINT),
                RateLimitDecision::Allowed { remaining: 2 - i }
            );
        }
        let denied = limiter.check("1.2.3.4", DEFAULT_ENDPOINT);
        assert_eq!(
            denied,
            RateLimitDecision::LockedOut {
                retry_after: Duration::from_secs(900)
            }
        );
    }

    #[test]
    fn test_keys_are_independent() {
        let (limiter, _) = limiter(1);
        assert!(limiter.is_request_allowed("a", DEFAULT_ENDPOINT));
        assert!(limiter.is_request_allowed("b", DEFAULT_ENDPOINT));
        assert!(limiter.is_request_allowed("a", "auth"));
        assert!(!limiter.is_request_allowed("a", DEFAULT_ENDPOINT));
    }

    #[test]
    fn test_lockout_outlasts_window() {
        let (limiter, clock) = limiter(2);
        assert!(limiter.is_request_allowed("c", DEFAULT_ENDPOINT));
        assert!(limiter.is_request_allowed("c", DEFAULT_ENDPOINT));
        assert!(!limiter.is_request_allowed("c", DEFAULT_ENDPOINT));

        // Next window starts, but the lockout still holds.
        clock.advance(Duration::from_secs(61));
        match limiter.check("c", DEFAULT_ENDPOINT) {
            RateLimitDecision::LockedOut { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(900 - 61));
            }
            other => panic!("expected lockout, got {other:?}"),
        }

        clock.advance(Duration::from_secs(900));
        assert_eq!(
            limiter.check("c", DEFAULT_ENDPOINT),
            RateLimitDecision::Allowed { remaining: 1 }
        );
    }

    #[test]
    fn test_window_resets_without_violation() {
        let (limiter, clock) = limiter(2);
        assert!(limiter.is_request_allowed("d", DEFAULT_ENDPOINT));
        assert!(limiter.is_request_allowed("d", DEFAULT_ENDPOINT));
        clock.advance(Duration::from_secs(60));
        assert!(limiter.is_request_allowed("d", DEFAULT_ENDPOINT));
        assert!(limiter.is_request_allowed("d", DEFAULT_ENDPOINT));
    }

    #[test]
    fn test_limited_before_lockout_threshold() {
        let clock = Arc::new(ManualClock::new());
        let cfg = RateLimitConfig {
            violations_before_lockout: 3,
            ..config(1)
        };
        let limiter = RateLimiter::with_clock(&cfg, clock.clone());
        assert!(limiter.is_request_allowed("e", DEFAULT_ENDPOINT));
        clock.advance(Duration::from_secs(20));
        assert_eq!(
            limiter.check("e", DEFAULT_ENDPOINT),
            RateLimitDecision::Limited {
                retry_after: Duration::from_secs(40)
            }
        );
        assert!(matches!(
            limiter.check("e", DEFAULT_ENDPOINT),
            RateLimitDecision::Limited { .. }
        ));
        assert!(matches!(
            limiter.check("e", DEFAULT_ENDPOINT),
            RateLimitDecision::LockedOut { .. }
        ));
    }

    #[test]
    fn test_endpoint_classes() {
        let cfg = RateLimitConfig {
            endpoints: vec![
                EndpointLimitConfig {
                    name: "auth".into(),
                    path_prefix: "/api/auth/".into(),
                    method: None,
                    requests_per_window: 5,
                    window_secs: 60,
                },
                EndpointLimitConfig {
                    name: "video-session-create".into(),
                    path_prefix: "/api/video-sessions".into(),
                    method: Some("POST".into()),
                    requests_per_window: 20,
                    window_secs: 3600,
                },
            ],
            ..config(60)
        };
        let limiter = RateLimiter::new(&cfg);

        assert_eq!(limiter.endpoint_for("/api/auth/login", "POST"), "auth");
        assert_eq!(
            limiter.endpoint_for("/api/video-sessions", "post"),
            "video-session-create"
        );
        assert_eq!(limiter.endpoint_for("/api/video-sessions", "GET"), DEFAULT_ENDPOINT);
        assert_eq!(limiter.endpoint_for("/api/skills", "GET"), DEFAULT_ENDPOINT);
        assert_eq!(
            limiter.limit_for("video-session-create"),
            (20, Duration::from_secs(3600))
        );
        assert_eq!(limiter.limit_for("unknown"), (60, Duration::from_secs(60)));
    }

    #[test]
    fn test_block_client() {
        let (limiter, clock) = limiter(100);
        limiter.block_client("f", Duration::from_secs(30));
        assert!(!limiter.is_request_allowed("f", DEFAULT_ENDPOINT));
        assert!(!limiter.is_request_allowed("f", "auth"));
        clock.advance(Duration::from_secs(31));
        assert!(limiter.is_request_allowed("f", DEFAULT_ENDPOINT));
    }

    #[test]
    fn test_oversized_lockout_is_clamped() {
        let clock = Arc::new(ManualClock::new());
        let cfg = RateLimitConfig {
            lockout_secs: u64::MAX,
            ..config(1)
        };
        let limiter = RateLimiter::with_clock(&cfg, clock.clone());
        assert!(limiter.is_request_allowed("greedy", DEFAULT_ENDPOINT));
        assert_eq!(
            limiter.check("greedy", DEFAULT_ENDPOINT),
            RateLimitDecision::LockedOut {
                retry_after: Duration::from_secs(MAX_LOCKOUT_SECS)
            }
        );
        clock.advance(Duration::from_secs(MAX_LOCKOUT_SECS - 1));
        assert!(!limiter.is_request_allowed("greedy", DEFAULT_ENDPOINT));

        limiter.block_client("blocked", Duration::MAX);
        assert!(!limiter.is_request_allowed("blocked", DEFAULT_ENDPOINT));
    }

    #[test]
    fn test_evict_idle_keeps_locked() {
        let clock = Arc::new(ManualClock::new());
        let cfg = RateLimitConfig {
            lockout_secs: 10_000,
            ..config(1)
        };
        let limiter = RateLimiter::with_clock(&cfg, clock.clone());
        assert!(limiter.is_request_allowed("idle", DEFAULT_ENDPOINT));
        assert!(limiter.is_request_allowed("locked", DEFAULT_ENDPOINT));
        assert!(!limiter.is_request_allowed("locked", DEFAULT_ENDPOINT));
        assert_eq!(limiter.bucket_count(), 2);

        clock.advance(Duration::from_secs(10));
        assert_eq!(limiter.evict_idle(), 0);

        // Both idle past retention; only the unlocked one goes.
        clock.advance(Duration::from_secs(7200));
        assert_eq!(limiter.evict_idle(), 1);
        assert_eq!(limiter.bucket_count(), 1);

        clock.advance(Duration::from_secs(10_000));
        assert_eq!(limiter.evict_idle(), 1);
        assert_eq!(limiter.bucket_count(), 0);
    }

    #[test]
    fn test_concurrent_admits_exactly_limit() {
        let limiter = Arc::new(RateLimiter::new(&config(50)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .filter(|_| limiter.is_request_allowed("shared", DEFAULT_ENDPOINT))
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }

    #[test]
    fn test_disabled_always_allows() {
        let cfg = RateLimitConfig {
            enabled: false,
            ..config(1)
        };
        let limiter = RateLimiter::new(&cfg);
        for _ in 0..10 {
            assert!(limiter.is_request_allowed("g", DEFAULT_ENDPOINT));
        }
        assert_eq!(limiter.bucket_count(), 0);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let limiter = Arc::new(RateLimiter::new(&config(1)));
        let (tx, rx) = broadcast::channel(1);
        let handle = spawn_sweeper(limiter, Duration::from_millis(10), rx);
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
