//! # Per-Gate Rate Limiting
//!
//! Fixed-window request budget keyed by the `X-Gate-Id` header. Bounds how
//! fast a single gate terminal can present credentials.
//!
//! The header is client-supplied, so the number of tracked gates is capped.
//! When the table is full, gates whose window has ended are evicted; if it
//! is still full, an unseen gate id is charged to the shared `anonymous`
//! bucket instead of getting a fresh budget.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::Mutex;

use crate::error::{ErrorBody, ErrorDetail};

/// Header naming the calling gate terminal.
pub const GATE_ID_HEADER: &str = "x-gate-id";

/// Bucket shared by callers without a gate id, and by overflow.
pub const ANONYMOUS_GATE: &str = "anonymous";

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u64,
    /// Window duration in seconds.
    pub window_secs: u64,
    /// Most gate ids tracked at once.
    pub max_gates: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 600,
            window_secs: 60,
            max_gates: 1_024,
        }
    }
}

#[derive(Debug, Clone)]
struct BucketState {
    count: u64,
    window_start: Instant,
}

/// Shared rate limiter state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Arc<Mutex<HashMap<String, BucketState>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Gate ids currently tracked.
    pub fn tracked(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Count one request against `key`; `false` when the budget is spent.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let window = Duration::from_secs(self.config.window_secs);
        let mut buckets = self.buckets.lock();

        let mut key = key;
        if !buckets.contains_key(key) && buckets.len() >= self.config.max_gates {
            buckets.retain(|_, b| now.saturating_duration_since(b.window_start) < window);
            if buckets.len() >= self.config.max_gates {
                key = ANONYMOUS_GATE;
            }
        }

        let bucket = buckets.entry(key.to_string()).or_insert(BucketState {
            count: 0,
            window_start: now,
        });

        if now.saturating_duration_since(bucket.window_start) >= window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        if bucket.count >= self.config.max_requests {
            false
        } else {
            bucket.count += 1;
            true
        }
    }
}

/// Middleware that enforces per-gate rate limits.
///
/// Requests without an `X-Gate-Id` header share the `"anonymous"` bucket.
pub async fn rate_limit_middleware(request: Request, next: Next) -> Response {
    let limiter = request.extensions().get::<RateLimiter>().cloned();

    if let Some(limiter) = limiter {
        let key = request
            .headers()
            .get(GATE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(ANONYMOUS_GATE)
            .to_string();

        if !limiter.check(&key) {
            tracing::warn!(gate_id = %key, "rate limit exceeded");
            let body = ErrorBody {
                error: ErrorDetail {
                    code: "RATE_LIMITED".to_string(),
                    message: "rate limit exceeded".to_string(),
                    details: None,
                },
            };
            return (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        }
    }

    next.run(request).await
}
