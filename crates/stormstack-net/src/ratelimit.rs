//! Per-principal fixed-window rate limiting.
//!
//! Defaults: 1000 generic requests/min and 100 commands/s per container.
//! Every verdict carries the `X-RateLimit-Limit` / `-Remaining` / `-Reset`
//! header values; an exhausted window rejects with `Backpressure`-class
//! 429 semantics at the HTTP layer.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// `X-RateLimit-Limit` header name.
pub static LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// `X-RateLimit-Remaining` header name.
pub static REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// `X-RateLimit-Reset` header name.
pub static RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitVerdict {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Window limit.
    pub limit: u32,
    /// Requests remaining in the window.
    pub remaining: u32,
    /// Seconds until the window resets.
    pub reset_secs: u64,
}

impl RateLimitVerdict {
    /// The standard rate-limit response headers.
    #[must_use]
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.limit.to_string()) {
            headers.insert(LIMIT_HEADER.clone(), value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.remaining.to_string()) {
            headers.insert(REMAINING_HEADER.clone(), value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.reset_secs.to_string()) {
            headers.insert(RESET_HEADER.clone(), value);
        }
        headers
    }
}

/// Fixed-window limiter keyed by principal (and optionally target).
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    /// Create a limiter allowing `limit` requests per `window`.
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            windows: DashMap::new(),
        }
    }

    /// The generic per-principal limiter: 1000 requests/minute.
    #[must_use]
    pub fn generic() -> Self {
        Self::new(1_000, Duration::from_secs(60))
    }

    /// The command limiter: 100 commands/second per container.
    #[must_use]
    pub fn commands() -> Self {
        Self::new(100, Duration::from_secs(1))
    }

    /// Account one request against a key and return the verdict.
    pub fn check(&self, key: &str) -> RateLimitVerdict {
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| Window {
                started: Instant::now(),
                count: 0,
            });

        if entry.started.elapsed() >= self.window {
            entry.started = Instant::now();
            entry.count = 0;
        }

        let allowed = entry.count < self.limit;
        if allowed {
            entry.count += 1;
        }
        let remaining = self.limit.saturating_sub(entry.count);
        let reset_secs = self
            .window
            .saturating_sub(entry.started.elapsed())
            .as_secs()
            .max(1);

        RateLimitVerdict {
            allowed,
            limit: self.limit,
            remaining,
            reset_secs,
        }
    }
}
