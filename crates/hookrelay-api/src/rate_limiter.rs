//! Per-IP request rate limiting for the webhook ingress path.
//!
//! Mirrors the in-memory/trait-based shape used throughout this crate's
//! sibling `hookrelay-core` stores ([`RwLock<HashMap<...>>`](std::sync::RwLock)
//! guarding per-key state): a trait so the limiting strategy can be swapped
//! for a shared backend later, and a sliding-window implementation that is
//! the only one needed for a single-process deployment.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Decision returned by a rate limiter for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allow,
    Throttle { retry_after_seconds: u64 },
}

/// Interface for request-admission rate limiting, keyed by remote IP.
///
/// Implementations must be safe to share across the Axum worker threads
/// that call them concurrently for every inbound webhook request.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, key: IpAddr) -> RateLimitDecision;
}

/// Sliding-window limiter: admits at most `limit` requests per `window` for
/// each IP, tracked as a timestamp deque pruned on every check. Local,
/// in-process state only — fine for a single replica, and the trait
/// boundary above is what a future shared-bucket (e.g. Redis-backed)
/// implementation would replace.
pub struct SlidingWindowRateLimiter {
    limit: u32,
    window: Duration,
    buckets: RwLock<HashMap<IpAddr, VecDeque<Instant>>>,
}

impl SlidingWindowRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Construct from the service's `ip_rate_limit` (requests per minute)
    /// setting, using a 60-second window.
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowRateLimiter {
    async fn check(&self, key: IpAddr) -> RateLimitDecision {
        let now = Instant::now();
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        let entry = buckets.entry(key).or_default();

        while let Some(oldest) = entry.front() {
            if now.duration_since(*oldest) > self.window {
                entry.pop_front();
            } else {
                break;
            }
        }

        if entry.len() >= self.limit as usize {
            let retry_after = entry
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            return RateLimitDecision::Throttle {
                retry_after_seconds: retry_after.as_secs().max(1),
            };
        }

        entry.push_back(now);
        RateLimitDecision::Allow
    }
}

/// A limiter that admits every request; used when
/// [`SecurityConfig::enable_ip_rate_limiting`](crate::config::SecurityConfig::enable_ip_rate_limiting)
/// is `false`.
pub struct NoopRateLimiter;

#[async_trait]
impl RateLimiter for NoopRateLimiter {
    async fn check(&self, _key: IpAddr) -> RateLimitDecision {
        RateLimitDecision::Allow
    }
}

#[cfg(test)]
#[path = "rate_limiter_tests.rs"]
mod tests;
