// ABOUTME: Redis-backed fixed-window rate limiting for authentication attempts
// ABOUTME: Disabled state is a distinct enum variant with no store handle and no per-call overhead
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Rate Limiter Adapter
//!
//! Wraps a distributed Redis counter to throttle authentication endpoint
//! calls per client key. Leaving the connection string empty disables rate
//! limiting entirely: the [`RateLimiter::Disabled`] variant holds no
//! connection and `allow` returns immediately. A *malformed* connection
//! string, by contrast, is a startup-fatal configuration error —
//! "disabled by absence" and "broken" must never be conflated.

use crate::config::RateLimitConfig;
use crate::errors::{AuthError, AuthResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    /// Whether the call may proceed
    pub allowed: bool,
    /// Suggested wait before retrying, when the window TTL is known
    pub retry_after: Option<Duration>,
}

impl Decision {
    /// A permit with no restriction
    #[must_use]
    pub const fn permit() -> Self {
        Self {
            allowed: true,
            retry_after: None,
        }
    }
}

/// Distributed rate limiter with an explicit disabled state
pub enum RateLimiter {
    /// Rate limiting not configured; every call is allowed with no store I/O
    Disabled,
    /// Redis-backed fixed-window counter
    Redis(RedisRateLimiter),
}

impl RateLimiter {
    /// Build a limiter from configuration.
    ///
    /// An empty connection string yields [`RateLimiter::Disabled`]; this is a
    /// supported configuration state, not an error.
    ///
    /// # Errors
    /// Returns [`AuthError::Config`] on a malformed connection string or a
    /// zero quota/window, and [`AuthError::RateLimiter`] when the initial
    /// connection cannot be established.
    pub async fn connect(config: &RateLimitConfig) -> AuthResult<Self> {
        if config.connection_string.is_empty() {
            info!("rate limiting disabled: no connection string configured");
            return Ok(Self::Disabled);
        }
        RedisRateLimiter::connect(config).await.map(Self::Redis)
    }

    /// Check whether a call keyed by `key` may proceed.
    ///
    /// # Errors
    /// Returns [`AuthError::RateLimiter`] on store failure (never returned
    /// from the disabled variant).
    pub async fn allow(&self, key: &str) -> AuthResult<Decision> {
        match self {
            Self::Disabled => Ok(Decision::permit()),
            Self::Redis(limiter) => limiter.allow(key).await,
        }
    }

    /// Whether rate limiting is active
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Redis(_))
    }
}

/// Fixed-window counter against Redis
pub struct RedisRateLimiter {
    manager: ConnectionManager,
    key_prefix: String,
    quota: u64,
    interval: Duration,
}

impl RedisRateLimiter {
    async fn connect(config: &RateLimitConfig) -> AuthResult<Self> {
        if config.quota == 0 || config.interval.is_zero() {
            return Err(AuthError::Config(format!(
                "rate limit quota ({}) and interval ({:?}) must be non-zero",
                config.quota, config.interval
            )));
        }

        let client = redis::Client::open(config.connection_string.as_str()).map_err(|e| {
            AuthError::Config(format!("malformed redis connection string: {e}"))
        })?;

        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| AuthError::RateLimiter(format!("redis connection failed: {e}")))?;

        info!(
            prefix = %config.key_prefix,
            quota = config.quota,
            interval_secs = config.interval.as_secs(),
            "rate limiting enabled"
        );

        Ok(Self {
            manager,
            key_prefix: config.key_prefix.clone(),
            quota: config.quota,
            interval: config.interval,
        })
    }

    fn bucket_key(&self, key: &str) -> String {
        format!("{}:ratelimit:{}", self.key_prefix, key)
    }

    /// Increment the window counter and decide.
    ///
    /// INCR is atomic at the store, so concurrent callers cannot undercount;
    /// the first increment of a window attaches the TTL. The bucket expires
    /// with its window, nothing is cleaned up manually.
    async fn allow(&self, key: &str) -> AuthResult<Decision> {
        let bucket = self.bucket_key(key);
        let mut conn = self.manager.clone();

        let count: u64 = conn
            .incr(&bucket, 1u64)
            .await
            .map_err(|e| AuthError::RateLimiter(format!("INCR failed: {e}")))?;

        if count == 1 {
            let ttl_secs = i64::try_from(self.interval.as_secs()).unwrap_or(i64::MAX);
            let _: () = conn
                .expire(&bucket, ttl_secs)
                .await
                .map_err(|e| AuthError::RateLimiter(format!("EXPIRE failed: {e}")))?;
        }

        if count > self.quota {
            let ttl: i64 = conn
                .ttl(&bucket)
                .await
                .map_err(|e| AuthError::RateLimiter(format!("TTL failed: {e}")))?;
            // -2: key gone, -1: no expiry attached; either way no hint
            let retry_after = u64::try_from(ttl).ok().map(Duration::from_secs);
            return Ok(Decision {
                allowed: false,
                retry_after,
            });
        }

        Ok(Decision::permit())
    }
}
