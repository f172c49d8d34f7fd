// ABOUTME: Unified error taxonomy for authentication, key management, and rate limiting
// ABOUTME: Maps internal error kinds to opaque HTTP-facing classifications
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Unified Error Handling
//!
//! Central error type for the user-administration authentication core.
//! Startup errors ([`AuthError::Config`]) abort initialization; request-scoped
//! errors are classified into an opaque response shape so that callers cannot
//! distinguish *why* a token was rejected (no oracle for attackers probing
//! expired vs. unknown-key vs. malformed tokens).

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for convenience
pub type AuthResult<T> = Result<T, AuthError>;

/// Error type covering the whole authentication subsystem
#[derive(Debug, Error)]
pub enum AuthError {
    /// Fatal at startup: malformed pattern, unreadable key directory,
    /// invalid explicitly-configured fallback key, bad rate-limit settings
    #[error("configuration error: {0}")]
    Config(String),

    /// Token could not be signed with the active key
    #[error("token signing failed: {0}")]
    Signing(String),

    /// Token carries a key id with no matching registry or fallback entry
    #[error("no verification key for key id {kid}")]
    UnknownKey {
        /// Key id extracted from the token header
        kid: u32,
    },

    /// Token validity window has passed
    #[error("token expired at {expired_at}")]
    ExpiredToken {
        /// When the token expired
        expired_at: DateTime<Utc>,
    },

    /// Token is not a structurally valid JWT or is missing required claims
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// Token parses but its signature does not verify
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Login credentials did not match a known user
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Session/token cap reached and eviction itself failed
    #[error("session or token limit exceeded")]
    LimitExceeded,

    /// Backing store unavailable or misbehaving; retryable by the caller
    #[error("store error: {0}")]
    Store(String),

    /// Rate-limit backing store unavailable; retryable by the caller
    #[error("rate limiter error: {0}")]
    RateLimiter(String),

    /// Authentication attempt throttled
    #[error("too many requests")]
    TooManyRequests {
        /// Suggested wait before retrying, when the store can provide it
        retry_after: Option<Duration>,
    },

    /// Tenant verification returned inactive or failed outright
    #[error("tenant verification failed: {0}")]
    TenantVerification(String),

    /// Caller-supplied deadline elapsed before the external call completed
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

impl AuthError {
    /// HTTP status classification for this error.
    ///
    /// All token-rejection kinds collapse to 401 and throttling to 429;
    /// only the status distinguishes them, never the body.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::UnknownKey { .. }
            | Self::ExpiredToken { .. }
            | Self::MalformedToken(_)
            | Self::InvalidToken(_)
            | Self::InvalidCredentials
            | Self::TenantVerification(_) => 401,
            Self::TooManyRequests { .. } => 429,
            Self::Store(_) | Self::RateLimiter(_) | Self::DeadlineExceeded => 503,
            Self::Config(_) | Self::Signing(_) | Self::LimitExceeded => 500,
        }
    }

    /// Message safe to return to clients.
    ///
    /// Deliberately identical across all unauthorized kinds so the response
    /// shape leaks nothing about the internal failure.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self.http_status() {
            401 => "unauthorized",
            429 => "too many requests",
            503 => "service temporarily unavailable",
            _ => "internal error",
        }
    }

    /// Whether the caller may retry the same request unchanged
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::RateLimiter(_) | Self::DeadlineExceeded
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_kinds_share_response_shape() {
        let errors = [
            AuthError::UnknownKey { kid: 3 },
            AuthError::ExpiredToken {
                expired_at: Utc::now(),
            },
            AuthError::MalformedToken("bad header".into()),
            AuthError::InvalidToken("signature mismatch".into()),
            AuthError::InvalidCredentials,
        ];
        for err in &errors {
            assert_eq!(err.http_status(), 401);
            assert_eq!(err.public_message(), "unauthorized");
        }
    }

    #[test]
    fn test_throttling_is_distinct_only_in_status() {
        let err = AuthError::TooManyRequests { retry_after: None };
        assert_eq!(err.http_status(), 429);
        assert_eq!(err.public_message(), "too many requests");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(AuthError::Store("down".into()).is_retryable());
        assert!(AuthError::RateLimiter("down".into()).is_retryable());
        assert!(AuthError::DeadlineExceeded.is_retryable());
        assert!(!AuthError::InvalidCredentials.is_retryable());
        assert!(!AuthError::Config("bad pattern".into()).is_retryable());
    }
}
