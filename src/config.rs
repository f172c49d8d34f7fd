// ABOUTME: Environment-based configuration for the authentication core
// ABOUTME: Parses USERADM_* variables with validated defaults; parse failures are startup-fatal
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Environment-based configuration management
//!
//! All settings are read from `USERADM_*` environment variables with defaults
//! matching a single-node deployment. A variable that is present but fails to
//! parse is a configuration error and aborts startup; silently falling back
//! to a default would mask operator mistakes.

use crate::errors::{AuthError, AuthResult};
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Conventional location of the default (id 0) signing key
pub const DEFAULT_PRIV_KEY_PATH: &str = "/etc/useradm/rsa/private.pem";

/// Default filename pattern; the capture group yields the key id
pub const DEFAULT_PRIV_KEY_FILENAME_PATTERN: &str = r"private\.id\.([0-9]*)\.pem";

/// Key loading settings, consumed by the key registry at startup
#[derive(Debug, Clone)]
pub struct KeysConfig {
    /// Active signing key path; its parent directory is scanned for keys
    pub priv_key_path: PathBuf,
    /// Regex matched against filenames; capture group 1 is the key id
    pub filename_pattern: String,
    /// Conventional default key path, tried when the scan yields no id 0
    pub default_key_path: PathBuf,
    /// Verification-only fallback key; load failure is fatal when set
    pub fallback_key_path: Option<PathBuf>,
}

/// Rate limiter settings
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Redis connection string; empty disables rate limiting entirely
    pub connection_string: String,
    /// Namespace prefix for rate-limit keys
    pub key_prefix: String,
    /// Allowed authentication attempts per window
    pub quota: u64,
    /// Window length
    pub interval: Duration,
}

/// Full configuration surface of the authentication core
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Active signing key path
    pub priv_key_path: PathBuf,
    /// Key filename pattern with optional numeric capture group
    pub priv_key_filename_pattern: String,
    /// Optional fallback verification key path
    pub fallback_priv_key_path: Option<PathBuf>,
    /// `iss` claim on issued tokens
    pub jwt_issuer: String,
    /// Token lifetime in seconds
    pub jwt_expiration_secs: i64,
    /// Max live sessions per user; 0 disables enforcement
    pub limit_sessions_per_user: usize,
    /// Max issued tokens per user; 0 disables enforcement
    pub limit_tokens_per_user: usize,
    /// Minimum minutes between `last_used_at` refreshes per session
    pub token_last_used_update_freq_minutes: u64,
    /// Redis connection string; empty = rate limiting disabled
    pub redis_connection_string: String,
    /// Rate-limit key prefix
    pub redis_key_prefix: String,
    /// Auth attempts allowed per rate-limit window
    pub ratelimit_quota: u64,
    /// Rate-limit window in seconds
    pub ratelimit_interval_secs: u64,
    /// Tenant-administration base URL; empty = tenant verification off
    pub tenantadm_addr: Option<String>,
    /// Maximum accepted request body size, advertised to the HTTP layer
    pub max_request_size: usize,
    /// Deadline applied to each store / tenant call, in seconds
    pub store_op_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            priv_key_path: PathBuf::from(DEFAULT_PRIV_KEY_PATH),
            priv_key_filename_pattern: DEFAULT_PRIV_KEY_FILENAME_PATTERN.into(),
            fallback_priv_key_path: None,
            jwt_issuer: "useradm".into(),
            jwt_expiration_secs: 604_800, // one week
            limit_sessions_per_user: 10,
            limit_tokens_per_user: 10,
            token_last_used_update_freq_minutes: 5,
            redis_connection_string: String::new(),
            redis_key_prefix: "useradm:v1".into(),
            ratelimit_quota: 300,
            ratelimit_interval_secs: 60,
            tenantadm_addr: None,
            max_request_size: 1024 * 1024,
            store_op_timeout_secs: 10,
        }
    }
}

impl AuthConfig {
    /// Load configuration from the environment.
    ///
    /// # Errors
    /// Returns [`AuthError::Config`] when a variable is present but fails to
    /// parse, or when a numeric limit is out of range.
    pub fn from_env() -> AuthResult<Self> {
        let defaults = Self::default();

        let config = Self {
            priv_key_path: env::var("USERADM_SERVER_PRIV_KEY_PATH")
                .map_or(defaults.priv_key_path, PathBuf::from),
            priv_key_filename_pattern: env::var("USERADM_SERVER_PRIV_KEY_FILENAME_PATTERN")
                .unwrap_or(defaults.priv_key_filename_pattern),
            fallback_priv_key_path: env::var("USERADM_SERVER_FALLBACK_PRIV_KEY_PATH")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            jwt_issuer: env::var("USERADM_JWT_ISSUER").unwrap_or(defaults.jwt_issuer),
            jwt_expiration_secs: parse_env("USERADM_JWT_EXP_TIMEOUT", defaults.jwt_expiration_secs)?,
            limit_sessions_per_user: parse_env(
                "USERADM_LIMIT_SESSIONS_PER_USER",
                defaults.limit_sessions_per_user,
            )?,
            limit_tokens_per_user: parse_env(
                "USERADM_LIMIT_TOKENS_PER_USER",
                defaults.limit_tokens_per_user,
            )?,
            token_last_used_update_freq_minutes: parse_env(
                "USERADM_TOKEN_LAST_USED_UPDATE_FREQ_MINUTES",
                defaults.token_last_used_update_freq_minutes,
            )?,
            redis_connection_string: env::var("USERADM_REDIS_CONNECTION_STRING")
                .unwrap_or(defaults.redis_connection_string),
            redis_key_prefix: env::var("USERADM_REDIS_KEY_PREFIX")
                .unwrap_or(defaults.redis_key_prefix),
            ratelimit_quota: parse_env("USERADM_RATELIMIT_QUOTA", defaults.ratelimit_quota)?,
            ratelimit_interval_secs: parse_env(
                "USERADM_RATELIMIT_INTERVAL_SEC",
                defaults.ratelimit_interval_secs,
            )?,
            tenantadm_addr: env::var("USERADM_TENANTADM_ADDR")
                .ok()
                .filter(|a| !a.is_empty()),
            max_request_size: parse_env("USERADM_MAX_REQUEST_SIZE", defaults.max_request_size)?,
            store_op_timeout_secs: parse_env(
                "USERADM_STORE_OP_TIMEOUT_SEC",
                defaults.store_op_timeout_secs,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate invariants that hold across sources (env or programmatic)
    ///
    /// # Errors
    /// Returns [`AuthError::Config`] on out-of-range settings.
    pub fn validate(&self) -> AuthResult<()> {
        if self.jwt_expiration_secs <= 0 {
            return Err(AuthError::Config(format!(
                "jwt expiration must be positive, got {}",
                self.jwt_expiration_secs
            )));
        }
        if self.priv_key_path.as_os_str().is_empty() {
            return Err(AuthError::Config("signing key path must not be empty".into()));
        }
        Ok(())
    }

    /// Key loading settings derived from this configuration
    #[must_use]
    pub fn keys_config(&self) -> KeysConfig {
        KeysConfig {
            priv_key_path: self.priv_key_path.clone(),
            filename_pattern: self.priv_key_filename_pattern.clone(),
            default_key_path: PathBuf::from(DEFAULT_PRIV_KEY_PATH),
            fallback_key_path: self.fallback_priv_key_path.clone(),
        }
    }

    /// Rate limiter settings derived from this configuration
    #[must_use]
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            connection_string: self.redis_connection_string.clone(),
            key_prefix: self.redis_key_prefix.clone(),
            quota: self.ratelimit_quota,
            interval: Duration::from_secs(self.ratelimit_interval_secs),
        }
    }

    /// Minimum interval between `last_used_at` refreshes
    #[must_use]
    pub fn last_used_refresh_interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::try_from(self.token_last_used_update_freq_minutes).unwrap_or(i64::MAX))
    }

    /// Deadline applied to store and tenant-verification calls
    #[must_use]
    pub const fn op_timeout(&self) -> Duration {
        Duration::from_secs(self.store_op_timeout_secs)
    }
}

/// Parse an environment variable, falling back to `default` only when unset.
///
/// A set-but-invalid value is a hard error: operators should learn about a
/// typo at startup, not from a service silently running with defaults.
fn parse_env<T>(key: &str, default: T) -> AuthResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| AuthError::Config(format!("invalid value for {key}: {e}"))),
        Err(_) => Ok(default),
    }
}
