// ABOUTME: Structured logging setup built on the tracing ecosystem
// ABOUTME: Env-selected level and output format, initialized once at process start
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Logging initialization.
//!
//! Call [`init`] once at startup. Level comes from `RUST_LOG` when set,
//! otherwise from `USERADM_LOG_LEVEL`; format from `USERADM_LOG_FORMAT`.

use crate::errors::{AuthError, AuthResult};
use std::env;
use std::str::FromStr;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line, for log aggregation
    Json,
    /// Human-readable multi-line output
    Pretty,
    /// Single-line human-readable output
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(AuthError::Config(format!("unknown log format {other:?}"))),
        }
    }
}

/// Logging settings read from the environment
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default level directive when `RUST_LOG` is unset
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Read logging settings from `USERADM_LOG_LEVEL` / `USERADM_LOG_FORMAT`
    ///
    /// # Errors
    /// Returns [`AuthError::Config`] on an unknown format name.
    pub fn from_env() -> AuthResult<Self> {
        let defaults = Self::default();
        let level = env::var("USERADM_LOG_LEVEL").unwrap_or(defaults.level);
        let format = match env::var("USERADM_LOG_FORMAT") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.format,
        };
        Ok(Self { level, format })
    }
}

/// Install the global tracing subscriber.
///
/// # Errors
/// Returns [`AuthError::Config`] when a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> AuthResult<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
    };

    result.map_err(|e| AuthError::Config(format!("logging initialization failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("PRETTY".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("yaml".parse::<LogFormat>().is_err());
    }
}
