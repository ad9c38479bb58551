//! Environment variable names used to configure the demo binary.
//!
//! These are purely helpers; the logger and emitter types remain decoupled
//! from environment access. Every variable is optional and an unparsable
//! value is an error rather than a silent fallback.

use crate::backend::{parse_target, SinkTargetError};
use crate::emitter::EmitterConfig;
use crate::encoder::ParseEncodingError;
use crate::init::LoggerConfig;
use crate::severity::ParseSeverityError;
use std::time::Duration;

/// Sink target: `stdout`, `stderr`, `file://<path>` or a bare path.
pub const LOGDEMO_OUTPUT_ENV: &str = "LOGDEMO_OUTPUT";

/// Record encoding: `json` or `console`.
pub const LOGDEMO_ENCODING_ENV: &str = "LOGDEMO_ENCODING";

/// Minimum severity: `info` or `error`.
pub const LOGDEMO_LEVEL_ENV: &str = "LOGDEMO_LEVEL";

/// Emission interval in milliseconds.
pub const LOGDEMO_INTERVAL_MS_ENV: &str = "LOGDEMO_INTERVAL_MS";

/// Attach the emitting callsite to each record: `true` or `false`.
pub const LOGDEMO_INCLUDE_CALLER_ENV: &str = "LOGDEMO_INCLUDE_CALLER";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{var}: {source}")]
    Target {
        var: &'static str,
        #[source]
        source: SinkTargetError,
    },

    #[error("{var}: {source}")]
    Encoding {
        var: &'static str,
        #[source]
        source: ParseEncodingError,
    },

    #[error("{var}: {source}")]
    Level {
        var: &'static str,
        #[source]
        source: ParseSeverityError,
    },

    #[error("{var}: expected {expected}, got `{value}`")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Build both configurations from a variable lookup.
///
/// `lookup` returns the raw value for a name, or `None` when unset; tests
/// pass a closure over a map instead of touching the process environment.
pub fn load_with<F>(lookup: F) -> Result<(LoggerConfig, EmitterConfig), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut logger = LoggerConfig::default();
    let mut emitter = EmitterConfig::default();

    if let Some(raw) = lookup(LOGDEMO_OUTPUT_ENV) {
        logger.output = parse_target(&raw).map_err(|source| ConfigError::Target {
            var: LOGDEMO_OUTPUT_ENV,
            source,
        })?;
    }
    if let Some(raw) = lookup(LOGDEMO_ENCODING_ENV) {
        logger.encoding = raw.parse().map_err(|source| ConfigError::Encoding {
            var: LOGDEMO_ENCODING_ENV,
            source,
        })?;
    }
    if let Some(raw) = lookup(LOGDEMO_LEVEL_ENV) {
        logger.min_level = raw.parse().map_err(|source| ConfigError::Level {
            var: LOGDEMO_LEVEL_ENV,
            source,
        })?;
    }
    if let Some(raw) = lookup(LOGDEMO_INCLUDE_CALLER_ENV) {
        logger.include_caller = raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var: LOGDEMO_INCLUDE_CALLER_ENV,
            expected: "true or false",
            value: raw.clone(),
        })?;
    }
    if let Some(raw) = lookup(LOGDEMO_INTERVAL_MS_ENV) {
        let millis = raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or_else(|| ConfigError::Invalid {
                var: LOGDEMO_INTERVAL_MS_ENV,
                expected: "a positive number of milliseconds",
                value: raw.clone(),
            })?;
        emitter.interval = Duration::from_millis(millis);
    }

    Ok((logger, emitter))
}

/// Build both configurations from the process environment.
pub fn load() -> Result<(LoggerConfig, EmitterConfig), ConfigError> {
    load_with(|key| std::env::var(key).ok())
}
