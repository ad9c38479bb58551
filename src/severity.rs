use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Closed set of severities a [`LogRecord`](crate::record::LogRecord) can carry.
///
/// Variants are declared in ascending order so that `Info < Error`; the
/// minimum-level filter relies on this ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Error,
}

impl Severity {
    /// Lowercase textual form used in encoded output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Error => "error",
        }
    }

    /// Map a `tracing` level onto the closed set.
    ///
    /// Levels without a counterpart (`WARN`, `DEBUG`, `TRACE`) return `None`
    /// and are never recorded.
    pub fn from_tracing(level: &tracing::Level) -> Option<Severity> {
        match *level {
            tracing::Level::INFO => Some(Severity::Info),
            tracing::Level::ERROR => Some(Severity::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a severity name is not part of the closed set.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown severity `{0}`, expected one of: info, error")]
pub struct ParseSeverityError(pub String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "error" => Ok(Severity::Error),
            _ => Err(ParseSeverityError(s.to_string())),
        }
    }
}
