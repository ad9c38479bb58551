use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::encoder::Encoder;
use crate::sink::LogSink;
use crate::writer_sink::WriterSink;

/// Path used when no destination is configured.
pub const DEFAULT_LOG_PATH: &str = "/var/log/myapp.log";

/// Destination for encoded records, selected by config or environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    Stdout,
    Stderr,
    File(PathBuf),
}

impl Default for SinkTarget {
    fn default() -> Self {
        SinkTarget::File(PathBuf::from(DEFAULT_LOG_PATH))
    }
}

impl fmt::Display for SinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkTarget::Stdout => f.write_str("stdout"),
            SinkTarget::Stderr => f.write_str("stderr"),
            SinkTarget::File(path) => write!(f, "file://{}", path.display()),
        }
    }
}

/// Parse a destination string.
///
/// Examples:
/// - "stdout" / "stderr"
/// - "file:///var/log/myapp.log"
/// - "/var/log/myapp.log" (bare paths are files)
pub fn parse_target(raw: &str) -> Result<SinkTarget, SinkTargetError> {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();

    if trimmed.is_empty() {
        Err(SinkTargetError::Empty)
    } else if lower == "stdout" {
        Ok(SinkTarget::Stdout)
    } else if lower == "stderr" {
        Ok(SinkTarget::Stderr)
    } else if lower.starts_with("file://") {
        let path = &trimmed["file://".len()..];
        if path.is_empty() {
            Err(SinkTargetError::Empty)
        } else {
            Ok(SinkTarget::File(PathBuf::from(path)))
        }
    } else if let Some((scheme, _)) = trimmed.split_once("://") {
        Err(SinkTargetError::UnknownScheme(scheme.to_string()))
    } else {
        Ok(SinkTarget::File(PathBuf::from(trimmed)))
    }
}

impl FromStr for SinkTarget {
    type Err = SinkTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_target(s)
    }
}

/// Error type returned when parsing a destination string.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SinkTargetError {
    #[error("empty sink target")]
    Empty,

    #[error("unsupported sink scheme `{0}`")]
    UnknownScheme(String),
}

/// Error type returned when opening a sink.
#[derive(thiserror::Error, Debug)]
pub enum SinkBuildError {
    #[error("cannot open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Create a concrete [`LogSink`] for `target`.
///
/// Files are opened immediately; a missing directory or a permission problem
/// surfaces here rather than on the first write.
pub fn make_sink(target: &SinkTarget, encoder: Encoder) -> Result<Arc<dyn LogSink>, SinkBuildError> {
    let sink = match target {
        SinkTarget::Stdout => WriterSink::stdout(encoder),
        SinkTarget::Stderr => WriterSink::stderr(encoder),
        SinkTarget::File(path) => {
            WriterSink::open_file(path, encoder).map_err(|source| SinkBuildError::Open {
                path: path.clone(),
                source,
            })?
        }
    };
    Ok(Arc::new(sink) as Arc<dyn LogSink>)
}
