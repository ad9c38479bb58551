use crate::record::LogRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Output layout produced by an [`Encoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// One JSON object per line.
    #[default]
    Json,
    /// Tab-separated `timestamp level [caller] message {fields}` lines.
    Console,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown encoding `{0}`, expected `json` or `console`")]
pub struct ParseEncodingError(pub String);

impl FromStr for Encoding {
    type Err = ParseEncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Encoding::Json),
            "console" => Ok(Encoding::Console),
            _ => Err(ParseEncodingError(s.to_string())),
        }
    }
}

/// Names of the reserved keys in encoded records.
///
/// Downstream consumers depend on these, so they are fixed at configuration
/// time and never derived from event data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldKeys {
    pub message: String,
    pub level: String,
    pub timestamp: String,
}

impl Default for FieldKeys {
    fn default() -> Self {
        Self {
            message: "message".to_string(),
            level: "level".to_string(),
            timestamp: "timestamp".to_string(),
        }
    }
}

const CALLER_KEY: &str = "caller";

/// Render a timestamp as ISO 8601 UTC with millisecond precision,
/// e.g. `2024-05-01T12:00:00.123Z`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serializes [`LogRecord`]s into single lines (without the trailing newline).
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    pub encoding: Encoding,
    pub keys: FieldKeys,
}

impl Encoder {
    pub fn new(encoding: Encoding, keys: FieldKeys) -> Self {
        Self { encoding, keys }
    }

    pub fn encode(&self, record: &LogRecord) -> Result<String, serde_json::Error> {
        match self.encoding {
            Encoding::Json => self.encode_json(record),
            Encoding::Console => self.encode_console(record),
        }
    }

    fn is_reserved(&self, key: &str, record: &LogRecord) -> bool {
        key == self.keys.message
            || key == self.keys.level
            || key == self.keys.timestamp
            || (record.caller.is_some() && key == CALLER_KEY)
    }

    fn encode_json(&self, record: &LogRecord) -> Result<String, serde_json::Error> {
        let mut obj = Map::with_capacity(record.fields.len() + 4);
        obj.insert(self.keys.level.clone(), serde_json::to_value(record.level)?);
        obj.insert(
            self.keys.timestamp.clone(),
            Value::from(format_timestamp(&record.timestamp)),
        );
        obj.insert(self.keys.message.clone(), Value::from(record.message.as_str()));
        if let Some(caller) = &record.caller {
            obj.insert(CALLER_KEY.to_string(), Value::from(caller.as_str()));
        }
        // Event fields never shadow the reserved keys.
        for (k, v) in record.fields.iter() {
            if !self.is_reserved(k, record) {
                obj.insert(k.clone(), v.clone());
            }
        }
        serde_json::to_string(&Value::Object(obj))
    }

    fn encode_console(&self, record: &LogRecord) -> Result<String, serde_json::Error> {
        let mut line = format!(
            "{}\t{}",
            format_timestamp(&record.timestamp),
            record.level
        );
        if let Some(caller) = &record.caller {
            line.push('\t');
            line.push_str(caller);
        }
        line.push('\t');
        line.push_str(&record.message);
        if !record.fields.is_empty() {
            line.push('\t');
            line.push_str(&serde_json::to_string(&record.fields)?);
        }
        Ok(line)
    }
}
