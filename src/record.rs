use crate::severity::Severity;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A single structured log entry.
///
/// Built by [`RecordLayer`](crate::layer::RecordLayer) from a `tracing`
/// event, encoded once by a sink and then discarded.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Severity,
    pub message: String,
    /// Structured attributes in the order the event declared them.
    pub fields: Map<String, Value>,
    /// `file:line` of the emitting callsite, when caller capture is enabled.
    pub caller: Option<String>,
}

impl LogRecord {
    pub fn new(level: Severity, message: impl Into<String>) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            fields: Map::new(),
            caller: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}
