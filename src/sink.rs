use crate::record::LogRecord;
use async_trait::async_trait;
use std::error::Error;

/// Asynchronous destination for [`LogRecord`]s produced by the record layer.
///
/// Implementations are responsible for encoding records and moving them to
/// a concrete destination (file, stdout, memory). The layer calls `send`
/// from a background task and never awaits it on the emitting thread.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Write a single log record to the underlying destination.
    ///
    /// **Returns**
    /// - `Ok(())` if the record was accepted.
    /// - `Err(..)` on encoding or I/O failure. The worker reports the
    ///   failure and moves on; the record is not retried.
    async fn send(&self, record: &LogRecord) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Flush any buffered records, if the destination implements buffering.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
