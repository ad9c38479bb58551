use crate::record::LogRecord;
use crate::severity::Severity;
use crate::sink::LogSink;
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Settings consumed by [`RecordLayer::new`].
#[derive(Clone, Debug)]
pub struct LayerSettings {
    pub min_level: Severity,
    pub capture_target: Option<String>,
    pub include_caller: bool,
    pub channel_buffer: usize,
    /// Records written per sink call. `1` writes and flushes every record
    /// as soon as it is dequeued.
    pub batch_size: usize,
    /// Upper bound on how long a record waits in a partial batch.
    pub flush_interval: Duration,
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self {
            min_level: Severity::Info,
            capture_target: None,
            include_caller: false,
            channel_buffer: 1024,
            batch_size: 1,
            flush_interval: Duration::from_secs(1),
        }
    }
}

pub(crate) enum Command {
    Record(LogRecord),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    enqueued: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time view of the pipeline counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayerStats {
    /// Events seen by the layer, before any filtering.
    pub total: u64,
    /// Records accepted into the channel.
    pub enqueued: u64,
    /// Records lost because the channel was full or the worker had stopped.
    pub dropped: u64,
    /// Records the sink accepted.
    pub written: u64,
    /// Records the sink rejected.
    pub failed: u64,
}

impl Counters {
    fn snapshot(&self) -> LayerStats {
        LayerStats {
            total: self.total.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Error returned by [`LoggerHandle`] operations.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("log worker has already stopped")]
    Closed,

    #[error("log worker terminated abnormally: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// `tracing_subscriber` layer that turns events into [`LogRecord`]s and
/// forwards them to a [`LogSink`] via a bounded channel and background task.
///
/// Only events whose level belongs to the closed [`Severity`] set and is at
/// or above `min_level` are captured. Sink I/O is fully decoupled from the
/// emitting thread.
pub struct RecordLayer {
    sender: mpsc::Sender<Command>,
    min_level: Severity,
    capture_target: Option<String>,
    include_caller: bool,
    counters: Arc<Counters>,
}

/// Owner-side handle of the record pipeline.
///
/// Keep it alive for as long as records should be written, and call
/// [`LoggerHandle::shutdown`] before the process exits so buffered output
/// reaches the sink.
pub struct LoggerHandle {
    sender: mpsc::Sender<Command>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl RecordLayer {
    /// Create a new layer and spawn a background task that pulls records
    /// from a bounded channel and writes them to `sink`.
    ///
    /// Must be called from within a Tokio runtime. Minimal thresholds are
    /// enforced for the buffer, batch size and flush interval.
    pub fn new(sink: Arc<dyn LogSink>, settings: LayerSettings) -> (Self, LoggerHandle) {
        let buffer = settings.channel_buffer.max(16);
        let batch_size = settings.batch_size.max(1);
        let flush_interval = settings.flush_interval.max(Duration::from_millis(10));

        let (tx, rx) = mpsc::channel::<Command>(buffer);
        let counters = Arc::new(Counters::default());

        let worker = tokio::spawn(run_worker(
            sink,
            rx,
            batch_size,
            flush_interval,
            Arc::clone(&counters),
        ));

        let layer = RecordLayer {
            sender: tx.clone(),
            min_level: settings.min_level,
            capture_target: settings.capture_target,
            include_caller: settings.include_caller,
            counters: Arc::clone(&counters),
        };
        let handle = LoggerHandle {
            sender: tx,
            worker: Some(worker),
            counters,
        };
        (layer, handle)
    }

    pub fn stats(&self) -> LayerStats {
        self.counters.snapshot()
    }

    fn captures(&self, target: &str) -> bool {
        self.capture_target.as_deref().map_or(true, |t| t == target)
    }
}

impl LoggerHandle {
    pub fn stats(&self) -> LayerStats {
        self.counters.snapshot()
    }

    /// Wait until every record enqueued before this call has been written
    /// and the sink has been flushed.
    pub async fn flush(&self) -> Result<(), PipelineError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.sender
            .send(Command::Flush(ack_tx))
            .await
            .map_err(|_| PipelineError::Closed)?;
        ack_rx.await.map_err(|_| PipelineError::Closed)
    }

    /// Drain the queue, flush the sink and stop the worker.
    pub async fn shutdown(mut self) -> Result<(), PipelineError> {
        let worker = match self.worker.take() {
            Some(worker) => worker,
            None => return Ok(()),
        };
        // A closed channel means the worker already exited; joining still
        // reports whether it ended cleanly.
        let _ = self.sender.send(Command::Shutdown).await;
        worker.await?;
        Ok(())
    }
}

impl Drop for LoggerHandle {
    fn drop(&mut self) {
        if self.worker.is_some() {
            // Best effort: the worker drains what is queued as long as the
            // runtime keeps running.
            if self.sender.try_send(Command::Shutdown).is_err() {
                eprintln!("log pipeline dropped without shutdown; buffered records may be lost");
            }
        }
    }
}

async fn run_worker(
    sink: Arc<dyn LogSink>,
    mut rx: mpsc::Receiver<Command>,
    batch_size: usize,
    flush_interval: Duration,
    counters: Arc<Counters>,
) {
    let mut batch = Vec::with_capacity(batch_size);
    // Armed when the first record enters an empty batch and cleared on
    // every write, so later records never push it back.
    let mut deadline: Option<Instant> = None;

    loop {
        let due = deadline.unwrap_or_else(Instant::now);
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Record(record)) => {
                    if batch.is_empty() {
                        deadline = Some(Instant::now() + flush_interval);
                    }
                    batch.push(record);
                    if batch.len() >= batch_size {
                        write_batch(&*sink, &mut batch, &counters).await;
                        deadline = None;
                    }
                }
                Some(Command::Flush(ack)) => {
                    write_batch(&*sink, &mut batch, &counters).await;
                    deadline = None;
                    let _ = ack.send(());
                }
                Some(Command::Shutdown) | None => {
                    write_batch(&*sink, &mut batch, &counters).await;
                    break;
                }
            },
            _ = sleep_until(due), if deadline.is_some() => {
                write_batch(&*sink, &mut batch, &counters).await;
                deadline = None;
            }
        }
    }
}

/// Send every queued record, then flush the sink. Failed records are
/// reported and discarded.
async fn write_batch(sink: &dyn LogSink, batch: &mut Vec<LogRecord>, counters: &Counters) {
    for record in batch.drain(..) {
        match sink.send(&record).await {
            Ok(()) => {
                counters.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                eprintln!("error writing log record: {}", e);
            }
        }
    }

    if let Err(e) = sink.flush().await {
        eprintln!("error flushing log sink: {}", e);
    }
}

impl<S> Layer<S> for RecordLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.counters.total.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        let level = match Severity::from_tracing(meta.level()) {
            Some(level) if level >= self.min_level => level,
            _ => return,
        };
        if !self.captures(meta.target()) {
            return;
        }

        let mut fields = Map::new();
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        let caller = if self.include_caller {
            meta.file().zip(meta.line()).map(|(file, line)| short_caller(file, line))
        } else {
            None
        };

        let record = LogRecord {
            timestamp: Utc::now(),
            level,
            message: message.unwrap_or_default(),
            fields,
            caller,
        };

        match self.sender.try_send(Command::Record(record)) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                eprintln!("log channel full, dropping log record");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Trim a source path to its last directory and file name.
fn short_caller(file: &str, line: u32) -> String {
    let mut parts = file.rsplit('/');
    let name = parts.next().unwrap_or(file);
    match parts.next() {
        Some(dir) if !dir.is_empty() => format!("{}/{}:{}", dir, name, line),
        _ => format!("{}:{}", name, line),
    }
}

struct FieldVisitor<'a> {
    fields: &'a mut Map<String, Value>,
    message: &'a mut Option<String>,
}

impl<'a> FieldVisitor<'a> {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // Format-string messages arrive here as `fmt::Arguments`.
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.insert(field, Value::String(format!("{:?}", value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_sink::MemorySink;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    fn layer_with(settings: LayerSettings) -> (RecordLayer, LoggerHandle, MemorySink) {
        let sink = MemorySink::new();
        let (layer, handle) = RecordLayer::new(Arc::new(sink.clone()), settings);
        (layer, handle, sink)
    }

    #[tokio::test]
    async fn captures_message_and_fields_in_order() {
        let (layer, handle, sink) = layer_with(LayerSettings::default());
        let subscriber = Registry::default().with(layer);
        {
            let _guard = tracing::subscriber::set_default(subscriber);
            tracing::info!(count = 5u64, app = "logdemo", "Regular application log");
        }
        handle.flush().await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.level, Severity::Info);
        assert_eq!(record.message, "Regular application log");
        let keys: Vec<&str> = record.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["count", "app"]);
        assert_eq!(record.field("count"), Some(&Value::from(5u64)));
        assert!(record.caller.is_none());
    }

    #[tokio::test]
    async fn ignores_levels_outside_the_set_and_below_minimum() {
        let settings = LayerSettings {
            min_level: Severity::Error,
            ..LayerSettings::default()
        };
        let (layer, handle, sink) = layer_with(settings);
        let subscriber = Registry::default().with(layer);
        {
            let _guard = tracing::subscriber::set_default(subscriber);
            tracing::warn!("not in the set");
            tracing::debug!("not in the set");
            tracing::info!("below minimum");
            tracing::error!("kept");
        }
        handle.flush().await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "kept");
        assert_eq!(handle.stats().total, 4);
        assert_eq!(handle.stats().enqueued, 1);
    }

    #[tokio::test]
    async fn capture_target_filters_other_events() {
        let settings = LayerSettings {
            capture_target: Some("records".to_string()),
            include_caller: true,
            ..LayerSettings::default()
        };
        let (layer, handle, sink) = layer_with(settings);
        let subscriber = Registry::default().with(layer);
        {
            let _guard = tracing::subscriber::set_default(subscriber);
            tracing::info!("lifecycle message");
            tracing::info!(target: "records", "kept");
        }
        handle.flush().await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let caller = records[0].caller.as_deref().unwrap();
        assert!(caller.contains("layer.rs:"), "caller was {}", caller);
    }

    #[tokio::test]
    async fn shutdown_drains_queued_records() {
        let settings = LayerSettings {
            batch_size: 1000,
            flush_interval: Duration::from_secs(3600),
            ..LayerSettings::default()
        };
        let (layer, handle, sink) = layer_with(settings);
        let subscriber = Registry::default().with(layer);
        {
            let _guard = tracing::subscriber::set_default(subscriber);
            for i in 0..10u64 {
                tracing::info!(count = i, "queued");
            }
        }
        handle.shutdown().await.unwrap();

        assert_eq!(sink.len(), 10);
        assert!(sink.flush_count() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_batch_is_written_after_flush_interval() {
        let settings = LayerSettings {
            batch_size: 100,
            flush_interval: Duration::from_millis(200),
            ..LayerSettings::default()
        };
        let (layer, handle, sink) = layer_with(settings);
        let subscriber = Registry::default().with(layer);
        {
            let _guard = tracing::subscriber::set_default(subscriber);
            tracing::error!("waiting for the timer");
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(sink.len(), 1);
        assert_eq!(handle.stats().written, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn steady_traffic_does_not_postpone_the_flush_deadline() {
        let settings = LayerSettings {
            batch_size: 100,
            flush_interval: Duration::from_millis(1000),
            ..LayerSettings::default()
        };
        let (layer, handle, sink) = layer_with(settings);
        let _guard = tracing::subscriber::set_default(Registry::default().with(layer));

        for i in 0..20u64 {
            tracing::info!(count = i, "every half second");
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        // Each batch waits at most one interval, so only the records of the
        // last interval can still be pending after 10s.
        assert!(sink.len() >= 18, "written {} of 20", sink.len());
        assert_eq!(handle.stats().enqueued, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn default_settings_write_each_record_immediately() {
        let (layer, handle, sink) = layer_with(LayerSettings::default());
        {
            let _guard = tracing::subscriber::set_default(Registry::default().with(layer));
            tracing::info!(count = 1u64, "no batching");
        }
        // Far below the default flush interval.
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.flush_count(), 1);
        assert_eq!(handle.stats().written, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_still_drains_the_queue() {
        let settings = LayerSettings {
            batch_size: 1000,
            flush_interval: Duration::from_secs(3600),
            ..LayerSettings::default()
        };
        let (layer, handle, sink) = layer_with(settings);
        {
            let _guard = tracing::subscriber::set_default(Registry::default().with(layer));
            for i in 0..5u64 {
                tracing::error!(count = i, "queued before drop");
            }
        }
        drop(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(sink.len(), 5);
        assert!(sink.flush_count() >= 1);
    }

    #[test]
    fn shortens_caller_paths() {
        assert_eq!(short_caller("src/emitter.rs", 12), "src/emitter.rs:12");
        assert_eq!(short_caller("/a/b/c/emitter.rs", 3), "c/emitter.rs:3");
        assert_eq!(short_caller("main.rs", 1), "main.rs:1");
    }
}
