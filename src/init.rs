use crate::backend::{make_sink, SinkBuildError, SinkTarget};
use crate::encoder::{Encoder, Encoding, FieldKeys};
use crate::layer::{LayerSettings, LoggerHandle, RecordLayer};
use crate::severity::Severity;
use crate::sink::LogSink;
use std::sync::Arc;
use tokio::time::Duration;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::Registry;

/// Logger configuration, applied once at startup.
///
/// **Fields**
/// - `encoding`: serialization layout of each record.
/// - `min_level`: records below this severity are discarded.
/// - `output`: where encoded records are written.
/// - `keys`: names of the message, level and timestamp keys.
/// - `include_caller`: attach `file:line` of the callsite.
/// - `capture_target`: only events with exactly this target become records.
/// - `diagnostics`: print all other events to stderr through a `fmt` layer.
/// - `channel_buffer`, `batch_size`, `flush_interval`: worker tuning.
#[derive(Clone, Debug)]
pub struct LoggerConfig {
    pub encoding: Encoding,
    pub min_level: Severity,
    pub output: SinkTarget,
    pub keys: FieldKeys,
    pub include_caller: bool,
    pub capture_target: Option<String>,
    pub diagnostics: bool,
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let layer = LayerSettings::default();
        Self {
            encoding: Encoding::Json,
            min_level: Severity::Info,
            output: SinkTarget::default(),
            keys: FieldKeys::default(),
            include_caller: false,
            capture_target: None,
            diagnostics: false,
            channel_buffer: layer.channel_buffer,
            batch_size: layer.batch_size,
            flush_interval: layer.flush_interval,
        }
    }
}

impl LoggerConfig {
    pub fn encoder(&self) -> Encoder {
        Encoder::new(self.encoding, self.keys.clone())
    }

    fn layer_settings(&self) -> LayerSettings {
        LayerSettings {
            min_level: self.min_level,
            capture_target: self.capture_target.clone(),
            include_caller: self.include_caller,
            channel_buffer: self.channel_buffer,
            batch_size: self.batch_size,
            flush_interval: self.flush_interval,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Sink(#[from] SinkBuildError),

    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Build the record layer for `config` without installing anything
/// globally. The caller composes the layer into its own subscriber.
pub fn build_layer(config: &LoggerConfig) -> Result<(RecordLayer, LoggerHandle), InitError> {
    let sink = make_sink(&config.output, config.encoder())?;
    Ok(build_layer_with_sink(config, sink))
}

/// Same as [`build_layer`] but writes to an injected sink; `config.output`
/// and the encoding settings are ignored.
pub fn build_layer_with_sink(
    config: &LoggerConfig,
    sink: Arc<dyn LogSink>,
) -> (RecordLayer, LoggerHandle) {
    RecordLayer::new(sink, config.layer_settings())
}

/// Install the global `tracing` subscriber described by `config`.
///
/// Fails if the output cannot be opened or another subscriber is already
/// installed; nothing is installed in either case. The returned handle must
/// be shut down before exit to flush buffered records.
pub fn init_tracing(config: &LoggerConfig) -> Result<LoggerHandle, InitError> {
    let (layer, handle) = build_layer(config)?;

    if config.diagnostics {
        let capture = config.capture_target.clone();
        let diagnostics = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(filter_fn(move |meta| {
                capture.as_deref().map_or(false, |t| meta.target() != t)
            }));
        let subscriber = Registry::default().with(layer).with(diagnostics);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_sink::MemorySink;

    #[test]
    fn defaults_match_the_documented_contract() {
        let config = LoggerConfig::default();
        assert_eq!(config.encoding, Encoding::Json);
        assert_eq!(config.min_level, Severity::Info);
        assert_eq!(config.output, SinkTarget::default());
        assert_eq!(config.keys, FieldKeys::default());
        assert!(!config.include_caller);
    }

    #[tokio::test]
    async fn unwritable_output_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggerConfig {
            output: SinkTarget::File(dir.path().join("absent").join("app.log")),
            ..LoggerConfig::default()
        };
        match build_layer(&config) {
            Err(InitError::Sink(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("expected construction to fail"),
        }
    }

    #[tokio::test]
    async fn injected_sink_receives_records() {
        let sink = MemorySink::new();
        let (layer, handle) =
            build_layer_with_sink(&LoggerConfig::default(), Arc::new(sink.clone()));
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(app = "logdemo", "Something went wrong");
        });
        handle.shutdown().await.unwrap();
        assert_eq!(sink.records()[0].level, Severity::Error);
    }
}
