use crate::encoder::Encoder;
use crate::record::LogRecord;
use crate::sink::LogSink;
use async_trait::async_trait;
use std::error::Error;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Line-oriented sink that encodes each record and appends it to a buffered
/// async writer.
///
/// Lines are buffered until [`LogSink::flush`] is called; the record worker
/// flushes after every batch and once more on shutdown.
pub struct WriterSink {
    writer: Mutex<BufWriter<BoxedWriter>>,
    encoder: Encoder,
}

impl WriterSink {
    pub fn new<W>(writer: W, encoder: Encoder) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        WriterSink {
            writer: Mutex::new(BufWriter::new(Box::new(writer) as BoxedWriter)),
            encoder,
        }
    }

    /// Open `path` for appending, creating it if needed.
    ///
    /// The file is opened eagerly so that an unwritable destination is
    /// reported at construction time instead of on the first write.
    pub fn open_file(path: &Path, encoder: Encoder) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(tokio::fs::File::from_std(file), encoder))
    }

    pub fn stdout(encoder: Encoder) -> Self {
        Self::new(tokio::io::stdout(), encoder)
    }

    pub fn stderr(encoder: Encoder) -> Self {
        Self::new(tokio::io::stderr(), encoder)
    }
}

#[async_trait]
impl LogSink for WriterSink {
    async fn send(&self, record: &LogRecord) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut line = self.encoder.encode(record)?;
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut writer = self.writer.lock().await;
        writer.flush().await?;
        Ok(())
    }
}
