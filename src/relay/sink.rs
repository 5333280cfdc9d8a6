use anyhow::{Context, Result};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::id::SessionId;

/// Append-only destination for one session's binary frames
#[async_trait::async_trait]
pub trait Sink: Send {
    /// Append `bytes`; returns once the data has been handed to the backing store
    async fn append(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Flush and release the underlying handle
    async fn close(&mut self) -> io::Result<()>;
}

/// Opens one sink per session
#[async_trait::async_trait]
pub trait SinkFactory: Send + Sync {
    /// Human-readable location of the sink for `id` (file path, bucket key, ...)
    fn location(&self, id: &SessionId) -> String;

    /// Open a fresh sink for `id`. Must fail with `AlreadyExists` rather than
    /// truncate an existing destination.
    async fn open(&self, id: &SessionId) -> io::Result<Box<dyn Sink>>;
}

/// Writes each session to `<output_dir>/<prefix>-<id>.<extension>`
#[derive(Debug, Clone)]
pub struct FileSinkFactory {
    output_dir: PathBuf,
    prefix: String,
    extension: String,
}

impl FileSinkFactory {
    /// Create the factory, creating `output_dir` if it doesn't exist
    pub fn new(
        output_dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        extension: impl Into<String>,
    ) -> Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).with_context(|| {
            format!("Failed to create output directory: {}", output_dir.display())
        })?;

        Ok(Self {
            output_dir,
            prefix: prefix.into(),
            extension: extension.into(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path_for(&self, id: &SessionId) -> PathBuf {
        self.output_dir
            .join(format!("{}-{}.{}", self.prefix, id, self.extension))
    }
}

#[async_trait::async_trait]
impl SinkFactory for FileSinkFactory {
    fn location(&self, id: &SessionId) -> String {
        self.path_for(id).display().to_string()
    }

    async fn open(&self, id: &SessionId) -> io::Result<Box<dyn Sink>> {
        let path = self.path_for(id);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        info!("Opened audio sink: {}", path.display());

        Ok(Box::new(FileSink {
            path,
            file: Some(file),
            bytes_written: 0,
        }))
    }
}

/// File-backed sink
pub struct FileSink {
    path: PathBuf,
    file: Option<File>,
    bytes_written: u64,
}

#[async_trait::async_trait]
impl Sink for FileSink {
    async fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "sink already closed")
        })?;

        file.write_all(bytes).await?;
        // tokio hands writes to the blocking pool; flush waits for the OS write
        // so IO errors surface on this frame rather than the next one
        file.flush().await?;
        self.bytes_written += bytes.len() as u64;

        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            debug!(
                "Closed audio sink {} ({} bytes)",
                self.path.display(),
                self.bytes_written
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_sink_appends_in_order() -> Result<()> {
        let dir = TempDir::new()?;
        let factory = FileSinkFactory::new(dir.path(), "audio", "webm")?;
        let id = SessionId::new("7-0");

        let mut sink = factory.open(&id).await?;
        sink.append(b"abc").await?;
        sink.append(b"").await?;
        sink.append(b"def").await?;
        sink.close().await?;

        let written = std::fs::read(factory.path_for(&id))?;
        assert_eq!(written, b"abcdef");
        assert!(factory.location(&id).ends_with("audio-7-0.webm"));
        Ok(())
    }

    #[tokio::test]
    async fn test_open_refuses_to_truncate_existing_file() -> Result<()> {
        let dir = TempDir::new()?;
        let factory = FileSinkFactory::new(dir.path(), "audio", "webm")?;
        let id = SessionId::new("dup");
        std::fs::write(factory.path_for(&id), b"keep me")?;

        let err = factory.open(&id).await.err().expect("open should fail");
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(factory.path_for(&id))?, b"keep me");
        Ok(())
    }

    #[tokio::test]
    async fn test_append_after_close_fails() -> Result<()> {
        let dir = TempDir::new()?;
        let factory = FileSinkFactory::new(dir.path(), "audio", "webm")?;
        let mut sink = factory.open(&SessionId::new("closed")).await?;

        sink.close().await?;
        sink.close().await?;
        assert!(sink.append(b"late").await.is_err());
        Ok(())
    }

    #[test]
    fn test_factory_creates_output_dir() -> Result<()> {
        let dir = TempDir::new()?;
        let nested = dir.path().join("nested").join("audio-data");
        let factory = FileSinkFactory::new(&nested, "audio", "webm")?;
        assert!(nested.is_dir());
        assert_eq!(factory.output_dir(), nested.as_path());
        Ok(())
    }
}
