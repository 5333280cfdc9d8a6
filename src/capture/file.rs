// File-backed capture source: replays an already encoded recording as if it
// were produced live, one chunk per timeslice

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::device::{CaptureConstraints, CaptureDevice, CaptureError, CaptureEvent, CaptureStream};

const EVENT_BUFFER: usize = 32;

/// Capture device reading encoded audio from a file
#[derive(Debug, Clone)]
pub struct FileCaptureDevice {
    path: PathBuf,
    chunk_bytes: Option<usize>,
}

impl FileCaptureDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_bytes: None,
        }
    }

    /// Fixed chunk size instead of one derived from the target bitrate
    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = Some(chunk_bytes.max(1));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl CaptureDevice for FileCaptureDevice {
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        constraints.validate()?;

        let data = tokio::fs::read(&self.path).await?;
        let chunk_bytes = self
            .chunk_bytes
            .unwrap_or_else(|| constraints.bytes_per_chunk());

        info!(
            "File capture acquired: {} ({} bytes, {} bytes per chunk)",
            self.path.display(),
            data.len(),
            chunk_bytes
        );

        Ok(Box::new(FileCaptureStream {
            data: Arc::new(data),
            chunk_bytes,
            task: None,
            stop_tx: None,
        }))
    }
}

/// Running replay of a file
pub struct FileCaptureStream {
    data: Arc<Vec<u8>>,
    chunk_bytes: usize,
    task: Option<JoinHandle<()>>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl CaptureStream for FileCaptureStream {
    fn start(&mut self, timeslice: Duration) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError> {
        if self.task.is_some() {
            return Err(CaptureError::Other("capture already started".to_string()));
        }
        if timeslice.is_zero() {
            return Err(CaptureError::InvalidConstraints(
                "timeslice must be greater than zero".to_string(),
            ));
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (stop_tx, stop_rx) = oneshot::channel();
        let data = Arc::clone(&self.data);
        let chunk_bytes = self.chunk_bytes;

        self.task = Some(tokio::spawn(replay(data, chunk_bytes, timeslice, events_tx, stop_rx)));
        self.stop_tx = Some(stop_tx);

        Ok(events_rx)
    }

    fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // Replay may already have finished on its own
            let _ = stop_tx.send(());
        }
    }

    fn release(&mut self) {
        self.stop_tx = None;
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("File capture released");
        }
    }

    fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for FileCaptureStream {
    fn drop(&mut self) {
        self.release();
    }
}

async fn replay(
    data: Arc<Vec<u8>>,
    chunk_bytes: usize,
    timeslice: Duration,
    events: mpsc::Sender<CaptureEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(timeslice);
    // First tick completes immediately; a chunk covers one full timeslice
    ticker.tick().await;

    let mut chunks = data.chunks(chunk_bytes);

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                let Some(chunk) = chunks.next() else { break };
                if events.send(CaptureEvent::Chunk(chunk.to_vec())).await.is_err() {
                    return;
                }
            }
        }
    }

    let _ = events.send(CaptureEvent::Stopped).await;
}
