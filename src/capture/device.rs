use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Audio capture constraints requested when acquiring a capture source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Container/codec the encoder should emit
    pub mime_type: String,
    /// Target encoder bitrate
    pub audio_bits_per_second: u32,
    /// Interval between emitted chunks
    pub timeslice: Duration,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            mime_type: "audio/webm;codecs=opus".to_string(),
            audio_bits_per_second: 128_000,
            timeslice: Duration::from_millis(500),
        }
    }
}

impl CaptureConstraints {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.timeslice.is_zero() {
            return Err(CaptureError::InvalidConstraints(
                "timeslice must be greater than zero".to_string(),
            ));
        }
        if self.audio_bits_per_second == 0 {
            return Err(CaptureError::InvalidConstraints(
                "audio_bits_per_second must be greater than zero".to_string(),
            ));
        }
        if self.mime_type.trim().is_empty() {
            return Err(CaptureError::InvalidConstraints(
                "mime_type must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Encoded bytes expected per timeslice at the target bitrate
    pub fn bytes_per_chunk(&self) -> usize {
        let bits = u128::from(self.audio_bits_per_second) * self.timeslice.as_millis() / 1000;
        ((bits / 8) as usize).max(1)
    }
}

/// Event emitted by a running capture stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// One encoded chunk (may be empty)
    Chunk(Vec<u8>),
    /// The stream stopped; no further events follow
    Stopped,
    /// The stream failed; no further events follow
    Error(String),
}

/// Why a capture source could not be acquired, in user-presentable terms
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("Microphone access was denied. Check the microphone permission settings.")]
    PermissionDenied,

    #[error("No microphone was found. Check that a microphone is connected.")]
    DeviceNotFound,

    #[error("Could not access the microphone. Another application may be using it.")]
    DeviceBusy,

    #[error("No microphone satisfies the requested constraints.")]
    Overconstrained,

    #[error("Invalid capture constraints: {0}")]
    InvalidConstraints(String),

    #[error("An error occurred while accessing the microphone: {0}")]
    Other(String),
}

impl CaptureError {
    /// Stable machine-readable category
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::PermissionDenied => "PERMISSION_DENIED",
            CaptureError::DeviceNotFound => "DEVICE_NOT_FOUND",
            CaptureError::DeviceBusy => "DEVICE_BUSY",
            CaptureError::Overconstrained => "OVERCONSTRAINED",
            CaptureError::InvalidConstraints(_) => "INVALID_CONSTRAINTS",
            CaptureError::Other(_) => "CAPTURE_ERROR",
        }
    }
}

impl From<io::Error> for CaptureError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => CaptureError::DeviceNotFound,
            io::ErrorKind::PermissionDenied => CaptureError::PermissionDenied,
            io::ErrorKind::InvalidInput => CaptureError::InvalidConstraints(error.to_string()),
            _ => CaptureError::Other(error.to_string()),
        }
    }
}

/// Platform facility producing encoded audio chunks
///
/// Implementations:
/// - File: replay an encoded file in timed chunks (testing, CLI)
/// - Microphone backends live outside this crate and plug in here
#[async_trait::async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Acquire a capture stream honoring `constraints`
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// An acquired capture source
pub trait CaptureStream: Send {
    /// Begin emitting one chunk per `timeslice`
    ///
    /// Events arrive on the returned receiver until `Stopped` or `Error`.
    fn start(&mut self, timeslice: Duration) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError>;

    /// Ask the encoder to stop; a final `Stopped` event follows
    fn stop(&mut self);

    /// Release tracks and device handles. Idempotent.
    fn release(&mut self);

    /// Whether the stream is currently emitting
    fn is_active(&self) -> bool;
}
