use thiserror::Error;

use crate::capture::CaptureError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not connected to the relay")]
    NotConnected,

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Recording client has shut down")]
    Shutdown,
}
