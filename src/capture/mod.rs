pub mod device;
pub mod file;

pub use device::{CaptureConstraints, CaptureDevice, CaptureError, CaptureEvent, CaptureStream};
pub use file::{FileCaptureDevice, FileCaptureStream};
