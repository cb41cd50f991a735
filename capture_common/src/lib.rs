pub mod device;
pub mod error;
pub mod fake;
pub mod source;
#[cfg(feature = "gstreamer")]
pub mod webcam;

pub use device::{encode_png, with_capture, ActiveCapture, CaptureDevice};
pub use error::CaptureError;
pub use source::{build_device, CaptureSource};
