use thiserror::Error;

/// Failures of a capture device.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The device was denied, absent, or refused to start streaming.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A frame was requested while the device is closed.
    #[error("capture device is not active")]
    NotActive,

    /// The stream died while active; the device has been closed.
    #[error("capture stream lost: {0}")]
    StreamLost(String),

    /// A frame arrived but could not be turned into a still image.
    #[error("failed to encode captured frame: {0}")]
    Encode(#[from] image::ImageError),
}

impl CaptureError {
    /// Short message suitable for the session's status line.
    pub fn user_message(&self) -> String {
        match self {
            CaptureError::DeviceUnavailable(_) => {
                "Camera unavailable. Check that it is connected and access is allowed.".to_string()
            }
            CaptureError::StreamLost(_) => "Camera stream stopped unexpectedly.".to_string(),
            other => format!("Camera error: {other}"),
        }
    }
}
