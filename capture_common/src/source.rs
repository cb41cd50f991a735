use std::fmt;
use std::str::FromStr;

use crate::device::CaptureDevice;
use crate::error::CaptureError;
use crate::fake::FakeCapture;

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    /// A V4L2 device node such as `/dev/video0`.
    Device(String),
    /// The gstreamer synthetic test pattern.
    Test,
    /// In-memory gradient frames, no camera needed.
    Fake,
}

impl FromStr for CaptureSource {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(CaptureError::DeviceUnavailable(
                "empty capture source".to_string(),
            )),
            "test" => Ok(CaptureSource::Test),
            "fake" => Ok(CaptureSource::Fake),
            "webcam" => Ok(CaptureSource::Device("/dev/video0".to_string())),
            path => Ok(CaptureSource::Device(path.to_string())),
        }
    }
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureSource::Device(path) => write!(f, "{path}"),
            CaptureSource::Test => write!(f, "test"),
            CaptureSource::Fake => write!(f, "fake"),
        }
    }
}

/// Builds a closed device for `source`. Nothing is acquired until `open`.
pub fn build_device(
    source: &CaptureSource,
    width: u32,
    height: u32,
) -> Result<Box<dyn CaptureDevice>, CaptureError> {
    match source {
        CaptureSource::Fake => Ok(Box::new(FakeCapture::new(width, height))),
        #[cfg(feature = "gstreamer")]
        other => Ok(Box::new(crate::webcam::GstCapture::new(
            other.clone(),
            width,
            height,
        ))),
        #[cfg(not(feature = "gstreamer"))]
        other => Err(CaptureError::DeviceUnavailable(format!(
            "{other}: built without gstreamer support"
        ))),
    }
}
