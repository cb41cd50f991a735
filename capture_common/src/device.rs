use std::io::Cursor;

use image::{ImageFormat, RgbImage};

use crate::error::CaptureError;

/// A live video source that can be opened, sampled and released.
///
/// Implementations move between two states only: closed and active.
/// `open` on success leaves the device active; on failure it must leave the
/// device closed. `close` is idempotent. A fatal stream error observed by
/// `capture_frame` closes the device before the error is returned.
pub trait CaptureDevice: Send {
    fn open(&mut self) -> Result<(), CaptureError>;
    fn close(&mut self);
    fn is_active(&self) -> bool;
    /// Samples the current frame into a PNG-encoded still.
    fn capture_frame(&mut self) -> Result<Vec<u8>, CaptureError>;
}

impl<D: CaptureDevice + ?Sized> CaptureDevice for Box<D> {
    fn open(&mut self) -> Result<(), CaptureError> {
        (**self).open()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_active(&self) -> bool {
        (**self).is_active()
    }

    fn capture_frame(&mut self) -> Result<Vec<u8>, CaptureError> {
        (**self).capture_frame()
    }
}

/// An opened device. Dropping it closes the device, so release happens on
/// every exit path: early return, `?`, or unwinding.
pub struct ActiveCapture<'a, D: CaptureDevice + ?Sized> {
    device: &'a mut D,
}

impl<'a, D: CaptureDevice + ?Sized> ActiveCapture<'a, D> {
    pub fn open(device: &'a mut D) -> Result<Self, CaptureError> {
        device.open()?;
        Ok(Self { device })
    }

    pub fn capture_frame(&mut self) -> Result<Vec<u8>, CaptureError> {
        self.device.capture_frame()
    }

    pub fn is_active(&self) -> bool {
        self.device.is_active()
    }

    /// Releases the device now instead of at end of scope.
    pub fn close(self) {}
}

impl<D: CaptureDevice + ?Sized> Drop for ActiveCapture<'_, D> {
    fn drop(&mut self) {
        self.device.close();
    }
}

/// Opens `device`, runs `f` with it, and closes it afterwards.
pub fn with_capture<D, T, F>(device: &mut D, f: F) -> Result<T, CaptureError>
where
    D: CaptureDevice + ?Sized,
    F: FnOnce(&mut ActiveCapture<'_, D>) -> T,
{
    let mut active = ActiveCapture::open(device)?;
    Ok(f(&mut active))
}

pub fn encode_png(frame: &RgbImage) -> Result<Vec<u8>, CaptureError> {
    let mut bytes = Cursor::new(Vec::new());
    frame.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}
