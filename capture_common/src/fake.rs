use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{Rgb, RgbImage};

use crate::device::{encode_png, CaptureDevice};
use crate::error::CaptureError;

/// Open/close counters shared with whoever created the fake.
#[derive(Debug, Default)]
pub struct FakeStats {
    opens: AtomicUsize,
    closes: AtomicUsize,
    frames: AtomicUsize,
}

impl FakeStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::Relaxed)
    }

    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::Relaxed)
    }
}

/// In-memory capture device producing a synthetic gradient that shifts with
/// every frame. Used by tests and by builds without gstreamer.
pub struct FakeCapture {
    width: u32,
    height: u32,
    active: bool,
    unavailable: Option<String>,
    lose_stream_after: Option<usize>,
    frames_this_session: usize,
    stats: Arc<FakeStats>,
}

impl FakeCapture {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            active: false,
            unavailable: None,
            lose_stream_after: None,
            frames_this_session: 0,
            stats: Arc::new(FakeStats::default()),
        }
    }

    /// Every `open` fails with `DeviceUnavailable(reason)`.
    pub fn unavailable(mut self, reason: &str) -> Self {
        self.unavailable = Some(reason.to_string());
        self
    }

    /// The stream dies on the frame after `frames` successful captures.
    pub fn lose_stream_after(mut self, frames: usize) -> Self {
        self.lose_stream_after = Some(frames);
        self
    }

    pub fn stats(&self) -> Arc<FakeStats> {
        Arc::clone(&self.stats)
    }

    fn render(&self, index: usize) -> RgbImage {
        let shift = (index * 37 % 256) as u32;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let r = ((x * 255) / self.width.max(1) + shift) % 256;
            let g = ((y * 255) / self.height.max(1) + shift) % 256;
            Rgb([r as u8, g as u8, 96])
        })
    }
}

impl CaptureDevice for FakeCapture {
    fn open(&mut self) -> Result<(), CaptureError> {
        if self.active {
            return Ok(());
        }
        if let Some(reason) = &self.unavailable {
            log::warn!("Fake camera refused to open: {reason}");
            return Err(CaptureError::DeviceUnavailable(reason.clone()));
        }
        self.active = true;
        self.frames_this_session = 0;
        self.stats.opens.fetch_add(1, Ordering::Relaxed);
        log::debug!("Fake camera opened ({}x{})", self.width, self.height);
        Ok(())
    }

    fn close(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.stats.closes.fetch_add(1, Ordering::Relaxed);
        log::debug!("Fake camera closed");
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn capture_frame(&mut self) -> Result<Vec<u8>, CaptureError> {
        if !self.active {
            return Err(CaptureError::NotActive);
        }
        if self
            .lose_stream_after
            .is_some_and(|limit| self.frames_this_session >= limit)
        {
            self.close();
            return Err(CaptureError::StreamLost("fake stream ended".to_string()));
        }
        let index = self.stats.frames.fetch_add(1, Ordering::Relaxed);
        self.frames_this_session += 1;
        encode_png(&self.render(index))
    }
}
