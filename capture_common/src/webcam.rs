//! Webcam capture through a gstreamer pipeline ending in an `appsink`.

use gstreamer::{self as gst, prelude::*, MessageView};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;

use crate::device::{encode_png, CaptureDevice};
use crate::error::CaptureError;
use crate::source::CaptureSource;

/// How long `open` waits for the pipeline to reach `Playing`.
const START_TIMEOUT_SECS: u64 = 5;
/// How long `capture_frame` waits for a sample.
const FRAME_TIMEOUT_MS: u64 = 2000;

struct Running {
    pipeline: gst::Pipeline,
    sink: gst_app::AppSink,
}

pub struct GstCapture {
    source: CaptureSource,
    width: u32,
    height: u32,
    running: Option<Running>,
}

impl GstCapture {
    pub fn new(source: CaptureSource, width: u32, height: u32) -> Self {
        Self {
            source,
            width,
            height,
            running: None,
        }
    }

    fn pipeline_description(&self) -> Result<String, CaptureError> {
        let src = match &self.source {
            CaptureSource::Device(path) => {
                // Keep the device path from injecting extra pipeline elements.
                if path.contains('"') || path.contains('!') {
                    return Err(CaptureError::DeviceUnavailable(format!(
                        "invalid device path: {path}"
                    )));
                }
                format!("v4l2src device=\"{path}\"")
            }
            CaptureSource::Test => "videotestsrc pattern=smpte is-live=true".to_string(),
            CaptureSource::Fake => {
                return Err(CaptureError::DeviceUnavailable(
                    "the fake source is not backed by gstreamer".to_string(),
                ))
            }
        };
        // Only the newest frame is buffered.
        Ok(format!(
            "{src} ! videoconvert ! videoscale ! \
             video/x-raw,format=RGB,width={},height={} ! \
             appsink name=sink max-buffers=1 drop=true sync=false",
            self.width, self.height
        ))
    }

    fn start(&self) -> Result<Running, CaptureError> {
        gst::init().map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        let description = self.pipeline_description()?;
        log::debug!("Capture pipeline: {description}");
        let pipeline = gst::parse::launch(&description)
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| {
                CaptureError::DeviceUnavailable("failed to create capture pipeline".to_string())
            })?;

        let running = pipeline
            .by_name("sink")
            .and_then(|e| e.dynamic_cast::<gst_app::AppSink>().ok())
            .map(|sink| Running {
                pipeline: pipeline.clone(),
                sink,
            });
        let Some(running) = running else {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(CaptureError::DeviceUnavailable(
                "capture pipeline has no appsink".to_string(),
            ));
        };

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(CaptureError::DeviceUnavailable(e.to_string()));
        }
        let (result, current, _pending) =
            pipeline.state(gst::ClockTime::from_seconds(START_TIMEOUT_SECS));
        if result.is_err() || current != gst::State::Playing {
            let detail = bus_error(&pipeline)
                .unwrap_or_else(|| format!("pipeline stuck in {current:?}"));
            let _ = pipeline.set_state(gst::State::Null);
            return Err(CaptureError::DeviceUnavailable(detail));
        }

        Ok(running)
    }

    fn sample_to_image(sample: &gst::Sample) -> Result<RgbImage, String> {
        let caps = sample.caps().ok_or("sample without caps")?;
        let info = gst_video::VideoInfo::from_caps(caps).map_err(|e| e.to_string())?;
        let buffer = sample.buffer().ok_or("sample without buffer")?;
        let map = buffer.map_readable().map_err(|e| e.to_string())?;

        let width = info.width();
        let height = info.height();
        let stride = info.stride()[0] as usize;
        let row_len = width as usize * 3;
        let data = map.as_slice();
        if height == 0 || stride < row_len || data.len() < stride * (height as usize - 1) + row_len {
            return Err(format!(
                "buffer of {} bytes too small for {width}x{height} stride {stride}",
                data.len()
            ));
        }

        let mut pixels = Vec::with_capacity(row_len * height as usize);
        for row in data.chunks(stride).take(height as usize) {
            pixels.extend_from_slice(&row[..row_len]);
        }
        RgbImage::from_vec(width, height, pixels).ok_or_else(|| "frame size mismatch".to_string())
    }
}

/// First error message pending on the pipeline bus, if any.
fn bus_error(pipeline: &gst::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    while let Some(msg) = bus.pop() {
        match msg.view() {
            MessageView::Error(err) => {
                let name = err.src().map(|e| e.name().to_string());
                return Some(format!("{name:?}: {}", err.error()));
            }
            MessageView::Eos(..) => return Some("end of stream".to_string()),
            _ => (),
        }
    }
    None
}

impl CaptureDevice for GstCapture {
    fn open(&mut self) -> Result<(), CaptureError> {
        if self.running.is_some() {
            return Ok(());
        }
        log::info!("Opening camera {:?}", self.source);
        self.running = Some(self.start()?);
        log::info!("Camera streaming at {}x{}", self.width, self.height);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(running) = self.running.take() {
            if let Err(e) = running.pipeline.set_state(gst::State::Null) {
                log::error!("Failed to stop capture pipeline: {e}");
            }
            log::info!("Camera released");
        }
    }

    fn is_active(&self) -> bool {
        self.running.is_some()
    }

    fn capture_frame(&mut self) -> Result<Vec<u8>, CaptureError> {
        let Some(running) = &self.running else {
            return Err(CaptureError::NotActive);
        };

        if let Some(detail) = bus_error(&running.pipeline) {
            self.close();
            return Err(CaptureError::StreamLost(detail));
        }

        let sample = running
            .sink
            .try_pull_sample(gst::ClockTime::from_mseconds(FRAME_TIMEOUT_MS));
        let frame = match sample {
            Some(sample) => Self::sample_to_image(&sample),
            None if running.sink.is_eos() => Err("end of stream".to_string()),
            None => Err(format!("no frame within {FRAME_TIMEOUT_MS}ms")),
        };

        match frame {
            Ok(image) => encode_png(&image),
            Err(detail) => {
                self.close();
                Err(CaptureError::StreamLost(detail))
            }
        }
    }
}

impl Drop for GstCapture {
    fn drop(&mut self) {
        self.close();
    }
}
