use std::time::Duration;

use capture_common::{build_device, with_capture, CaptureError, CaptureSource};

/// Frames taken in one capture session. `error` is set when the device
/// failed partway; the frames taken before that are still usable.
#[derive(Debug, Default)]
pub struct Snapshots {
    pub frames: Vec<Vec<u8>>,
    pub error: Option<CaptureError>,
}

/// Opens the device once, takes `count` PNG snapshots `interval` apart and
/// releases the device again, on every path.
pub async fn take_snapshots(
    source: CaptureSource,
    width: u32,
    height: u32,
    count: usize,
    interval: Duration,
) -> Snapshots {
    let task = tokio::task::spawn_blocking(move || {
        let mut device = match build_device(&source, width, height) {
            Ok(device) => device,
            Err(err) => {
                return Snapshots {
                    frames: Vec::new(),
                    error: Some(err),
                }
            }
        };
        log::info!("Capturing {count} frames from {source}");

        let outcome = with_capture(&mut device, |active| {
            let mut snapshots = Snapshots::default();
            for i in 0..count {
                if i > 0 && !interval.is_zero() {
                    std::thread::sleep(interval);
                }
                match active.capture_frame() {
                    Ok(frame) => snapshots.frames.push(frame),
                    Err(err) => {
                        snapshots.error = Some(err);
                        break;
                    }
                }
            }
            snapshots
        });

        outcome.unwrap_or_else(|err| Snapshots {
            frames: Vec::new(),
            error: Some(err),
        })
    });

    task.await.unwrap_or_else(|err| Snapshots {
        frames: Vec::new(),
        error: Some(CaptureError::StreamLost(format!("capture task failed: {err}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rutting_common::asset::CAPTURE_MIME;
    use rutting_common::AssetSet;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

    #[tokio::test]
    async fn test_fake_snapshots() {
        let snapshots = take_snapshots(CaptureSource::Fake, 16, 8, 3, Duration::ZERO).await;
        assert!(snapshots.error.is_none());
        assert_eq!(snapshots.frames.len(), 3);
        assert!(snapshots.frames.iter().all(|f| f.starts_with(PNG_MAGIC)));
    }

    #[tokio::test]
    async fn test_captured_asset_mime_matches_frame_encoding() {
        let snapshots = take_snapshots(CaptureSource::Fake, 16, 8, 1, Duration::ZERO).await;
        let mut set = AssetSet::new();
        let frame = snapshots.frames.into_iter().next().unwrap();
        let id = set.add_from_capture(frame);

        let asset = set.get(id).unwrap();
        assert_eq!(asset.mime(), CAPTURE_MIME);
        assert!(asset.bytes().starts_with(PNG_MAGIC));
    }

    #[tokio::test]
    async fn test_zero_count_opens_nothing_useful() {
        let snapshots = take_snapshots(CaptureSource::Fake, 16, 8, 0, Duration::ZERO).await;
        assert!(snapshots.frames.is_empty());
        assert!(snapshots.error.is_none());
    }

    #[cfg(not(feature = "gstreamer"))]
    #[tokio::test]
    async fn test_live_source_without_gstreamer_is_unavailable() {
        let snapshots = take_snapshots(
            CaptureSource::Device("/dev/video0".to_string()),
            16,
            8,
            1,
            Duration::ZERO,
        )
        .await;
        assert!(snapshots.frames.is_empty());
        assert!(matches!(
            snapshots.error,
            Some(CaptureError::DeviceUnavailable(_))
        ));
    }
}
