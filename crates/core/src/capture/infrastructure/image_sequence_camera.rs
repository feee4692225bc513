use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::capture::domain::media_capture::{CaptureError, FrameSize, MediaCapture, MediaStream};
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

/// Serves a directory of still images as a live camera.
///
/// Frames are delivered in file-name order and loop back to the first image
/// when the sequence runs out. Images are decoded on the blocking pool when
/// the stream opens. Only one stream may be open at a time.
pub struct ImageSequenceCamera {
    dir: PathBuf,
    streaming: Arc<AtomicBool>,
}

impl ImageSequenceCamera {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            streaming: Arc::new(AtomicBool::new(false)),
        }
    }

    fn list_frames(&self) -> Result<Vec<PathBuf>, CaptureError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| self.map_io_error(e))?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image(path))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(CaptureError::DeviceUnavailable(format!(
                "no image frames in {}",
                self.dir.display()
            )));
        }
        Ok(paths)
    }

    fn map_io_error(&self, e: io::Error) -> CaptureError {
        let dir = self.dir.display();
        match e.kind() {
            io::ErrorKind::PermissionDenied => {
                CaptureError::PermissionDenied(format!("cannot read {dir}: {e}"))
            }
            io::ErrorKind::NotFound => {
                CaptureError::DeviceUnavailable(format!("{dir} does not exist"))
            }
            _ => CaptureError::DeviceUnavailable(format!("{dir}: {e}")),
        }
    }
}

#[async_trait]
impl MediaCapture for ImageSequenceCamera {
    async fn open_stream(&self) -> Result<Box<dyn MediaStream>, CaptureError> {
        let paths = self.list_frames()?;
        if self
            .streaming
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaptureError::DeviceUnavailable(format!(
                "{} is already streaming",
                self.dir.display()
            )));
        }
        // Frees the device again if decoding fails or this future is dropped.
        let lease = StreamLease(self.streaming.clone());

        let frames = tokio::task::spawn_blocking(move || decode_frames(&paths))
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(format!("frame decoding failed: {e}")))?;
        if frames.is_empty() {
            return Err(CaptureError::DeviceUnavailable(format!(
                "no readable image frames in {}",
                self.dir.display()
            )));
        }

        log::debug!(
            "Opened image sequence {} ({} frames)",
            self.dir.display(),
            frames.len()
        );
        Ok(Box::new(ImageSequenceStream {
            label: self.dir.display().to_string(),
            frames,
            cursor: 0,
            lease: Some(lease),
        }))
    }
}

/// Decodes every frame up front so grabbing one never touches the disk.
fn decode_frames(paths: &[PathBuf]) -> Vec<Frame> {
    paths
        .iter()
        .filter_map(|path| match image::open(path) {
            Ok(img) => Some(Frame::from_rgb_image(img.to_rgb8(), 0)),
            Err(e) => {
                log::warn!("Skipping unreadable frame {}: {e}", path.display());
                None
            }
        })
        .collect()
}

struct StreamLease(Arc<AtomicBool>);

impl Drop for StreamLease {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct ImageSequenceStream {
    label: String,
    frames: Vec<Frame>,
    cursor: usize,
    lease: Option<StreamLease>,
}

impl MediaStream for ImageSequenceStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn frame_size(&mut self) -> Result<Option<FrameSize>, CaptureError> {
        Ok(self.frames.first().map(|f| FrameSize {
            width: f.width(),
            height: f.height(),
        }))
    }

    fn grab_frame(&mut self) -> Option<Frame> {
        if !self.is_live() {
            return None;
        }
        let index = self.cursor;
        self.cursor += 1;
        Some(self.frames[index % self.frames.len()].with_index(index))
    }

    fn stop(&mut self) {
        self.lease = None;
    }

    fn is_live(&self) -> bool {
        self.lease.is_some()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_frame(dir: &Path, name: &str, width: u32, height: u32, shade: u8) {
        let mut img = image::RgbImage::new(width, height);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb([shade, shade, shade]);
        }
        img.save(dir.join(name)).unwrap();
    }

    #[tokio::test]
    async fn test_missing_directory_is_unavailable() {
        let camera = ImageSequenceCamera::new("/nonexistent/frames");
        let result = camera.open_stream().await;
        assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_directory_without_images_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let camera = ImageSequenceCamera::new(dir.path());
        let result = camera.open_stream().await;

        assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_reports_first_frame_size() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "000.png", 64, 48, 10);

        let camera = ImageSequenceCamera::new(dir.path());
        let mut stream = camera.open_stream().await.unwrap();

        assert_eq!(
            stream.frame_size().unwrap(),
            Some(FrameSize {
                width: 64,
                height: 48
            })
        );
    }

    #[tokio::test]
    async fn test_frames_cycle_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "b.png", 4, 4, 200);
        write_frame(dir.path(), "a.png", 4, 4, 100);

        let camera = ImageSequenceCamera::new(dir.path());
        let mut stream = camera.open_stream().await.unwrap();

        let shades: Vec<(usize, u8)> = (0..3)
            .map(|_| {
                let frame = stream.grab_frame().unwrap();
                (frame.index(), frame.data()[0])
            })
            .collect();
        assert_eq!(shades, vec![(0, 100), (1, 200), (2, 100)]);
    }

    #[tokio::test]
    async fn test_only_one_stream_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "000.png", 4, 4, 0);
        let camera = ImageSequenceCamera::new(dir.path());

        let mut first = camera.open_stream().await.unwrap();
        assert!(camera.open_stream().await.is_err());

        first.stop();
        assert!(camera.open_stream().await.is_ok());
    }

    #[tokio::test]
    async fn test_stopped_stream_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "000.png", 4, 4, 0);
        let camera = ImageSequenceCamera::new(dir.path());
        let mut stream = camera.open_stream().await.unwrap();

        stream.stop();
        stream.stop();

        assert!(!stream.is_live());
        assert!(stream.grab_frame().is_none());
    }

    #[tokio::test]
    async fn test_frames_are_decoded_when_stream_opens() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "000.png", 4, 4, 40);
        let camera = ImageSequenceCamera::new(dir.path());
        let mut stream = camera.open_stream().await.unwrap();

        std::fs::remove_file(dir.path().join("000.png")).unwrap();

        let frame = stream.grab_frame().unwrap();
        assert_eq!(frame.data()[0], 40);
        assert_eq!(stream.grab_frame().unwrap().index(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_frames_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("000.png"), b"not a png").unwrap();
        write_frame(dir.path(), "001.png", 4, 4, 90);
        let camera = ImageSequenceCamera::new(dir.path());
        let mut stream = camera.open_stream().await.unwrap();

        let shades: Vec<u8> = (0..2).map(|_| stream.grab_frame().unwrap().data()[0]).collect();

        assert_eq!(shades, vec![90, 90]);
    }

    #[tokio::test]
    async fn test_only_unreadable_frames_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("000.png"), b"not a png").unwrap();
        let camera = ImageSequenceCamera::new(dir.path());

        let result = camera.open_stream().await;

        assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
        write_frame(dir.path(), "001.png", 4, 4, 0);
        assert!(camera.open_stream().await.is_ok());
    }

    #[tokio::test]
    async fn test_dropping_stream_frees_camera() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "000.png", 4, 4, 0);
        let camera = ImageSequenceCamera::new(dir.path());

        drop(camera.open_stream().await.unwrap());

        assert!(camera.open_stream().await.is_ok());
    }
}
