use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{self, Instant};

use crate::capture::domain::media_capture::{
    CaptureError, FrameSize, FrameSource, MediaCapture, MediaStream,
};
use crate::shared::constants::{BIND_POLL_INTERVAL, BIND_TIMEOUT};
use crate::shared::frame::Frame;

type SharedStream = Arc<Mutex<Box<dyn MediaStream>>>;

fn lock(stream: &SharedStream) -> MutexGuard<'_, Box<dyn MediaStream>> {
    stream.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Grants exclusive access to one camera.
///
/// Only one [`CameraHandle`] can be outstanding at a time; a second
/// `acquire` fails with `DeviceUnavailable` until the first is released.
pub struct CaptureManager {
    capture: Arc<dyn MediaCapture>,
    in_use: Arc<AtomicBool>,
    next_id: AtomicU64,
    bind_timeout: Duration,
    bind_poll_interval: Duration,
}

impl CaptureManager {
    pub fn new(capture: Arc<dyn MediaCapture>) -> Self {
        Self {
            capture,
            in_use: Arc::new(AtomicBool::new(false)),
            next_id: AtomicU64::new(1),
            bind_timeout: BIND_TIMEOUT,
            bind_poll_interval: BIND_POLL_INTERVAL,
        }
    }

    pub fn with_bind_timing(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.bind_timeout = timeout;
        self.bind_poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    /// True while a handle is outstanding (the camera-in-use indicator).
    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    pub async fn acquire(&self) -> Result<CameraHandle, CaptureError> {
        if self
            .in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaptureError::DeviceUnavailable(
                "camera is held by another session".into(),
            ));
        }
        // Taken before awaiting so a dropped acquire future still frees the device.
        let lease = DeviceLease(self.in_use.clone());

        let stream = self.capture.open_stream().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        log::info!("Camera {id} acquired ({})", stream.label());

        Ok(CameraHandle {
            id,
            stream: Arc::new(Mutex::new(stream)),
            lease: Some(lease),
        })
    }

    /// Attaches the handle's stream to a video surface.
    ///
    /// Resolves once the first frame's dimensions are known, or fails with
    /// `DeviceUnavailable` if none arrive within the bind timeout.
    pub async fn bind(&self, handle: &CameraHandle) -> Result<VideoSurface, CaptureError> {
        let deadline = Instant::now() + self.bind_timeout;
        loop {
            if handle.is_released() {
                return Err(CaptureError::DeviceUnavailable(
                    "camera was released before it produced a frame".into(),
                ));
            }
            let size = lock(&handle.stream).frame_size()?;
            if let Some(size) = size {
                log::debug!(
                    "Camera {} bound at {}x{}",
                    handle.id,
                    size.width,
                    size.height
                );
                return Ok(VideoSurface {
                    stream: handle.stream.clone(),
                    size,
                });
            }
            if Instant::now() >= deadline {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "no frames received within {}ms",
                    self.bind_timeout.as_millis()
                )));
            }
            time::sleep(self.bind_poll_interval).await;
        }
    }

    /// Acquire and bind in one step, releasing the handle if binding fails.
    pub async fn open(&self) -> Result<(CameraHandle, VideoSurface), CaptureError> {
        let mut handle = self.acquire().await?;
        match self.bind(&handle).await {
            Ok(surface) => Ok((handle, surface)),
            Err(e) => {
                self.release(&mut handle);
                Err(e)
            }
        }
    }

    /// Stops the stream and frees the device. Safe to call repeatedly.
    pub fn release(&self, handle: &mut CameraHandle) {
        handle.release();
    }
}

/// Clears the in-use flag when dropped.
struct DeviceLease(Arc<AtomicBool>);

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Exclusive ownership of an acquired camera.
///
/// Dropping the handle releases the camera, so every exit path of the
/// owner gives the device back.
pub struct CameraHandle {
    id: u64,
    stream: SharedStream,
    lease: Option<DeviceLease>,
}

impl CameraHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_released(&self) -> bool {
        self.lease.is_none()
    }

    pub fn release(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        lock(&self.stream).stop();
        drop(lease);
        log::info!("Camera {} released", self.id);
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for CameraHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraHandle")
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Live view of a bound camera stream.
///
/// Shares the stream with its [`CameraHandle`]; once the handle is released
/// the surface stops producing frames.
pub struct VideoSurface {
    stream: SharedStream,
    size: FrameSize,
}

impl VideoSurface {
    pub fn size(&self) -> FrameSize {
        self.size
    }
}

impl FrameSource for VideoSurface {
    fn is_ready(&self) -> bool {
        lock(&self.stream).is_live()
    }

    fn capture_frame(&mut self) -> Option<Frame> {
        lock(&self.stream).grab_frame()
    }
}
