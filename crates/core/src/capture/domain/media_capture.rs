use async_trait::async_trait;
use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

/// Domain interface for the platform's camera API.
///
/// Mirrors the getUserMedia contract: either a live stream comes back or the
/// request is rejected because the user declined or no device exists.
#[async_trait]
pub trait MediaCapture: Send + Sync {
    async fn open_stream(&self) -> Result<Box<dyn MediaStream>, CaptureError>;
}

/// A live camera stream.
///
/// After `stop` the hardware tracks are ended: `is_live` turns false and
/// `grab_frame` yields nothing.
pub trait MediaStream: Send {
    /// Human-readable device name, used in logs.
    fn label(&self) -> &str;

    /// Frame dimensions, or `None` until the first frame's metadata is known.
    fn frame_size(&mut self) -> Result<Option<FrameSize>, CaptureError>;

    fn grab_frame(&mut self) -> Option<Frame>;

    fn stop(&mut self);

    fn is_live(&self) -> bool;
}

/// Anything the scan loop can pull frames from.
pub trait FrameSource: Send {
    /// False while the underlying surface has no frame to offer.
    fn is_ready(&self) -> bool;

    fn capture_frame(&mut self) -> Option<Frame>;
}
