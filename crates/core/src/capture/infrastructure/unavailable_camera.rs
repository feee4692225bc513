use async_trait::async_trait;

use crate::capture::domain::media_capture::{CaptureError, MediaCapture, MediaStream};

/// Stand-in for hosts without any video input device.
///
/// Every request is rejected with `DeviceUnavailable`, which lets
/// upload-only front ends run the orchestrator without a camera.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableCamera;

#[async_trait]
impl MediaCapture for UnavailableCamera {
    async fn open_stream(&self) -> Result<Box<dyn MediaStream>, CaptureError> {
        Err(CaptureError::DeviceUnavailable("no video input device".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_always_unavailable() {
        let result = UnavailableCamera.open_stream().await;
        assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
    }
}
