use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("face detection failed: {0}")]
    Failure(String),
    #[error("face detection model failed to load: {0}")]
    ModelNotLoaded(String),
}

/// Domain interface for face detection.
///
/// Calls may be slow and may fail; callers never retry. Implementations may
/// be stateful, hence `&mut self`.
#[async_trait]
pub trait FaceDetector: Send {
    /// False while the model is still loading. Polls are skipped until then.
    fn is_ready(&mut self) -> bool {
        true
    }

    /// Returns every face found in `frame`, best candidate first.
    ///
    /// `return_tensors` asks for raw model tensors instead of plain
    /// coordinates; adapters without a tensor representation ignore it.
    async fn estimate_faces(
        &mut self,
        frame: &Frame,
        return_tensors: bool,
    ) -> Result<Vec<FaceRegion>, DetectionError>;
}

/// A detector shared between successive scan sessions.
///
/// The lock is held for the whole of a detection call, so at most one call
/// is ever outstanding.
pub type SharedDetector = Arc<tokio::sync::Mutex<Box<dyn FaceDetector>>>;

pub fn share(detector: impl FaceDetector + 'static) -> SharedDetector {
    Arc::new(tokio::sync::Mutex::new(Box::new(detector)))
}
