use async_trait::async_trait;
use tokio::sync::oneshot::{self, error::TryRecvError};

use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

type LoadResult = Result<Box<dyn FaceDetector>, String>;

/// Detector whose model is still loading on a background thread.
///
/// Reports not-ready until the load finishes, so scanning can start
/// immediately and simply skips polls meanwhile. A failed load surfaces as
/// [`DetectionError::ModelNotLoaded`] on the next detection call.
pub struct BackgroundLoadedDetector {
    pending: Option<oneshot::Receiver<LoadResult>>,
    loaded: Option<Box<dyn FaceDetector>>,
    failure: Option<String>,
}

impl BackgroundLoadedDetector {
    /// Runs `load` on the blocking pool. Must be called within a tokio runtime.
    pub fn spawn<F, E>(load: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn FaceDetector>, E> + Send + 'static,
        E: std::fmt::Display,
    {
        let (tx, rx) = oneshot::channel();
        tokio::task::spawn_blocking(move || {
            let result = load().map_err(|e| e.to_string());
            match &result {
                Ok(_) => log::info!("Face detection model loaded"),
                Err(e) => log::error!("Face detection model failed to load: {e}"),
            }
            let _ = tx.send(result);
        });
        Self::from_receiver(rx)
    }

    pub fn from_receiver(rx: oneshot::Receiver<LoadResult>) -> Self {
        Self {
            pending: Some(rx),
            loaded: None,
            failure: None,
        }
    }

    fn poll_load(&mut self) {
        let Some(rx) = self.pending.as_mut() else {
            return;
        };
        match rx.try_recv() {
            Ok(Ok(detector)) => self.loaded = Some(detector),
            Ok(Err(e)) => self.failure = Some(e),
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Closed) => {
                self.failure = Some("model loader exited without a result".into())
            }
        }
        self.pending = None;
    }
}

#[async_trait]
impl FaceDetector for BackgroundLoadedDetector {
    fn is_ready(&mut self) -> bool {
        self.poll_load();
        self.pending.is_none()
    }

    async fn estimate_faces(
        &mut self,
        frame: &Frame,
        return_tensors: bool,
    ) -> Result<Vec<FaceRegion>, DetectionError> {
        self.poll_load();
        if let Some(detector) = self.loaded.as_mut() {
            return detector.estimate_faces(frame, return_tensors).await;
        }
        match &self.failure {
            Some(e) => Err(DetectionError::ModelNotLoaded(e.clone())),
            None => Ok(Vec::new()),
        }
    }
}
