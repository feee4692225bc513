use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::capture::domain::capture_manager::CameraHandle;
use crate::scan::attribute_estimator::AttributeResult;
use crate::scan::scan_loop::ScanLoopHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scan#{}", self.0)
    }
}

/// One scan attempt and everything it holds.
///
/// The session is the only owner of its camera. Ending or dropping it
/// cancels the loop and any pending transition and releases the camera.
pub struct ScanSession {
    id: SessionId,
    capture_token: CancellationToken,
    camera: Option<CameraHandle>,
    scan_loop: Option<ScanLoopHandle>,
    transition: Option<CancellationToken>,
    result: Option<AttributeResult>,
}

impl ScanSession {
    pub fn new(id: SessionId) -> Self {
        log::info!("{id} started");
        Self {
            id,
            capture_token: CancellationToken::new(),
            camera: None,
            scan_loop: None,
            transition: None,
            result: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Cancelled as soon as the session stops wanting the camera.
    pub fn capture_token(&self) -> CancellationToken {
        self.capture_token.clone()
    }

    pub fn attach_camera(&mut self, camera: CameraHandle) {
        self.camera = Some(camera);
    }

    pub fn attach_loop(&mut self, scan_loop: ScanLoopHandle) {
        self.scan_loop = Some(scan_loop);
    }

    pub fn holds_camera(&self) -> bool {
        self.camera.as_ref().is_some_and(|c| !c.is_released())
    }

    pub fn is_polling(&self) -> bool {
        self.scan_loop.as_ref().is_some_and(|l| !l.is_cancelled())
    }

    /// Attributes the session resolved with, if it got that far.
    pub fn result(&self) -> Option<AttributeResult> {
        self.result
    }

    /// Records the result and frees the camera. Returns the token guarding
    /// the delayed transition that presents it.
    pub fn resolve(&mut self, attributes: AttributeResult) -> CancellationToken {
        self.teardown_capture();
        self.result = Some(attributes);
        self.schedule_transition()
    }

    /// Token for a delayed transition; cancelled when the session ends.
    pub fn schedule_transition(&mut self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self.transition.replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Stops polling and gives the camera back.
    pub fn teardown_capture(&mut self) {
        if let Some(scan_loop) = self.scan_loop.take() {
            scan_loop.cancel();
        }
        self.capture_token.cancel();
        if let Some(mut camera) = self.camera.take() {
            camera.release();
        }
    }

    pub fn end(&mut self) {
        self.teardown_capture();
        if let Some(transition) = self.transition.take() {
            transition.cancel();
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.end();
        log::debug!("{} dropped", self.id);
    }
}
