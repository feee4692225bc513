use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::capture::domain::capture_manager::{CameraHandle, CaptureManager, VideoSurface};
use crate::capture::domain::media_capture::{CaptureError, MediaCapture};
use crate::detection::domain::face_detector::SharedDetector;
use crate::scan::attribute_estimator::{self, AttributeResult, FaceShape};
use crate::scan::scan_config::ScanConfig;
use crate::scan::scan_loop::{LoopEvent, ScanLoop};
use crate::scan::scan_session::{ScanSession, SessionId};
use crate::shared::constants::messages;
use crate::shared::face_region::FaceRegion;
use crate::ui::ui_sink::{UiSection, UiSink};
use crate::upload::photo_upload::{self, UploadError, UploadPreview};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum ScanState {
    #[default]
    Idle,
    Capturing,
    Scanning,
    Resolved,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a scan session ended.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum ScanOutcome {
    Resolved(AttributeResult),
    Failed(String),
    Aborted,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum UploadOutcome {
    Analyzed(AttributeResult),
    Failed(String),
}

/// Snapshot of the flow, published after every change.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ScanStatus {
    pub state: ScanState,
    pub section: UiSection,
    /// Last attributes shown in the label slots.
    pub attributes: Option<AttributeResult>,
    pub last_scan: Option<ScanOutcome>,
    pub last_upload: Option<UploadOutcome>,
    pub scans_finished: u64,
    pub uploads_finished: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    StartScan,
    Abort,
    Navigate(UiSection),
    Upload(PathBuf),
    SelectHairstyle(String),
    Shutdown,
}

/// Completions of the orchestrator's own suspension points.
enum Event {
    CaptureFinished {
        session: SessionId,
        result: Result<(CameraHandle, VideoSurface), CaptureError>,
    },
    Loop {
        session: SessionId,
        event: LoopEvent,
    },
    PresentationElapsed {
        session: SessionId,
    },
    NotificationExpired {
        id: u64,
    },
    UploadDecoded {
        id: u64,
        result: Result<UploadPreview, UploadError>,
    },
    UploadAnalyzed {
        id: u64,
    },
}

struct PendingUpload {
    id: u64,
    token: CancellationToken,
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Drives scans from user commands to a UI outcome.
///
/// Runs as a single task. Camera acquisition, each detection poll and the
/// delayed transitions run as separate tasks that post their completion
/// back tagged with the session that started them; completions for a
/// session that is no longer live are dropped, which also releases any
/// camera they carry.
pub struct ScanOrchestrator {
    capture: Arc<CaptureManager>,
    detector: SharedDetector,
    ui: Box<dyn UiSink>,
    config: ScanConfig,
    scan_loop: ScanLoop,
    session: Option<ScanSession>,
    next_session_id: u64,
    /// Last camera acquisition task. A new one waits for it to exit.
    capture_task: Option<JoinHandle<()>>,
    /// Held while a capture task hands over its camera and while a session
    /// gives up its capture token, so a camera is never queued after abort.
    capture_gate: Arc<Mutex<()>>,
    notification_id: u64,
    upload: Option<PendingUpload>,
    next_upload_id: u64,
    status: ScanStatus,
    status_tx: watch::Sender<ScanStatus>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
}

impl ScanOrchestrator {
    pub fn new(
        camera: Arc<dyn MediaCapture>,
        detector: SharedDetector,
        ui: Box<dyn UiSink>,
        config: ScanConfig,
    ) -> Self {
        let capture = CaptureManager::new(camera)
            .with_bind_timing(config.bind_timeout, config.bind_poll_interval);
        let status = ScanStatus::default();
        let (status_tx, _) = watch::channel(status.clone());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            capture: Arc::new(capture),
            detector,
            ui,
            scan_loop: ScanLoop::new(config.poll_interval),
            config,
            session: None,
            next_session_id: 1,
            capture_task: None,
            capture_gate: Arc::default(),
            notification_id: 0,
            upload: None,
            next_upload_id: 1,
            status,
            status_tx,
            events_tx,
            events_rx,
        }
    }

    /// Starts the orchestrator on the current runtime.
    ///
    /// It stops on [`Command::Shutdown`] or once every handle is dropped.
    pub fn spawn(self) -> (OrchestratorHandle, JoinHandle<()>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let handle = OrchestratorHandle {
            commands,
            status: self.status_tx.subscribe(),
        };
        (handle, tokio::spawn(self.run(rx)))
    }

    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        log::debug!("Scan orchestrator running");
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                Some(event) = self.events_rx.recv() => self.on_event(event),
            }
        }
        self.shut_down();
    }

    fn on_command(&mut self, command: Command) {
        log::debug!("Command: {command:?}");
        match command {
            Command::StartScan => self.start_scan(),
            Command::Abort => self.abort(),
            Command::Navigate(section) => self.navigate(section),
            Command::Upload(path) => self.start_upload(path),
            Command::SelectHairstyle(name) => self.select_hairstyle(&name),
            Command::Shutdown => {}
        }
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::CaptureFinished { session, result } => self.on_capture_finished(session, result),
            Event::Loop { session, event } => self.on_loop_event(session, event),
            Event::PresentationElapsed { session } => self.on_presentation_elapsed(session),
            Event::NotificationExpired { id } => {
                if id == self.notification_id {
                    self.ui.dismiss_notification();
                }
            }
            Event::UploadDecoded { id, result } => self.on_upload_decoded(id, result),
            Event::UploadAnalyzed { id } => self.on_upload_analyzed(id),
        }
    }

    // -----------------------------------------------------------------------
    // Scanning
    // -----------------------------------------------------------------------

    fn start_scan(&mut self) {
        if let Some(session) = &self.session {
            log::warn!("Rejecting scan request: {} is still live", session.id());
            self.notify(messages::SCAN_IN_PROGRESS);
            return;
        }

        // Cameras still queued from an earlier session are released here.
        while let Ok(event) = self.events_rx.try_recv() {
            self.on_event(event);
        }

        let id = SessionId(self.next_session_id);
        self.next_session_id += 1;
        let session = ScanSession::new(id);
        let token = session.capture_token();
        self.session = Some(session);

        self.show_section(UiSection::FaceScan);
        self.set_state(ScanState::Capturing);

        let previous = self.capture_task.take();
        let gate = self.capture_gate.clone();
        let capture = self.capture.clone();
        let events = self.events_tx.clone();
        self.capture_task = Some(tokio::spawn(async move {
            // An abandoned acquisition holds the device until its task exits.
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    log::error!("Camera acquisition task failed: {e}");
                }
            }
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    log::debug!("{id}: camera acquisition abandoned");
                    return;
                }
                result = capture.open() => result,
            };
            let _gate = lock(&gate);
            if token.is_cancelled() {
                log::debug!("{id}: releasing camera acquired after abort");
                return;
            }
            let _ = events.send(Event::CaptureFinished {
                session: id,
                result,
            });
        }));
    }

    fn on_capture_finished(
        &mut self,
        id: SessionId,
        result: Result<(CameraHandle, VideoSurface), CaptureError>,
    ) {
        let Some(session) = self.session.as_mut().filter(|s| s.id() == id) else {
            log::debug!("Dropping camera result for stale {id}");
            return;
        };

        match result {
            Ok((camera, surface)) => {
                session.attach_camera(camera);
                let events = self.events_tx.clone();
                let scan_loop = self
                    .scan_loop
                    .start(surface, self.detector.clone(), move |event| {
                        let _ = events.send(Event::Loop { session: id, event });
                    });
                session.attach_loop(scan_loop);
                self.set_state(ScanState::Scanning);
            }
            Err(e) => {
                log::warn!("{id}: camera acquisition failed: {e}");
                self.end_session(Some(e.to_string()));
                self.notify(match e {
                    CaptureError::PermissionDenied(_) => messages::CAMERA_DENIED,
                    CaptureError::DeviceUnavailable(_) => messages::CAMERA_UNAVAILABLE,
                });
            }
        }
    }

    fn on_loop_event(&mut self, id: SessionId, event: LoopEvent) {
        if !self.is_live(id) || self.status.state != ScanState::Scanning {
            log::debug!("Dropping detection result for stale {id}");
            return;
        }
        match event {
            LoopEvent::NoFace => self.ui.draw_overlay(None),
            LoopEvent::Detected(region) => self.resolve(id, region),
            LoopEvent::Failed(e) => {
                self.end_session(Some(e.to_string()));
                self.notify(messages::DETECTION_FAILED);
            }
        }
    }

    fn resolve(&mut self, id: SessionId, region: FaceRegion) {
        let attributes = match attribute_estimator::estimate(&region) {
            Ok(attributes) => attributes,
            Err(e) => {
                self.end_session(Some(e.to_string()));
                self.notify(messages::DETECTION_FAILED);
                return;
            }
        };
        log::info!("{id}: face shape {}", attributes.face_shape);

        self.ui.draw_overlay(Some(&region));
        self.publish_attributes(attributes);
        self.notify(messages::ANALYSIS_COMPLETE);

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let transition = session.resolve(attributes);
        self.set_state(ScanState::Resolved);

        let delay = self.config.presentation_delay;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = transition.cancelled() => {}
                _ = time::sleep(delay) => {
                    let _ = events.send(Event::PresentationElapsed { session: id });
                }
            }
        });
    }

    fn on_presentation_elapsed(&mut self, id: SessionId) {
        if !self.is_live(id) || self.status.state != ScanState::Resolved {
            log::debug!("Dropping transition for stale {id}");
            return;
        }
        self.show_section(UiSection::Hairstyles);
        self.end_session(None);
    }

    fn abort(&mut self) {
        if self.session.is_none() {
            log::debug!("Nothing to abort");
            return;
        }
        self.end_session(None);
    }

    fn navigate(&mut self, section: UiSection) {
        if section == self.status.section {
            return;
        }
        if self.session.is_some() {
            log::info!("Leaving {} ends the live scan", self.status.section);
            self.end_session(None);
        }
        self.show_section(section);
    }

    /// Ends the live session, if any, and returns to idle.
    ///
    /// The camera is released and the loop cancelled before this returns.
    fn end_session(&mut self, failure: Option<String>) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        {
            let _gate = lock(&self.capture_gate);
            session.end();
        }
        let outcome = match (failure, session.result()) {
            (Some(reason), _) => ScanOutcome::Failed(reason),
            (None, Some(attributes)) => ScanOutcome::Resolved(attributes),
            (None, None) => ScanOutcome::Aborted,
        };
        log::info!("{} finished: {outcome:?}", session.id());
        self.status.last_scan = Some(outcome);
        self.status.scans_finished += 1;
        self.set_state(ScanState::Idle);
    }

    fn is_live(&self, id: SessionId) -> bool {
        self.session.as_ref().is_some_and(|s| s.id() == id)
    }

    // -----------------------------------------------------------------------
    // Upload
    // -----------------------------------------------------------------------

    fn start_upload(&mut self, path: PathBuf) {
        let id = self.next_upload_id;
        self.next_upload_id += 1;
        let token = CancellationToken::new();
        if self
            .upload
            .replace(PendingUpload {
                id,
                token: token.clone(),
            })
            .is_some()
        {
            log::debug!("Upload {id} supersedes the pending one");
        }
        log::info!("Upload {id}: {}", path.display());

        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                result = photo_upload::decode_photo_async(path) => result,
            };
            let _ = events.send(Event::UploadDecoded { id, result });
        });
    }

    fn on_upload_decoded(&mut self, id: u64, result: Result<UploadPreview, UploadError>) {
        let Some(upload) = self.upload.as_ref().filter(|u| u.id == id) else {
            return;
        };
        match result {
            Ok(preview) => {
                self.ui.show_upload_preview(&preview);
                let token = upload.token.clone();
                let delay = self.config.upload_analysis_delay;
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {}
                        _ = time::sleep(delay) => {
                            let _ = events.send(Event::UploadAnalyzed { id });
                        }
                    }
                });
            }
            Err(e) => {
                log::warn!("Upload {id} failed: {e}");
                self.upload = None;
                self.notify(messages::UPLOAD_UNREADABLE);
                self.finish_upload(UploadOutcome::Failed(e.to_string()));
            }
        }
    }

    fn on_upload_analyzed(&mut self, id: u64) {
        if !self.upload.as_ref().is_some_and(|u| u.id == id) {
            return;
        }
        self.upload = None;
        // Uploaded photos are not run through detection.
        let attributes = AttributeResult::with_shape(FaceShape::Oval);
        self.publish_attributes(attributes);
        self.notify(messages::ANALYSIS_COMPLETE);
        self.finish_upload(UploadOutcome::Analyzed(attributes));
    }

    fn finish_upload(&mut self, outcome: UploadOutcome) {
        self.status.last_upload = Some(outcome);
        self.status.uploads_finished += 1;
        self.publish_status();
    }

    // -----------------------------------------------------------------------
    // UI
    // -----------------------------------------------------------------------

    fn select_hairstyle(&mut self, name: &str) {
        if self.status.section != UiSection::Hairstyles {
            log::debug!("Ignoring hairstyle selection outside the gallery");
            return;
        }
        self.notify(&format!("{name} selected!"));
        self.ui.show_style_preview(name);
    }

    /// Shows `message` and schedules its dismissal. A newer message takes
    /// over the dismissal.
    fn notify(&mut self, message: &str) {
        self.notification_id += 1;
        let id = self.notification_id;
        self.ui.show_notification(message);

        let ttl = self.config.notification_ttl;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            time::sleep(ttl).await;
            let _ = events.send(Event::NotificationExpired { id });
        });
    }

    fn publish_attributes(&mut self, attributes: AttributeResult) {
        self.ui.publish_attributes(&attributes);
        self.status.attributes = Some(attributes);
        self.publish_status();
    }

    fn show_section(&mut self, section: UiSection) {
        if self.status.section == section {
            return;
        }
        log::info!("Showing {section}");
        self.ui.show_section(section);
        self.status.section = section;
        self.publish_status();
    }

    fn set_state(&mut self, state: ScanState) {
        if self.status.state != state {
            log::info!("Scan state {} -> {state}", self.status.state);
            self.status.state = state;
        }
        self.publish_status();
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.status.clone());
    }

    fn shut_down(&mut self) {
        self.upload = None;
        self.end_session(None);
        log::debug!("Scan orchestrator stopped");
    }
}

fn lock(gate: &Mutex<()>) -> MutexGuard<'_, ()> {
    gate.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable front end to a running [`ScanOrchestrator`].
#[derive(Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ScanStatus>,
}

impl OrchestratorHandle {
    pub fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            log::warn!("Scan orchestrator has stopped; command ignored");
        }
    }

    pub fn start_scan(&self) {
        self.send(Command::StartScan);
    }

    pub fn abort(&self) {
        self.send(Command::Abort);
    }

    pub fn navigate(&self, section: UiSection) {
        self.send(Command::Navigate(section));
    }

    pub fn upload(&self, path: impl Into<PathBuf>) {
        self.send(Command::Upload(path.into()));
    }

    pub fn select_hairstyle(&self, name: impl Into<String>) {
        self.send(Command::SelectHairstyle(name.into()));
    }

    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    pub fn status(&self) -> ScanStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScanStatus> {
        self.status.clone()
    }

    /// Starts a scan and waits for the next scan outcome.
    ///
    /// If a scan is already live the request is rejected and this waits for
    /// that scan instead. `None` if the orchestrator stops first.
    pub async fn scan(&self) -> Option<ScanOutcome> {
        let mut status = self.subscribe();
        let seen = status.borrow_and_update().scans_finished;
        self.start_scan();
        status
            .wait_for(|s| s.scans_finished > seen)
            .await
            .ok()
            .and_then(|s| s.last_scan.clone())
    }

    /// Uploads a photo and waits for its analysis.
    pub async fn analyze_upload(&self, path: impl Into<PathBuf>) -> Option<UploadOutcome> {
        let mut status = self.subscribe();
        let seen = status.borrow_and_update().uploads_finished;
        self.upload(path);
        status
            .wait_for(|s| s.uploads_finished > seen)
            .await
            .ok()
            .and_then(|s| s.last_upload.clone())
    }

    pub async fn wait_for_state(&self, state: ScanState) -> Option<ScanStatus> {
        self.subscribe()
            .wait_for(|s| s.state == state)
            .await
            .ok()
            .map(|s| s.clone())
    }
}
