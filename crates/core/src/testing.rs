//! Fakes for the external collaborators, shared by the unit tests.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::capture::domain::media_capture::{CaptureError, FrameSize, MediaCapture, MediaStream};
use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
use crate::scan::attribute_estimator::AttributeResult;
use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;
use crate::ui::ui_sink::{UiSection, UiSink};
use crate::upload::photo_upload::UploadPreview;

pub const FAKE_FRAME_SIZE: FrameSize = FrameSize {
    width: 640,
    height: 480,
};

pub fn tiny_frame(index: usize) -> Frame {
    Frame::new(vec![0u8; 4 * 3 * 3], 4, 3, 3, index)
}

// ---------------------------------------------------------------------------
// Camera
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CameraStats {
    opened: AtomicUsize,
    stopped: AtomicUsize,
    stop_times: Mutex<Vec<Instant>>,
}

/// Observes a [`FakeCamera`] after it has been moved into the code under test.
#[derive(Clone, Default)]
pub struct CameraProbe(Arc<CameraStats>);

impl CameraProbe {
    pub fn opened(&self) -> usize {
        self.0.opened.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.0.stopped.load(Ordering::SeqCst)
    }

    pub fn last_stopped_at(&self) -> Option<Instant> {
        self.0.stop_times.lock().unwrap().last().copied()
    }
}

/// Camera whose streams report [`FAKE_FRAME_SIZE`] and serve tiny frames.
#[derive(Clone)]
pub struct FakeCamera {
    denying: bool,
    open_delay: Duration,
    ready_after_polls: Option<usize>,
    probe: CameraProbe,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self {
            denying: false,
            open_delay: Duration::ZERO,
            ready_after_polls: Some(0),
            probe: CameraProbe::default(),
        }
    }

    pub fn denying() -> Self {
        Self {
            denying: true,
            ..Self::new()
        }
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn ready_after_polls(mut self, polls: usize) -> Self {
        self.ready_after_polls = Some(polls);
        self
    }

    pub fn never_ready(mut self) -> Self {
        self.ready_after_polls = None;
        self
    }

    pub fn probe(&self) -> CameraProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl MediaCapture for FakeCamera {
    async fn open_stream(&self) -> Result<Box<dyn MediaStream>, CaptureError> {
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if self.denying {
            return Err(CaptureError::PermissionDenied("user declined".into()));
        }
        self.probe.0.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            live: true,
            polls: 0,
            ready_after_polls: self.ready_after_polls,
            next_index: 0,
            probe: self.probe.clone(),
        }))
    }
}

struct FakeStream {
    live: bool,
    polls: usize,
    ready_after_polls: Option<usize>,
    next_index: usize,
    probe: CameraProbe,
}

impl MediaStream for FakeStream {
    fn label(&self) -> &str {
        "fake camera"
    }

    fn frame_size(&mut self) -> Result<Option<FrameSize>, CaptureError> {
        let ready = matches!(self.ready_after_polls, Some(n) if self.polls >= n);
        self.polls += 1;
        Ok((self.live && ready).then_some(FAKE_FRAME_SIZE))
    }

    fn grab_frame(&mut self) -> Option<Frame> {
        if !self.live {
            return None;
        }
        let frame = tiny_frame(self.next_index);
        self.next_index += 1;
        Some(frame)
    }

    fn stop(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        self.probe.0.stopped.fetch_add(1, Ordering::SeqCst);
        self.probe.0.stop_times.lock().unwrap().push(Instant::now());
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DetectorStats {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    tensor_requests: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct DetectorProbe(Arc<DetectorStats>);

impl DetectorProbe {
    pub fn calls(&self) -> usize {
        self.0.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.0.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn tensor_requests(&self) -> usize {
        self.0.tensor_requests.load(Ordering::SeqCst)
    }
}

type Response = Result<Vec<FaceRegion>, DetectionError>;

/// Detector answering from a queue; detects nothing once the queue is empty.
pub struct FakeDetector {
    responses: VecDeque<Response>,
    latency: Duration,
    gate: Option<Arc<Notify>>,
    ready: Arc<AtomicBool>,
    probe: DetectorProbe,
}

impl FakeDetector {
    pub fn new() -> Self {
        Self {
            responses: VecDeque::new(),
            latency: Duration::ZERO,
            gate: None,
            ready: Arc::new(AtomicBool::new(true)),
            probe: DetectorProbe::default(),
        }
    }

    /// Answers `empty_polls` empty results, then one face.
    pub fn face_after(empty_polls: usize, region: FaceRegion) -> Self {
        let mut detector = Self::new();
        for _ in 0..empty_polls {
            detector = detector.then(Ok(vec![]));
        }
        detector.then(Ok(vec![region]))
    }

    pub fn then(mut self, response: Response) -> Self {
        self.responses.push_back(response);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every call blocks until the gate is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_ready_flag(mut self, ready: Arc<AtomicBool>) -> Self {
        self.ready = ready;
        self
    }

    pub fn probe(&self) -> DetectorProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl FaceDetector for FakeDetector {
    fn is_ready(&mut self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn estimate_faces(
        &mut self,
        _frame: &Frame,
        return_tensors: bool,
    ) -> Result<Vec<FaceRegion>, DetectionError> {
        let stats = &self.probe.0;
        stats.calls.fetch_add(1, Ordering::SeqCst);
        if return_tensors {
            stats.tensor_requests.fetch_add(1, Ordering::SeqCst);
        }
        let now_in_flight = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.responses.pop_front().unwrap_or(Ok(vec![]))
    }
}

// ---------------------------------------------------------------------------
// UI
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum UiEvent {
    Section(UiSection),
    Attributes(AttributeResult),
    Overlay(Option<FaceRegion>),
    Notification(String),
    Dismissed,
    UploadPreview(PathBuf),
    StylePreview(String),
}

/// Records every UI call with the (simulated) time it happened.
#[derive(Clone, Default)]
pub struct RecordingUi {
    events: Arc<Mutex<Vec<(Instant, UiEvent)>>>,
}

impl RecordingUi {
    fn record(&self, event: UiEvent) {
        self.events.lock().unwrap().push((Instant::now(), event));
    }

    pub fn timed_events(&self) -> Vec<(Instant, UiEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<UiEvent> {
        self.timed_events().into_iter().map(|(_, e)| e).collect()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Notification(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn sections(&self) -> Vec<UiSection> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Section(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn attributes(&self) -> Vec<AttributeResult> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Attributes(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    /// When `event` was first recorded.
    pub fn time_of(&self, event: &UiEvent) -> Option<Instant> {
        self.timed_events()
            .into_iter()
            .find(|(_, e)| e == event)
            .map(|(t, _)| t)
    }
}

impl UiSink for RecordingUi {
    fn show_section(&mut self, section: UiSection) {
        self.record(UiEvent::Section(section));
    }

    fn publish_attributes(&mut self, attributes: &AttributeResult) {
        self.record(UiEvent::Attributes(*attributes));
    }

    fn draw_overlay(&mut self, region: Option<&FaceRegion>) {
        self.record(UiEvent::Overlay(region.copied()));
    }

    fn show_notification(&mut self, message: &str) {
        self.record(UiEvent::Notification(message.to_string()));
    }

    fn dismiss_notification(&mut self) {
        self.record(UiEvent::Dismissed);
    }

    fn show_upload_preview(&mut self, preview: &UploadPreview) {
        self.record(UiEvent::UploadPreview(preview.path.clone()));
    }

    fn show_style_preview(&mut self, style: &str) {
        self.record(UiEvent::StylePreview(style.to_string()));
    }
}
