use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::capture::domain::media_capture::FrameSource;
use crate::detection::domain::face_detector::{DetectionError, SharedDetector};
use crate::shared::face_region::FaceRegion;

/// What one completed poll produced.
#[derive(Clone, Debug, PartialEq)]
pub enum LoopEvent {
    /// Nothing usable in this frame. Reported every empty cycle.
    NoFace,
    /// First face found. The loop has stopped.
    Detected(FaceRegion),
    /// The detector failed. The loop has stopped.
    Failed(DetectionError),
}

/// Polls a frame source through the detector at a fixed interval until a
/// face is found, detection fails or the loop is cancelled.
///
/// Polls never overlap: a slow detection call delays the next tick and any
/// ticks missed meanwhile are skipped, not replayed.
#[derive(Clone, Copy, Debug)]
pub struct ScanLoop {
    poll_interval: Duration,
}

impl ScanLoop {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Spawns the loop on the current runtime. `report` is called from the
    /// loop task; after cancellation it is never called again.
    pub fn start<S, F>(&self, source: S, detector: SharedDetector, report: F) -> ScanLoopHandle
    where
        S: FrameSource + 'static,
        F: FnMut(LoopEvent) + Send + 'static,
    {
        let token = CancellationToken::new();
        let task = tokio::spawn(run(
            source,
            detector,
            report,
            self.poll_interval,
            token.clone(),
        ));
        ScanLoopHandle {
            token,
            task: Some(task),
        }
    }
}

async fn run<S, F>(
    mut source: S,
    detector: SharedDetector,
    mut report: F,
    poll_interval: Duration,
    token: CancellationToken,
) where
    S: FrameSource,
    F: FnMut(LoopEvent),
{
    let mut ticks = time::interval_at(Instant::now() + poll_interval, poll_interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticks.tick() => {}
        }
        if !source.is_ready() {
            continue;
        }

        // Held for the whole call: at most one detection is ever outstanding.
        let mut detector = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            guard = detector.lock() => guard,
        };
        if !detector.is_ready() {
            log::trace!("Detector still loading, skipping poll");
            continue;
        }
        let Some(frame) = source.capture_frame() else {
            continue;
        };
        let result = detector.estimate_faces(&frame, false).await;
        drop(detector);

        if token.is_cancelled() {
            log::debug!("Discarding detection for frame {} after cancel", frame.index());
            break;
        }

        match result {
            Ok(regions) => match regions.into_iter().next() {
                None => report(LoopEvent::NoFace),
                Some(region) if !region.is_well_formed() => {
                    log::warn!(
                        "Skipping frame {}: malformed region {}x{}",
                        frame.index(),
                        region.width(),
                        region.height()
                    );
                    report(LoopEvent::NoFace);
                }
                Some(region) => {
                    log::debug!("Face found in frame {}", frame.index());
                    report(LoopEvent::Detected(region));
                    break;
                }
            },
            Err(e) => {
                log::error!("Detection failed on frame {}: {e}", frame.index());
                report(LoopEvent::Failed(e));
                break;
            }
        }
    }
}

/// Cancels the loop when dropped.
pub struct ScanLoopHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ScanLoopHandle {
    /// Stops scheduling polls. An in-flight detection runs to completion
    /// but its result is dropped.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the loop task to exit.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("Scan loop task failed: {e}");
            }
        }
    }
}

impl Drop for ScanLoopHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
