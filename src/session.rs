//! One viewing session: frame handoff, analysis worker and result delivery.
//!
//! Threads:
//! - the frame producer calls `FrameSlot::offer` (keep-only-latest),
//! - one analysis worker converts, detects and sends `FrameAnalysis` values,
//! - status writers run store transactions and send completions,
//! - the caller of `Session::pump` owns the `StatusBoard` and applies both.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::court::{ComplexRecord, CourtStatus};
use crate::detect::{DetectorSlot, FrameAnalysis, PostprocessConfig, Postprocessor};
use crate::error::{CourtError, Result};
use crate::frame::Frame;
use crate::occupancy::{
    InferenceThrottle, OccupancyTracker, StatusBoard, StatusChange, INFERENCE_INTERVAL_MS,
};
use crate::storage::CourtStore;
use crate::updater::{RequestOutcome, StatusUpdater, UpdateCompletion};

const WORKER_POLL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionConfig {
    pub postprocess: PostprocessConfig,
    pub inference_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            postprocess: PostprocessConfig::default(),
            inference_interval: Duration::from_millis(INFERENCE_INTERVAL_MS),
        }
    }
}

/// Messages delivered to the session owner.
#[derive(Debug)]
pub enum SessionEvent {
    Analysis(FrameAnalysis),
    Completion(UpdateCompletion),
}

/// What `Session::pump` hands back for rendering and logging.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionUpdate {
    /// An analysed frame and the status changes it started.
    Frame {
        analysis: FrameAnalysis,
        changes: Vec<StatusChange>,
    },
    StatusApplied {
        court: String,
        status: CourtStatus,
    },
    UpdateFailed {
        court: String,
        error: CourtError,
    },
}

#[derive(Default)]
struct SlotState {
    latest: Option<Frame>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    replaced: AtomicU64,
    throttled: AtomicU64,
    failed: AtomicU64,
    analysed: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_received: u64,
    /// Frames overwritten by a newer one before the worker took them.
    pub frames_replaced: u64,
    pub frames_throttled: u64,
    pub frames_failed: u64,
    pub frames_analysed: u64,
}

/// Keep-only-latest frame handoff.
#[derive(Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
    counters: Counters,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand a frame to the worker, replacing any frame it has not taken yet.
    /// Frames offered after close are discarded.
    pub fn offer(&self, frame: Frame) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.closed {
            return;
        }
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        if state.latest.replace(frame).is_some() {
            self.counters.replaced.fetch_add(1, Ordering::Relaxed);
        }
        self.ready.notify_one();
    }

    /// Wait up to `timeout` for a frame. `None` on timeout or once closed.
    pub fn take(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            if state.closed {
                return None;
            }
            if let Some(frame) = state.latest.take() {
                return Some(frame);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            state = match self.ready.wait_timeout(state, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.closed = true;
        state.latest = None;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|s| s.closed).unwrap_or(true)
    }
}

struct Worker {
    frames: Arc<FrameSlot>,
    detector: Arc<DetectorSlot>,
    postprocessor: Postprocessor,
    throttle: InferenceThrottle,
    cancel: CancellationToken,
    events: Sender<SessionEvent>,
}

impl Worker {
    fn run(mut self) {
        log::debug!("analysis worker started");
        while !self.cancel.is_cancelled() {
            let Some(frame) = self.frames.take(WORKER_POLL) else {
                if self.frames.is_closed() {
                    break;
                }
                continue;
            };
            let Some(analysis) = self.analyse(frame) else {
                continue;
            };
            if self.cancel.is_cancelled() {
                break;
            }
            self.frames.counters.analysed.fetch_add(1, Ordering::Relaxed);
            if self.events.send(SessionEvent::Analysis(analysis)).is_err() {
                break;
            }
        }
        log::debug!("analysis worker stopped");
    }

    fn analyse(&mut self, frame: Frame) -> Option<FrameAnalysis> {
        let counters = &self.frames.counters;
        let now = Instant::now();
        if !self.throttle.is_open(now) {
            counters.throttled.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        // A frame that cannot be converted leaves the window open.
        let image = match frame.to_upright_rgb() {
            Ok(image) => image,
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("dropping frame: {}", e);
                return None;
            }
        };
        self.throttle.record_run(now);
        if self.cancel.is_cancelled() {
            return None;
        }
        match self.detector.detect(&image, &self.postprocessor) {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("inference failed: {}", e);
                None
            }
        }
    }
}

pub struct Session {
    complex_id: String,
    cancel: CancellationToken,
    frames: Arc<FrameSlot>,
    detector: Arc<DetectorSlot>,
    events: Receiver<SessionEvent>,
    board: StatusBoard,
    tracker: OccupancyTracker,
    updater: StatusUpdater,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    /// Start watching `complex` with an already loaded detector.
    pub fn start(
        complex: &ComplexRecord,
        store: Arc<dyn CourtStore>,
        detector: Arc<DetectorSlot>,
        config: SessionConfig,
    ) -> Result<Self> {
        let regions = complex.configured_regions();
        if regions.is_empty() {
            return Err(CourtError::config(format!(
                "complex {} has no configured court regions",
                complex.id
            )));
        }
        if !detector.is_loaded() {
            return Err(CourtError::inference("detector not initialized"));
        }
        if complex.has_unconfigured_courts() {
            log::info!("complex {} has courts without regions; they are not watched", complex.id);
        }
        log::info!(
            "session for {} watching {} court(s)",
            complex.id,
            regions.len()
        );

        let (tx, rx) = mpsc::channel();
        let cancel = CancellationToken::new();
        let frames = Arc::new(FrameSlot::new());
        let worker = Worker {
            frames: Arc::clone(&frames),
            detector: Arc::clone(&detector),
            postprocessor: Postprocessor::new(config.postprocess),
            throttle: InferenceThrottle::new(config.inference_interval),
            cancel: cancel.clone(),
            events: tx.clone(),
        };
        let handle = std::thread::Builder::new()
            .name("frame-analysis".to_string())
            .spawn(move || worker.run())
            .map_err(|e| CourtError::inference(format!("failed to start analysis worker: {}", e)))?;

        Ok(Self {
            complex_id: complex.id.clone(),
            cancel,
            frames,
            detector,
            events: rx,
            board: StatusBoard::from_complex(complex),
            tracker: OccupancyTracker::new(regions),
            updater: StatusUpdater::new(store, complex.id.clone(), tx),
            worker: Some(handle),
        })
    }

    pub fn complex_id(&self) -> &str {
        &self.complex_id
    }

    /// Shared handle for a frame producer thread.
    pub fn frame_slot(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.frames)
    }

    pub fn submit(&self, frame: Frame) {
        self.frames.offer(frame);
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    pub fn tracker(&self) -> &OccupancyTracker {
        &self.tracker
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn stats(&self) -> SessionStats {
        let c = &self.frames.counters;
        SessionStats {
            frames_received: c.received.load(Ordering::Relaxed),
            frames_replaced: c.replaced.load(Ordering::Relaxed),
            frames_throttled: c.throttled.load(Ordering::Relaxed),
            frames_failed: c.failed.load(Ordering::Relaxed),
            frames_analysed: c.analysed.load(Ordering::Relaxed),
        }
    }

    /// Wait up to `timeout` for the next worker result or store completion
    /// and apply it. Returns `None` on timeout or after cancellation.
    pub fn pump(&mut self, timeout: Duration) -> Option<SessionUpdate> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let event = match self.events.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
        };
        if self.cancel.is_cancelled() {
            return None;
        }

        match event {
            SessionEvent::Analysis(analysis) => {
                let changes = self
                    .tracker
                    .evaluate(&self.board, &analysis)
                    .into_iter()
                    .filter(|change| {
                        self.updater.request(&mut self.board, &change.court, change.to)
                            == RequestOutcome::Accepted
                    })
                    .collect();
                Some(SessionUpdate::Frame { analysis, changes })
            }
            SessionEvent::Completion(completion) => {
                let court = completion.court.clone();
                Some(match self.updater.complete(&mut self.board, completion) {
                    Ok(status) => SessionUpdate::StatusApplied { court, status },
                    Err(error) => SessionUpdate::UpdateFailed { court, error },
                })
            }
        }
    }

    /// Stop the worker and release the detector.
    pub fn shutdown(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.cancel.cancel();
        self.frames.close();
        self.detector.close();
        worker
            .join()
            .map_err(|_| CourtError::inference("analysis worker panicked"))?;
        let stats = self.stats();
        log::info!(
            "session for {} ended: {} frames received, {} analysed, {} updates pending",
            self.complex_id,
            stats.frames_received,
            stats.frames_analysed,
            self.board.pending_count()
        );
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            log::error!("session teardown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use std::thread;

    fn frame() -> Frame {
        Frame::new(vec![0; 2 * 2 * 3], 2, 2, PixelFormat::Rgb888)
    }

    #[test]
    fn slot_keeps_only_latest_frame() {
        let slot = FrameSlot::new();
        slot.offer(frame());
        slot.offer(frame().with_rotation(90));
        let taken = slot.take(Duration::from_millis(10)).unwrap();
        assert_eq!(taken.rotation_degrees, 90);
        assert!(slot.take(Duration::from_millis(10)).is_none());
        assert_eq!(slot.counters.received.load(Ordering::Relaxed), 2);
        assert_eq!(slot.counters.replaced.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn close_wakes_a_waiting_taker() {
        let slot = Arc::new(FrameSlot::new());
        let waiter = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.take(Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(20));
        slot.close();
        assert!(waiter.join().unwrap().is_none());

        slot.offer(frame());
        assert!(slot.take(Duration::from_millis(10)).is_none());
    }
}
