//! Court occupancy from a live camera feed.
//!
//! # Pipeline
//!
//! camera frame → upright RGB → detector → postprocessor (filter + NMS)
//! → occupancy tracker (person boxes vs. court polygons) → status updater
//! (optimistic transaction against the court store).
//!
//! # Module Structure
//!
//! - `geometry`: points, boxes, closed polygons, overlap tests
//! - `court`: persisted complex/court records and region validation
//! - `frame`: camera frames, pixel format conversion, input tensors
//! - `detect`: detector backends, the detector slot, postprocessing
//! - `occupancy`: status board, tracker, inference throttle
//! - `updater` / `storage`: transactional status writes
//! - `session`: frame handoff, analysis worker, result delivery
//! - `ingest`, `config`: daemon plumbing

use std::time::{SystemTime, UNIX_EPOCH};

pub mod cancel;
pub mod config;
pub mod court;
pub mod detect;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod occupancy;
pub mod session;
pub mod storage;
pub mod updater;

pub use cancel::CancellationToken;
pub use court::{
    parse_points, validate_region, ComplexRecord, CourtRecord, CourtRegion, CourtStatus, PointData,
};
pub use detect::{
    Detection, DetectorBackend, DetectorSlot, FrameAnalysis, ModelSpec, PostprocessConfig,
    Postprocessor, StubBackend,
};
pub use error::{CourtError, Result};
pub use frame::{Frame, PixelFormat};
pub use geometry::{Point, Polygon, Rect};
pub use occupancy::{InferenceThrottle, OccupancyTracker, StatusBoard, StatusChange};
pub use session::{FrameSlot, Session, SessionConfig, SessionStats, SessionUpdate};
pub use storage::{CourtStore, InMemoryCourtStore, SqliteCourtStore, TransactionOutcome};
pub use updater::{RequestOutcome, StatusUpdater, UpdateCompletion};

/// Milliseconds since the Unix epoch. A clock before 1970 reads as zero.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
