//! Per-court occupancy decisions.
//!
//! `OccupancyTracker` maps person detections onto court polygons and compares
//! the verdict with the cached status held in a `StatusBoard`. The board is
//! owned by the delivery context; nothing here mutates it.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::court::{ComplexRecord, CourtRegion, CourtStatus};
use crate::detect::{Detection, FrameAnalysis};
use crate::geometry::rect_overlaps_polygon;

/// Default minimum spacing between analysed frames.
pub const INFERENCE_INTERVAL_MS: u64 = 3000;

/// A requested transition for one court.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusChange {
    pub court: String,
    pub from: CourtStatus,
    pub to: CourtStatus,
}

/// Cached court statuses and the set of courts with an update in flight.
#[derive(Clone, Debug, Default)]
pub struct StatusBoard {
    statuses: HashMap<String, CourtStatus>,
    pending: HashSet<String>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from the persisted statuses of every watchable court.
    pub fn from_complex(complex: &ComplexRecord) -> Self {
        let statuses = complex
            .courts
            .iter()
            .filter(|c| c.is_watchable())
            .map(|c| (c.name.clone(), c.status))
            .collect();
        Self {
            statuses,
            pending: HashSet::new(),
        }
    }

    pub fn status(&self, court: &str) -> Option<CourtStatus> {
        self.statuses.get(court).copied()
    }

    pub fn set_status(&mut self, court: &str, status: CourtStatus) {
        self.statuses.insert(court.to_string(), status);
    }

    pub fn is_pending(&self, court: &str) -> bool {
        self.pending.contains(court)
    }

    /// Returns false if the court already had an update in flight.
    pub fn mark_pending(&mut self, court: &str) -> bool {
        self.pending.insert(court.to_string())
    }

    pub fn clear_pending(&mut self, court: &str) -> bool {
        self.pending.remove(court)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn statuses(&self) -> impl Iterator<Item = (&str, CourtStatus)> {
        self.statuses.iter().map(|(name, status)| (name.as_str(), *status))
    }
}

pub struct OccupancyTracker {
    regions: Vec<CourtRegion>,
}

impl OccupancyTracker {
    pub fn new(regions: Vec<CourtRegion>) -> Self {
        for region in &regions {
            if !region.polygon.is_usable() {
                log::warn!(
                    "court {} has {} region point(s); it will never be reported occupied",
                    region.name,
                    region.polygon.len()
                );
            }
        }
        Self { regions }
    }

    pub fn regions(&self) -> &[CourtRegion] {
        &self.regions
    }

    /// Occupancy verdict for every region, in region order.
    pub fn occupancy(
        &self,
        detections: &[Detection],
        image_width: u32,
        image_height: u32,
    ) -> Vec<(&str, bool)> {
        let people: Vec<&Detection> = detections.iter().filter(|d| d.is_person()).collect();
        let (w, h) = (image_width as f32, image_height as f32);

        self.regions
            .iter()
            .map(|region| {
                let polygon = region.polygon.to_absolute(w, h);
                let occupied = people
                    .iter()
                    .any(|d| rect_overlaps_polygon(&d.bounding_box, &polygon));
                (region.name.as_str(), occupied)
            })
            .collect()
    }

    /// Status changes implied by one analysed frame.
    ///
    /// Courts with a pending update are skipped, as are courts whose verdict
    /// matches the cached status.
    pub fn evaluate(&self, board: &StatusBoard, analysis: &FrameAnalysis) -> Vec<StatusChange> {
        self.occupancy(
            &analysis.detections,
            analysis.image_width,
            analysis.image_height,
        )
        .into_iter()
        .filter(|(court, _)| !board.is_pending(court))
        .filter_map(|(court, occupied)| {
            let from = board.status(court).unwrap_or(CourtStatus::Available);
            let to = CourtStatus::from_occupied(occupied);
            (from != to).then(|| StatusChange {
                court: court.to_string(),
                from,
                to,
            })
        })
        .collect()
    }
}

/// Admits at most one analysis per interval.
#[derive(Clone, Debug)]
pub struct InferenceThrottle {
    interval: Duration,
    last_run: Option<Instant>,
}

impl InferenceThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True if a frame arriving at `now` may be analysed. Does not use up the window.
    pub fn is_open(&self, now: Instant) -> bool {
        match self.last_run {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        }
    }

    /// Start a new window at `now`.
    pub fn record_run(&mut self, now: Instant) {
        self.last_run = Some(now);
    }

    /// `is_open` followed by `record_run` when it is.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        let open = self.is_open(now);
        if open {
            self.record_run(now);
        }
        open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, Polygon, Rect};

    fn region(name: &str, points: &[(f32, f32)]) -> CourtRegion {
        CourtRegion {
            name: name.to_string(),
            polygon: Polygon::new(points.iter().map(|&(x, y)| Point::new(x, y)).collect()),
        }
    }

    fn left_half() -> CourtRegion {
        region("Court 1", &[(0.0, 0.0), (0.5, 0.0), (0.5, 1.0), (0.0, 1.0)])
    }

    fn person(rect: Rect) -> Detection {
        Detection {
            bounding_box: rect,
            class_name: "Person".to_string(),
            confidence: 0.9,
        }
    }

    fn analysis(detections: Vec<Detection>) -> FrameAnalysis {
        FrameAnalysis {
            detections,
            image_width: 200,
            image_height: 100,
        }
    }

    fn board(status: CourtStatus) -> StatusBoard {
        let mut board = StatusBoard::new();
        board.set_status("Court 1", status);
        board
    }

    #[test]
    fn person_inside_court_is_occupied() {
        let tracker = OccupancyTracker::new(vec![left_half()]);
        let frame = analysis(vec![person(Rect::new(20.0, 20.0, 40.0, 60.0))]);
        let changes = tracker.evaluate(&board(CourtStatus::Available), &frame);
        assert_eq!(
            changes,
            vec![StatusChange {
                court: "Court 1".to_string(),
                from: CourtStatus::Available,
                to: CourtStatus::InUse,
            }]
        );
    }

    #[test]
    fn other_classes_are_ignored() {
        let tracker = OccupancyTracker::new(vec![left_half()]);
        let mut racket = person(Rect::new(20.0, 20.0, 40.0, 60.0));
        racket.class_name = "tennis racket".to_string();
        let verdict = tracker.occupancy(&[racket], 200, 100);
        assert_eq!(verdict, vec![("Court 1", false)]);
    }

    #[test]
    fn person_outside_court_is_not_occupied() {
        let tracker = OccupancyTracker::new(vec![left_half()]);
        let frame = analysis(vec![person(Rect::new(150.0, 20.0, 190.0, 60.0))]);
        assert!(tracker
            .evaluate(&board(CourtStatus::Available), &frame)
            .is_empty());
    }

    #[test]
    fn crossing_band_without_contained_vertices_is_occupied() {
        // Thin vertical court crossed by a wide, short box: no corner of
        // either shape lies inside the other.
        let court = region("Court 1", &[(0.45, 0.1), (0.55, 0.1), (0.55, 0.9), (0.45, 0.9)]);
        let tracker = OccupancyTracker::new(vec![court]);
        let verdict = tracker.occupancy(&[person(Rect::new(20.0, 40.0, 180.0, 60.0))], 200, 100);
        assert_eq!(verdict, vec![("Court 1", true)]);
    }

    #[test]
    fn unchanged_verdict_requests_nothing() {
        let tracker = OccupancyTracker::new(vec![left_half()]);
        let frame = analysis(vec![person(Rect::new(20.0, 20.0, 40.0, 60.0))]);
        assert!(tracker.evaluate(&board(CourtStatus::InUse), &frame).is_empty());
        assert!(tracker
            .evaluate(&board(CourtStatus::Available), &analysis(Vec::new()))
            .is_empty());
    }

    #[test]
    fn pending_court_is_skipped() {
        let tracker = OccupancyTracker::new(vec![left_half()]);
        let mut board = board(CourtStatus::Available);
        assert!(board.mark_pending("Court 1"));
        assert!(!board.mark_pending("Court 1"));
        let frame = analysis(vec![person(Rect::new(20.0, 20.0, 40.0, 60.0))]);
        assert!(tracker.evaluate(&board, &frame).is_empty());
    }

    #[test]
    fn degenerate_region_is_never_occupied() {
        let tracker = OccupancyTracker::new(vec![region("Line", &[(0.0, 0.0), (1.0, 1.0)])]);
        let verdict = tracker.occupancy(&[person(Rect::new(0.0, 0.0, 200.0, 100.0))], 200, 100);
        assert_eq!(verdict, vec![("Line", false)]);
    }

    #[test]
    fn throttle_spaces_analyses() {
        let mut throttle = InferenceThrottle::new(Duration::from_millis(INFERENCE_INTERVAL_MS));
        let start = Instant::now();
        assert!(throttle.try_acquire(start));
        assert!(!throttle.try_acquire(start + Duration::from_millis(2999)));
        assert!(throttle.try_acquire(start + Duration::from_millis(3000)));
        assert!(!throttle.try_acquire(start + Duration::from_millis(3001)));
    }

    #[test]
    fn checking_the_throttle_does_not_use_the_window() {
        let mut throttle = InferenceThrottle::new(Duration::from_millis(INFERENCE_INTERVAL_MS));
        let start = Instant::now();
        assert!(throttle.is_open(start));
        assert!(throttle.is_open(start + Duration::from_millis(10)));
        throttle.record_run(start + Duration::from_millis(10));
        assert!(!throttle.is_open(start + Duration::from_millis(20)));
        assert!(throttle.is_open(start + Duration::from_millis(3010)));
    }

    #[test]
    fn zero_interval_admits_every_frame() {
        let mut throttle = InferenceThrottle::new(Duration::ZERO);
        let now = Instant::now();
        assert!(throttle.try_acquire(now));
        assert!(throttle.try_acquire(now));
    }
}
