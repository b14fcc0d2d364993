use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use courtwatch::ingest::{FrameSource, SourceConfig, SyntheticSource};
use courtwatch::{
    ComplexRecord, CourtError, CourtStatus, CourtStore, DetectorSlot, Frame, InMemoryCourtStore,
    ModelSpec, PixelFormat, PointData, PostprocessConfig, Session, SessionConfig, SessionUpdate,
    StatusChange, StubBackend, TransactionOutcome,
};

const WAIT: Duration = Duration::from_secs(5);

const COMPLEX: &str = r#"{
    "name": "Riverside Tennis Club",
    "courts": [
        {
            "name": "Center",
            "status": "available",
            "isConfigured": true,
            "regionPoints": [
                {"x": 0.25, "y": 0.25}, {"x": 0.75, "y": 0.25},
                {"x": 0.75, "y": 0.75}, {"x": 0.25, "y": 0.75}
            ]
        },
        {
            "name": "Corner",
            "status": "available",
            "isConfigured": true,
            "regionPoints": [
                {"x": 0.0, "y": 0.0}, {"x": 0.1, "y": 0.0},
                {"x": 0.1, "y": 0.1}, {"x": 0.0, "y": 0.1}
            ]
        },
        {"name": "Annex", "status": "available", "isConfigured": false}
    ]
}"#;

/// One person standing in the middle of the frame.
const PERSON_IN_CENTER: [f32; 6] = [0.5, 0.5, 0.2, 0.4, 0.9, 0.95];

fn spec() -> ModelSpec {
    ModelSpec {
        input_width: 8,
        input_height: 8,
        num_classes: 1,
    }
}

fn complex() -> ComplexRecord {
    ComplexRecord::from_json("riverside", COMPLEX).unwrap()
}

fn loaded_detector(backend: StubBackend) -> Arc<DetectorSlot> {
    let slot = Arc::new(DetectorSlot::new());
    slot.load(backend, vec!["person".to_string()]).unwrap();
    slot
}

fn config() -> SessionConfig {
    SessionConfig {
        postprocess: PostprocessConfig::default(),
        inference_interval: Duration::ZERO,
    }
}

fn frame() -> Frame {
    Frame::new(vec![90; 64 * 48 * 3], 64, 48, PixelFormat::Rgb888)
}

fn next_update(session: &mut Session) -> SessionUpdate {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if let Some(update) = session.pump(Duration::from_millis(100)) {
            return update;
        }
    }
    panic!("no session update within {:?}", WAIT);
}

fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Holds every status write until the test releases it.
struct GatedStore {
    inner: InMemoryCourtStore,
    writes_started: AtomicUsize,
    release: Mutex<Receiver<()>>,
}

impl CourtStore for GatedStore {
    fn load_complex(&self, id: &str) -> courtwatch::Result<ComplexRecord> {
        self.inner.load_complex(id)
    }

    fn list_complexes(&self) -> courtwatch::Result<Vec<ComplexRecord>> {
        self.inner.list_complexes()
    }

    fn put_complex(&self, record: &ComplexRecord) -> courtwatch::Result<()> {
        self.inner.put_complex(record)
    }

    fn save_regions(
        &self,
        id: &str,
        regions: &[(String, Vec<PointData>)],
    ) -> courtwatch::Result<usize> {
        self.inner.save_regions(id, regions)
    }

    fn update_court_status(
        &self,
        id: &str,
        court: &str,
        desired: CourtStatus,
        updated_at_ms: i64,
    ) -> courtwatch::Result<TransactionOutcome> {
        self.writes_started.fetch_add(1, Ordering::SeqCst);
        let _ = self.release.lock().unwrap().recv_timeout(WAIT);
        self.inner.update_court_status(id, court, desired, updated_at_ms)
    }
}

fn next_frame_changes(session: &mut Session) -> Vec<StatusChange> {
    match next_update(session) {
        SessionUpdate::Frame { analysis, changes } => {
            assert_eq!((analysis.image_width, analysis.image_height), (64, 48));
            changes
        }
        other => panic!("expected a frame update, got {:?}", other),
    }
}

#[test]
fn occupied_cycles_request_exactly_one_write() {
    let store = Arc::new(InMemoryCourtStore::with_complex(complex()).unwrap());
    let detector = loaded_detector(StubBackend::new(spec()).with_output(PERSON_IN_CENTER.to_vec()));
    let mut session = Session::start(
        &complex(),
        store.clone() as Arc<dyn CourtStore>,
        detector,
        config(),
    )
    .unwrap();

    session.submit(frame());
    assert_eq!(
        next_frame_changes(&mut session),
        vec![StatusChange {
            court: "Center".to_string(),
            from: CourtStatus::Available,
            to: CourtStatus::InUse,
        }]
    );
    assert!(session.board().is_pending("Center"));
    assert_eq!(
        next_update(&mut session),
        SessionUpdate::StatusApplied {
            court: "Center".to_string(),
            status: CourtStatus::InUse,
        }
    );

    for _ in 0..2 {
        session.submit(frame());
        assert!(next_frame_changes(&mut session).is_empty());
    }

    assert_eq!(store.revision("riverside"), Some(1));
    let persisted = store.load_complex("riverside").unwrap();
    let center = persisted.court("Center").unwrap();
    assert_eq!(center.status, CourtStatus::InUse);
    assert!(center.last_updated_status > 0);
    assert_eq!(
        persisted.court("Corner").unwrap().status,
        CourtStatus::Available
    );
    assert_eq!(session.board().status("Center"), Some(CourtStatus::InUse));
    assert_eq!(session.board().status("Annex"), None);
    assert_eq!(session.stats().frames_analysed, 3);

    session.shutdown().unwrap();
}

#[test]
fn court_frees_up_when_the_player_leaves() {
    let store = Arc::new(InMemoryCourtStore::with_complex(complex()).unwrap());
    let backend = StubBackend::new(spec())
        .with_output(PERSON_IN_CENTER.to_vec())
        .with_output(Vec::new());
    let mut session = Session::start(
        &complex(),
        store.clone() as Arc<dyn CourtStore>,
        loaded_detector(backend),
        config(),
    )
    .unwrap();

    session.submit(frame());
    assert_eq!(next_frame_changes(&mut session).len(), 1);
    assert!(matches!(
        next_update(&mut session),
        SessionUpdate::StatusApplied { .. }
    ));

    session.submit(frame());
    let changes = next_frame_changes(&mut session);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].to, CourtStatus::Available);
    assert_eq!(
        next_update(&mut session),
        SessionUpdate::StatusApplied {
            court: "Center".to_string(),
            status: CourtStatus::Available,
        }
    );
    assert_eq!(store.revision("riverside"), Some(2));
}

#[test]
fn bad_frames_are_dropped_and_the_pipeline_continues() {
    let store = Arc::new(InMemoryCourtStore::with_complex(complex()).unwrap());
    let detector = loaded_detector(StubBackend::new(spec()).with_output(PERSON_IN_CENTER.to_vec()));
    let mut session =
        Session::start(&complex(), store as Arc<dyn CourtStore>, detector, config()).unwrap();

    session.submit(Frame::new(vec![0; 64 * 48 * 2], 64, 48, PixelFormat::Other(0x10)));
    wait_until("the bad frame to be rejected", || session.stats().frames_failed == 1);

    session.submit(frame());
    assert_eq!(next_frame_changes(&mut session).len(), 1);
    assert_eq!(session.stats().frames_failed, 1);
    session.shutdown().unwrap();
}

#[test]
fn throttle_drops_frames_inside_the_interval() {
    let store = Arc::new(InMemoryCourtStore::with_complex(complex()).unwrap());
    let detector = loaded_detector(StubBackend::new(spec()));
    let slow = SessionConfig {
        inference_interval: Duration::from_secs(3600),
        ..config()
    };
    let mut session =
        Session::start(&complex(), store as Arc<dyn CourtStore>, detector, slow).unwrap();

    session.submit(frame());
    assert!(next_frame_changes(&mut session).is_empty());

    session.submit(frame());
    let deadline = Instant::now() + WAIT;
    while session.stats().frames_throttled == 0 {
        assert!(Instant::now() < deadline, "second frame was never throttled");
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(session.pump(Duration::from_millis(50)).is_none());
    assert_eq!(session.stats().frames_analysed, 1);
}

#[test]
fn start_requires_regions_and_a_loaded_detector() {
    let store: Arc<dyn CourtStore> = Arc::new(InMemoryCourtStore::new());

    let unconfigured = ComplexRecord::from_json(
        "bare",
        r#"{"name": "Bare", "courts": [{"name": "A", "status": "available", "isConfigured": false}]}"#,
    )
    .unwrap();
    let detector = loaded_detector(StubBackend::new(spec()));
    assert!(matches!(
        Session::start(&unconfigured, store.clone(), detector, config()),
        Err(CourtError::ConfigLoadError(_))
    ));

    let unloaded = Arc::new(DetectorSlot::new());
    assert!(matches!(
        Session::start(&complex(), store, unloaded, config()),
        Err(CourtError::InferenceError(_))
    ));
}

#[test]
fn shutdown_releases_the_detector_and_silences_delivery() {
    let store = Arc::new(InMemoryCourtStore::with_complex(complex()).unwrap());
    let detector = loaded_detector(StubBackend::new(spec()).with_output(PERSON_IN_CENTER.to_vec()));
    let mut session = Session::start(
        &complex(),
        store as Arc<dyn CourtStore>,
        Arc::clone(&detector),
        config(),
    )
    .unwrap();

    let cancel = session.cancellation();
    session.submit(frame());
    cancel.cancel();
    assert!(session.pump(Duration::from_millis(100)).is_none());

    session.shutdown().unwrap();
    assert!(!detector.is_loaded());
}

#[test]
fn failed_conversion_leaves_the_throttle_window_open() {
    let store = Arc::new(InMemoryCourtStore::with_complex(complex()).unwrap());
    let detector = loaded_detector(StubBackend::new(spec()).with_output(PERSON_IN_CENTER.to_vec()));
    let slow = SessionConfig {
        inference_interval: Duration::from_secs(3600),
        ..config()
    };
    let mut session =
        Session::start(&complex(), store as Arc<dyn CourtStore>, detector, slow).unwrap();

    session.submit(Frame::new(vec![0; 10], 64, 48, PixelFormat::Rgb888));
    wait_until("the bad frame to be rejected", || session.stats().frames_failed == 1);

    session.submit(frame());
    assert_eq!(next_frame_changes(&mut session).len(), 1);
    let stats = session.stats();
    assert_eq!(stats.frames_throttled, 0);
    assert_eq!(stats.frames_analysed, 1);
    session.shutdown().unwrap();
}

#[test]
fn completion_after_cancellation_leaves_the_board_alone() {
    let (release, gate) = mpsc::channel();
    let store = Arc::new(GatedStore {
        inner: InMemoryCourtStore::with_complex(complex()).unwrap(),
        writes_started: AtomicUsize::new(0),
        release: Mutex::new(gate),
    });
    let detector = loaded_detector(StubBackend::new(spec()).with_output(PERSON_IN_CENTER.to_vec()));
    let mut session = Session::start(
        &complex(),
        store.clone() as Arc<dyn CourtStore>,
        detector,
        config(),
    )
    .unwrap();

    session.submit(frame());
    assert_eq!(next_frame_changes(&mut session).len(), 1);
    wait_until("the status write to start", || {
        store.writes_started.load(Ordering::SeqCst) == 1
    });

    session.cancellation().cancel();
    release.send(()).unwrap();
    wait_until("the status write to land", || {
        store.inner.revision("riverside") == Some(1)
    });

    assert!(session.pump(Duration::from_millis(200)).is_none());
    assert!(session.board().is_pending("Center"));
    assert_eq!(session.board().status("Center"), Some(CourtStatus::Available));
    session.shutdown().unwrap();
}

#[test]
fn synthetic_player_occupies_and_frees_the_center_court() {
    let store = Arc::new(InMemoryCourtStore::with_complex(complex()).unwrap());
    let detector = loaded_detector(StubBackend::new(spec()).detecting_bright_regions(0));
    let mut session = Session::start(
        &complex(),
        store.clone() as Arc<dyn CourtStore>,
        detector,
        config(),
    )
    .unwrap();
    let mut camera = SyntheticSource::new(SourceConfig {
        url: "stub://test".to_string(),
        width: 64,
        height: 48,
        rotation_degrees: 0,
        target_fps: 10,
    });

    session.submit(camera.next_frame().unwrap());
    assert!(next_frame_changes(&mut session).is_empty());

    while !camera.player_present() {
        camera.next_frame().unwrap();
    }
    session.submit(camera.next_frame().unwrap());
    assert_eq!(
        next_frame_changes(&mut session),
        vec![StatusChange {
            court: "Center".to_string(),
            from: CourtStatus::Available,
            to: CourtStatus::InUse,
        }]
    );
    assert!(matches!(
        next_update(&mut session),
        SessionUpdate::StatusApplied { .. }
    ));

    while camera.player_present() {
        camera.next_frame().unwrap();
    }
    session.submit(camera.next_frame().unwrap());
    let changes = next_frame_changes(&mut session);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].to, CourtStatus::Available);
    assert!(matches!(
        next_update(&mut session),
        SessionUpdate::StatusApplied { .. }
    ));
    assert_eq!(store.revision("riverside"), Some(2));
    session.shutdown().unwrap();
}
