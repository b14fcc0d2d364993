//! courtwatchd - court occupancy daemon
//!
//! This daemon:
//! 1. Loads configuration and the complex document for one complex
//! 2. Loads the detector once for the session
//! 3. Feeds camera frames to the analysis worker (keep-only-latest)
//! 4. Writes court status changes to the court store
//! 5. Tears everything down on Ctrl-C

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use courtwatch::config::CourtwatchConfig;
use courtwatch::detect::{load_labels, PERSON_CLASS};
use courtwatch::ingest::{open_source, FrameSource};
use courtwatch::{
    CancellationToken, CourtStore, DetectorSlot, FrameSlot, ModelSpec, Session, SessionUpdate,
    SqliteCourtStore, StubBackend,
};

const PUMP_TIMEOUT: Duration = Duration::from_millis(500);
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("courtwatchd stopped: {:#}", e);
        return Err(e);
    }
    Ok(())
}

fn run() -> Result<()> {
    let cfg = CourtwatchConfig::load()?;

    let store: Arc<dyn CourtStore> = Arc::new(
        SqliteCourtStore::open(&cfg.db_path)
            .with_context(|| format!("failed to open court store {}", cfg.db_path))?,
    );
    let complex = store.load_complex(&cfg.complex_id)?;
    log::info!(
        "loaded complex {} ({}) with {} court(s)",
        complex.id,
        complex.name,
        complex.courts.len()
    );

    let detector = Arc::new(DetectorSlot::new());
    load_detector(&cfg, &detector)?;

    let mut source = open_source(&cfg.source)?;
    source.connect()?;

    let mut session = Session::start(
        &complex,
        Arc::clone(&store),
        Arc::clone(&detector),
        cfg.session_config(),
    )?;
    let cancel = session.cancellation();

    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel())
            .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    }

    let producer = {
        let slot = session.frame_slot();
        let cancel = cancel.clone();
        let fps = cfg.source.target_fps;
        thread::Builder::new()
            .name("frame-producer".to_string())
            .spawn(move || produce_frames(source, slot, cancel, fps))?
    };

    log::info!(
        "courtwatchd running. complex={} source={} interval={}ms",
        cfg.complex_id,
        cfg.source.url,
        cfg.detection.inference_interval.as_millis()
    );

    let mut last_health_log = Instant::now();
    while !cancel.is_cancelled() {
        if let Some(update) = session.pump(PUMP_TIMEOUT) {
            log_update(&update);
        }
        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let stats = session.stats();
            log::info!(
                "health: frames received={} replaced={} throttled={} failed={} analysed={} pending={}",
                stats.frames_received,
                stats.frames_replaced,
                stats.frames_throttled,
                stats.frames_failed,
                stats.frames_analysed,
                session.board().pending_count()
            );
            last_health_log = Instant::now();
        }
    }

    log::info!("shutdown signal received, stopping session...");
    session.shutdown()?;
    producer
        .join()
        .map_err(|_| anyhow!("frame producer thread panicked"))?;
    Ok(())
}

fn load_detector(cfg: &CourtwatchConfig, slot: &DetectorSlot) -> Result<ModelSpec> {
    let spec = match cfg.model.backend.as_str() {
        "stub" => {
            let labels = stub_labels(&cfg.model.labels_path)?;
            let spec = ModelSpec {
                input_width: cfg.model.input_width,
                input_height: cfg.model.input_height,
                num_classes: labels.len(),
            };
            let person = labels
                .iter()
                .position(|l| l.eq_ignore_ascii_case(PERSON_CLASS))
                .unwrap_or_else(|| {
                    log::warn!("no person label; stub detections will not occupy courts");
                    0
                });
            slot.load(StubBackend::new(spec).detecting_bright_regions(person), labels)?
        }
        "tract" => load_tract(cfg, slot)?,
        other => return Err(anyhow!("unknown detector backend '{}'", other)),
    };
    Ok(spec)
}

/// The stub backend boxes the bright player block of `stub://` frames as a
/// person. Without a label file it uses a person-only list.
fn stub_labels(path: &Path) -> Result<Vec<String>> {
    if path.exists() {
        return Ok(load_labels(path)?);
    }
    log::warn!(
        "labels {} not found; stub backend uses [person]",
        path.display()
    );
    Ok(vec![PERSON_CLASS.to_string()])
}

#[cfg(feature = "backend-tract")]
fn load_tract(cfg: &CourtwatchConfig, slot: &DetectorSlot) -> Result<ModelSpec> {
    let labels = load_labels(&cfg.model.labels_path)?;
    let backend = courtwatch::detect::TractBackend::new(
        &cfg.model.model_path,
        cfg.model.input_width,
        cfg.model.input_height,
    )?;
    Ok(slot.load(backend, labels)?)
}

#[cfg(not(feature = "backend-tract"))]
fn load_tract(_cfg: &CourtwatchConfig, _slot: &DetectorSlot) -> Result<ModelSpec> {
    Err(anyhow!(
        "the tract backend requires building with --features backend-tract"
    ))
}

fn produce_frames(
    mut source: Box<dyn FrameSource>,
    slot: Arc<FrameSlot>,
    cancel: CancellationToken,
    target_fps: u32,
) {
    let period = Duration::from_secs(1) / target_fps.max(1);
    while !cancel.is_cancelled() {
        let started = Instant::now();
        match source.next_frame() {
            Ok(frame) => slot.offer(frame),
            Err(e) => log::warn!("frame source error: {}", e),
        }
        if let Some(rest) = period.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }
    let stats = source.stats();
    log::info!(
        "frame source {} stopped after {} frames",
        stats.url,
        stats.frames_captured
    );
}

fn log_update(update: &SessionUpdate) {
    match update {
        SessionUpdate::Frame { analysis, changes } => {
            let people = analysis.detections.iter().filter(|d| d.is_person()).count();
            log::debug!(
                "frame {}x{}: {} detection(s), {} person(s)",
                analysis.image_width,
                analysis.image_height,
                analysis.detections.len(),
                people
            );
            for change in changes {
                log::info!("{}: {} -> {}", change.court, change.from, change.to);
            }
        }
        SessionUpdate::StatusApplied { court, status } => {
            log::info!("{} saved as {}", court, status);
        }
        SessionUpdate::UpdateFailed { court, error } => {
            log::warn!("{} not saved: {}", court, error);
        }
    }
}
