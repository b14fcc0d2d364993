//! Single-owner holder for the loaded detector.
//!
//! The network is loaded once per session and shared between the frame
//! worker and shutdown. All inference goes through one lock; a closed slot
//! stays closed.

use std::sync::{Arc, Mutex, MutexGuard};

use image::RgbImage;

use crate::detect::backend::{DetectorBackend, ModelSpec};
use crate::detect::postprocess::Postprocessor;
use crate::detect::result::FrameAnalysis;
use crate::error::{CourtError, Result};
use crate::frame::prepare_input;

enum SlotState {
    Unloaded,
    Loaded(LoadedDetector),
    Closed,
}

struct LoadedDetector {
    backend: Box<dyn DetectorBackend>,
    labels: Arc<[String]>,
    spec: ModelSpec,
}

pub struct DetectorSlot {
    state: Mutex<SlotState>,
}

impl Default for DetectorSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorSlot {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Unloaded),
        }
    }

    /// Install a backend and its labels.
    ///
    /// Loading into an already loaded slot keeps the existing detector and
    /// returns its spec.
    pub fn load<B: DetectorBackend + 'static>(
        &self,
        mut backend: B,
        labels: Vec<String>,
    ) -> Result<ModelSpec> {
        let mut state = self.lock_for_load()?;
        match &*state {
            SlotState::Loaded(existing) => {
                log::debug!("detector already loaded ({})", existing.backend.name());
                return Ok(existing.spec);
            }
            SlotState::Closed => {
                return Err(CourtError::model_load("detector slot is closed"));
            }
            SlotState::Unloaded => {}
        }

        let spec = backend.model_spec();
        if spec.input_width == 0 || spec.input_height == 0 || spec.num_classes == 0 {
            return Err(CourtError::model_load(format!(
                "backend {} reports an empty model ({}x{}, {} classes)",
                backend.name(),
                spec.input_width,
                spec.input_height,
                spec.num_classes
            )));
        }
        if labels.is_empty() {
            return Err(CourtError::model_load("label list is empty"));
        }
        if labels.len() != spec.num_classes {
            log::warn!(
                "label count {} differs from model class count {}; missing ids map to unknown",
                labels.len(),
                spec.num_classes
            );
        }
        backend
            .warm_up()
            .map_err(|e| CourtError::model_load(format!("warm-up failed: {}", e)))?;

        log::info!(
            "detector loaded: backend={} input={}x{} classes={}",
            backend.name(),
            spec.input_width,
            spec.input_height,
            spec.num_classes
        );
        *state = SlotState::Loaded(LoadedDetector {
            backend: Box::new(backend),
            labels: labels.into(),
            spec,
        });
        Ok(spec)
    }

    pub fn is_loaded(&self) -> bool {
        self.model_spec().is_some()
    }

    pub fn model_spec(&self) -> Option<ModelSpec> {
        let state = self.state.lock().ok()?;
        match &*state {
            SlotState::Loaded(detector) => Some(detector.spec),
            _ => None,
        }
    }

    /// Detect objects in an upright image.
    ///
    /// Boxes are returned in the image's pixel coordinates.
    pub fn detect(&self, image: &RgbImage, postprocessor: &Postprocessor) -> Result<FrameAnalysis> {
        let (raw, spec, labels) = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| CourtError::inference("detector lock poisoned"))?;
            let detector = match &mut *state {
                SlotState::Loaded(detector) => detector,
                SlotState::Unloaded => {
                    return Err(CourtError::inference("detector not initialized"))
                }
                SlotState::Closed => return Err(CourtError::inference("detector is closed")),
            };
            let input = prepare_input(image, &detector.spec);
            let raw = detector.backend.infer(&input)?;
            raw.check_against(&detector.spec)?;
            (raw, detector.spec, Arc::clone(&detector.labels))
        };

        let detections = postprocessor.process(&raw, &spec, &labels, image.width(), image.height());
        Ok(FrameAnalysis {
            detections,
            image_width: image.width(),
            image_height: image.height(),
        })
    }

    /// Release the backend. Later detection calls fail with `InferenceError`.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let SlotState::Loaded(detector) = &*state {
            log::info!("detector closed ({})", detector.backend.name());
        }
        *state = SlotState::Closed;
    }

    fn lock_for_load(&self) -> Result<MutexGuard<'_, SlotState>> {
        self.state
            .lock()
            .map_err(|_| CourtError::model_load("detector lock poisoned"))
    }
}
