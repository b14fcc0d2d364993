use crate::error::{CourtError, Result};

/// Fixed input/output geometry of a loaded network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelSpec {
    pub input_width: u32,
    pub input_height: u32,
    pub num_classes: usize,
}

impl ModelSpec {
    /// Floats per prediction record: `cx, cy, w, h, objectness, class scores...`.
    pub fn record_len(&self) -> usize {
        5 + self.num_classes
    }
}

/// Upright RGB image resized to the model input, values in `[0,1]`, HWC order.
#[derive(Clone, Debug, PartialEq)]
pub struct InputTensor {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl InputTensor {
    /// Reject a tensor whose shape does not match `spec`.
    pub fn check_against(&self, spec: &ModelSpec) -> Result<()> {
        if self.width != spec.input_width || self.height != spec.input_height {
            return Err(CourtError::inference(format!(
                "input {}x{} does not match model input {}x{}",
                self.width, self.height, spec.input_width, spec.input_height
            )));
        }
        let expected = self.width as usize * self.height as usize * 3;
        if self.data.len() != expected {
            return Err(CourtError::inference(format!(
                "input tensor has {} values, expected {}",
                self.data.len(),
                expected
            )));
        }
        Ok(())
    }
}

/// Flat network output: `num_predictions` records of `spec.record_len()` floats.
#[derive(Clone, Debug, PartialEq)]
pub struct RawOutput {
    pub num_predictions: usize,
    pub data: Vec<f32>,
}

impl RawOutput {
    /// Wrap a flat buffer, checking it divides into whole records.
    pub fn from_flat(data: Vec<f32>, spec: &ModelSpec) -> Result<Self> {
        let stride = spec.record_len();
        if data.len() % stride != 0 {
            return Err(CourtError::inference(format!(
                "output length {} is not a multiple of record length {}",
                data.len(),
                stride
            )));
        }
        Ok(Self {
            num_predictions: data.len() / stride,
            data,
        })
    }

    /// Reject output whose length does not hold `num_predictions` whole records.
    pub fn check_against(&self, spec: &ModelSpec) -> Result<()> {
        let expected = self.num_predictions.checked_mul(spec.record_len());
        if expected != Some(self.data.len()) {
            return Err(CourtError::inference(format!(
                "output has {} values, expected {} records of {}",
                self.data.len(),
                self.num_predictions,
                spec.record_len()
            )));
        }
        Ok(())
    }

    /// Prediction records of `stride` floats. A trailing partial record is skipped.
    pub fn records(&self, stride: usize) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(stride.max(1)).take(self.num_predictions)
    }
}

/// Detector backend trait.
///
/// A backend wraps one loaded network. It is not safe for concurrent
/// invocation; `DetectorSlot` serializes all calls.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Geometry of the loaded network.
    fn model_spec(&self) -> ModelSpec;

    /// Run the network on a prepared input tensor.
    fn infer(&mut self, input: &InputTensor) -> Result<RawOutput>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
