use crate::detect::backend::{DetectorBackend, InputTensor, ModelSpec, RawOutput};
use crate::error::{CourtError, Result};

/// Mean channel value above which an input pixel counts as bright.
const BRIGHTNESS_THRESHOLD: f32 = 0.6;
const BRIGHT_REGION_SCORE: f32 = 0.9;

enum Mode {
    Scripted,
    BrightRegion { class_id: usize },
}

/// Stub backend for tests and synthetic runs.
///
/// Scripted (default): returns queued outputs in order, then repeats the last
/// one. Bright-region: reports one box around the bright pixels of the input,
/// which is what the `stub://` source draws for a player.
///
/// Shape checks match a real network: the input must match the model spec
/// and every output must divide into whole records.
pub struct StubBackend {
    spec: ModelSpec,
    mode: Mode,
    outputs: Vec<Vec<f32>>,
    next: usize,
    calls: u64,
}

impl StubBackend {
    pub fn new(spec: ModelSpec) -> Self {
        Self {
            spec,
            mode: Mode::Scripted,
            outputs: Vec::new(),
            next: 0,
            calls: 0,
        }
    }

    /// Queue a flat output buffer.
    pub fn with_output(mut self, output: Vec<f32>) -> Self {
        self.outputs.push(output);
        self
    }

    /// Derive the output from the input pixels instead of the queue.
    pub fn detecting_bright_regions(mut self, class_id: usize) -> Self {
        self.mode = Mode::BrightRegion { class_id };
        self
    }

    /// Number of completed `infer` calls.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn scripted(&mut self) -> Vec<f32> {
        match self.outputs.get(self.next) {
            Some(output) => {
                if self.next + 1 < self.outputs.len() {
                    self.next += 1;
                }
                output.clone()
            }
            None => Vec::new(),
        }
    }

    fn bright_region(&self, input: &InputTensor, class_id: usize) -> Result<Vec<f32>> {
        if class_id >= self.spec.num_classes {
            return Err(CourtError::inference(format!(
                "stub class {} is outside the model's {} classes",
                class_id, self.spec.num_classes
            )));
        }
        let width = input.width as usize;
        let mut bounds: Option<(usize, usize, usize, usize)> = None;
        for (i, px) in input.data.chunks_exact(3).enumerate() {
            if (px[0] + px[1] + px[2]) / 3.0 < BRIGHTNESS_THRESHOLD {
                continue;
            }
            let (x, y) = (i % width, i / width);
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
        let Some((x0, y0, x1, y1)) = bounds else {
            return Ok(Vec::new());
        };

        let w = input.width as f32;
        let h = input.height as f32;
        let mut record = vec![0.0; self.spec.record_len()];
        record[0] = (x0 + x1 + 1) as f32 / 2.0 / w;
        record[1] = (y0 + y1 + 1) as f32 / 2.0 / h;
        record[2] = (x1 + 1 - x0) as f32 / w;
        record[3] = (y1 + 1 - y0) as f32 / h;
        record[4] = BRIGHT_REGION_SCORE;
        record[5 + class_id] = BRIGHT_REGION_SCORE;
        Ok(record)
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn model_spec(&self) -> ModelSpec {
        self.spec
    }

    fn infer(&mut self, input: &InputTensor) -> Result<RawOutput> {
        input.check_against(&self.spec)?;
        if self.spec.num_classes == 0 {
            return Err(CourtError::inference("stub model has no classes"));
        }
        let data = match self.mode {
            Mode::Scripted => self.scripted(),
            Mode::BrightRegion { class_id } => self.bright_region(input, class_id)?,
        };
        let output = RawOutput::from_flat(data, &self.spec)?;
        self.calls += 1;
        Ok(output)
    }
}
