#![cfg(feature = "backend-tract")]

use std::path::Path;

use tract_onnx::prelude::*;

use crate::detect::backend::{DetectorBackend, InputTensor, ModelSpec, RawOutput};
use crate::error::{CourtError, Result};

/// Tract-based backend for YOLO-style ONNX models.
///
/// Expects an NCHW `1x3xHxW` f32 input and a `1xNx(5+C)` f32 output. The
/// class count is read from the optimized output shape.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    spec: ModelSpec,
}

impl TractBackend {
    /// Load an ONNX model from disk with a fixed input size.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let load_err = |stage: &str, e: TractError| {
            CourtError::model_load(format!("{} {}: {}", stage, model_path.display(), e))
        };
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|e| load_err("failed to load ONNX model from", e))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .map_err(|e| load_err("failed to set input fact for", e))?
            .into_optimized()
            .map_err(|e| load_err("failed to optimize", e))?
            .into_runnable()
            .map_err(|e| load_err("failed to build runnable model from", e))?;

        let num_classes = {
            let fact = model
                .model()
                .output_fact(0)
                .map_err(|e| load_err("no output tensor in", e))?;
            let shape = fact.shape.as_concrete().ok_or_else(|| {
                CourtError::model_load(format!(
                    "output shape of {} is not concrete",
                    model_path.display()
                ))
            })?;
            match shape {
                [1, _, record] if *record > 5 => record - 5,
                other => {
                    return Err(CourtError::model_load(format!(
                        "unsupported output shape {:?} in {}",
                        other,
                        model_path.display()
                    )))
                }
            }
        };

        Ok(Self {
            model,
            spec: ModelSpec {
                input_width: width,
                input_height: height,
                num_classes,
            },
        })
    }

    fn build_input(&self, input: &InputTensor) -> Result<Tensor> {
        input.check_against(&self.spec)?;
        let width = input.width as usize;
        let tensor = tract_ndarray::Array4::from_shape_fn(
            (1, 3, input.height as usize, width),
            |(_, channel, y, x)| input.data[(y * width + x) * 3 + channel],
        );
        Ok(tensor.into_tensor())
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn model_spec(&self) -> ModelSpec {
        self.spec
    }

    fn infer(&mut self, input: &InputTensor) -> Result<RawOutput> {
        let tensor = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .map_err(|e| CourtError::inference(format!("ONNX inference failed: {}", e)))?;
        let output = outputs
            .first()
            .ok_or_else(|| CourtError::inference("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| CourtError::inference(format!("output tensor was not f32: {}", e)))?;
        RawOutput::from_flat(view.iter().copied().collect(), &self.spec)
    }
}
