mod backend;
pub mod backends;
mod labels;
mod postprocess;
mod result;
mod slot;

pub use backend::{DetectorBackend, InputTensor, ModelSpec, RawOutput};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use labels::{label_for, load_labels, parse_labels, UNKNOWN_LABEL};
pub use postprocess::{
    non_max_suppression, PostprocessConfig, Postprocessor, CONFIDENCE_THRESHOLD, IOU_THRESHOLD,
    MAX_DETECTED_OBJECTS,
};
pub use result::{Detection, FrameAnalysis, PERSON_CLASS};
pub use slot::DetectorSlot;
