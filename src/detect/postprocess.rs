//! Raw network output to deduplicated detections.

use crate::detect::backend::{ModelSpec, RawOutput};
use crate::detect::labels::label_for;
use crate::detect::result::Detection;
use crate::geometry::Rect;

pub const CONFIDENCE_THRESHOLD: f32 = 0.4;
pub const IOU_THRESHOLD: f32 = 0.5;
pub const MAX_DETECTED_OBJECTS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PostprocessConfig {
    /// Minimum objectness, and the bar the best class score must exceed.
    pub confidence_threshold: f32,
    /// Candidates overlapping a kept box by more than this are suppressed.
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: CONFIDENCE_THRESHOLD,
            iou_threshold: IOU_THRESHOLD,
            max_detections: MAX_DETECTED_OBJECTS,
        }
    }
}

/// Converts raw predictions into detections scaled to a target frame.
#[derive(Clone, Debug, Default)]
pub struct Postprocessor {
    config: PostprocessConfig,
}

impl Postprocessor {
    pub fn new(config: PostprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PostprocessConfig {
        &self.config
    }

    /// Decode, filter and suppress. Output is sorted by descending confidence.
    pub fn process(
        &self,
        output: &RawOutput,
        spec: &ModelSpec,
        labels: &[String],
        target_width: u32,
        target_height: u32,
    ) -> Vec<Detection> {
        let candidates = self.candidates(output, spec, labels, target_width, target_height);
        non_max_suppression(
            candidates,
            self.config.iou_threshold,
            self.config.max_detections,
        )
    }

    fn candidates(
        &self,
        output: &RawOutput,
        spec: &ModelSpec,
        labels: &[String],
        target_width: u32,
        target_height: u32,
    ) -> Vec<Detection> {
        let stride = spec.record_len();
        let threshold = self.config.confidence_threshold;
        let tw = target_width as f32;
        let th = target_height as f32;
        let mut candidates = Vec::new();

        for record in output.records(stride) {
            let objectness = record[4];
            if objectness.is_nan() || objectness < threshold {
                continue;
            }

            let mut best: Option<(usize, f32)> = None;
            for (class_id, &score) in record[5..].iter().enumerate() {
                if score > best.map_or(0.0, |(_, s)| s) {
                    best = Some((class_id, score));
                }
            }
            let Some((class_id, class_score)) = best else {
                continue;
            };
            if class_score <= threshold {
                continue;
            }

            let confidence = objectness * class_score;
            if !confidence.is_finite() {
                continue;
            }

            let decoded = Rect::from_center(
                record[0] * tw,
                record[1] * th,
                record[2] * tw,
                record[3] * th,
            );
            // Clamping would turn a NaN or infinite edge into a frame edge.
            if !decoded.is_finite() {
                continue;
            }
            let bbox = decoded.clamp_to(tw, th);
            if bbox.is_empty() {
                continue;
            }

            candidates.push(Detection {
                bounding_box: bbox,
                class_name: label_for(labels, class_id).to_string(),
                confidence,
            });
        }
        candidates
    }
}

/// Greedy non-maximum suppression.
///
/// Candidates are visited in descending confidence; a kept candidate
/// deactivates every later one whose IoU with it exceeds `iou_threshold`.
/// Stops after `max_detections` are kept.
pub fn non_max_suppression(
    mut candidates: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    if candidates.is_empty() || max_detections == 0 {
        return Vec::new();
    }
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut active = vec![true; candidates.len()];
    let mut selected = Vec::new();

    for i in 0..candidates.len() {
        if !active[i] {
            continue;
        }
        selected.push(candidates[i].clone());
        if selected.len() >= max_detections {
            break;
        }
        let kept = candidates[i].bounding_box;
        for j in (i + 1)..candidates.len() {
            if active[j] && kept.iou(&candidates[j].bounding_box) > iou_threshold {
                active[j] = false;
            }
        }
    }
    selected
}
