use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

/// Class name the occupancy tracker counts.
pub const PERSON_CLASS: &str = "person";

/// One detected object, in pixel coordinates of the upright frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bounding_box: Rect,
    pub class_name: String,
    pub confidence: f32,
}

impl Detection {
    pub fn is_person(&self) -> bool {
        self.class_name.eq_ignore_ascii_case(PERSON_CLASS)
    }
}

/// Detections for one analysed frame, with the frame size they refer to.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    pub detections: Vec<Detection>,
    pub image_width: u32,
    pub image_height: u32,
}
