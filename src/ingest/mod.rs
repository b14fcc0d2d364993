//! Frame sources.
//!
//! - `stub://name`: synthetic frames for tests and dry runs
//! - a local image file or directory of images, replayed in a loop
//!
//! Sources only produce frames. Pacing to `target_fps` is the caller's job
//! and conversion to RGB happens in the analysis worker.

pub mod image_file;
pub mod synthetic;

use anyhow::Result;

use crate::frame::Frame;

pub use image_file::ImageFileSource;
pub use synthetic::SyntheticSource;

#[derive(Clone, Debug, PartialEq)]
pub struct SourceConfig {
    /// `stub://...`, `file://...` or a plain local path.
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Clockwise rotation attached to every frame.
    pub rotation_degrees: u32,
    pub target_fps: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://court_camera".to_string(),
            width: 640,
            height: 480,
            rotation_degrees: 0,
            target_fps: 10,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

pub trait FrameSource: Send {
    fn connect(&mut self) -> Result<()>;
    fn next_frame(&mut self) -> Result<Frame>;
    fn is_healthy(&self) -> bool;
    fn stats(&self) -> SourceStats;
}

/// Pick a source implementation from the URL scheme.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    if config.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config.clone())));
    }
    let path = config.url.strip_prefix("file://").unwrap_or(&config.url);
    Ok(Box::new(ImageFileSource::new(path, config.clone())?))
}
