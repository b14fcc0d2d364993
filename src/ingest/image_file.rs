use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::{Frame, PixelFormat};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Replays a still image, or every image in a directory, as camera frames.
///
/// Images are decoded lazily on each frame so edits on disk show up on the
/// next pass. Only local paths are accepted.
pub struct ImageFileSource {
    config: SourceConfig,
    paths: Vec<PathBuf>,
    next: usize,
    frame_count: u64,
    last_error: Option<String>,
}

impl ImageFileSource {
    pub fn new(path: &str, config: SourceConfig) -> Result<Self> {
        if path.contains("://") {
            return Err(anyhow!(
                "image source only supports local paths, got {}",
                path
            ));
        }
        let root = Path::new(path);
        let paths = if root.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(root)
                .with_context(|| format!("failed to list {}", root.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_image(p))
                .collect();
            entries.sort();
            entries
        } else if root.is_file() {
            vec![root.to_path_buf()]
        } else {
            return Err(anyhow!("image source {} does not exist", root.display()));
        };
        if paths.is_empty() {
            return Err(anyhow!("no images found in {}", root.display()));
        }
        Ok(Self {
            config,
            paths,
            next: 0,
            frame_count: 0,
            last_error: None,
        })
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

impl FrameSource for ImageFileSource {
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "frame source {} connected ({} image(s))",
            self.config.url,
            self.paths.len()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let path = &self.paths[self.next];
        self.next = (self.next + 1) % self.paths.len();
        let image = match image::open(path) {
            Ok(image) => image.into_rgb8(),
            Err(e) => {
                self.last_error = Some(e.to_string());
                return Err(anyhow!("failed to decode {}: {}", path.display(), e));
            }
        };
        self.last_error = None;
        self.frame_count += 1;
        let (width, height) = image.dimensions();
        Ok(Frame::new(image.into_raw(), width, height, PixelFormat::Rgb888)
            .with_rotation(self.config.rotation_degrees))
    }

    fn is_healthy(&self) -> bool {
        self.last_error.is_none()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}
