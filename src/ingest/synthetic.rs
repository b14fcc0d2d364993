use anyhow::Result;

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::{Frame, PixelFormat};

const SCENE_LENGTH: u64 = 50;

/// Synthetic court camera (`stub://`).
///
/// Draws a green court and, every other scene, a bright block in the middle
/// standing in for a player.
pub struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    /// True when the current scene contains the player block.
    pub fn player_present(&self) -> bool {
        (self.frame_count / SCENE_LENGTH) % 2 == 1
    }

    fn render(&self) -> Vec<u8> {
        let (w, h) = (self.config.width as usize, self.config.height as usize);
        let mut pixels = Vec::with_capacity(w * h * 3);
        let player = self.player_present();
        let block_x = w * 2 / 5..w * 3 / 5;
        let block_y = h / 4..h * 3 / 4;
        for y in 0..h {
            for x in 0..w {
                if player && block_x.contains(&x) && block_y.contains(&y) {
                    pixels.extend_from_slice(&[230, 200, 180]);
                } else {
                    pixels.extend_from_slice(&[40, 120 + (y % 16) as u8, 60]);
                }
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!("frame source {} connected (synthetic)", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let pixels = self.render();
        self.frame_count += 1;
        Ok(Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            PixelFormat::Rgb888,
        )
        .with_rotation(self.config.rotation_degrees))
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}
