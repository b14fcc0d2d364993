//! Camera frames and detector input preparation.
//!
//! A `Frame` is whatever the camera delivered: a pixel buffer in one of a few
//! layouts plus the rotation needed to make it upright. The pipeline turns it
//! into an upright `RgbImage` (the coordinate frame detections refer to) and
//! then into a normalized `InputTensor` sized for the model.

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::detect::{InputTensor, ModelSpec};
use crate::error::{CourtError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// 4 bytes per pixel. Rows may be padded (see `Frame::row_stride`).
    Rgba8888,
    Rgb888,
    /// Y plane followed by interleaved V/U.
    Nv21,
    /// Y plane followed by interleaved U/V.
    Nv12,
    /// Camera format code with no converter.
    Other(u32),
}

/// One frame as delivered by a frame source.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Clockwise rotation that makes the image upright.
    pub rotation_degrees: u32,
    pub format: PixelFormat,
    /// Bytes per row for `Rgba8888` when rows are padded.
    pub row_stride: Option<usize>,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            rotation_degrees: 0,
            format,
            row_stride: None,
        }
    }

    pub fn with_rotation(mut self, degrees: u32) -> Self {
        self.rotation_degrees = degrees;
        self
    }

    pub fn with_row_stride(mut self, stride: usize) -> Self {
        self.row_stride = Some(stride);
        self
    }

    /// Convert to an upright RGB image.
    pub fn to_upright_rgb(&self) -> Result<RgbImage> {
        if self.width == 0 || self.height == 0 {
            return Err(CourtError::frame(format!(
                "invalid frame dimensions {}x{}",
                self.width, self.height
            )));
        }
        let rgb = normalize_to_rgb(self)?;
        let image = RgbImage::from_raw(self.width, self.height, rgb)
            .ok_or_else(|| CourtError::frame("RGB buffer does not match frame dimensions"))?;
        rotate_upright(image, self.rotation_degrees)
    }
}

fn rotate_upright(image: RgbImage, degrees: u32) -> Result<RgbImage> {
    match degrees % 360 {
        0 => Ok(image),
        90 => Ok(imageops::rotate90(&image)),
        180 => Ok(imageops::rotate180(&image)),
        270 => Ok(imageops::rotate270(&image)),
        other => Err(CourtError::frame(format!(
            "rotation must be a multiple of 90 degrees, got {}",
            other
        ))),
    }
}

fn normalize_to_rgb(frame: &Frame) -> Result<Vec<u8>> {
    let w = frame.width as usize;
    let h = frame.height as usize;
    let pixels = w
        .checked_mul(h)
        .ok_or_else(|| CourtError::frame("frame dimensions overflow"))?;

    match frame.format {
        PixelFormat::Rgb888 => {
            let expected = pixels * 3;
            if frame.data.len() != expected {
                return Err(CourtError::frame(format!(
                    "RGB frame length mismatch: expected {}, got {}",
                    expected,
                    frame.data.len()
                )));
            }
            Ok(frame.data.clone())
        }
        PixelFormat::Rgba8888 => rgba_to_rgb(&frame.data, w, h, frame.row_stride),
        PixelFormat::Nv21 => semi_planar_to_rgb(&frame.data, w, h, true),
        PixelFormat::Nv12 => semi_planar_to_rgb(&frame.data, w, h, false),
        PixelFormat::Other(code) => Err(CourtError::frame(format!(
            "unsupported pixel format {:#x}",
            code
        ))),
    }
}

fn rgba_to_rgb(data: &[u8], w: usize, h: usize, row_stride: Option<usize>) -> Result<Vec<u8>> {
    let stride = row_stride.unwrap_or(w * 4);
    if stride < w * 4 {
        return Err(CourtError::frame(format!(
            "RGBA row stride {} is shorter than a row of {} pixels",
            stride, w
        )));
    }
    // The last row may omit its padding.
    let expected = stride * (h - 1) + w * 4;
    if data.len() < expected {
        return Err(CourtError::frame(format!(
            "RGBA frame too short: expected at least {}, got {}",
            expected,
            data.len()
        )));
    }

    let mut rgb = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let start = row * stride;
        for px in data[start..start + w * 4].chunks_exact(4) {
            rgb.extend_from_slice(&px[..3]);
        }
    }
    Ok(rgb)
}

fn semi_planar_to_rgb(data: &[u8], w: usize, h: usize, v_first: bool) -> Result<Vec<u8>> {
    let y_plane = w * h;
    let expected = y_plane + 2 * w.div_ceil(2) * h.div_ceil(2);
    if data.len() != expected {
        return Err(CourtError::frame(format!(
            "{} frame length mismatch: expected {}, got {}",
            if v_first { "NV21" } else { "NV12" },
            expected,
            data.len()
        )));
    }
    let chroma_row = 2 * w.div_ceil(2);

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = data[j * w + i] as f32;
            let uv = y_plane + (j / 2) * chroma_row + (i / 2) * 2;
            let (u, v) = if v_first {
                (data[uv + 1], data[uv])
            } else {
                (data[uv], data[uv + 1])
            };
            let u = u as f32 - 128.0;
            let v = v as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }
    Ok(rgb)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Resize (bilinear) to the model input and scale channels to `[0,1]`.
pub fn prepare_input(image: &RgbImage, spec: &ModelSpec) -> InputTensor {
    let resized;
    let source = if image.width() == spec.input_width && image.height() == spec.input_height {
        image
    } else {
        resized = imageops::resize(
            image,
            spec.input_width,
            spec.input_height,
            FilterType::Triangle,
        );
        &resized
    };
    InputTensor {
        width: spec.input_width,
        height: spec.input_height,
        data: source
            .as_raw()
            .iter()
            .map(|&v| v as f32 / 255.0)
            .collect(),
    }
}
