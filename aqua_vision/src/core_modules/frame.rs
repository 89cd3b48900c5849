// THEORY:
// A `Frame` is an immutable snapshot of one capture tick: dimensions, a tightly
// packed RGBA buffer and the instant it was taken. It is the only type that crosses
// the boundary from the frame source into the engine, so it is also where buffer
// validation happens. Once a `Frame` exists, every downstream stage may index it
// without re-checking lengths.
//
// The detector never runs on the full-resolution frame. The orchestrator asks for a
// downscaled copy (bilinear, through the `image` crate) and maps the resulting
// boxes back up, which keeps per-pass cost bounded regardless of camera resolution.

use crate::core_modules::pixel::pixel::{CHANNELS, Pixel};
use crate::error::FrameError;
use image::RgbaImage;
use image::imageops::{self, FilterType};
use std::time::Instant;

/// One captured RGBA frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA bytes, exactly `width * height * 4` long.
    pub data: Vec<u8>,
    pub frame_id: u64,
    pub timestamp: Instant,
}

impl Frame {
    /// Wraps a raw RGBA buffer, checking that its length matches the dimensions.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(FrameError::MalformedBuffer {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
            frame_id: 0,
            timestamp: Instant::now(),
        })
    }

    pub fn with_id(mut self, frame_id: u64) -> Self {
        self.frame_id = frame_id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Instant) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn from_rgba_image(image: RgbaImage) -> Result<Self, FrameError> {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    pub fn to_rgba_image(&self) -> Result<RgbaImage, FrameError> {
        let expected = self.pixel_count() * CHANNELS;
        RgbaImage::from_raw(self.width, self.height, self.data.clone()).ok_or(
            FrameError::MalformedBuffer {
                width: self.width,
                height: self.height,
                expected,
                actual: self.data.len(),
            },
        )
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// The colour at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Pixel> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Pixel::from_rgba(self.data.get(index..index + CHANNELS)?)
    }

    /// Dimensions of the copy produced by `downscale(scale)`.
    pub fn scaled_dimensions(&self, scale: f64) -> (u32, u32) {
        let width = ((self.width as f64 * scale).floor() as u32).max(1);
        let height = ((self.height as f64 * scale).floor() as u32).max(1);
        (width, height)
    }

    /// A bilinear-filtered copy at `scale` of the linear resolution, keeping the
    /// id and timestamp. A scale of 1.0 returns a plain copy.
    pub fn downscale(&self, scale: f64) -> Result<Frame, FrameError> {
        if !(scale > 0.0 && scale <= 1.0) {
            return Err(FrameError::InvalidScale(scale));
        }
        if scale == 1.0 {
            return Ok(self.clone());
        }

        let (width, height) = self.scaled_dimensions(scale);
        let source = self.to_rgba_image()?;
        let resized = imageops::resize(&source, width, height, FilterType::Triangle);

        Ok(Frame::from_rgba_image(resized)?
            .with_id(self.frame_id)
            .with_timestamp(self.timestamp))
    }
}
