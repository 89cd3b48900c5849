// THEORY:
// The `SampleMap` is the preprocessor's output: the frame decoded once into the two
// per-pixel views every later stage reads. The grayscale view feeds the edge detector
// and the motion comparison; the colour view feeds the colour-profile score and the
// species classifier. Decoding once per pass keeps the RGBA stride arithmetic out of
// the hot loops below.

use crate::core_modules::frame::Frame;
use crate::core_modules::pixel::pixel::{CHANNELS, Gray, Pixel};

/// Grayscale and colour views of one frame, same dimensions as the frame.
#[derive(Debug, Clone)]
pub struct SampleMap {
    pub width: u32,
    pub height: u32,
    /// Row-major `floor((r + g + b) / 3)` values.
    pub gray: Vec<Gray>,
    /// Row-major RGB samples.
    pub color: Vec<Pixel>,
}

impl SampleMap {
    pub fn from_frame(frame: &Frame) -> Self {
        let mut gray = Vec::with_capacity(frame.pixel_count());
        let mut color = Vec::with_capacity(frame.pixel_count());

        for bytes in frame.data.chunks_exact(CHANNELS) {
            let pixel = Pixel::new(bytes[0], bytes[1], bytes[2]);
            gray.push(pixel.gray());
            color.push(pixel);
        }

        Self {
            width: frame.width,
            height: frame.height,
            gray,
            color,
        }
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    pub fn gray_at(&self, x: u32, y: u32) -> Option<Gray> {
        if !self.contains(x, y) {
            return None;
        }
        self.gray.get(self.index(x, y)).copied()
    }

    pub fn color_at(&self, x: u32, y: u32) -> Option<Pixel> {
        if !self.contains(x, y) {
            return None;
        }
        self.color.get(self.index(x, y)).copied()
    }

    pub fn same_dimensions(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}
