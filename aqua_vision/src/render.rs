// THEORY:
// Rendering is a collaborator, not part of detection. The orchestrator redraws the
// latest full-resolution frame every cycle and then the overlays of the most recent
// detection pass, which stay on screen until the next pass replaces them. What a
// "surface" is (a window, a browser canvas, a PNG on disk) is up to the host.
//
// This module defines:
// 1.  `Overlay`: one box to draw with its colour, line thickness and label. Tilapia
//     are drawn in bright green with a heavier line; other fish in gray.
// 2.  `RenderSurface`: the trait the orchestrator draws through.
// 3.  `RgbaCanvas`: an in-memory surface backed by an `image::RgbaImage` that draws
//     box outlines. Text is not rasterised; labels are carried on the overlay for
//     the host to show as it sees fit.

use crate::core_modules::bounding_box::BoundingBox;
use crate::core_modules::frame::Frame;
use crate::core_modules::measurement::DetectionRecord;
use crate::error::VisionError;
use image::{Rgba, RgbaImage};

pub const TARGET_SPECIES_COLOR: [u8; 3] = [0x00, 0xff, 0x00];
pub const OTHER_FISH_COLOR: [u8; 3] = [0x80, 0x80, 0x80];
pub const TARGET_SPECIES_THICKNESS: u32 = 4;
pub const OTHER_FISH_THICKNESS: u32 = 3;

/// One box to draw over the frame, in full-resolution coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub bounding_box: BoundingBox,
    pub color: [u8; 3],
    pub thickness: u32,
    pub label: String,
}

impl Overlay {
    /// Overlay for the `index`-th (1-based) record of a pass.
    pub fn for_record(record: &DetectionRecord, index: usize) -> Self {
        let (color, thickness, kind) = if record.is_target_species {
            (TARGET_SPECIES_COLOR, TARGET_SPECIES_THICKNESS, "Tilapia")
        } else {
            (OTHER_FISH_COLOR, OTHER_FISH_THICKNESS, "Fish")
        };
        Self {
            bounding_box: record.bounding_box,
            color,
            thickness,
            label: format!("{} {} {:.1}%", kind, index, record.confidence * 100.0),
        }
    }

    /// CSS-style `#rrggbb`.
    pub fn color_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.color[0], self.color[1], self.color[2])
    }
}

/// Where the orchestrator draws each cycle.
pub trait RenderSurface: Send {
    fn draw_frame(&mut self, frame: &Frame) -> Result<(), VisionError>;

    fn draw_overlay(&mut self, overlay: &Overlay) -> Result<(), VisionError>;

    /// Called once per cycle after all overlays were drawn.
    fn present(&mut self) -> Result<(), VisionError> {
        Ok(())
    }
}

/// Surface that draws nothing. Useful for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl RenderSurface for NullSurface {
    fn draw_frame(&mut self, _frame: &Frame) -> Result<(), VisionError> {
        Ok(())
    }

    fn draw_overlay(&mut self, _overlay: &Overlay) -> Result<(), VisionError> {
        Ok(())
    }
}

/// In-memory surface holding the last drawn frame plus outlines.
#[derive(Debug, Default, Clone)]
pub struct RgbaCanvas {
    image: Option<RgbaImage>,
    labels: Vec<String>,
}

impl RgbaCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self) -> Option<&RgbaImage> {
        self.image.as_ref()
    }

    /// Labels of the overlays drawn since the last frame.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    fn fill_rect(image: &mut RgbaImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgba<u8>) {
        let x1 = x1.min(image.width());
        let y1 = y1.min(image.height());
        for y in y0..y1 {
            for x in x0..x1 {
                image.put_pixel(x, y, color);
            }
        }
    }
}

impl RenderSurface for RgbaCanvas {
    fn draw_frame(&mut self, frame: &Frame) -> Result<(), VisionError> {
        self.image = Some(frame.to_rgba_image()?);
        self.labels.clear();
        Ok(())
    }

    fn draw_overlay(&mut self, overlay: &Overlay) -> Result<(), VisionError> {
        let Some(image) = self.image.as_mut() else {
            return Ok(());
        };
        let b = &overlay.bounding_box;
        let t = overlay.thickness.max(1);
        let color = Rgba([overlay.color[0], overlay.color[1], overlay.color[2], 255]);
        let (x0, y0) = (b.x, b.y);
        let (x1, y1) = (b.x + b.width, b.y + b.height);

        // --- Top, bottom, left, right bands ---
        Self::fill_rect(image, x0, y0, x1, y0.saturating_add(t), color);
        Self::fill_rect(image, x0, y1.saturating_sub(t), x1, y1, color);
        Self::fill_rect(image, x0, y0, x0.saturating_add(t), y1, color);
        Self::fill_rect(image, x1.saturating_sub(t), y0, x1, y1, color);

        self.labels.push(overlay.label.clone());
        Ok(())
    }
}
