// THEORY:
// The `BoundingBox` is the candidate object flowing through the middle of the
// pipeline. The component extractor creates it with a placeholder confidence, the
// feature scorer overwrites that confidence, and non-max suppression consumes it.
//
// It is a "dumb" data container plus the geometry every stage needs: area, the
// orientation-independent aspect ratio (long side over short side), intersection
// with another box, and rescaling between the processing resolution and the
// full-resolution frame. All coordinates are integer pixels in whichever frame the
// box was produced for.

/// A simple struct to represent a 2D point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

/// An axis-aligned candidate region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Placeholder until scored, then the final confidence in [0, 1].
    pub confidence: f64,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32, confidence: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn long_side(&self) -> u32 {
        self.width.max(self.height)
    }

    pub fn short_side(&self) -> u32 {
        self.width.min(self.height)
    }

    /// Long side over short side; infinite for degenerate boxes.
    pub fn aspect_ratio(&self) -> f64 {
        let short = self.short_side();
        if short == 0 {
            return f64::INFINITY;
        }
        self.long_side() as f64 / short as f64
    }

    /// Geometric centre as floating point coordinates.
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    pub fn top_left(&self) -> Point {
        Point {
            x: self.x,
            y: self.y,
        }
    }

    /// True when the box lies entirely inside a `frame_width` x `frame_height` frame.
    pub fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.x as u64 + self.width as u64 <= frame_width as u64
            && self.y as u64 + self.height as u64 <= frame_height as u64
    }

    /// Area shared with `other`.
    pub fn intersection_area(&self, other: &BoundingBox) -> u64 {
        let left = self.x.max(other.x) as i64;
        let right = (self.x as i64 + self.width as i64).min(other.x as i64 + other.width as i64);
        let top = self.y.max(other.y) as i64;
        let bottom = (self.y as i64 + self.height as i64).min(other.y as i64 + other.height as i64);
        let overlap_x = (right - left).max(0) as u64;
        let overlap_y = (bottom - top).max(0) as u64;
        overlap_x * overlap_y
    }

    /// Multiplies every coordinate by `factor`, flooring the result, and clamps
    /// the box into the target frame.
    pub fn scaled(&self, factor: f64, frame_width: u32, frame_height: u32) -> BoundingBox {
        let scale = |v: u32| (v as f64 * factor).floor().max(0.0) as u32;
        let x = scale(self.x).min(frame_width);
        let y = scale(self.y).min(frame_height);
        let width = scale(self.width).min(frame_width - x);
        let height = scale(self.height).min(frame_height - y);
        BoundingBox {
            x,
            y,
            width,
            height,
            confidence: self.confidence,
        }
    }
}
