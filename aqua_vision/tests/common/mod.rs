#![allow(dead_code)]

use aqua_vision::Frame;
use std::time::Instant;

pub const BACKGROUND: [u8; 3] = [30, 30, 30];
/// Two gray-silver body tones, 30 gray levels apart.
pub const BODY_DARK: [u8; 3] = [110, 125, 140];
pub const BODY_LIGHT: [u8; 3] = [140, 155, 170];
pub const STRIPE_WIDTH: u32 = 4;

/// Placement of one synthetic fish: a striped gray rectangle.
#[derive(Debug, Clone, Copy)]
pub struct Fish {
    pub x: u32,
    pub y: u32,
    pub length: u32,
    pub thickness: u32,
    /// Shifts the stripe pattern; advancing it animates the body in place.
    pub phase: u32,
}

impl Fish {
    pub fn at(x: u32, y: u32) -> Self {
        Self {
            x,
            y,
            length: 150,
            thickness: 50,
            phase: 0,
        }
    }

    pub fn shifted(self, dx: u32) -> Self {
        Self { x: self.x + dx, ..self }
    }

    pub fn with_phase(self, phase: u32) -> Self {
        Self { phase, ..self }
    }

    fn color_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x < self.x || x >= self.x + self.length || y < self.y || y >= self.y + self.thickness {
            return None;
        }
        let stripe = ((x - self.x + self.phase) / STRIPE_WIDTH) % 2;
        Some(if stripe == 0 { BODY_DARK } else { BODY_LIGHT })
    }
}

/// A flat dark frame with the given fish painted on it.
pub fn scene(width: u32, height: u32, fish: &[Fish]) -> Frame {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let rgb = fish
                .iter()
                .find_map(|f| f.color_at(x, y))
                .unwrap_or(BACKGROUND);
            data.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
    }
    Frame::new(width, height, data).expect("synthetic frame is well formed")
}

pub fn scene_at(width: u32, height: u32, fish: &[Fish], id: u64, timestamp: Instant) -> Frame {
    scene(width, height, fish).with_id(id).with_timestamp(timestamp)
}
