// THEORY:
// Fish move; decorations, rocks and printed backgrounds do not. The motion cache is
// the one-frame memory that lets the scorer tell them apart. It holds the grayscale
// map of the immediately preceding processed pass and nothing older.
//
// The slot is only useful when the previous map has the same dimensions as the
// current one. After a resolution change the cache reports "nothing comparable" and
// the scorer falls back to its conservative default instead of comparing unrelated
// pixels.

use crate::core_modules::pixel::pixel::Gray;
use crate::core_modules::sample_map::SampleMap;

/// Single-slot holder of the previous pass's grayscale map.
#[derive(Debug, Default, Clone)]
pub struct MotionCache {
    previous: Option<PreviousGray>,
}

#[derive(Debug, Clone)]
struct PreviousGray {
    width: u32,
    height: u32,
    gray: Vec<Gray>,
}

impl MotionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the slot with the current pass's map.
    pub fn update(&mut self, map: &SampleMap) {
        match &mut self.previous {
            Some(previous) => {
                previous.width = map.width;
                previous.height = map.height;
                previous.gray.clear();
                previous.gray.extend_from_slice(&map.gray);
            }
            None => {
                self.previous = Some(PreviousGray {
                    width: map.width,
                    height: map.height,
                    gray: map.gray.clone(),
                });
            }
        }
    }

    /// The previous grayscale map, if one exists with exactly these dimensions.
    pub fn comparable(&self, width: u32, height: u32) -> Option<&[Gray]> {
        self.previous
            .as_ref()
            .filter(|previous| previous.width == width && previous.height == height)
            .map(|previous| previous.gray.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.previous.is_none()
    }

    pub fn clear(&mut self) {
        self.previous = None;
    }
}
