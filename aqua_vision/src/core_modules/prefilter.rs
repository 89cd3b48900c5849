// THEORY:
// The prefilter is the cheap gate in front of the expensive scorer. Most connected
// components in a real scene are either specks (sensor noise, debris, bubbles) or
// huge background structures (tank walls, plants, the whole frame). Both are rejected
// here on geometry alone: area outside `[min_area, max_area_fraction * frame_area]`
// or an aspect ratio (long over short side) outside the elongated-body range.

use crate::config::DetectorConfig;
use crate::core_modules::bounding_box::BoundingBox;

pub mod prefilter {
    use super::*;

    /// Why a candidate was dropped, for debug logging.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Rejection {
        TooSmall,
        TooLarge,
        AspectOutOfRange,
    }

    /// Largest admissible area for a frame of the given size.
    pub fn max_area(frame_width: u32, frame_height: u32, config: &DetectorConfig) -> f64 {
        frame_width as f64 * frame_height as f64 * config.max_area_fraction
    }

    pub fn check(
        candidate: &BoundingBox,
        frame_width: u32,
        frame_height: u32,
        config: &DetectorConfig,
    ) -> Result<(), Rejection> {
        let area = candidate.area();
        if area == 0 || area < config.min_area as u64 {
            return Err(Rejection::TooSmall);
        }
        if area as f64 > max_area(frame_width, frame_height, config) {
            return Err(Rejection::TooLarge);
        }
        let aspect = candidate.aspect_ratio();
        if aspect < config.min_aspect_ratio || aspect > config.max_aspect_ratio {
            return Err(Rejection::AspectOutOfRange);
        }
        Ok(())
    }

    /// Keeps only candidates that pass every geometric bound.
    pub fn filter_candidates(
        candidates: Vec<BoundingBox>,
        frame_width: u32,
        frame_height: u32,
        config: &DetectorConfig,
    ) -> Vec<BoundingBox> {
        candidates
            .into_iter()
            .filter(|candidate| check(candidate, frame_width, frame_height, config).is_ok())
            .collect()
    }
}
