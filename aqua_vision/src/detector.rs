// THEORY:
// The `Detector` is the single-pass engine. It owns the only state that survives
// between passes (the motion cache and the location history) and runs the stages in
// a fixed order on one already-downscaled frame:
//
//   Frame -> SampleMap -> EdgeMask -> components -> prefilter -> scores
//         -> acceptance (threshold + location history) -> NMS -> species tags
//
// Key principles:
// 1.  **Owned State, No Globals**: Two independent detectors never share anything.
//     `reset` returns a detector to its freshly constructed state.
// 2.  **Processing Coordinates**: Everything here is in the coordinates of the frame
//     it was given. Mapping back to the full-resolution frame is done by the caller
//     through `PassReport::records`.
// 3.  **History Before Suppression**: Every accepted candidate is written to the
//     location history, including ones NMS later drops. Repeated hits on the same
//     patch of texture accumulate whether or not they were shown.
// 4.  **Motion Always Advances**: The motion cache is replaced with the current map
//     at the end of every pass, detection or not, so it always holds the
//     immediately preceding processed frame.

use crate::config::DetectorConfig;
use crate::core_modules::bounding_box::BoundingBox;
use crate::core_modules::component_extractor::component_extractor;
use crate::core_modules::edge_detector::edge_detector;
use crate::core_modules::feature_scorer::feature_scorer::{self, ScoreBreakdown};
use crate::core_modules::frame::Frame;
use crate::core_modules::location_history::LocationHistory;
use crate::core_modules::measurement::DetectionRecord;
use crate::core_modules::motion_cache::MotionCache;
use crate::core_modules::pixel::pixel::CHANNELS;
use crate::core_modules::prefilter::prefilter;
use crate::core_modules::sample_map::SampleMap;
use crate::core_modules::species::species;
use crate::core_modules::suppression::suppression;
use crate::error::FrameError;
use std::time::Instant;
use tracing::{debug, trace};

/// One accepted candidate, in processing coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub breakdown: ScoreBreakdown,
    pub is_target_species: bool,
}

/// How many candidates survived each stage of a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCounts {
    pub edge_pixels: usize,
    pub components: usize,
    pub prefiltered: usize,
    pub above_threshold: usize,
    pub accepted: usize,
    pub kept: usize,
}

/// The result of one detection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub frame_id: u64,
    /// Dimensions of the frame the pass ran on.
    pub width: u32,
    pub height: u32,
    /// Survivors of suppression, highest confidence first.
    pub detections: Vec<Detection>,
    pub counts: StageCounts,
}

impl PassReport {
    pub fn has_detections(&self) -> bool {
        !self.detections.is_empty()
    }

    /// The highest-confidence detection of the pass.
    pub fn best(&self) -> Option<&Detection> {
        self.detections.first()
    }

    /// Maps every detection to a measured record in a frame of `full_width` x
    /// `full_height`, scaling each box by `1 / process_scale`.
    pub fn records(
        &self,
        process_scale: f64,
        full_width: u32,
        full_height: u32,
        pixel_to_cm_ratio: f64,
    ) -> Vec<DetectionRecord> {
        let factor = if process_scale > 0.0 { 1.0 / process_scale } else { 1.0 };
        self.detections
            .iter()
            .map(|detection| {
                let full = detection.bounding_box.scaled(factor, full_width, full_height);
                DetectionRecord::new(full, detection.is_target_species, pixel_to_cm_ratio)
            })
            .collect()
    }
}

/// The main, top-level struct for a single detection pass.
pub struct Detector {
    config: DetectorConfig,
    motion_cache: MotionCache,
    location_history: LocationHistory,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Self {
        let location_history = LocationHistory::new(config.history_capacity);
        Self {
            config,
            motion_cache: MotionCache::new(),
            location_history,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn location_history(&self) -> &LocationHistory {
        &self.location_history
    }

    pub fn motion_cache(&self) -> &MotionCache {
        &self.motion_cache
    }

    /// Forgets the previous frame and every recorded location.
    pub fn reset(&mut self) {
        self.motion_cache.clear();
        self.location_history.clear();
    }

    /// Runs one pass over `frame`, using `now` for location-history timing.
    pub fn process(&mut self, frame: &Frame, now: Instant) -> Result<PassReport, FrameError> {
        // --- 1. Validate & preprocess ---
        if frame.width == 0 || frame.height == 0 {
            return Err(FrameError::Empty {
                width: frame.width,
                height: frame.height,
            });
        }
        let expected = frame.pixel_count() * CHANNELS;
        if frame.data.len() != expected {
            return Err(FrameError::MalformedBuffer {
                width: frame.width,
                height: frame.height,
                expected,
                actual: frame.data.len(),
            });
        }
        let map = SampleMap::from_frame(frame);
        let mut counts = StageCounts::default();

        // --- 2. Edges & components ---
        let mask = edge_detector::detect_edges(&map, &self.config);
        counts.edge_pixels = mask.edge_count();
        let components = component_extractor::extract_components(&mask, &self.config);
        counts.components = components.len();

        // --- 3. Geometric prefilter ---
        let candidates = prefilter::filter_candidates(components, frame.width, frame.height, &self.config);
        counts.prefiltered = candidates.len();

        // --- 4. Score & accept ---
        let previous = self.motion_cache.comparable(map.width, map.height);
        let window = self.config.history_window();
        let mut accepted: Vec<Detection> = Vec::new();

        for candidate in candidates {
            let breakdown = feature_scorer::score_candidate(&candidate, &map, previous, &self.config);
            trace!(
                x = candidate.x,
                y = candidate.y,
                width = candidate.width,
                height = candidate.height,
                score = breakdown.score,
                motion = breakdown.motion,
                "Scored candidate"
            );
            if breakdown.score <= self.config.acceptance_threshold {
                continue;
            }
            counts.above_threshold += 1;

            let hits = self.location_history.recent_hits(
                candidate.x,
                candidate.y,
                now,
                self.config.history_radius,
                window,
            );
            if hits >= self.config.max_recent_hits {
                debug!(x = candidate.x, y = candidate.y, hits, "Suppressed repeated location");
                continue;
            }

            self.location_history.record(candidate.x, candidate.y, now);
            let bounding_box = BoundingBox {
                confidence: breakdown.score,
                ..candidate
            };
            accepted.push(Detection {
                bounding_box,
                breakdown,
                is_target_species: false,
            });
        }
        counts.accepted = accepted.len();

        // --- 5. Suppression & species tags ---
        let mut detections = suppression::suppress_by(accepted, |d| &d.bounding_box, &self.config);
        for detection in detections.iter_mut() {
            detection.is_target_species =
                species::is_target_species(&detection.bounding_box, &map, &self.config.species);
        }
        counts.kept = detections.len();

        // --- 6. Advance the motion cache ---
        self.motion_cache.update(&map);

        debug!(
            frame_id = frame.frame_id,
            edge_pixels = counts.edge_pixels,
            components = counts.components,
            prefiltered = counts.prefiltered,
            accepted = counts.accepted,
            kept = counts.kept,
            "Detection pass complete"
        );

        Ok(PassReport {
            frame_id: frame.frame_id,
            width: frame.width,
            height: frame.height,
            detections,
            counts,
        })
    }
}
