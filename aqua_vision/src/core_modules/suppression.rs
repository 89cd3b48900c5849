// THEORY:
// Non-max suppression collapses overlapping detections of the same animal. The edge
// components of one fish frequently split into a body box and a fin or tail box, and
// both can pass scoring. Keeping the highest-confidence box and dropping anything
// that overlaps it too much leaves one report per animal.
//
// Overlap is judged two ways and either one suppresses:
// - intersection over the smaller area catches a small box nested inside a big one;
// - intersection over the larger area catches two similar boxes side by side.
//
// The output is capped at `max_detections` so a busy scene cannot flood the overlay
// or the persistence collaborator.

use crate::config::DetectorConfig;
use crate::core_modules::bounding_box::BoundingBox;

pub mod suppression {
    use super::*;

    /// True if `candidate` overlaps `kept` above either threshold.
    pub fn overlaps_too_much(candidate: &BoundingBox, kept: &BoundingBox, config: &DetectorConfig) -> bool {
        let overlap = candidate.intersection_area(kept);
        if overlap == 0 {
            return false;
        }
        let (a, b) = (candidate.area(), kept.area());
        let min_area = a.min(b).max(1) as f64;
        let max_area = a.max(b).max(1) as f64;
        let overlap = overlap as f64;

        overlap / min_area > config.nms_min_area_overlap || overlap / max_area > config.nms_max_area_overlap
    }

    /// Greedy suppression in descending confidence order. Ties keep their input order.
    pub fn suppress(boxes: Vec<BoundingBox>, config: &DetectorConfig) -> Vec<BoundingBox> {
        suppress_by(boxes, |b| b, config)
    }

    /// Same as `suppress`, for items that carry a box alongside other data.
    pub fn suppress_by<T, F>(mut items: Vec<T>, bbox: F, config: &DetectorConfig) -> Vec<T>
    where
        F: Fn(&T) -> &BoundingBox,
    {
        items.sort_by(|a, b| bbox(b).confidence.total_cmp(&bbox(a).confidence));

        let mut kept: Vec<T> = Vec::with_capacity(config.max_detections.min(items.len()));
        for item in items {
            if kept.len() >= config.max_detections {
                break;
            }
            let candidate = bbox(&item);
            if kept.iter().any(|k| overlaps_too_much(candidate, bbox(k), config)) {
                continue;
            }
            kept.push(item);
        }
        kept
    }
}
