// THEORY:
// Measurement turns a full-resolution bounding box into physical size. There is no
// camera calibration: a single configurable pixel-to-centimetre constant is applied
// to the long and short sides of the box, so "length" is always the long side
// regardless of whether the fish swims horizontally or vertically.
//
// The size band is a two-threshold classifier over (length, width) in centimetres.
// Both bounds of a band must hold; anything that fails the Medium band is Large.
//
// `DetectionRecord` is the typed result of a pass. Formatting to the loosely typed
// string payload the persistence collaborator expects happens only in
// `RecordPayload`, at the boundary.

use crate::core_modules::bounding_box::{BoundingBox, Point};
use serde::{Deserialize, Serialize};
use std::fmt;

const SMALL_MAX_LENGTH_CM: f64 = 5.0;
const SMALL_MAX_WIDTH_CM: f64 = 2.0;
const MEDIUM_MAX_LENGTH_CM: f64 = 10.0;
const MEDIUM_MAX_WIDTH_CM: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeCategory {
    Small,
    Medium,
    Large,
}

impl SizeCategory {
    pub fn classify(length_cm: f64, width_cm: f64) -> Self {
        if length_cm <= SMALL_MAX_LENGTH_CM && width_cm <= SMALL_MAX_WIDTH_CM {
            SizeCategory::Small
        } else if length_cm <= MEDIUM_MAX_LENGTH_CM && width_cm <= MEDIUM_MAX_WIDTH_CM {
            SizeCategory::Medium
        } else {
            SizeCategory::Large
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeCategory::Small => "Small",
            SizeCategory::Medium => "Medium",
            SizeCategory::Large => "Large",
        }
    }
}

impl fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical size estimate of one box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub length_cm: f64,
    pub width_cm: f64,
    pub category: SizeCategory,
}

impl Measurement {
    pub fn of(bbox: &BoundingBox, pixel_to_cm_ratio: f64) -> Self {
        let length_cm = bbox.long_side() as f64 * pixel_to_cm_ratio;
        let width_cm = bbox.short_side() as f64 * pixel_to_cm_ratio;
        Self {
            length_cm,
            width_cm,
            category: SizeCategory::classify(length_cm, width_cm),
        }
    }
}

/// One accepted, measured detection in full-resolution frame coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub length_cm: f64,
    pub width_cm: f64,
    pub size_category: SizeCategory,
    pub confidence: f64,
    /// Top-left corner of the box.
    pub position: Point,
    pub bounding_box: BoundingBox,
    pub is_target_species: bool,
}

impl DetectionRecord {
    pub fn new(bounding_box: BoundingBox, is_target_species: bool, pixel_to_cm_ratio: f64) -> Self {
        let measurement = Measurement::of(&bounding_box, pixel_to_cm_ratio);
        Self {
            length_cm: measurement.length_cm,
            width_cm: measurement.width_cm,
            size_category: measurement.category,
            confidence: bounding_box.confidence,
            position: bounding_box.top_left(),
            bounding_box,
            is_target_species,
        }
    }

    pub fn measurement(&self) -> Measurement {
        Measurement {
            length_cm: self.length_cm,
            width_cm: self.width_cm,
            category: self.size_category,
        }
    }
}

/// The wire form handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayload {
    /// Centimetres, two decimals.
    pub length: String,
    /// Centimetres, two decimals.
    pub width: String,
    pub category: String,
    /// Percent, one decimal.
    pub confidence: String,
}

impl From<&DetectionRecord> for RecordPayload {
    fn from(record: &DetectionRecord) -> Self {
        Self {
            length: format!("{:.2}", record.length_cm),
            width: format!("{:.2}", record.width_cm),
            category: record.size_category.to_string(),
            confidence: format!("{:.1}", record.confidence * 100.0),
        }
    }
}
