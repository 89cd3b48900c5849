// THEORY:
// The `FeatureScorer` is where a geometric candidate becomes a confidence. There is no
// learned model: confidence is a weighted sum of six independently computed
// sub-scores, each a coarse lookup table over one measurable property of the region.
//
// Sub-scores and what they look for:
// 1.  **Shape density**: elongated bodies put their mass near the centre. Ratio of
//     samples inside a central disc to samples outside it.
// 2.  **Colour profile**: fraction of samples in a broad aquatic palette (silver, gray,
//     blue, green-gray, brown, gold, red-orange, dark and mid tones). Heavily damped
//     for flat uniform regions and for bright or saturated ones, which are far more
//     often decorations or printed patterns than animals.
// 3.  **Aspect ratio**: 1.0 across the canonical 2.0..=4.0 body range, tapering off.
// 4.  **Size**: 1.0 for a typical footprint, lower near the prefilter bounds.
// 5.  **Edge consistency**: variance of gray values along the box diagonal. A smooth
//     body contour gives moderate variance; flat texture or clutter do not.
// 6.  **Motion**: the dominant factor. Fraction of samples whose gray value changed by
//     more than a fixed delta since the previous pass. A moderate ratio is ideal (a
//     swimming body moves part of its box, not all of it). Low motion additionally
//     applies a multiplicative penalty to the whole score, so a static object cannot
//     reach the acceptance threshold on looks alone.
//
// The final score is clamped to `max_confidence`. Acceptance (threshold plus
// location-history check) is the detector's job; this module only scores.

use crate::config::DetectorConfig;
use crate::core_modules::bounding_box::BoundingBox;
use crate::core_modules::pixel::pixel::{Gray, Pixel};
use crate::core_modules::sample_map::SampleMap;

pub mod feature_scorer {
    use super::*;

    const EDGE_SAMPLE_COUNT: u32 = 24;
    const MIN_EDGE_SAMPLES: usize = 6;
    const CENTER_RADIUS_FRACTION: f64 = 0.35;

    /// Every sub-score of one candidate, kept for logging and tests.
    #[derive(Debug, Clone, PartialEq)]
    pub struct ScoreBreakdown {
        pub shape: f64,
        pub color: f64,
        pub aspect: f64,
        pub size: f64,
        pub edge: f64,
        pub motion: f64,
        /// `None` when there was no comparable previous frame.
        pub motion_ratio: Option<f64>,
        /// Multiplier applied for weak motion (1.0 when none).
        pub motion_penalty: f64,
        pub score: f64,
    }

    /// One sampled pixel with its position.
    #[derive(Debug, Clone, Copy)]
    pub struct Sample {
        pub x: u32,
        pub y: u32,
        pub pixel: Pixel,
    }

    /// `max(2, min(w, h) / divisor)`.
    pub fn sample_step(candidate: &BoundingBox, divisor: u32) -> u32 {
        2.max(candidate.short_side() / divisor.max(1))
    }

    /// Samples the box on a regular grid, clipped to the map.
    pub fn sample_box(map: &SampleMap, candidate: &BoundingBox, step: u32) -> Vec<Sample> {
        let step = step.max(1) as usize;
        let x_end = (candidate.x + candidate.width).min(map.width);
        let y_end = (candidate.y + candidate.height).min(map.height);
        let mut samples = Vec::new();
        for y in (candidate.y..y_end).step_by(step) {
            for x in (candidate.x..x_end).step_by(step) {
                if let Some(pixel) = map.color_at(x, y) {
                    samples.push(Sample { x, y, pixel });
                }
            }
        }
        samples
    }

    // --- Shape density ---

    pub fn center_edge_ratio(candidate: &BoundingBox, samples: &[Sample]) -> f64 {
        let (center_x, center_y) = candidate.center();
        let radius = candidate.short_side() as f64 * CENTER_RADIUS_FRACTION;
        let center = samples
            .iter()
            .filter(|s| {
                let dx = s.x as f64 - center_x;
                let dy = s.y as f64 - center_y;
                (dx * dx + dy * dy).sqrt() < radius
            })
            .count();
        let edge = samples.len() - center;
        center as f64 / edge.max(1) as f64
    }

    pub fn shape_score(density_ratio: f64) -> f64 {
        if density_ratio > 0.6 {
            1.0
        } else if density_ratio > 0.4 {
            0.85
        } else if density_ratio > 0.3 {
            0.65
        } else if density_ratio > 0.2 {
            0.4
        } else {
            0.1
        }
    }

    // --- Colour profile ---

    /// Broad palette of plausible fish colours, in raw 0..255 channels.
    pub fn is_aquatic_color(pixel: &Pixel) -> bool {
        let (r, g, b) = (pixel.red as i32, pixel.green as i32, pixel.blue as i32);
        let saturation = pixel.saturation() as f64;
        let brightness = pixel.brightness() as f64;

        let silver = saturation < 0.25 && brightness > 40.0 && brightness < 200.0;
        let blue = b > r + 20 && b > g + 15 && saturation < 0.50 && brightness < 200.0;
        let green_gray = g > r + 15 && g > b + 10 && saturation < 0.45 && brightness < 200.0;
        let brown = r > 80 && g > 70 && b > 60 && r < 180 && g < 170 && b < 160 && saturation < 0.40;
        let gold = r > 150 && g > 140 && b < 100 && saturation < 0.55 && brightness < 220.0;
        let red_orange = r > 120 && g < r - 20 && b < r - 30 && saturation < 0.60 && brightness < 210.0;
        let dark = brightness < 80.0 && saturation < 0.30;
        let mid_tone = (80.0..=160.0).contains(&brightness) && saturation < 0.35;

        silver || blue || green_gray || brown || gold || red_orange || dark || mid_tone
    }

    pub fn color_score(samples: &[Sample]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let total = samples.len() as f64;
        let mut palette = 0usize;
        let mut uniform = 0usize;
        let mut bright = 0usize;
        let mut underwater = 0usize;
        let mut saturation_sum = 0.0f64;

        for sample in samples {
            let pixel = &sample.pixel;
            let saturation = pixel.saturation() as f64;
            let brightness = pixel.brightness() as f64;
            saturation_sum += saturation;

            if pixel.channel_range() < 25 {
                uniform += 1;
            }
            if brightness > 220.0 || saturation > 0.6 {
                bright += 1;
            }
            if is_aquatic_color(pixel) {
                palette += 1;
            }
            let (r, g, b) = (pixel.red as i32, pixel.green as i32, pixel.blue as i32);
            if b > g + 10 || g > r + 10 {
                underwater += 1;
            }
        }

        let palette_ratio = palette as f64 / total;
        let uniformity_ratio = uniform as f64 / total;
        let bright_ratio = bright as f64 / total;
        let average_saturation = saturation_sum / total;
        let underwater_ratio = underwater as f64 / total;

        let mut score = palette_ratio;
        if uniformity_ratio > 0.6 {
            score *= 0.4;
        } else if uniformity_ratio > 0.45 {
            score *= 0.6;
        }

        if bright_ratio > 0.3 {
            score *= 0.3;
        } else if bright_ratio > 0.2 {
            score *= 0.5;
        }

        if average_saturation > 0.5 {
            score *= 0.6;
        } else if average_saturation > 0.4 {
            score *= 0.8;
        }

        if underwater_ratio > 0.3 {
            score = (score * 1.1).min(1.0);
        }

        if palette_ratio < 0.55 {
            score *= 0.5;
        } else if palette_ratio < 0.65 {
            score *= 0.7;
        }

        score
    }

    // --- Geometry ---

    pub fn aspect_score(aspect: f64) -> f64 {
        if (2.0..=4.0).contains(&aspect) {
            1.0
        } else if (1.8..2.0).contains(&aspect) {
            0.9
        } else if aspect > 4.0 && aspect <= 4.5 {
            0.85
        } else if (1.5..1.8).contains(&aspect) || (aspect > 4.5 && aspect <= 5.0) {
            0.7
        } else if (1.3..1.5).contains(&aspect) {
            0.5
        } else {
            0.2
        }
    }

    pub fn size_score(candidate: &BoundingBox) -> f64 {
        let area = candidate.area();
        let short = candidate.short_side();
        let long = candidate.long_side();

        if (3000..=50_000).contains(&area) && short >= 30 && long <= 400 {
            1.0
        } else if (2000..3000).contains(&area) && short >= 25 {
            0.8
        } else if area > 50_000 && area <= 80_000 && long <= 500 {
            0.8
        } else if short < 25 {
            0.2
        } else if area > 80_000 {
            0.3
        } else {
            0.5
        }
    }

    // --- Edge consistency ---

    /// Gray values at 24 evenly spaced points along the box diagonal.
    pub fn diagonal_samples(map: &SampleMap, candidate: &BoundingBox) -> Vec<Gray> {
        (0..EDGE_SAMPLE_COUNT)
            .filter_map(|i| {
                let t = i as f64 / EDGE_SAMPLE_COUNT as f64;
                let x = (candidate.x as f64 + candidate.width as f64 * t).floor() as u32;
                let y = (candidate.y as f64 + candidate.height as f64 * t).floor() as u32;
                map.gray_at(x, y)
            })
            .collect()
    }

    pub fn variance(values: &[Gray]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let count = values.len() as f64;
        let mean = values.iter().map(|v| *v as f64).sum::<f64>() / count;
        values.iter().map(|v| (*v as f64 - mean).powi(2)).sum::<f64>() / count
    }

    pub fn edge_consistency_score(values: &[Gray]) -> f64 {
        if values.len() < MIN_EDGE_SAMPLES {
            return 0.0;
        }
        let variance = variance(values);
        if variance > 150.0 && variance < 3000.0 {
            1.0
        } else if variance > 100.0 && variance < 4000.0 {
            0.7
        } else if variance > 50.0 && variance < 5000.0 {
            0.4
        } else {
            0.2
        }
    }

    // --- Motion ---

    /// Fraction of grid samples whose gray value moved by more than `delta` since
    /// the previous map. `None` when nothing was sampled.
    pub fn motion_ratio(
        map: &SampleMap,
        previous: &[Gray],
        candidate: &BoundingBox,
        step: u32,
        delta: u8,
    ) -> Option<f64> {
        let step = step.max(1) as usize;
        let x_end = (candidate.x + candidate.width).min(map.width);
        let y_end = (candidate.y + candidate.height).min(map.height);
        let mut moving = 0usize;
        let mut sampled = 0usize;

        for y in (candidate.y..y_end).step_by(step) {
            for x in (candidate.x..x_end).step_by(step) {
                let index = map.index(x, y);
                let (Some(current), Some(prior)) = (map.gray.get(index), previous.get(index)) else {
                    continue;
                };
                sampled += 1;
                if current.abs_diff(*prior) > delta {
                    moving += 1;
                }
            }
        }

        if sampled == 0 {
            None
        } else {
            Some(moving as f64 / sampled as f64)
        }
    }

    pub fn motion_score(ratio: f64) -> f64 {
        if ratio > 0.30 && ratio < 0.60 {
            1.0
        } else if ratio > 0.20 && ratio < 0.70 {
            0.85
        } else if ratio > 0.15 && ratio < 0.80 {
            0.65
        } else if ratio > 0.10 {
            0.4
        } else if ratio > 0.05 {
            0.15
        } else {
            0.0
        }
    }

    /// Multiplier applied to the whole score for weak motion.
    pub fn motion_penalty(motion: f64) -> f64 {
        if motion < 0.15 {
            0.4
        } else if motion < 0.3 {
            0.6
        } else if motion < 0.5 {
            0.8
        } else {
            1.0
        }
    }

    /// Scores one prefiltered candidate against the current map and, when
    /// available, the previous pass's grayscale map.
    pub fn score_candidate(
        candidate: &BoundingBox,
        map: &SampleMap,
        previous: Option<&[Gray]>,
        config: &DetectorConfig,
    ) -> ScoreBreakdown {
        let step = sample_step(candidate, config.sample_divisor);
        let samples = sample_box(map, candidate, step);
        if samples.is_empty() {
            return ScoreBreakdown {
                shape: 0.0,
                color: 0.0,
                aspect: 0.0,
                size: 0.0,
                edge: 0.0,
                motion: 0.0,
                motion_ratio: None,
                motion_penalty: 1.0,
                score: 0.0,
            };
        }

        let shape = shape_score(center_edge_ratio(candidate, &samples));
        let color = color_score(&samples);
        let aspect = aspect_score(candidate.aspect_ratio());
        let size = size_score(candidate);
        let edge = edge_consistency_score(&diagonal_samples(map, candidate));

        let motion_step = 2.max((step as f64 / 1.5).floor() as u32);
        let ratio = previous.and_then(|previous| {
            motion_ratio(map, previous, candidate, motion_step, config.motion_delta)
        });
        let motion = match (previous, ratio) {
            (None, _) => config.no_motion_history_score,
            (Some(_), Some(ratio)) => motion_score(ratio),
            (Some(_), None) => 0.0,
        };

        let weights = &config.weights;
        let weighted = shape * weights.shape
            + color * weights.color
            + aspect * weights.aspect
            + size * weights.size
            + edge * weights.edge
            + motion * weights.motion;
        let penalty = motion_penalty(motion);
        let score = (weighted * penalty).clamp(0.0, config.max_confidence);

        ScoreBreakdown {
            shape,
            color,
            aspect,
            size,
            edge,
            motion,
            motion_ratio: ratio,
            motion_penalty: penalty,
            score,
        }
    }
}
