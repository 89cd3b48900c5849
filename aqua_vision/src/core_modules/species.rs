// THEORY:
// The species classifier tags an accepted detection as the target species (tilapia)
// or as a generic fish. It never gates: a fish that fails the colour test is still
// reported, just drawn and labelled differently.
//
// Tilapia read as a fairly uniform gray-silver body: low saturation at medium
// brightness. The classifier samples the box on a coarse grid of the colour map the
// box was found in and requires:
// 1.  a large share of samples in one of three gray-silver colour bands,
// 2.  a low average saturation across the box,
// 3.  an average brightness in the mid range (neither shadow nor glare).

use crate::config::SpeciesConfig;
use crate::core_modules::bounding_box::BoundingBox;
use crate::core_modules::pixel::pixel::Pixel;
use crate::core_modules::sample_map::SampleMap;

pub mod species {
    use super::*;

    /// Aggregate colour statistics of one box, as read by the classifier.
    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct SpeciesStats {
        pub samples: usize,
        pub target_color_ratio: f64,
        pub average_saturation: f64,
        pub average_brightness: f64,
    }

    /// True for the gray-silver bands a tilapia body falls into.
    pub fn is_target_color(pixel: &Pixel) -> bool {
        let saturation = pixel.saturation() as f64;
        let brightness = pixel.brightness() as f64;
        let (r, g, b) = (pixel.red, pixel.green, pixel.blue);

        (saturation < 0.25 && brightness > 60.0 && brightness < 160.0)
            || (saturation < 0.20 && brightness > 50.0 && brightness < 170.0)
            || (r > 90 && g > 85 && b > 80 && r < 150 && g < 145 && b < 140 && saturation < 0.22)
    }

    /// Samples the box and aggregates colour statistics. `None` if no sample fell
    /// inside the map.
    pub fn measure(candidate: &BoundingBox, map: &SampleMap, config: &SpeciesConfig) -> Option<SpeciesStats> {
        let step = 2.max(candidate.short_side() / config.sample_divisor.max(1)) as usize;
        let x_end = (candidate.x + candidate.width).min(map.width);
        let y_end = (candidate.y + candidate.height).min(map.height);

        let mut samples = 0usize;
        let mut target = 0usize;
        let mut saturation_sum = 0.0f64;
        let mut brightness_sum = 0.0f64;

        for y in (candidate.y..y_end).step_by(step) {
            for x in (candidate.x..x_end).step_by(step) {
                let Some(pixel) = map.color_at(x, y) else {
                    continue;
                };
                samples += 1;
                saturation_sum += pixel.saturation() as f64;
                brightness_sum += pixel.brightness() as f64;
                if is_target_color(&pixel) {
                    target += 1;
                }
            }
        }

        if samples == 0 {
            return None;
        }

        let total = samples as f64;
        Some(SpeciesStats {
            samples,
            target_color_ratio: target as f64 / total,
            average_saturation: saturation_sum / total,
            average_brightness: brightness_sum / total,
        })
    }

    pub fn is_target_species(candidate: &BoundingBox, map: &SampleMap, config: &SpeciesConfig) -> bool {
        let Some(stats) = measure(candidate, map, config) else {
            return false;
        };

        stats.target_color_ratio >= config.min_color_ratio
            && stats.average_saturation < config.max_average_saturation
            && stats.average_brightness >= config.min_average_brightness
            && stats.average_brightness <= config.max_average_brightness
    }
}
