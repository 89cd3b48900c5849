// THEORY:
// The `EdgeDetector` turns the grayscale map into a binary mask of "outline" pixels,
// the raw material the component extractor groups into candidate silhouettes.
//
// Algorithm:
// 1.  **Sobel Gradient**: At every interior pixel a pair of 3x3 Sobel kernels gives
//     horizontal and vertical gradients; their Euclidean norm is the edge strength.
//     Border pixels have no full neighbourhood and are never edges.
// 2.  **Adaptive Threshold**: A fixed threshold fails as soon as the lighting changes
//     (murky water, glare, dusk). Instead the threshold follows the statistics of the
//     current frame: `max(floor, min(median * 1.2, mean * 0.8))`. The floor stops a
//     nearly flat frame from turning sensor noise into edges.
// 3.  **Binarisation**: A pixel is an edge when its magnitude is strictly above the
//     threshold.
//
// This is a stateless utility. The output mask always has exactly the frame's
// dimensions, even for frames too small to carry an interior.

use crate::config::DetectorConfig;
use crate::core_modules::sample_map::SampleMap;

pub mod edge_detector {
    use super::*;

    const KERNEL_X: [[i32; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];
    const KERNEL_Y: [[i32; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];

    /// A binary per-pixel edge map.
    #[derive(Debug, Clone)]
    pub struct EdgeMask {
        pub width: u32,
        pub height: u32,
        /// Row-major, `true` where the pixel is an edge.
        pub bits: Vec<bool>,
        /// The threshold this mask was cut at.
        pub threshold: f64,
    }

    impl EdgeMask {
        pub fn empty(width: u32, height: u32, threshold: f64) -> Self {
            Self {
                width,
                height,
                bits: vec![false; width as usize * height as usize],
                threshold,
            }
        }

        #[inline]
        pub fn is_edge(&self, x: i64, y: i64) -> bool {
            if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
                return false;
            }
            self.bits[y as usize * self.width as usize + x as usize]
        }

        pub fn edge_count(&self) -> usize {
            self.bits.iter().filter(|on| **on).count()
        }
    }

    /// Sobel magnitude of every interior pixel, in row-major order
    /// (`(width - 2) * (height - 2)` values).
    pub fn interior_magnitudes(map: &SampleMap) -> Vec<f32> {
        let width = map.width as usize;
        let height = map.height as usize;
        if width < 3 || height < 3 {
            return Vec::new();
        }

        let mut magnitudes = Vec::with_capacity((width - 2) * (height - 2));
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let mut gx = 0i32;
                let mut gy = 0i32;
                for (ky, (row_x, row_y)) in KERNEL_X.iter().zip(KERNEL_Y.iter()).enumerate() {
                    let row_offset = (y + ky - 1) * width;
                    for kx in 0..3 {
                        let value = map.gray[row_offset + x + kx - 1] as i32;
                        gx += value * row_x[kx];
                        gy += value * row_y[kx];
                    }
                }
                magnitudes.push(((gx * gx + gy * gy) as f32).sqrt());
            }
        }
        magnitudes
    }

    /// `max(floor, min(median * median_factor, mean * mean_factor))`.
    /// The median is the element at index `len / 2` of the sorted magnitudes.
    pub fn adaptive_threshold(magnitudes: &[f32], config: &DetectorConfig) -> f64 {
        if magnitudes.is_empty() {
            return config.edge_threshold_floor;
        }

        let mean = magnitudes.iter().map(|m| *m as f64).sum::<f64>() / magnitudes.len() as f64;

        let mut scratch = magnitudes.to_vec();
        let middle = scratch.len() / 2;
        let (_, median, _) = scratch.select_nth_unstable_by(middle, |a, b| a.total_cmp(b));
        let median = *median as f64;

        let adaptive = (median * config.edge_median_factor).min(mean * config.edge_mean_factor);
        config.edge_threshold_floor.max(adaptive)
    }

    /// Builds the binary edge mask for a preprocessed frame.
    pub fn detect_edges(map: &SampleMap, config: &DetectorConfig) -> EdgeMask {
        let magnitudes = interior_magnitudes(map);
        let threshold = adaptive_threshold(&magnitudes, config);
        let mut mask = EdgeMask::empty(map.width, map.height, threshold);
        if magnitudes.is_empty() {
            return mask;
        }

        let width = map.width as usize;
        let interior_width = width - 2;
        for (i, magnitude) in magnitudes.iter().enumerate() {
            if *magnitude as f64 > threshold {
                let y = i / interior_width + 1;
                let x = i % interior_width + 1;
                mask.bits[y * width + x] = true;
            }
        }
        mask
    }
}
