// THEORY:
// The `ComponentExtractor` is the spatial grouping step. It walks the edge mask and
// collapses every 8-connected run of edge pixels into one axis-aligned bounding box,
// which is what the rest of the pipeline treats as a candidate animal.
//
// Key points:
// 1.  **Strided Seeding**: Seeds are only tried on a coarse grid (every `stride`
//     pixels, stride scaling with frame size). Any component big enough to survive the
//     prefilter is crossed by the grid many times, so nothing relevant is missed, while
//     the scan itself stays cheap.
// 2.  **Breadth-First Region Growing**: From each unvisited edge seed a BFS follows all
//     8 neighbours, tracking the min/max extent. The fill itself is exhaustive, not
//     strided.
// 3.  **Shared Visited Grid**: A single `visited` grid spans all seeds, so a component
//     is grown exactly once no matter how many grid points land on it.
// 4.  **Stateless Utility**: No memory between frames. Boxes leave with a placeholder
//     confidence that the feature scorer overwrites.

use crate::config::DetectorConfig;
use crate::core_modules::bounding_box::{BoundingBox, Point};
use crate::core_modules::edge_detector::edge_detector::EdgeMask;
use std::collections::VecDeque;

pub mod component_extractor {
    use super::*;

    const NEIGHBORS: [(i64, i64); 8] = [
        (-1, -1),
        (0, -1),
        (1, -1),
        (-1, 0),
        (1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
    ];

    /// Seed spacing for a frame of the given size.
    pub fn seed_stride(width: u32, height: u32, config: &DetectorConfig) -> u32 {
        config
            .min_seed_stride
            .max(width.min(height) / config.seed_stride_divisor.max(1))
            .max(1)
    }

    /// Finds one bounding box per connected edge region reachable from the seed grid.
    pub fn extract_components(mask: &EdgeMask, config: &DetectorConfig) -> Vec<BoundingBox> {
        let stride = seed_stride(mask.width, mask.height, config);
        let mut visited = vec![false; mask.bits.len()];
        let mut boxes = Vec::new();

        if mask.width <= 2 * stride || mask.height <= 2 * stride {
            return boxes;
        }

        let mut y = stride;
        while y < mask.height - stride {
            let mut x = stride;
            while x < mask.width - stride {
                let index = y as usize * mask.width as usize + x as usize;
                if mask.bits[index] && !visited[index] {
                    boxes.push(grow_component(
                        mask,
                        Point { x, y },
                        &mut visited,
                        config.placeholder_confidence,
                    ));
                }
                x += stride;
            }
            y += stride;
        }

        boxes
    }

    /// Breadth-first 8-connected fill from `seed`, returning the region's extent.
    fn grow_component(
        mask: &EdgeMask,
        seed: Point,
        visited: &mut [bool],
        placeholder_confidence: f64,
    ) -> BoundingBox {
        let width = mask.width as usize;
        let mut queue: VecDeque<Point> = VecDeque::new();
        visited[seed.y as usize * width + seed.x as usize] = true;
        queue.push_back(seed);

        let (mut min_x, mut max_x, mut min_y, mut max_y) = (seed.x, seed.x, seed.y, seed.y);

        while let Some(current) = queue.pop_front() {
            min_x = min_x.min(current.x);
            max_x = max_x.max(current.x);
            min_y = min_y.min(current.y);
            max_y = max_y.max(current.y);

            for (dx, dy) in NEIGHBORS.iter() {
                let nx = current.x as i64 + dx;
                let ny = current.y as i64 + dy;
                if !mask.is_edge(nx, ny) {
                    continue;
                }
                let n_index = ny as usize * width + nx as usize;
                if visited[n_index] {
                    continue;
                }
                visited[n_index] = true;
                queue.push_back(Point {
                    x: nx as u32,
                    y: ny as u32,
                });
            }
        }

        BoundingBox::new(
            min_x,
            min_y,
            max_x - min_x,
            max_y - min_y,
            placeholder_confidence,
        )
    }
}
