// SPDX-License-Identifier: GPL-3.0-only

//! Canny edge detection on 8-bit intensity images
//!
//! Sobel 3x3 gradients (replicated borders), L1 magnitude, non-maximum
//! suppression along four quantized directions, then double-threshold
//! hysteresis over 8-connected neighbours. Border pixels are never edges.

use crate::errors::{ProcessError, ProcessResult};

/// Edge pixel value in the output map
pub const EDGE: u8 = 255;

const NOT_EDGE: u8 = 0;
const WEAK: u8 = 1;

/// Hysteresis bounds on the gradient magnitude
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub low: u32,
    pub high: u32,
}

impl Thresholds {
    /// `low = threshold`, `high = threshold * ratio`, never below `low`
    pub fn from_ratio(threshold: u32, ratio: u32) -> Self {
        Self {
            low: threshold,
            high: threshold.saturating_mul(ratio).max(threshold),
        }
    }
}

/// Quantized gradient direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sector {
    /// Gradient mostly along x; compare left and right
    Horizontal,
    /// Gradient along the main diagonal; compare up-left and down-right
    Diagonal,
    /// Gradient mostly along y; compare above and below
    Vertical,
    /// Gradient along the anti-diagonal; compare up-right and down-left
    AntiDiagonal,
}

impl Sector {
    // tan(22.5°) and tan(67.5°) scaled by 1000
    const TAN_22: i64 = 414;
    const TAN_67: i64 = 2414;

    fn of(gx: i32, gy: i32) -> Self {
        let ax = i64::from(gx.unsigned_abs());
        let ay = i64::from(gy.unsigned_abs());
        if ay * 1000 <= ax * Self::TAN_22 {
            Sector::Horizontal
        } else if ay * 1000 > ax * Self::TAN_67 {
            Sector::Vertical
        } else if (gx > 0) == (gy > 0) {
            Sector::Diagonal
        } else {
            Sector::AntiDiagonal
        }
    }

    /// Neighbour offsets (dx, dy) on either side along the gradient
    fn neighbours(self) -> [(isize, isize); 2] {
        match self {
            Sector::Horizontal => [(-1, 0), (1, 0)],
            Sector::Diagonal => [(-1, -1), (1, 1)],
            Sector::Vertical => [(0, -1), (0, 1)],
            Sector::AntiDiagonal => [(1, -1), (-1, 1)],
        }
    }
}

/// Reusable detector; buffers grow to the largest frame seen
#[derive(Debug, Default)]
pub struct EdgeDetector {
    magnitude: Vec<u32>,
    sectors: Vec<Sector>,
    map: Vec<u8>,
    stack: Vec<usize>,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect edges in a `width` x `height` intensity image
    ///
    /// Returns a map with [`EDGE`] at edge pixels and 0 elsewhere.
    pub fn detect(
        &mut self,
        luma: &[u8],
        width: usize,
        height: usize,
        thresholds: Thresholds,
    ) -> ProcessResult<&[u8]> {
        let pixels = width
            .checked_mul(height)
            .filter(|&n| n > 0 && n <= luma.len())
            .ok_or_else(|| {
                ProcessError::InvalidFrame(format!(
                    "{}x{} intensity image with {} bytes",
                    width,
                    height,
                    luma.len()
                ))
            })?;

        self.gradients(&luma[..pixels], width, height);
        self.suppress(width, height, thresholds);
        self.hysteresis(width, height);
        Ok(&self.map)
    }

    fn gradients(&mut self, luma: &[u8], w: usize, h: usize) {
        self.magnitude.clear();
        self.magnitude.resize(w * h, 0);
        self.sectors.clear();
        self.sectors.resize(w * h, Sector::Horizontal);

        let at = |x: usize, y: usize| i32::from(luma[y * w + x]);
        for y in 0..h {
            let (up, down) = (y.saturating_sub(1), (y + 1).min(h - 1));
            for x in 0..w {
                let (left, right) = (x.saturating_sub(1), (x + 1).min(w - 1));
                let gx = (at(right, up) + 2 * at(right, y) + at(right, down))
                    - (at(left, up) + 2 * at(left, y) + at(left, down));
                let gy = (at(left, down) + 2 * at(x, down) + at(right, down))
                    - (at(left, up) + 2 * at(x, up) + at(right, up));
                let i = y * w + x;
                self.magnitude[i] = gx.unsigned_abs() + gy.unsigned_abs();
                self.sectors[i] = Sector::of(gx, gy);
            }
        }
    }

    fn suppress(&mut self, w: usize, h: usize, thresholds: Thresholds) {
        self.map.clear();
        self.map.resize(w * h, NOT_EDGE);
        self.stack.clear();

        if w < 3 || h < 3 {
            return;
        }

        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let i = y * w + x;
                let m = self.magnitude[i];
                if m <= thresholds.low {
                    continue;
                }

                let [(ax, ay), (bx, by)] = self.sectors[i].neighbours();
                let a = self.magnitude[(y as isize + ay) as usize * w + (x as isize + ax) as usize];
                let b = self.magnitude[(y as isize + by) as usize * w + (x as isize + bx) as usize];
                // Strict on one side so plateaus keep exactly one pixel
                if m <= a || m < b {
                    continue;
                }

                if m > thresholds.high {
                    self.map[i] = EDGE;
                    self.stack.push(i);
                } else {
                    self.map[i] = WEAK;
                }
            }
        }
    }

    fn hysteresis(&mut self, w: usize, h: usize) {
        while let Some(i) = self.stack.pop() {
            let (x, y) = (i % w, i / w);
            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    let n = ny * w + nx;
                    if self.map[n] == WEAK {
                        self.map[n] = EDGE;
                        self.stack.push(n);
                    }
                }
            }
        }

        for value in &mut self.map {
            if *value == WEAK {
                *value = NOT_EDGE;
            }
        }
    }
}

/// Number of edge pixels in a map
pub fn edge_count(map: &[u8]) -> usize {
    map.iter().filter(|&&v| v == EDGE).count()
}

/// Paint an edge map into opaque RGBA
pub fn edges_to_rgba(map: &[u8], edge: [u8; 3], background: [u8; 3], out: &mut [u8]) {
    for (&value, px) in map.iter().zip(out.chunks_exact_mut(4)) {
        let [r, g, b] = if value == EDGE { edge } else { background };
        px.copy_from_slice(&[r, g, b, 255]);
    }
}

/// Run the detector on a built-in image and count edge pixels
///
/// A working detector finds the outline of a bright square; zero means the
/// transform is broken.
pub fn run_self_test() -> usize {
    const SIZE: usize = 32;
    let mut image = vec![16u8; SIZE * SIZE];
    for y in 8..24 {
        for x in 8..24 {
            image[y * SIZE + x] = 235;
        }
    }

    let mut detector = EdgeDetector::new();
    detector
        .detect(&image, SIZE, SIZE, Thresholds::from_ratio(50, 3))
        .map(edge_count)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::synthetic::test_pattern;

    fn step_image(contrast_top: u8, contrast_bottom: u8) -> Vec<u8> {
        let mut image = vec![0u8; 16 * 16];
        for y in 0..16 {
            let v = if y < 8 { contrast_top } else { contrast_bottom };
            for x in 8..16 {
                image[y * 16 + x] = v;
            }
        }
        image
    }

    #[test]
    fn test_thresholds_from_ratio() {
        assert_eq!(Thresholds::from_ratio(50, 3), Thresholds { low: 50, high: 150 });
        assert_eq!(Thresholds::from_ratio(50, 0), Thresholds { low: 50, high: 50 });
        assert_eq!(Thresholds::from_ratio(u32::MAX, 3).high, u32::MAX);
    }

    #[test]
    fn test_flat_image_has_no_edges() {
        let mut detector = EdgeDetector::new();
        let map = detector
            .detect(&[77; 64], 8, 8, Thresholds::from_ratio(0, 3))
            .unwrap();
        assert_eq!(edge_count(map), 0);
    }

    #[test]
    fn test_self_test_finds_square() {
        let count = run_self_test();
        // Roughly the perimeter of the 16x16 square
        assert!(count >= 40 && count <= 100, "count {}", count);
    }

    #[test]
    fn test_raising_threshold_never_adds_edges() {
        let [luma, _, _] = test_pattern(64, 48, 5, 1, 0);
        let mut detector = EdgeDetector::new();

        let mut previous = usize::MAX;
        for threshold in [0, 10, 50, 100, 200, 400, 1000] {
            let map = detector
                .detect(&luma.data, 64, 48, Thresholds::from_ratio(threshold, 3))
                .unwrap();
            let count = edge_count(map);
            assert!(count <= previous, "threshold {} gave {} > {}", threshold, count, previous);
            previous = count;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn test_zero_threshold_keeps_every_local_maximum() {
        let (w, h) = (64, 48);
        let [luma, _, _] = test_pattern(w, h, 5, 1, 0);
        let (w, h) = (w as usize, h as usize);
        let mut detector = EdgeDetector::new();

        let map = detector
            .detect(&luma.data, w, h, Thresholds::from_ratio(0, 3))
            .unwrap()
            .to_vec();

        let mut expected = vec![NOT_EDGE; w * h];
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let i = y * w + x;
                let m = detector.magnitude[i];
                let [(ax, ay), (bx, by)] = detector.sectors[i].neighbours();
                let a = detector.magnitude[(y as isize + ay) as usize * w + (x as isize + ax) as usize];
                let b = detector.magnitude[(y as isize + by) as usize * w + (x as isize + bx) as usize];
                if m > 0 && m > a && m >= b {
                    expected[i] = EDGE;
                }
            }
        }
        assert!(edge_count(&expected) > 0);
        assert_eq!(map, expected);

        // Any other threshold selects a subset
        for threshold in [1, 20, 80] {
            let higher = detector
                .detect(&luma.data, w, h, Thresholds::from_ratio(threshold, 2))
                .unwrap();
            assert!(higher.iter().zip(&map).all(|(&e, &z)| e != EDGE || z == EDGE));
        }
    }

    #[test]
    fn test_weak_edges_need_a_strong_seed() {
        let mut detector = EdgeDetector::new();
        let thresholds = Thresholds::from_ratio(100, 3);

        let weak_only = step_image(30, 30);
        let map = detector.detect(&weak_only, 16, 16, thresholds).unwrap();
        assert_eq!(edge_count(map), 0);

        let mixed = step_image(200, 30);
        let map = detector.detect(&mixed, 16, 16, thresholds).unwrap();
        let bottom = map[10 * 16..15 * 16].iter().filter(|&&v| v == EDGE).count();
        assert!(bottom > 0);
    }

    #[test]
    fn test_border_pixels_never_marked() {
        let mut image = vec![0u8; 10 * 10];
        image[0] = 255;
        let mut detector = EdgeDetector::new();
        let map = detector
            .detect(&image, 10, 10, Thresholds::from_ratio(0, 1))
            .unwrap();
        for x in 0..10 {
            assert_eq!(map[x], 0);
            assert_eq!(map[9 * 10 + x], 0);
        }
    }

    #[test]
    fn test_rejects_short_buffer() {
        let mut detector = EdgeDetector::new();
        assert!(matches!(
            detector.detect(&[0; 10], 4, 4, Thresholds::from_ratio(1, 1)),
            Err(ProcessError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_edges_to_rgba_colors() {
        let map = [EDGE, 0];
        let mut out = [0u8; 8];
        edges_to_rgba(&map, [255, 0, 255], [0, 0, 0], &mut out);
        assert_eq!(out, [255, 0, 255, 255, 0, 0, 0, 255]);
    }
}
