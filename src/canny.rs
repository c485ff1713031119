// canny.rs — Canny edge detector (stage 5).
//
// Steps:
//   1. 3×3 Sobel gradients (gradient.rs), L1 magnitude |gx| + |gy|.
//   2. Non-maximum suppression along the quantised gradient direction.
//   3. Double threshold: magnitude > high → strong, > low → weak.
//   4. Hysteresis: a weak pixel survives only if it is 8-connected
//      (through other surviving pixels) to a strong one.
//
// Output is a binary map: 255 on edges, 0 elsewhere.
//
// DIRECTION QUANTISATION
// ──────────────────────
// The gradient angle is bucketed into four sectors without calling atan2:
//
//   |gy| < tan(22.5°)·|gx|   → horizontal gradient, compare left/right
//   |gy| > tan(67.5°)·|gx|   → vertical gradient,   compare up/down
//   otherwise                → diagonal; the sign of gx·gy picks which one
//
// Ties are broken asymmetrically (strictly greater than the "previous"
// neighbour, greater-or-equal to the "next") so a plateau two pixels wide
// yields a one-pixel edge instead of none. The nms entry point in
// shaders/stages.wgsl encodes the same rules with the same constants.

use crate::gradient::{magnitude_l1, sobel_xy};
use crate::image::Image;

pub const TAN_22_5: f32 = 0.414_213_56;
pub const TAN_67_5: f32 = 2.414_213_6;

const NONE: u8 = 0;
const WEAK: u8 = 1;
const STRONG: u8 = 2;

/// Quantised gradient direction used by non-maximum suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Horizontal,
    Vertical,
    /// gx and gy share a sign: compare (x-1, y-1) and (x+1, y+1).
    DiagonalDown,
    /// gx and gy have opposite signs: compare (x+1, y-1) and (x-1, y+1).
    DiagonalUp,
}

impl Direction {
    pub fn quantise(gx: f32, gy: f32) -> Self {
        let ax = gx.abs();
        let ay = gy.abs();
        if ay < ax * TAN_22_5 {
            Direction::Horizontal
        } else if ay > ax * TAN_67_5 {
            Direction::Vertical
        } else if (gx < 0.0) != (gy < 0.0) {
            Direction::DiagonalUp
        } else {
            Direction::DiagonalDown
        }
    }
}

/// Canny detector configured with its two hysteresis thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CannyDetector {
    pub low: f32,
    pub high: f32,
}

impl CannyDetector {
    /// # Panics
    /// Panics if `low > high` or either threshold is negative.
    pub fn new(low: f32, high: f32) -> Self {
        assert!(low >= 0.0 && high >= 0.0, "thresholds must be non-negative");
        assert!(low <= high, "low threshold ({low}) must not exceed high ({high})");
        CannyDetector { low, high }
    }

    /// Run the full detector on a u8 plane.
    pub fn detect(&self, src: &Image<u8>) -> Image<u8> {
        let w = src.width();
        let h = src.height();
        let (gx, gy) = sobel_xy(src);
        let mag = magnitude_l1(&gx, &gy);

        // Magnitude lookup that treats everything outside the image as 0.
        let m_at = |x: isize, y: isize| -> f32 {
            if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
                0.0
            } else {
                mag.get(x as usize, y as usize)
            }
        };

        let mut class = vec![NONE; w * h];
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for y in 0..h {
            for x in 0..w {
                let m = mag.get(x, y);
                if m <= self.low {
                    continue;
                }
                let (xi, yi) = (x as isize, y as isize);
                let is_max = match Direction::quantise(gx.get(x, y), gy.get(x, y)) {
                    Direction::Horizontal => m > m_at(xi - 1, yi) && m >= m_at(xi + 1, yi),
                    Direction::Vertical => m > m_at(xi, yi - 1) && m >= m_at(xi, yi + 1),
                    Direction::DiagonalDown => {
                        m > m_at(xi - 1, yi - 1) && m > m_at(xi + 1, yi + 1)
                    }
                    Direction::DiagonalUp => {
                        m > m_at(xi + 1, yi - 1) && m > m_at(xi - 1, yi + 1)
                    }
                };
                if !is_max {
                    continue;
                }
                if m > self.high {
                    class[y * w + x] = STRONG;
                    stack.push((x, y));
                } else {
                    class[y * w + x] = WEAK;
                }
            }
        }

        // Hysteresis: flood strong labels through 8-connected weak pixels.
        while let Some((x, y)) = stack.pop() {
            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    let idx = ny * w + nx;
                    if class[idx] == WEAK {
                        class[idx] = STRONG;
                        stack.push((nx, ny));
                    }
                }
            }
        }

        let edges = class
            .into_iter()
            .map(|c| if c == STRONG { 255 } else { 0 })
            .collect();
        Image::from_vec(w, h, edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge_count(img: &Image<u8>) -> usize {
        img.pixels().filter(|&(_, _, v)| v == 255).count()
    }

    #[test]
    fn test_direction_sectors() {
        assert_eq!(Direction::quantise(10.0, 1.0), Direction::Horizontal);
        assert_eq!(Direction::quantise(1.0, 10.0), Direction::Vertical);
        assert_eq!(Direction::quantise(5.0, 5.0), Direction::DiagonalDown);
        assert_eq!(Direction::quantise(-5.0, -5.0), Direction::DiagonalDown);
        assert_eq!(Direction::quantise(5.0, -5.0), Direction::DiagonalUp);
    }

    #[test]
    fn test_flat_image_has_no_edges() {
        let img = Image::from_vec(16, 16, vec![90u8; 256]);
        let out = CannyDetector::new(50.0, 150.0).detect(&img);
        assert_eq!(edge_count(&out), 0);
    }

    #[test]
    fn test_step_edge_is_one_pixel_wide() {
        // Vertical step 0 → 100. Magnitude 400 on columns 9 and 10; the
        // asymmetric tie-break keeps exactly one of them.
        let mut img = Image::<u8>::new(20, 12);
        for y in 0..12 {
            for x in 10..20 {
                img.set(x, y, 100);
            }
        }
        let out = CannyDetector::new(50.0, 150.0).detect(&img);
        for y in 0..12 {
            let row: Vec<usize> = (0..20).filter(|&x| out.get(x, y) == 255).collect();
            assert_eq!(row, vec![9], "row {y}: edge columns {row:?}");
        }
    }

    #[test]
    fn test_weak_step_below_low_threshold_ignored() {
        // Step of 10 → magnitude 40 < low threshold 50.
        let mut img = Image::<u8>::new(20, 10);
        for y in 0..10 {
            for x in 10..20 {
                img.set(x, y, 10);
            }
        }
        let out = CannyDetector::new(50.0, 150.0).detect(&img);
        assert_eq!(edge_count(&out), 0);
    }

    #[test]
    fn test_hysteresis_keeps_weak_connected_to_strong() {
        // Top half of the edge has step 100 (mag 400, strong); bottom half
        // has step 30 (mag 120, weak only). The weak part is connected to
        // the strong part and must survive.
        let mut img = Image::<u8>::new(20, 20);
        for y in 0..20 {
            let v = if y < 10 { 100 } else { 30 };
            for x in 10..20 {
                img.set(x, y, v);
            }
        }
        let out = CannyDetector::new(50.0, 150.0).detect(&img);
        assert_eq!(out.get(9, 2), 255);
        assert_eq!(out.get(9, 17), 255, "weak edge connected to strong edge");
    }

    #[test]
    fn test_hysteresis_drops_isolated_weak_edge() {
        let mut img = Image::<u8>::new(20, 20);
        for y in 0..20 {
            for x in 10..20 {
                img.set(x, y, 30);
            }
        }
        let out = CannyDetector::new(50.0, 150.0).detect(&img);
        assert_eq!(edge_count(&out), 0, "weak-only edge must be dropped");
    }

    #[test]
    #[should_panic(expected = "must not exceed")]
    fn test_inverted_thresholds_panic() {
        CannyDetector::new(150.0, 50.0);
    }
}
