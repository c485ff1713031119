// gradient.rs — 3×3 Sobel gradients for the edge-detection stage.
//
// Sobel kernels are separable:
//   Sobel_x: row [-1, 0, 1] (derivative), col [1, 2, 1] (smoothing)
//   Sobel_y: row [ 1, 2, 1] (smoothing),  col [-1, 0, 1] (derivative)
//
// Both reuse convolve_separable, so the border rule (clamp) is the same one
// the blur stage uses. On u8 input every product and sum is an exact small
// integer in f32, which is why the host and GPU gradient magnitudes agree
// bit-for-bit.

use crate::convolution::convolve_separable;
use crate::image::{Image, Pixel};

const SOBEL_DERIV: [f32; 3] = [-1.0, 0.0, 1.0];
const SOBEL_SMOOTH: [f32; 3] = [1.0, 2.0, 1.0];

/// Horizontal gradient Ix. Positive where intensity increases to the right.
/// Unnormalised: roughly [-1020, 1020] for u8 input.
pub fn sobel_x<T: Pixel>(src: &Image<T>) -> Image<f32> {
    convolve_separable(src, &SOBEL_DERIV, &SOBEL_SMOOTH)
}

/// Vertical gradient Iy. Positive where intensity increases downward.
pub fn sobel_y<T: Pixel>(src: &Image<T>) -> Image<f32> {
    convolve_separable(src, &SOBEL_SMOOTH, &SOBEL_DERIV)
}

pub fn sobel_xy<T: Pixel>(src: &Image<T>) -> (Image<f32>, Image<f32>) {
    (sobel_x(src), sobel_y(src))
}

/// L1 gradient magnitude |Ix| + |Iy|.
///
/// The Canny stage thresholds this value (50 / 150), so the L1 norm is part
/// of what those thresholds mean.
pub fn magnitude_l1(ix: &Image<f32>, iy: &Image<f32>) -> Image<f32> {
    assert_eq!((ix.width(), ix.height()), (iy.width(), iy.height()),
        "gradient images must have the same size");
    let mut mag = Image::new(ix.width(), ix.height());
    for y in 0..ix.height() {
        for x in 0..ix.width() {
            mag.set(x, y, ix.get(x, y).abs() + iy.get(x, y).abs());
        }
    }
    mag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_horizontal_gradient() {
        // Vertical step edge: left half = 0, right half = 100.
        let mut img = Image::<u8>::new(20, 10);
        for y in 0..10 {
            for x in 10..20 {
                img.set(x, y, 100);
            }
        }
        let ix = sobel_x(&img);
        // Row pass at x=10 sees [0, 0, 100] → 100, col pass sums [1,2,1] → 400.
        assert_eq!(ix.get(10, 5), 400.0);
        assert_eq!(ix.get(9, 5), 400.0);
        assert_eq!(ix.get(5, 5), 0.0);
    }

    #[test]
    fn test_vertical_gradient() {
        let mut img = Image::<u8>::new(10, 20);
        for y in 10..20 {
            for x in 0..10 {
                img.set(x, y, 100);
            }
        }
        let iy = sobel_y(&img);
        assert_eq!(iy.get(5, 10), 400.0);
        assert!(iy.get(5, 5).abs() < 1e-6);
    }

    #[test]
    fn test_linear_ramp() {
        // f(x, y) = x. Row pass gives 2, col pass multiplies by 4 → Ix = 8.
        let mut img = Image::<f32>::new(20, 10);
        for y in 0..10 {
            for x in 0..20 {
                img.set(x, y, x as f32);
            }
        }
        let (ix, iy) = sobel_xy(&img);
        for y in 1..9 {
            for x in 1..19 {
                assert!((ix.get(x, y) - 8.0).abs() < 1e-3, "Ix at ({x},{y})");
                assert!(iy.get(x, y).abs() < 1e-3, "Iy at ({x},{y})");
            }
        }
    }

    #[test]
    fn test_magnitude_l1() {
        let ix = Image::from_vec(2, 1, vec![3.0f32, -4.0]);
        let iy = Image::from_vec(2, 1, vec![-4.0f32, 0.0]);
        let m = magnitude_l1(&ix, &iy);
        assert_eq!(m.get(0, 0), 7.0);
        assert_eq!(m.get(1, 0), 4.0);
    }
}
