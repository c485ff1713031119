// convolution.rs — Separable convolution and the Gaussian smoothing stage.
//
// Stage 2 of the pipeline: 5×5 Gaussian blur, sigma 1.5.
//
// A 2D Gaussian K = g * g^T is separable, so the blur runs as a
// horizontal pass followed by a vertical pass:
//
//   convolve_rows()  — horizontal pass, any Pixel type in, f32 out
//   convolve_cols()  — vertical pass, f32 in, f32 out
//
// The accelerated path runs the same two passes (blur_rows / blur_cols in
// shaders/stages.wgsl) with the same coefficients in the same order, so
// the only host/GPU difference is FMA contraction in the shader compiler.
//
// BORDER HANDLING: clamp (replicate edge pixels). Out-of-range taps read
// the nearest edge pixel, matching clamp-to-edge texture addressing.

use crate::convert::f32_raw_to_u8;
use crate::image::{Image, Pixel};

#[inline]
fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

/// Convolve each row of `src` with a centred, odd-length 1D kernel.
///
/// Interior pixels (window fully inside the row) use unchecked access;
/// the `half` pixels at each end take the clamped path.
pub fn convolve_rows<T: Pixel>(src: &Image<T>, kernel: &[f32]) -> Image<f32> {
    assert!(!kernel.is_empty(), "kernel must not be empty");
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());

    let w = src.width();
    let h = src.height();
    let half = kernel.len() / 2;
    let mut dst = Image::<f32>::new(w, h);

    let clamped = |x: usize, y: usize| -> f32 {
        let mut acc = 0.0f32;
        for (ki, &kv) in kernel.iter().enumerate() {
            let sx = clamp_index(x as isize + ki as isize - half as isize, w);
            acc += src.get(sx, y).to_f32() * kv;
        }
        acc
    };

    for y in 0..h {
        if w <= 2 * half {
            for x in 0..w {
                dst.set(x, y, clamped(x, y));
            }
            continue;
        }
        for x in (0..half).chain(w - half..w) {
            dst.set(x, y, clamped(x, y));
        }
        for x in half..(w - half) {
            let mut acc = 0.0f32;
            // SAFETY: x - half >= 0 and x + half < w.
            unsafe {
                for (ki, &kv) in kernel.iter().enumerate() {
                    acc += src.get_unchecked(x + ki - half, y).to_f32() * kv;
                }
                dst.set_unchecked(x, y, acc);
            }
        }
    }
    dst
}

/// Convolve each column of `src` with a centred, odd-length 1D kernel.
pub fn convolve_cols(src: &Image<f32>, kernel: &[f32]) -> Image<f32> {
    assert!(!kernel.is_empty(), "kernel must not be empty");
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());

    let w = src.width();
    let h = src.height();
    let half = kernel.len() / 2;
    let mut dst = Image::<f32>::new(w, h);

    let interior = if h > 2 * half { half..(h - half) } else { 0..0 };

    for y in 0..h {
        if interior.contains(&y) {
            for x in 0..w {
                let mut acc = 0.0f32;
                // SAFETY: y - half >= 0 and y + half < h inside `interior`.
                unsafe {
                    for (ki, &kv) in kernel.iter().enumerate() {
                        acc += src.get_unchecked(x, y + ki - half) * kv;
                    }
                    dst.set_unchecked(x, y, acc);
                }
            }
        } else {
            for x in 0..w {
                let mut acc = 0.0f32;
                for (ki, &kv) in kernel.iter().enumerate() {
                    let sy = clamp_index(y as isize + ki as isize - half as isize, h);
                    acc += src.get(x, sy) * kv;
                }
                dst.set(x, y, acc);
            }
        }
    }
    dst
}

/// Full separable 2D convolution: horizontal pass then vertical pass.
///
/// # Panics
/// Panics if either kernel is empty or has even length.
pub fn convolve_separable<T: Pixel>(
    src: &Image<T>,
    kernel_row: &[f32],
    kernel_col: &[f32],
) -> Image<f32> {
    let intermediate = convolve_rows(src, kernel_row);
    convolve_cols(&intermediate, kernel_col)
}

/// Generate a normalised 1D Gaussian kernel of length `2 * half_size + 1`.
///
/// # Examples
/// ```
/// let k = prepro_bench::convolution::gaussian_kernel_1d(2, 1.5);
/// assert_eq!(k.len(), 5);
/// assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
/// ```
pub fn gaussian_kernel_1d(half_size: usize, sigma: f32) -> Vec<f32> {
    assert!(sigma > 0.0, "sigma must be positive");
    let len = 2 * half_size + 1;
    let two_sigma_sq = 2.0 * sigma * sigma;

    let mut kernel: Vec<f32> = (0..len)
        .map(|i| {
            let x = i as f32 - half_size as f32;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();

    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Gaussian kernel for an odd window size (`ksize` = 5 → 5 taps).
///
/// # Panics
/// Panics if `ksize` is even or zero.
pub fn gaussian_kernel_for_size(ksize: usize, sigma: f32) -> Vec<f32> {
    assert!(ksize % 2 == 1, "kernel size must be odd (got {ksize})");
    gaussian_kernel_1d(ksize / 2, sigma)
}

/// Stage 2: Gaussian blur with a `ksize`×`ksize` window, rounded back to u8.
pub fn gaussian_blur(src: &Image<u8>, ksize: usize, sigma: f32) -> Image<u8> {
    let k = gaussian_kernel_for_size(ksize, sigma);
    f32_raw_to_u8(&convolve_separable(src, &k, &k))
}
