// histeq.rs — Global histogram equalization (stage 6).
//
// The edge map coming out of Canny is nearly binary, so on most frames the
// equalization is a two-level remap. It still has to be computed exactly:
// the accelerated path builds the same 256-bin histogram with atomics, the
// same LUT in a single invocation, and remaps per pixel.
//
// Algorithm:
//   1. Compute 256-bin histogram (one pass).
//   2. Build the cumulative distribution function (CDF).
//   3. lut[v] = round((cdf[v] - cdf_min) * 255 / (N - cdf_min)), where
//      cdf_min is the first non-zero CDF value.
//   4. Remap every pixel through the LUT.
//
// A single-valued image has N == cdf_min. Nothing can be stretched, so the
// LUT is the identity and the image passes through unchanged.

use crate::image::Image;

/// Count occurrences of each intensity.
pub fn histogram(image: &Image<u8>) -> [u32; 256] {
    let mut hist = [0u32; 256];
    for y in 0..image.height() {
        for &v in image.row(y) {
            hist[v as usize] += 1;
        }
    }
    hist
}

/// Build a 256-entry lookup table from a histogram and total pixel count.
pub fn build_lut(hist: &[u32; 256], total: usize) -> [u8; 256] {
    let mut cdf = [0u32; 256];
    let mut running = 0u32;
    for (c, &h) in cdf.iter_mut().zip(hist.iter()) {
        running += h;
        *c = running;
    }

    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);

    let mut lut = [0u8; 256];
    // Subtract before converting: above 2^24 pixels f32 cannot hold N exactly.
    let remaining = total.saturating_sub(cdf_min as usize);
    if remaining == 0 {
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as u8;
        }
        return lut;
    }

    let scale = 255.0 / remaining as f32;
    for (v, &c) in lut.iter_mut().zip(cdf.iter()) {
        let val = c.saturating_sub(cdf_min) as f32 * scale;
        *v = val.round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Remap every pixel through `lut`.
pub fn apply_lut(image: &Image<u8>, lut: &[u8; 256]) -> Image<u8> {
    let w = image.width();
    let h = image.height();
    let mut out = Image::new(w, h);
    for y in 0..h {
        for x in 0..w {
            out.set(x, y, lut[image.get(x, y) as usize]);
        }
    }
    out
}

/// Stage 6: global histogram equalization of a grayscale plane.
pub fn equalize_histogram(image: &Image<u8>) -> Image<u8> {
    let n = image.width() * image.height();
    if n == 0 {
        return Image::new(image.width(), image.height());
    }
    let lut = build_lut(&histogram(image), n);
    apply_lut(image, &lut)
}
