// convert.rs — Pixel format conversions feeding the stage pipeline.
//
// Stage 1 of the pipeline lives here: interleaved RGB → single-plane luma.
// The remaining helpers move planes between u8 and the f32 accumulation
// type used by convolution and gradients.

use crate::image::{ColorImage, Image, Pixel};

/// ITU-R BT.601 luma weights, R, G, B order. The grayscale WGSL kernel
/// uses the same constants.
pub const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Reduce a `ColorImage` to a single u8 luma plane.
///
/// 3-channel input: Y = round(0.299 R + 0.587 G + 0.114 B).
/// 1-channel input: copied unchanged.
pub fn to_grayscale(src: &ColorImage) -> Image<u8> {
    let w = src.width();
    let h = src.height();
    let mut gray = Image::new(w, h);
    match src.channels() {
        1 => {
            for y in 0..h {
                for x in 0..w {
                    gray.set(x, y, src.pixel(x, y)[0]);
                }
            }
        }
        _ => {
            for y in 0..h {
                for x in 0..w {
                    let p = src.pixel(x, y);
                    let luma = LUMA_WEIGHTS[0] * p[0] as f32
                        + LUMA_WEIGHTS[1] * p[1] as f32
                        + LUMA_WEIGHTS[2] * p[2] as f32;
                    gray.set(x, y, u8::from_f32(luma));
                }
            }
        }
    }
    gray
}

/// Convert an Image<f32> with raw intensity values to Image<u8>.
/// Clamps to [0, 255] and rounds.
pub fn f32_raw_to_u8(src: &Image<f32>) -> Image<u8> {
    let mut dst = Image::new(src.width(), src.height());
    for y in 0..src.height() {
        for x in 0..src.width() {
            dst.set(x, y, u8::from_f32(src.get(x, y)));
        }
    }
    dst
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grayscale_primaries() {
        let img = ColorImage::from_vec(
            3, 1, 3,
            vec![255, 0, 0,
                 0, 255, 0,
                 0, 0, 255],
        );
        let g = to_grayscale(&img);
        assert_eq!(g.get(0, 0), 76);  // 0.299 * 255 = 76.245
        assert_eq!(g.get(1, 0), 150); // 0.587 * 255 = 149.685
        assert_eq!(g.get(2, 0), 29);  // 0.114 * 255 = 29.07
    }

    #[test]
    fn test_grayscale_neutral_gray_preserved() {
        // Weights sum to 1, so equal channels map to themselves.
        for v in [0u8, 1, 127, 128, 254, 255] {
            let img = ColorImage::filled_rgb(2, 2, [v, v, v]);
            assert_eq!(to_grayscale(&img).get(1, 1), v, "gray level {v}");
        }
    }

    #[test]
    fn test_grayscale_single_channel_passthrough() {
        let img = ColorImage::from_vec(2, 1, 1, vec![7, 200]);
        let g = to_grayscale(&img);
        assert_eq!(g.get(0, 0), 7);
        assert_eq!(g.get(1, 0), 200);
    }

    #[test]
    fn test_raw_conversion_rounds_and_clamps() {
        let img = Image::from_vec(2, 2, vec![-4.0f32, 42.4, 127.5, 300.0]);
        let back = f32_raw_to_u8(&img);
        assert_eq!(back.as_slice(), &[0u8, 42, 128, 255]);
    }
}
