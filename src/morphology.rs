// morphology.rs — Erosion and dilation with a rectangular structuring element.
//
// Stages 3 and 4 of the pipeline: erode then dilate (a morphological
// opening) with the same 5×5 rectangle.
//
// A rectangular element is separable: the min (max) over a k×k window is
// the min (max) over a k-wide row window of the min (max) over a k-tall
// column window. Both passes clamp at the border. For a rectangle that is
// the same as ignoring out-of-range taps, because the replicated edge
// pixel is already inside the window.

use crate::image::Image;

/// Shape of a structuring element. Only the rectangle is used by the
/// pipeline; the enum leaves room for the element being described in the
/// stage sequence rather than implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementShape {
    Rect,
}

/// A `width`×`height` structuring element anchored at its centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuringElement {
    pub shape: ElementShape,
    pub width: usize,
    pub height: usize,
}

impl StructuringElement {
    /// A square rectangular element of odd size `k`.
    ///
    /// # Panics
    /// Panics if `k` is even or zero.
    pub fn rect(k: usize) -> Self {
        assert!(k % 2 == 1, "structuring element size must be odd (got {k})");
        StructuringElement { shape: ElementShape::Rect, width: k, height: k }
    }

    /// Half-extent in x and y (2 for a 5×5 element).
    pub fn radius(&self) -> (usize, usize) {
        (self.width / 2, self.height / 2)
    }
}

#[derive(Clone, Copy)]
enum Extremum {
    Min,
    Max,
}

impl Extremum {
    #[inline]
    fn pick(self, a: u8, b: u8) -> u8 {
        match self {
            Extremum::Min => a.min(b),
            Extremum::Max => a.max(b),
        }
    }

    #[inline]
    fn identity(self) -> u8 {
        match self {
            Extremum::Min => u8::MAX,
            Extremum::Max => u8::MIN,
        }
    }
}

fn rank_filter(src: &Image<u8>, element: StructuringElement, op: Extremum) -> Image<u8> {
    let w = src.width();
    let h = src.height();
    let (rx, ry) = element.radius();

    // Horizontal pass.
    let mut tmp = Image::<u8>::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let x0 = x.saturating_sub(rx);
            let x1 = (x + rx).min(w - 1);
            let mut acc = op.identity();
            for sx in x0..=x1 {
                // SAFETY: x0..=x1 lies inside [0, w) and y < h.
                acc = op.pick(acc, unsafe { src.get_unchecked(sx, y) });
            }
            tmp.set(x, y, acc);
        }
    }

    // Vertical pass.
    let mut dst = Image::<u8>::new(w, h);
    for y in 0..h {
        let y0 = y.saturating_sub(ry);
        let y1 = (y + ry).min(h - 1);
        for x in 0..w {
            let mut acc = op.identity();
            for sy in y0..=y1 {
                // SAFETY: y0..=y1 lies inside [0, h) and x < w.
                acc = op.pick(acc, unsafe { tmp.get_unchecked(x, sy) });
            }
            dst.set(x, y, acc);
        }
    }
    dst
}

/// Stage 3: grayscale erosion (window minimum).
pub fn erode(src: &Image<u8>, element: StructuringElement) -> Image<u8> {
    rank_filter(src, element, Extremum::Min)
}

/// Stage 4: grayscale dilation (window maximum).
pub fn dilate(src: &Image<u8>, element: StructuringElement) -> Image<u8> {
    rank_filter(src, element, Extremum::Max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(w: usize, h: usize, x0: usize, y0: usize, bw: usize, bh: usize, v: u8) -> Image<u8> {
        let mut img = Image::new(w, h);
        for y in y0..y0 + bh {
            for x in x0..x0 + bw {
                img.set(x, y, v);
            }
        }
        img
    }

    fn count_nonzero(img: &Image<u8>) -> usize {
        img.pixels().filter(|&(_, _, v)| v > 0).count()
    }

    #[test]
    fn test_rect_radius() {
        assert_eq!(StructuringElement::rect(5).radius(), (2, 2));
        assert_eq!(StructuringElement::rect(1).radius(), (0, 0));
    }

    #[test]
    fn test_erode_shrinks_block() {
        // 10×10 block at (10,10) → eroded by 2 on each side → 6×6.
        let img = block(30, 30, 10, 10, 10, 10, 200);
        let out = erode(&img, StructuringElement::rect(5));
        assert_eq!(count_nonzero(&out), 36);
        assert_eq!(out.get(12, 12), 200);
        assert_eq!(out.get(11, 12), 0);
    }

    #[test]
    fn test_dilate_grows_block() {
        let img = block(30, 30, 10, 10, 10, 10, 200);
        let out = dilate(&img, StructuringElement::rect(5));
        assert_eq!(count_nonzero(&out), 14 * 14);
        assert_eq!(out.get(8, 8), 200);
        assert_eq!(out.get(7, 8), 0);
    }

    #[test]
    fn test_opening_removes_speck_keeps_block() {
        let mut img = block(40, 40, 10, 10, 15, 15, 180);
        img.set(35, 35, 255); // isolated 1-pixel speck
        let el = StructuringElement::rect(5);
        let opened = dilate(&erode(&img, el), el);
        assert_eq!(opened.get(35, 35), 0, "speck must not survive opening");
        assert_eq!(count_nonzero(&opened), 15 * 15, "block must be restored");
    }

    #[test]
    fn test_border_block_touching_edge() {
        // Block flush with the left border: clamped erosion keeps column 0.
        let img = block(20, 20, 0, 5, 8, 8, 90);
        let out = erode(&img, StructuringElement::rect(5));
        assert_eq!(out.get(0, 8), 90);
        assert_eq!(out.get(5, 8), 90);
        assert_eq!(out.get(6, 8), 0);
    }

    #[test]
    fn test_constant_image_fixed_point() {
        let img = Image::from_vec(6, 6, vec![77u8; 36]);
        let el = StructuringElement::rect(5);
        assert!(erode(&img, el).pixels().all(|(_, _, v)| v == 77));
        assert!(dilate(&img, el).pixels().all(|(_, _, v)| v == 77));
    }
}
