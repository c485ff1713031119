// compare.rs — Pixel-wise agreement between host and accelerated outputs.
//
// The two paths are not required to be bit-identical. They agree when at
// most DEFAULT_MAX_MISMATCH_RATIO of the pixels differ by more than
// DEFAULT_TOLERANCE intensity levels.

use crate::image::{Image, ProcessedFrame};

/// Per-pixel difference still counted as a match.
pub const DEFAULT_TOLERANCE: u8 = 1;

/// Fraction of out-of-tolerance pixels still accepted as equivalent.
pub const DEFAULT_MAX_MISMATCH_RATIO: f64 = 0.005;

/// Result of comparing two single-plane images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareResult {
    /// Images have different dimensions
    DimensionMismatch {
        host: (usize, usize),
        accelerated: (usize, usize),
    },
    /// Same dimensions; pixel statistics follow
    Compared {
        max_abs_diff: u8,
        /// Pixels whose difference exceeds the tolerance
        mismatched_pixels: usize,
        total_pixels: usize,
    },
}

impl CompareResult {
    pub fn mismatch_ratio(&self) -> f64 {
        match *self {
            CompareResult::DimensionMismatch { .. } => 1.0,
            CompareResult::Compared { total_pixels: 0, .. } => 0.0,
            CompareResult::Compared { mismatched_pixels, total_pixels, .. } => {
                mismatched_pixels as f64 / total_pixels as f64
            }
        }
    }

    /// True when the images are equivalent under `max_ratio`.
    pub fn is_equivalent(&self, max_ratio: f64) -> bool {
        matches!(self, CompareResult::Compared { .. }) && self.mismatch_ratio() <= max_ratio
    }
}

/// Compare two planes pixel by pixel.
pub fn compare_images(host: &Image<u8>, accelerated: &Image<u8>, tolerance: u8) -> CompareResult {
    let hd = (host.width(), host.height());
    let ad = (accelerated.width(), accelerated.height());
    if hd != ad {
        return CompareResult::DimensionMismatch { host: hd, accelerated: ad };
    }

    let mut max_abs_diff = 0u8;
    let mut mismatched_pixels = 0usize;
    for y in 0..host.height() {
        for (&a, &b) in host.row(y).iter().zip(accelerated.row(y)) {
            let d = a.abs_diff(b);
            max_abs_diff = max_abs_diff.max(d);
            if d > tolerance {
                mismatched_pixels += 1;
            }
        }
    }
    CompareResult::Compared {
        max_abs_diff,
        mismatched_pixels,
        total_pixels: hd.0 * hd.1,
    }
}

/// Outcome for one identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameComparison {
    pub id: String,
    pub result: CompareResult,
}

/// Compare two output sequences position by position.
///
/// Identifiers are expected to line up; a pair whose identifiers differ
/// is reported as a dimension mismatch of the two images so that it can
/// never be counted as equivalent.
pub fn compare_outputs(
    host: &[ProcessedFrame],
    accelerated: &[ProcessedFrame],
    tolerance: u8,
) -> Vec<FrameComparison> {
    host.iter()
        .zip(accelerated)
        .map(|(h, a)| {
            let result = if h.id == a.id {
                compare_images(&h.image, &a.image, tolerance)
            } else {
                CompareResult::DimensionMismatch {
                    host: (h.image.width(), h.image.height()),
                    accelerated: (0, 0),
                }
            };
            FrameComparison { id: h.id.clone(), result }
        })
        .collect()
}
