// pipeline.rs — Host (CPU) execution path.
//
// One image at a time, host memory only:
//
//   ColorImage ─► grayscale ─► blur ─► erode ─► dilate ─► canny ─► histeq ─► Image<u8>
//
// The Gaussian coefficients, the structuring element, and the Canny
// detector are built once in `new()` and reused for every image, the same
// way the accelerated path reuses its kernel set.

use tracing::debug;

use crate::canny::CannyDetector;
use crate::convert::{f32_raw_to_u8, to_grayscale};
use crate::convolution::{convolve_separable, gaussian_kernel_for_size};
use crate::histeq::equalize_histogram;
use crate::image::{ColorImage, Frame, Image, ProcessedFrame};
use crate::morphology::{dilate, erode, StructuringElement};
use crate::stages::{PipelineConfig, Stage};

/// The sequential, host-memory pipeline.
#[derive(Debug, Clone)]
pub struct SequentialPipeline {
    config: PipelineConfig,
    gaussian: Vec<f32>,
    element: StructuringElement,
    canny: CannyDetector,
}

impl SequentialPipeline {
    /// # Panics
    /// Panics if a window size is even or the Canny thresholds are inverted.
    pub fn new(config: PipelineConfig) -> Self {
        SequentialPipeline {
            gaussian: gaussian_kernel_for_size(config.blur_ksize, config.blur_sigma),
            element: StructuringElement::rect(config.morph_ksize),
            canny: CannyDetector::new(config.canny_low, config.canny_high),
            config,
        }
    }

    pub fn stage_sequence(&self) -> [Stage; 6] {
        self.config.stage_sequence()
    }

    /// Run all six stages on one image. The input is not modified.
    pub fn process(&self, image: &ColorImage) -> Image<u8> {
        let gray = to_grayscale(image);
        let blurred = f32_raw_to_u8(&convolve_separable(&gray, &self.gaussian, &self.gaussian));
        let eroded = erode(&blurred, self.element);
        let dilated = dilate(&eroded, self.element);
        let edges = self.canny.detect(&dilated);
        equalize_histogram(&edges)
    }

    /// Run every stage and keep each intermediate. Index i holds the
    /// output of `stage_sequence()[i]`.
    pub fn process_stages(&self, image: &ColorImage) -> Vec<Image<u8>> {
        let mut out = Vec::with_capacity(6);
        out.push(to_grayscale(image));
        out.push(f32_raw_to_u8(&convolve_separable(&out[0], &self.gaussian, &self.gaussian)));
        out.push(erode(&out[1], self.element));
        out.push(dilate(&out[2], self.element));
        out.push(self.canny.detect(&out[3]));
        out.push(equalize_histogram(&out[4]));
        out
    }

    /// Process a batch in input order. Output i carries the identifier of
    /// input i.
    pub fn process_batch(&self, frames: &[Frame]) -> Vec<ProcessedFrame> {
        debug!(count = frames.len(), "host batch");
        frames
            .iter()
            .map(|f| ProcessedFrame { id: f.id.clone(), image: self.process(&f.image) })
            .collect()
    }
}

impl Default for SequentialPipeline {
    fn default() -> Self {
        SequentialPipeline::new(PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_image(w: usize, h: usize) -> ColorImage {
        let mut img = ColorImage::filled_rgb(w, h, [20, 20, 20]);
        for y in h / 4..3 * h / 4 {
            for x in w / 4..3 * w / 4 {
                img.set_pixel(x, y, &[220, 220, 220]);
            }
        }
        img
    }

    #[test]
    fn test_output_is_single_plane_same_size() {
        let out = SequentialPipeline::default().process(&block_image(40, 30));
        assert_eq!((out.width(), out.height()), (40, 30));
    }

    #[test]
    fn test_input_not_mutated() {
        let img = block_image(32, 32);
        let before = img.clone();
        SequentialPipeline::default().process(&img);
        assert_eq!(img, before);
    }

    #[test]
    fn test_stages_end_in_process_output() {
        let p = SequentialPipeline::default();
        let img = block_image(48, 48);
        let stages = p.process_stages(&img);
        assert_eq!(stages.len(), p.stage_sequence().len());
        assert_eq!(stages[5].as_slice(), p.process(&img).as_slice());
    }

    #[test]
    fn test_flat_image_has_no_edges() {
        let img = ColorImage::filled_rgb(24, 24, [90, 120, 30]);
        let out = SequentialPipeline::default().process(&img);
        assert!(out.pixels().all(|(_, _, v)| v == 0));
    }
}
