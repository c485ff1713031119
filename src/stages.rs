// stages.rs — The six-stage sequence both execution paths implement.
//
// The host pipeline (pipeline.rs) and the accelerated pipeline
// (gpu/pipeline.rs) are written independently. What keeps them in
// lock-step is this list: each reports `stage_sequence()` from the same
// `PipelineConfig`, and the tests assert the two lists are equal.
//
//   1. Grayscale      BT.601 luma
//   2. GaussianBlur   5×5, sigma 1.5
//   3. Erode          5×5 rectangle
//   4. Dilate         5×5 rectangle
//   5. Canny          thresholds 50 / 150
//   6. EqualizeHist   global, 256 bins

use std::fmt;

use serde::Serialize;

/// Where a pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPath {
    /// Host CPU, one image at a time.
    Host,
    /// GPU compute shaders, whole batch resident on the device.
    Accelerated,
}

impl fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionPath::Host => write!(f, "CPU"),
            ExecutionPath::Accelerated => write!(f, "GPU"),
        }
    }
}

/// One logical stage with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Stage {
    Grayscale,
    GaussianBlur { ksize: usize, sigma: f32 },
    Erode { ksize: usize },
    Dilate { ksize: usize },
    Canny { low: f32, high: f32 },
    EqualizeHist,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Grayscale => "grayscale",
            Stage::GaussianBlur { .. } => "gaussian_blur",
            Stage::Erode { .. } => "erode",
            Stage::Dilate { .. } => "dilate",
            Stage::Canny { .. } => "canny",
            Stage::EqualizeHist => "equalize_hist",
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    /// Gaussian window size (odd).
    pub blur_ksize: usize,
    /// Gaussian standard deviation in pixels.
    pub blur_sigma: f32,
    /// Side of the square structuring element used by erode and dilate (odd).
    pub morph_ksize: usize,
    /// Canny hysteresis low threshold, on the L1 Sobel magnitude.
    pub canny_low: f32,
    /// Canny hysteresis high threshold.
    pub canny_high: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            blur_ksize: 5,
            blur_sigma: 1.5,
            morph_ksize: 5,
            canny_low: 50.0,
            canny_high: 150.0,
        }
    }
}

impl PipelineConfig {
    /// The ordered stage list this configuration describes.
    pub fn stage_sequence(&self) -> [Stage; 6] {
        [
            Stage::Grayscale,
            Stage::GaussianBlur { ksize: self.blur_ksize, sigma: self.blur_sigma },
            Stage::Erode { ksize: self.morph_ksize },
            Stage::Dilate { ksize: self.morph_ksize },
            Stage::Canny { low: self.canny_low, high: self.canny_high },
            Stage::EqualizeHist,
        ]
    }
}
