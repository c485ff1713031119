// prepro-bench: CPU vs GPU benchmark of a six-stage image preprocessing
// pipeline (grayscale → Gaussian → erode → dilate → Canny → histogram
// equalization).
//
// Host operators live at the top level; the wgpu path lives in `gpu`.
// `harness` times both over the same batch and `compare` checks that
// their outputs agree.

pub mod image;
pub mod convert;
pub mod convolution;
pub mod morphology;
pub mod gradient;
pub mod canny;
pub mod histeq;

pub mod stages;
pub mod error;
pub mod pipeline;
pub mod harness;
pub mod compare;
pub mod io;

pub mod gpu;

pub use error::PipelineError;
pub use harness::{AcceleratedBackend, BenchmarkHarness, BenchmarkOutcome, BenchmarkReport};
pub use pipeline::SequentialPipeline;
pub use stages::{ExecutionPath, PipelineConfig, Stage};
