// error.rs — Failure taxonomy for the benchmark core.

use thiserror::Error;

use crate::gpu::device::GpuError;

/// Errors raised by the harness and the accelerated pipeline.
///
/// The host pipeline cannot fail on loader-validated input, so every
/// variant except `EmptyBatch` belongs to the accelerated path.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The batch held no images. Raised before any timing starts.
    #[error("no images to process")]
    EmptyBatch,

    /// No usable GPU backend. Only the accelerated path is affected.
    #[error("accelerator unavailable: {0}")]
    AcceleratorUnavailable(#[source] GpuError),

    /// The device could not hold the batch. No partial results survive.
    #[error("accelerator resources exhausted: {detail}")]
    AcceleratorResourceExhausted { detail: String },

    /// A frame's channel count differs from the one the kernels were built for.
    #[error("frame {id}: kernels built for {expected}-channel input, got {found}")]
    FormatMismatch { id: String, expected: usize, found: usize },
}

impl From<GpuError> for PipelineError {
    fn from(e: GpuError) -> Self {
        PipelineError::AcceleratorUnavailable(e)
    }
}
