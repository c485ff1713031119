// gpu/mod.rs — GPU execution path.
//
// wgpu compute kernels that mirror the host stages in the parent crate.
// The host implementations remain the reference; every kernel is checked
// against them (tests/test_gpu_pipeline.rs, ignored without a GPU).
//
//   device    adapter selection, profiles, workgroup size
//   image     input textures, stage planes, batched transfers
//   kernels   StageKernelFactory → StageKernelSet (built once per run)
//   pipeline  AcceleratedPipeline: upload → six stages → download
//
// Shaders live in src/shaders/ and are compiled once per kernel set.

pub mod device;
pub mod image;
pub mod kernels;
pub mod pipeline;

pub use device::{DeviceProfile, GpuDevice, GpuError};
pub use kernels::{StageKernelFactory, StageKernelSet};
pub use pipeline::AcceleratedPipeline;
