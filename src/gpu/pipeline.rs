// gpu/pipeline.rs — Accelerated execution path.
//
// process_batch() runs in three phases:
//
//   1. upload    every frame → GpuInput, one submit
//   2. process   per frame, in order:
//                  grayscale → blur_rows → blur_cols
//                  → erode_rows → erode_cols → dilate_rows → dilate_cols
//                  → sobel_magnitude → nms_threshold
//                  → hysteresis × N → finalize_edges
//                  → histogram → build_lut → remap
//   3. download  every final plane → Image<u8>, one submit, one poll
//
// Each stage writes a fresh GpuPlane. A plane is dropped as soon as the
// dispatch that reads it has been encoded; wgpu keeps the texture alive
// until the command buffer retires.
//
// HYSTERESIS CONVERGENCE
// ──────────────────────
// nms_threshold leaves every pixel labelled none / weak / strong in a
// storage buffer. Each hysteresis dispatch promotes weak pixels touching
// a strong one and bumps `changed`. The host clears the counter, encodes
// HYSTERESIS_PASSES dispatches, reads the counter back, and stops once a
// round promoted nothing. The result is the same 8-connected closure the
// host's flood fill computes.
//
// OUT OF MEMORY
// ─────────────
// The whole batch runs inside an OutOfMemory scope with a Validation scope
// nested in it. A failed allocation leaves an invalid resource behind and
// every later bind or submit touching it raises a validation error, so
// both scopes are needed to keep those errors away from the uncaptured
// handler. Each frame's stage encoding gets its own pair of scopes, popped
// before hysteresis starts reading the counter back. If any scope reports
// an error, the outputs are discarded and the batch fails with
// AcceleratorResourceExhausted.

use tracing::{debug, warn};
use wgpu::util::DeviceExt;

use crate::error::PipelineError;
use crate::gpu::device::{DeviceProfile, GpuDevice, GpuError};
use crate::gpu::image::{download_batch, read_u32s, upload_batch, GpuInput, GpuPlane};
use crate::gpu::kernels::{FrameDims, Kernel, StageKernelFactory, StageKernelSet};
use crate::harness::AcceleratedBackend;
use crate::image::{ColorImage, Frame, Image, ProcessedFrame};
use crate::stages::{PipelineConfig, Stage};

/// Hysteresis dispatches encoded between two counter readbacks.
const HYSTERESIS_PASSES: usize = 8;

/// Classes buffer bytes per pixel (one u32 label).
const CLASS_BYTES: u64 = 4;

/// Planes kept from one frame's run.
enum Retain {
    /// Only the equalized output.
    Final,
    /// Every stage output, in stage order.
    All,
}

/// Per-frame buffers that live for one frame only.
struct FrameScratch {
    dims: wgpu::Buffer,
    classes: wgpu::Buffer,
    changed: wgpu::Buffer,
    changed_readback: wgpu::Buffer,
    hist: wgpu::Buffer,
    lut: wgpu::Buffer,
}

impl FrameScratch {
    fn new(gpu: &GpuDevice, width: u32, height: u32) -> Self {
        let device = &gpu.device;
        let dims = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("FrameDims"),
            contents: bytemuck::bytes_of(&FrameDims::new(width, height)),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let storage = |label: &str, size: u64, extra: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE | extra,
                mapped_at_creation: false,
            })
        };
        FrameScratch {
            dims,
            classes: storage("classes", width as u64 * height as u64 * CLASS_BYTES, wgpu::BufferUsages::empty()),
            changed: storage("changed", 4, wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST),
            changed_readback: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("changed::readback"),
                size: 4,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            hist: storage("hist", 256 * 4, wgpu::BufferUsages::COPY_DST),
            lut: storage("lut", 256 * 4, wgpu::BufferUsages::empty()),
        }
    }
}

/// The GPU execution path. Owns the device for the lifetime of the run.
pub struct AcceleratedPipeline {
    gpu: GpuDevice,
    config: PipelineConfig,
}

impl AcceleratedPipeline {
    pub fn new(gpu: GpuDevice, config: PipelineConfig) -> Self {
        AcceleratedPipeline { gpu, config }
    }

    /// Open a device with `profile` limits.
    ///
    /// Fails with `AcceleratorUnavailable` when no adapter or device can be
    /// obtained.
    pub fn with_profile(profile: DeviceProfile, config: PipelineConfig) -> Result<Self, PipelineError> {
        let gpu = GpuDevice::new_with_profile(profile)?;
        Ok(AcceleratedPipeline::new(gpu, config))
    }

    /// Run every stage on one image and read back all six intermediates.
    /// Index i holds the output of `stage_sequence()[i]`.
    pub fn process_stages(
        &self,
        image: &ColorImage,
        kernels: &StageKernelSet,
    ) -> Result<Vec<Image<u8>>, PipelineError> {
        let frame = Frame::new("stages", image.clone());
        self.check_batch(std::slice::from_ref(&frame), kernels)?;

        self.scoped(|| {
            let inputs = upload_batch(&self.gpu, std::iter::once(image));
            let mut planes = Vec::with_capacity(6);
            for input in &inputs {
                planes.extend(self.run_frame(input, kernels, Retain::All)?);
            }
            Ok(download_batch(&self.gpu, &planes)?)
        })
    }

    /// Reject the batch before any upload if a frame cannot run with
    /// `kernels` on this device.
    fn check_batch(&self, frames: &[Frame], kernels: &StageKernelSet) -> Result<(), PipelineError> {
        if frames.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }
        let max_dim = self.gpu.max_texture_dimension();
        let max_binding = self.gpu.device.limits().max_storage_buffer_binding_size as u64;

        for f in frames {
            let found = f.image.channels();
            if found != kernels.reference_channels {
                return Err(PipelineError::FormatMismatch {
                    id: f.id.clone(),
                    expected: kernels.reference_channels,
                    found,
                });
            }
            let (w, h) = (f.image.width() as u64, f.image.height() as u64);
            if w > max_dim as u64 || h > max_dim as u64 {
                return Err(PipelineError::AcceleratorResourceExhausted {
                    detail: format!("frame {} is {w}x{h}, device limit is {max_dim} per side", f.id),
                });
            }
            if w * h * CLASS_BYTES > max_binding {
                return Err(PipelineError::AcceleratorResourceExhausted {
                    detail: format!(
                        "frame {} needs a {} byte edge buffer, device limit is {max_binding}",
                        f.id,
                        w * h * CLASS_BYTES
                    ),
                });
            }
        }
        Ok(())
    }

    /// Run `body` inside an OutOfMemory scope and a nested Validation scope.
    /// A captured error wins over whatever `body` returned.
    fn scoped<T>(
        &self,
        body: impl FnOnce() -> Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let result = body();
        let validation = pollster::block_on(device.pop_error_scope());
        let oom = pollster::block_on(device.pop_error_scope());
        if let Some(err) = scope_failure(validation, oom) {
            warn!(error = %err, "accelerated batch lost device resources");
            return Err(err);
        }
        result
    }

    fn plane(&self, width: u32, height: u32, label: &str) -> GpuPlane {
        GpuPlane::new(&self.gpu.device, width, height, label)
    }

    fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        kernel: &Kernel,
        bind_group: &wgpu::BindGroup,
        (dx, dy): (u32, u32),
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(kernel.entry_point()),
            timestamp_writes: None,
        });
        pass.set_pipeline(&kernel.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(dx, dy, 1);
    }

    /// Two-dispatch separable filter: `src` → rows → cols → new plane.
    fn separable(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        rows: &Kernel,
        cols: &Kernel,
        src: GpuPlane,
        scratch: &FrameScratch,
        kernels: &StageKernelSet,
    ) -> (GpuPlane, GpuPlane) {
        let (w, h) = (src.width, src.height);
        let grid = self.gpu.dispatch_size(w, h);

        let tmp = self.plane(w, h, rows.entry_point());
        let bg = rows.bind(&self.gpu, &[
            scratch.dims.as_entire_binding(),
            kernels.params.as_entire_binding(),
            wgpu::BindingResource::TextureView(&src.view),
            wgpu::BindingResource::TextureView(&tmp.view),
        ]);
        self.dispatch(encoder, rows, &bg, grid);

        let out = self.plane(w, h, cols.entry_point());
        let bg = cols.bind(&self.gpu, &[
            scratch.dims.as_entire_binding(),
            kernels.params.as_entire_binding(),
            wgpu::BindingResource::TextureView(&tmp.view),
            wgpu::BindingResource::TextureView(&out.view),
        ]);
        self.dispatch(encoder, cols, &bg, grid);
        (src, out)
    }

    /// Encode and run all six stages for one resident frame.
    ///
    /// With `Retain::Final` the returned vector holds one plane; with
    /// `Retain::All` it holds six.
    fn run_frame(
        &self,
        input: &GpuInput,
        kernels: &StageKernelSet,
        retain: Retain,
    ) -> Result<Vec<GpuPlane>, PipelineError> {
        let (w, h) = (input.width, input.height);
        let grid = self.gpu.dispatch_size(w, h);
        let mut kept = Vec::new();
        let mut finished = |plane: GpuPlane| {
            if matches!(retain, Retain::All) {
                kept.push(plane);
            }
        };

        // Hysteresis maps the counter buffer, so nothing past this scope
        // runs unless every allocation inside it succeeded.
        let scratch = self.scoped(|| {
            let scratch = FrameScratch::new(&self.gpu, w, h);
            let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("AcceleratedPipeline::stages"),
            });

            // 1. grayscale
            let gray = self.plane(w, h, "gray");
            let bg = kernels.grayscale.bind(&self.gpu, &[
                scratch.dims.as_entire_binding(),
                wgpu::BindingResource::TextureView(&input.view),
                wgpu::BindingResource::TextureView(&gray.view),
            ]);
            self.dispatch(&mut encoder, &kernels.grayscale, &bg, grid);

            // 2–4. blur, erode, dilate
            let (gray, blurred) =
                self.separable(&mut encoder, &kernels.blur_rows, &kernels.blur_cols, gray, &scratch, kernels);
            finished(gray);
            let (blurred, eroded) =
                self.separable(&mut encoder, &kernels.erode_rows, &kernels.erode_cols, blurred, &scratch, kernels);
            finished(blurred);
            let (eroded, dilated) =
                self.separable(&mut encoder, &kernels.dilate_rows, &kernels.dilate_cols, eroded, &scratch, kernels);
            finished(eroded);

            // 5a. magnitude, suppression, thresholds
            let magnitude = self.plane(w, h, "magnitude");
            let bg = kernels.sobel.bind(&self.gpu, &[
                scratch.dims.as_entire_binding(),
                wgpu::BindingResource::TextureView(&dilated.view),
                wgpu::BindingResource::TextureView(&magnitude.view),
            ]);
            self.dispatch(&mut encoder, &kernels.sobel, &bg, grid);

            let bg = kernels.nms.bind(&self.gpu, &[
                scratch.dims.as_entire_binding(),
                kernels.params.as_entire_binding(),
                wgpu::BindingResource::TextureView(&dilated.view),
                wgpu::BindingResource::TextureView(&magnitude.view),
                scratch.classes.as_entire_binding(),
            ]);
            self.dispatch(&mut encoder, &kernels.nms, &bg, grid);
            drop(magnitude);
            finished(dilated);
            self.gpu.queue.submit(std::iter::once(encoder.finish()));
            Ok(scratch)
        })?;

        // 5b. hysteresis until a round promotes nothing
        let rounds = self.converge_hysteresis(&scratch, kernels, grid)?;
        debug!(width = w, height = h, rounds, "hysteresis converged");

        // 5c–6. edge map, histogram, LUT, remap
        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("AcceleratedPipeline::equalize"),
        });
        let edges = self.plane(w, h, "edges");
        let bg = kernels.finalize.bind(&self.gpu, &[
            scratch.dims.as_entire_binding(),
            scratch.classes.as_entire_binding(),
            wgpu::BindingResource::TextureView(&edges.view),
        ]);
        self.dispatch(&mut encoder, &kernels.finalize, &bg, grid);

        encoder.clear_buffer(&scratch.hist, 0, None);
        let bg = kernels.histogram.bind(&self.gpu, &[
            scratch.dims.as_entire_binding(),
            wgpu::BindingResource::TextureView(&edges.view),
            scratch.hist.as_entire_binding(),
        ]);
        self.dispatch(&mut encoder, &kernels.histogram, &bg, grid);

        let bg = kernels.build_lut.bind(&self.gpu, &[
            scratch.dims.as_entire_binding(),
            scratch.hist.as_entire_binding(),
            scratch.lut.as_entire_binding(),
        ]);
        self.dispatch(&mut encoder, &kernels.build_lut, &bg, (1, 1));

        let equalized = self.plane(w, h, "equalized");
        let bg = kernels.remap.bind(&self.gpu, &[
            scratch.dims.as_entire_binding(),
            wgpu::BindingResource::TextureView(&edges.view),
            scratch.lut.as_entire_binding(),
            wgpu::BindingResource::TextureView(&equalized.view),
        ]);
        self.dispatch(&mut encoder, &kernels.remap, &bg, grid);
        finished(edges);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        kept.push(equalized);
        Ok(kept)
    }

    /// Returns the number of readback rounds it took.
    fn converge_hysteresis(
        &self,
        scratch: &FrameScratch,
        kernels: &StageKernelSet,
        grid: (u32, u32),
    ) -> Result<usize, GpuError> {
        let bg = kernels.hysteresis.bind(&self.gpu, &[
            scratch.dims.as_entire_binding(),
            scratch.classes.as_entire_binding(),
            scratch.changed.as_entire_binding(),
        ]);

        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("AcceleratedPipeline::hysteresis"),
            });
            encoder.clear_buffer(&scratch.changed, 0, None);
            for _ in 0..HYSTERESIS_PASSES {
                self.dispatch(&mut encoder, &kernels.hysteresis, &bg, grid);
            }
            encoder.copy_buffer_to_buffer(&scratch.changed, 0, &scratch.changed_readback, 0, 4);
            self.gpu.queue.submit(std::iter::once(encoder.finish()));

            let promoted = read_u32s(&self.gpu, &scratch.changed_readback)?;
            if promoted.first().copied().unwrap_or(0) == 0 {
                return Ok(rounds);
            }
        }
    }
}

/// Map the popped Validation and OutOfMemory scopes to a batch failure.
/// The allocation failure is the root cause when both fired.
fn scope_failure(validation: Option<wgpu::Error>, oom: Option<wgpu::Error>) -> Option<PipelineError> {
    let err = oom.or(validation)?;
    Some(PipelineError::AcceleratorResourceExhausted { detail: err.to_string() })
}

impl AcceleratedBackend for AcceleratedPipeline {
    type KernelSet = StageKernelSet;

    fn build_kernels(&self, reference: &ColorImage) -> Result<StageKernelSet, PipelineError> {
        StageKernelFactory::new(&self.gpu, self.config).build(reference)
    }

    fn process_batch(
        &self,
        frames: &[Frame],
        kernels: &StageKernelSet,
    ) -> Result<Vec<ProcessedFrame>, PipelineError> {
        self.check_batch(frames, kernels)?;
        debug!(count = frames.len(), adapter = %self.gpu.adapter_info, "accelerated batch");

        let images = self.scoped(|| {
            let inputs = upload_batch(&self.gpu, frames.iter().map(|f| &f.image));
            debug!(count = inputs.len(), "uploaded");

            let mut finals = Vec::with_capacity(inputs.len());
            for input in &inputs {
                finals.extend(self.run_frame(input, kernels, Retain::Final)?);
            }
            drop(inputs);

            Ok(download_batch(&self.gpu, &finals)?)
        })?;
        debug!(count = images.len(), "downloaded");

        Ok(frames
            .iter()
            .zip(images)
            .map(|(f, image)| ProcessedFrame { id: f.id.clone(), image })
            .collect())
    }

    fn stage_sequence(&self) -> [Stage; 6] {
        self.config.stage_sequence()
    }
}
