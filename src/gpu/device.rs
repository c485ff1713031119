// gpu/device.rs — wgpu device abstraction.
//
// Responsibilities:
//   - Enumerate Vulkan adapters and select the best non-software one.
//   - Expose a `DeviceProfile` for simulating hardware limits on a
//     development machine (e.g., cap invocations to match Raspberry Pi).
//   - Provide `WorkgroupSize`, validated against the active profile and
//     baked into every compute pipeline.
//
// ADAPTER SELECTION:
// wgpu's default `request_adapter` uses power preference heuristics that
// may grab llvmpipe/softpipe on WSL2 (where the software renderer appears
// as a valid Vulkan device). We enumerate explicitly and prefer real
// hardware, falling back to whatever exists.
//
// DEVICE LIMITS:
// Under a non-Native profile we request *lower* limits than the hardware
// supports. wgpu validates every dispatch and texture allocation against
// the requested limits, so a frame too large for the target device fails
// on the development machine too.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info};

/// Hardware profile controlling device limits and default workgroup sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceProfile {
    /// Use the adapter's actual hardware limits. No artificial caps.
    #[default]
    Native,
    /// Simulate Raspberry Pi 4/5 (Broadcom VideoCore VI/VII, V3DV Vulkan).
    /// Caps `max_compute_invocations_per_workgroup` to 256 and 2D textures
    /// to 4096 pixels per side.
    RaspberryPi,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::RaspberryPi => write!(f, "RaspberryPi (simulated limits)"),
        }
    }
}

/// A workgroup size configuration for 2D compute dispatches.
///
/// The product of both dimensions must not exceed the profile's
/// `max_compute_invocations_per_workgroup` limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    /// Total invocations per workgroup (x * y).
    pub fn total(&self) -> u32 {
        self.x * self.y
    }

    /// Substitute `{{WG_X}}` / `{{WG_Y}}` in a WGSL template.
    ///
    /// naga does not accept `override` expressions inside
    /// `@workgroup_size()`, so the dimensions are baked into the source.
    pub fn specialise(&self, template: &str) -> String {
        template
            .replace("{{WG_X}}", &self.x.to_string())
            .replace("{{WG_Y}}", &self.y.to_string())
    }

    /// Select a validated default workgroup size for the given profile.
    ///
    /// - `Native`: 16×8 = 128 invocations (4 NVIDIA warps, 2 AMD waves).
    /// - `RaspberryPi`: 8×8 = 64 invocations, well inside V3DV's 256.
    fn for_profile(profile: DeviceProfile) -> Self {
        match profile {
            DeviceProfile::Native => WorkgroupSize { x: 16, y: 8 },
            DeviceProfile::RaspberryPi => WorkgroupSize { x: 8, y: 8 },
        }
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

/// Cached adapter information for logging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// The GPU context: device, queue, active profile and workgroup size.
///
/// Expensive to create (Vulkan instance + device initialization). The
/// benchmark creates one and keeps it for the whole run.
///
/// # Field drop order
/// Rust drops struct fields in declaration order. `_instance` is declared
/// last so the `wgpu::Instance` outlives `device` and `queue`; dzn on WSL2
/// crashes if the Vulkan instance goes first.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: DeviceProfile,
    pub adapter_info: AdapterInfo,
    pub workgroup_size: WorkgroupSize,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Create a `GpuDevice` with an explicit hardware profile.
    pub fn new_with_profile(profile: DeviceProfile) -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async(profile))
    }

    async fn init_async(profile: DeviceProfile) -> Result<Self, GpuError> {
        // Vulkan only. ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER lets dzn
        // (D3D12-to-Vulkan on WSL2) through, which is fine for compute.
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
                | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            flags,
            ..Default::default()
        });

        // Tiered selection:
        //   1. DiscreteGpu / IntegratedGpu / VirtualGpu / Other
        //   2. anything else (llvmpipe), name logged so it is visible
        let mut all_adapters = instance.enumerate_adapters(wgpu::Backends::VULKAN);
        if all_adapters.is_empty() {
            return Err(GpuError::NoSuitableAdapter);
        }
        for a in &all_adapters {
            let info = a.get_info();
            debug!(name = %info.name, backend = ?info.backend, kind = ?info.device_type, "vulkan adapter");
        }

        let preferred = all_adapters.iter().position(|a| {
            matches!(
                a.get_info().device_type,
                wgpu::DeviceType::DiscreteGpu
                    | wgpu::DeviceType::IntegratedGpu
                    | wgpu::DeviceType::VirtualGpu
                    | wgpu::DeviceType::Other
            )
        });
        let adapter = all_adapters.swap_remove(preferred.unwrap_or(0));

        let raw_info = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };

        // A V3D adapter under the Native profile gets the RPi limits.
        let profile = match profile {
            DeviceProfile::Native if raw_info.name.to_ascii_lowercase().contains("v3d") => {
                info!("V3D adapter detected, using RaspberryPi profile");
                DeviceProfile::RaspberryPi
            }
            other => other,
        };

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("prepro-bench"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits_for_profile(profile),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(GpuError::DeviceRequest)?;

        let workgroup_size = WorkgroupSize::for_profile(profile);
        info!(adapter = %adapter_info, %profile, workgroup = %workgroup_size, "GPU ready");

        Ok(GpuDevice {
            device,
            queue,
            profile,
            adapter_info,
            workgroup_size,
            _instance: instance,
        })
    }

    /// Largest width or height a 2D texture may have on this device.
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Workgroup counts covering a `img_w`×`img_h` image (ceiling division).
    ///
    /// Every entry point guards `if gid.x >= width || gid.y >= height`.
    pub fn dispatch_size(&self, img_w: u32, img_h: u32) -> (u32, u32) {
        dispatch_size(self.workgroup_size, img_w, img_h)
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, profile: {}, workgroup: {} }}",
            self.adapter_info, self.profile, self.workgroup_size
        )
    }
}

fn dispatch_size(ws: WorkgroupSize, img_w: u32, img_h: u32) -> (u32, u32) {
    (img_w.div_ceil(ws.x), img_h.div_ceil(ws.y))
}

// ============================================================
// Limits helpers
// ============================================================

fn limits_for_profile(profile: DeviceProfile) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default(),

        DeviceProfile::RaspberryPi => wgpu::Limits {
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            // VideoCore VI caps textures at 4096×4096.
            max_texture_dimension_2d: 4096,
            max_storage_buffer_binding_size: 128 << 20,
            ..wgpu::Limits::default()
        },
    }
}

// ============================================================
// Error type
// ============================================================

/// Errors from GPU device initialization and host/device transfers.
#[derive(Debug, Error)]
pub enum GpuError {
    /// No Vulkan adapter at all.
    #[error(
        "no Vulkan adapter found. On WSL2: ensure Vulkan is installed and \
         `vulkaninfo` lists a GPU"
    )]
    NoSuitableAdapter,
    /// wgpu device request failed (driver issue, unsupported limits, etc.).
    #[error("device request failed")]
    DeviceRequest(#[source] wgpu::RequestDeviceError),
    /// A readback buffer could not be mapped.
    #[error("readback map failed")]
    Readback(#[from] wgpu::BufferAsyncError),
    /// The map callback never ran (device lost mid-poll).
    #[error("readback callback never fired")]
    ReadbackLost,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroup_size_for_native() {
        let ws = WorkgroupSize::for_profile(DeviceProfile::Native);
        assert_eq!(ws, WorkgroupSize { x: 16, y: 8 });
        assert_eq!(ws.total(), 128);
    }

    #[test]
    fn test_workgroup_size_for_rpi() {
        let ws = WorkgroupSize::for_profile(DeviceProfile::RaspberryPi);
        assert_eq!(ws, WorkgroupSize { x: 8, y: 8 });
        assert!(ws.total() <= 256);
    }

    #[test]
    fn test_specialise_template() {
        let ws = WorkgroupSize { x: 16, y: 8 };
        let src = ws.specialise("@workgroup_size({{WG_X}}, {{WG_Y}}, 1)");
        assert_eq!(src, "@workgroup_size(16, 8, 1)");
    }

    #[test]
    fn test_dispatch_size_exact() {
        let (dx, dy) = dispatch_size(WorkgroupSize { x: 16, y: 8 }, 640, 480);
        assert_eq!((dx, dy), (40, 60));
    }

    #[test]
    fn test_dispatch_size_ceiling() {
        // 100×100 with 8×8 → 13×13; the last workgroup overhangs by 4.
        let (dx, dy) = dispatch_size(WorkgroupSize { x: 8, y: 8 }, 100, 100);
        assert_eq!((dx, dy), (13, 13));
    }

    #[test]
    fn test_rpi_limits_cap_invocations_and_textures() {
        let limits = limits_for_profile(DeviceProfile::RaspberryPi);
        assert_eq!(limits.max_compute_invocations_per_workgroup, 256);
        assert_eq!(limits.max_texture_dimension_2d, 4096);
    }

    #[test]
    fn test_native_limits_are_default() {
        assert_eq!(limits_for_profile(DeviceProfile::Native), wgpu::Limits::default());
    }
}
