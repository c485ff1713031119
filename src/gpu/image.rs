// gpu/image.rs — Device-resident images and batched transfers.
//
// RESPONSIBILITIES
// ─────────────────
// 1. `GpuInput` is one decoded frame resident on the GPU as an Rgba8Uint
//    texture. RGB frames get alpha 255; grayscale frames are replicated
//    into all three colour channels. The grayscale kernel reads integers,
//    so there is no normalisation round trip.
//
// 2. `GpuPlane` is an R32Float texture holding one intermediate stage
//    result with raw values in [0, 255], the same range the host stages
//    use. Every stage reads one plane and writes a new one.
//
// 3. `upload_batch` / `download_batch`: one encoder and one submit for
//    the whole batch in each direction. Downloads map every readback
//    buffer and then poll the device once.
//
//
// ROW ALIGNMENT
// ─────────────
// wgpu's buffer↔texture copies require `bytes_per_row` to be a multiple
// of 256 (`COPY_BYTES_PER_ROW_ALIGNMENT`). Staging rows are padded to that
// boundary; only the first `width * bytes_per_pixel` bytes of each row
// carry pixels. Readback strips the padding again.

use std::sync::mpsc;

use wgpu::util::DeviceExt;

use crate::gpu::device::{GpuDevice, GpuError};
use crate::image::{ColorImage, Image};

const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// Rgba8Uint: 4 bytes per pixel.
const RGBA_BYTES: u32 = 4;
/// R32Float: 4 bytes per pixel.
const PLANE_BYTES: u32 = 4;

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d { width, height, depth_or_array_layers: 1 }
}

// ---------------------------------------------------------------------------
// GpuInput
// ---------------------------------------------------------------------------

/// An input frame on the GPU (Rgba8Uint, read with `textureLoad`).
pub struct GpuInput {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GpuInput {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("GpuInput"),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Uint,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuInput { texture, view, width, height }
    }
}

/// Expand an interleaved 1- or 3-channel image into 256-byte-aligned RGBA
/// rows. Returns the staging bytes and the padded row pitch.
pub(crate) fn rgba_staging(src: &ColorImage) -> (Vec<u8>, u32) {
    let width = src.width() as u32;
    let height = src.height() as u32;
    let bytes_per_row = align_to(width * RGBA_BYTES, COPY_ALIGNMENT);
    let mut staging = vec![0u8; (bytes_per_row * height) as usize];

    for y in 0..src.height() {
        let row_start = y * bytes_per_row as usize;
        for x in 0..src.width() {
            let p = src.pixel(x, y);
            let rgba = match p.len() {
                1 => [p[0], p[0], p[0], 255],
                _ => [p[0], p[1], p[2], 255],
            };
            let off = row_start + x * RGBA_BYTES as usize;
            staging[off..off + 4].copy_from_slice(&rgba);
        }
    }
    (staging, bytes_per_row)
}

/// Upload every frame in one submission, in input order.
pub fn upload_batch<'a>(
    gpu: &GpuDevice,
    frames: impl IntoIterator<Item = &'a ColorImage>,
) -> Vec<GpuInput> {
    let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("upload_batch"),
    });
    let mut inputs = Vec::new();
    // Staging buffers must live until the submit below.
    let mut staging_bufs = Vec::new();

    for src in frames {
        let width = src.width() as u32;
        let height = src.height() as u32;
        let input = GpuInput::new(&gpu.device, width, height);
        let (staging, bytes_per_row) = rgba_staging(src);

        let buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("upload_batch::staging"),
            contents: &staging,
            usage: wgpu::BufferUsages::COPY_SRC,
        });
        encoder.copy_buffer_to_texture(
            wgpu::ImageCopyBuffer {
                buffer: &buf,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::ImageCopyTexture {
                texture: &input.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            extent(width, height),
        );
        staging_bufs.push(buf);
        inputs.push(input);
    }

    gpu.queue.submit(std::iter::once(encoder.finish()));
    inputs
}

// ---------------------------------------------------------------------------
// GpuPlane
// ---------------------------------------------------------------------------

/// One R32Float stage result, bindable for reading and for storage writes.
pub struct GpuPlane {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GpuPlane {
    pub fn new(device: &wgpu::Device, width: u32, height: u32, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuPlane { texture, view, width, height }
    }
}

/// Strip row padding from an R32Float readback and convert to u8.
///
/// Stage outputs hold whole numbers in [0, 255]; the conversion is the
/// same clamp-and-round the host uses.
pub(crate) fn unpack_plane(mapped: &[u8], width: u32, height: u32, bytes_per_row: u32) -> Image<u8> {
    let w = width as usize;
    let mut out = Vec::with_capacity(w * height as usize);
    for y in 0..height as usize {
        let start = y * bytes_per_row as usize;
        let row = &mapped[start..start + w * PLANE_BYTES as usize];
        out.extend(row.chunks_exact(4).map(|b| {
            let v = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            v.clamp(0.0, 255.0).round() as u8
        }));
    }
    Image::from_vec(w, height as usize, out)
}

/// Copy every plane back to the host in one submission and one poll.
pub fn download_batch(gpu: &GpuDevice, planes: &[GpuPlane]) -> Result<Vec<Image<u8>>, GpuError> {
    let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("download_batch"),
    });

    let mut readbacks = Vec::with_capacity(planes.len());
    for plane in planes {
        let bytes_per_row = align_to(plane.width * PLANE_BYTES, COPY_ALIGNMENT);
        let buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("download_batch::readback"),
            size: (bytes_per_row * plane.height) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &plane.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buf,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(plane.height),
                },
            },
            extent(plane.width, plane.height),
        );
        readbacks.push((buf, bytes_per_row));
    }
    gpu.queue.submit(std::iter::once(encoder.finish()));

    let (tx, rx) = mpsc::channel();
    for (buf, _) in &readbacks {
        let tx = tx.clone();
        buf.slice(..).map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
    }
    gpu.device.poll(wgpu::Maintain::Wait);

    let mut mapped = 0;
    for result in rx.try_iter() {
        result?;
        mapped += 1;
    }
    if mapped != readbacks.len() {
        return Err(GpuError::ReadbackLost);
    }

    let mut out = Vec::with_capacity(planes.len());
    for ((buf, bytes_per_row), plane) in readbacks.iter().zip(planes) {
        let view = buf.slice(..).get_mapped_range();
        out.push(unpack_plane(&view, plane.width, plane.height, *bytes_per_row));
        drop(view);
        buf.unmap();
    }
    Ok(out)
}

/// Map a small buffer and read it as u32 words. Used for the hysteresis
/// change counter.
pub fn read_u32s(gpu: &GpuDevice, buf: &wgpu::Buffer) -> Result<Vec<u32>, GpuError> {
    let slice = buf.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        let _ = tx.send(r);
    });
    gpu.device.poll(wgpu::Maintain::Wait);
    rx.recv().map_err(|_| GpuError::ReadbackLost)??;

    let view = slice.get_mapped_range();
    let words = view
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    drop(view);
    buf.unmap();
    Ok(words)
}

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

/// Round `value` up to the next multiple of `alignment`.
///
///   align_to(100, 256) = 256
///   align_to(256, 256) = 256
///   align_to(257, 256) = 512
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}
