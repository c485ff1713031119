// benches/pipeline_benchmarks.rs — CPU vs GPU, per stage and per batch.
//
//   cargo bench --bench pipeline_benchmarks
//
// With a directory of real images:
//   PREPRO_IMAGES=/path/to/jpgs cargo bench --bench pipeline_benchmarks
//
// GPU cases are skipped (with a note on stderr) when no adapter is found.
//
//
// CRITERION + GPU CAVEATS
// ────────────────────────
// Criterion measures wall time including host-side overhead (uploads,
// bind group creation, submit, poll). Shader execution shows up inside
// poll(). That matches what the harness times. Warmup is raised because
// the first iterations pay for driver-side pipeline compilation.

use std::path::Path;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use prepro_bench::canny::CannyDetector;
use prepro_bench::convert::to_grayscale;
use prepro_bench::convolution::gaussian_blur;
use prepro_bench::gpu::{AcceleratedPipeline, DeviceProfile};
use prepro_bench::histeq::equalize_histogram;
use prepro_bench::image::{ColorImage, Frame};
use prepro_bench::io::load_frames;
use prepro_bench::morphology::{dilate, erode, StructuringElement};
use prepro_bench::{AcceleratedBackend, PipelineConfig, SequentialPipeline};

// ============================================================
// Shared helpers
// ============================================================

/// Gradient background with a few bright rectangles: gives Canny real edges.
fn make_scene(w: usize, h: usize) -> ColorImage {
    let mut img = ColorImage::filled_rgb(w, h, [0, 0, 0]);
    for y in 0..h {
        for x in 0..w {
            let base = ((x * 200 / w) + (y * 55 / h)) as u8;
            img.set_pixel(x, y, &[base, base / 2, 255 - base]);
        }
    }
    for rect in 0..6 {
        let rx = (50 + rect * 100) % w;
        let ry = (40 + (rect % 3) * 120) % h;
        let bright = 180u8 + rect as u8 * 10;
        for y in ry..(ry + 60).min(h) {
            for x in rx..(rx + 80).min(w) {
                img.set_pixel(x, y, &[bright, bright, bright]);
            }
        }
    }
    img
}

fn batch() -> Vec<Frame> {
    if let Ok(dir) = std::env::var("PREPRO_IMAGES") {
        match load_frames(Path::new(&dir), &["jpg".to_string(), "png".to_string()]) {
            Ok(frames) if !frames.is_empty() => return frames,
            _ => eprintln!("PREPRO_IMAGES={dir} has no usable images, using synthetic frames"),
        }
    }
    (0..8).map(|i| Frame::new(format!("{i:03}.png"), make_scene(640, 480))).collect()
}

fn gpu_pipeline() -> Option<AcceleratedPipeline> {
    match AcceleratedPipeline::with_profile(DeviceProfile::Native, PipelineConfig::default()) {
        Ok(p) => Some(p),
        Err(e) => {
            eprintln!("skipping GPU benchmarks: {e}");
            None
        }
    }
}

// ============================================================
// Host stages
// ============================================================

fn bench_cpu_stages(c: &mut Criterion) {
    let color = make_scene(640, 480);
    let gray = to_grayscale(&color);
    let blurred = gaussian_blur(&gray, 5, 1.5);
    let element = StructuringElement::rect(5);
    let eroded = erode(&blurred, element);
    let dilated = dilate(&eroded, element);
    let canny = CannyDetector::new(50.0, 150.0);
    let edges = canny.detect(&dilated);

    let mut group = c.benchmark_group("cpu_stages_640x480");
    group.bench_function("grayscale", |b| b.iter(|| to_grayscale(&color)));
    group.bench_function("gaussian_5x5", |b| b.iter(|| gaussian_blur(&gray, 5, 1.5)));
    group.bench_function("erode_5x5", |b| b.iter(|| erode(&blurred, element)));
    group.bench_function("dilate_5x5", |b| b.iter(|| dilate(&eroded, element)));
    group.bench_function("canny_50_150", |b| b.iter(|| canny.detect(&dilated)));
    group.bench_function("equalize_hist", |b| b.iter(|| equalize_histogram(&edges)));
    group.finish();
}

// ============================================================
// Whole pipeline: CPU vs GPU
// ============================================================

fn bench_single_image(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_single");
    group.warm_up_time(Duration::from_secs(2));
    let sequential = SequentialPipeline::default();
    let gpu = gpu_pipeline();

    for &(w, h) in &[(320usize, 240usize), (640, 480), (1280, 720)] {
        let frame = Frame::new("scene.png", make_scene(w, h));
        let label = format!("{w}x{h}");

        group.bench_with_input(BenchmarkId::new("cpu", &label), &frame, |b, f| {
            b.iter(|| sequential.process(&f.image))
        });

        if let Some(gpu) = &gpu {
            let Ok(kernels) = gpu.build_kernels(&frame.image) else { continue };
            let single = std::slice::from_ref(&frame);
            group.bench_with_input(BenchmarkId::new("gpu", &label), &frame, |b, _| {
                b.iter(|| gpu.process_batch(single, &kernels))
            });
        }
    }
    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let frames = batch();
    let sequential = SequentialPipeline::default();

    let mut group = c.benchmark_group("pipeline_batch");
    group.warm_up_time(Duration::from_secs(2));
    group.sample_size(10);

    group.bench_function(BenchmarkId::new("cpu", frames.len()), |b| {
        b.iter(|| sequential.process_batch(&frames))
    });

    if let Some(gpu) = gpu_pipeline() {
        if let Ok(kernels) = gpu.build_kernels(&frames[0].image) {
            group.bench_function(BenchmarkId::new("gpu", frames.len()), |b| {
                b.iter(|| gpu.process_batch(&frames, &kernels))
            });
        }
        group.bench_function("gpu_kernel_build", |b| {
            b.iter(|| gpu.build_kernels(&frames[0].image))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cpu_stages, bench_single_image, bench_batch);
criterion_main!(benches);
