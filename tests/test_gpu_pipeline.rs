// tests/test_gpu_pipeline.rs — GPU path checked against the host path.
//
// Needs a Vulkan adapter:
//   cargo test --test test_gpu_pipeline -- --ignored

use prepro_bench::compare::{compare_images, compare_outputs, DEFAULT_MAX_MISMATCH_RATIO, DEFAULT_TOLERANCE};
use prepro_bench::gpu::{AcceleratedPipeline, DeviceProfile};
use prepro_bench::image::{ColorImage, Frame, Image};
use prepro_bench::{AcceleratedBackend, BenchmarkHarness, PipelineConfig, PipelineError, SequentialPipeline};

fn gpu() -> AcceleratedPipeline {
    AcceleratedPipeline::with_profile(DeviceProfile::Native, PipelineConfig::default())
        .expect("no Vulkan GPU")
}

fn scene(w: usize, h: usize, seed: usize) -> ColorImage {
    let mut img = ColorImage::filled_rgb(w, h, [0, 0, 0]);
    for y in 0..h {
        for x in 0..w {
            let base = ((x * 200 / w) + (y * 55 / h) + seed) as u8;
            img.set_pixel(x, y, &[base, base / 2, 255 - base]);
        }
    }
    for rect in 0..4 {
        let rx = (10 + rect * 37 + seed) % w;
        let ry = (8 + rect * 23) % h;
        for y in ry..(ry + 30).min(h) {
            for x in rx..(rx + 40).min(w) {
                img.set_pixel(x, y, &[230, 230, 230]);
            }
        }
    }
    img
}

#[test]
#[ignore = "requires a real GPU"]
fn stage_sequences_agree() {
    let gpu = gpu();
    assert_eq!(gpu.stage_sequence(), SequentialPipeline::default().stage_sequence());
}

#[test]
#[ignore = "requires a real GPU"]
fn each_stage_matches_host() {
    let gpu = gpu();
    let host = SequentialPipeline::default();
    let img = scene(97, 61, 0);
    let kernels = gpu.build_kernels(&img).unwrap();

    let gpu_stages = gpu.process_stages(&img, &kernels).unwrap();
    let host_stages = host.process_stages(&img);
    assert_eq!(gpu_stages.len(), host_stages.len());

    for (i, (stage, (h, g))) in host.stage_sequence().iter().zip(host_stages.iter().zip(&gpu_stages)).enumerate() {
        let r = compare_images(h, g, DEFAULT_TOLERANCE);
        assert!(
            r.is_equivalent(DEFAULT_MAX_MISMATCH_RATIO),
            "stage {i} ({}) diverges: {r:?}",
            stage.name()
        );
    }
}

#[test]
#[ignore = "requires a real GPU"]
fn batch_matches_host_in_order() {
    let gpu = gpu();
    let host = SequentialPipeline::default();
    let frames: Vec<Frame> = (0..4)
        .map(|i| Frame::new(format!("{i}.jpg"), scene(128 + i * 16, 96, i * 11)))
        .collect();

    let outcome = BenchmarkHarness::new(&host, &gpu).run(&frames).unwrap();
    assert_eq!(outcome.accelerated_outputs.len(), frames.len());
    for cmp in compare_outputs(&outcome.cpu_outputs, &outcome.accelerated_outputs, DEFAULT_TOLERANCE) {
        assert!(cmp.result.is_equivalent(DEFAULT_MAX_MISMATCH_RATIO), "{}: {:?}", cmp.id, cmp.result);
    }
    for (f, o) in frames.iter().zip(&outcome.accelerated_outputs) {
        assert_eq!(f.id, o.id);
        assert_eq!((o.image.width(), o.image.height()), (f.image.width(), f.image.height()));
    }
}

#[test]
#[ignore = "requires a real GPU"]
fn grayscale_reference_uses_luma_kernel() {
    let gpu = gpu();
    let plane = Image::from_vec(32, 32, (0..1024).map(|i| (i % 251) as u8).collect());
    let img = ColorImage::from_gray(&plane);
    let kernels = gpu.build_kernels(&img).unwrap();
    assert_eq!(kernels.reference_channels, 1);

    let out = gpu.process_batch(&[Frame::new("g", img.clone())], &kernels).unwrap();
    let host = SequentialPipeline::default().process(&img);
    assert!(compare_images(&host, &out[0].image, DEFAULT_TOLERANCE).is_equivalent(DEFAULT_MAX_MISMATCH_RATIO));
}

#[test]
#[ignore = "requires a real GPU"]
fn channel_mismatch_rejected_before_upload() {
    let gpu = gpu();
    let rgb = scene(16, 16, 0);
    let kernels = gpu.build_kernels(&rgb).unwrap();
    let gray = ColorImage::from_gray(&Image::from_vec(16, 16, vec![7u8; 256]));

    let err = gpu
        .process_batch(&[Frame::new("rgb", rgb), Frame::new("gray", gray)], &kernels)
        .unwrap_err();
    assert!(matches!(err, PipelineError::FormatMismatch { found: 1, expected: 3, .. }));
}

#[test]
#[ignore = "requires a real GPU"]
fn oversized_frame_reports_resource_exhaustion() {
    let gpu = AcceleratedPipeline::with_profile(DeviceProfile::RaspberryPi, PipelineConfig::default())
        .expect("no Vulkan GPU");
    let wide = ColorImage::filled_rgb(4097, 1, [0, 0, 0]);
    let kernels = gpu.build_kernels(&wide).unwrap();
    let err = gpu.process_batch(&[Frame::new("wide", wide)], &kernels).unwrap_err();
    assert!(matches!(err, PipelineError::AcceleratorResourceExhausted { .. }));
}
