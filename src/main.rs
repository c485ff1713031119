// prepro-bench — run the six-stage preprocessing pipeline over a directory
// on the CPU and on the GPU, write both result sets, and report timings.
//
// Usage:
//   prepro-bench <input_dir> [--output results] [--ext jpg] [--json] [--verify]
//
// Exit status is non-zero when no image could be loaded, when the GPU runs
// out of memory, or when `--require-gpu` is given and no GPU is usable.
// Without `--require-gpu` a missing GPU is logged and only CPU results are
// written.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;

use prepro_bench::compare::{compare_outputs, DEFAULT_MAX_MISMATCH_RATIO, DEFAULT_TOLERANCE};
use prepro_bench::gpu::{AcceleratedPipeline, DeviceProfile};
use prepro_bench::image::ProcessedFrame;
use prepro_bench::io::{load_frames, FrameWriter};
use prepro_bench::{BenchmarkHarness, BenchmarkReport, ExecutionPath, PipelineConfig, PipelineError, SequentialPipeline};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProfileArg {
    Native,
    Rpi,
}

impl From<ProfileArg> for DeviceProfile {
    fn from(p: ProfileArg) -> Self {
        match p {
            ProfileArg::Native => DeviceProfile::Native,
            ProfileArg::Rpi => DeviceProfile::RaspberryPi,
        }
    }
}

/// CPU vs GPU image preprocessing benchmark
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Directory containing the input images
    input: PathBuf,

    /// Root of the result tree (cpu/ and gpu/ are created inside)
    #[arg(long, short, default_value = "results")]
    output: PathBuf,

    /// File extensions to load (repeatable)
    #[arg(long = "ext", default_value = "jpg")]
    extensions: Vec<String>,

    /// Gaussian window size (odd, at most 15)
    #[arg(long, default_value_t = 5)]
    blur_size: usize,

    /// Gaussian sigma
    #[arg(long, default_value_t = 1.5)]
    blur_sigma: f32,

    /// Erode/dilate structuring element size (odd)
    #[arg(long, default_value_t = 5)]
    morph_size: usize,

    /// Canny low threshold
    #[arg(long, default_value_t = 50.0)]
    canny_low: f32,

    /// Canny high threshold
    #[arg(long, default_value_t = 150.0)]
    canny_high: f32,

    /// GPU limits profile
    #[arg(long, value_enum, default_value = "native")]
    profile: ProfileArg,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Compare CPU and GPU outputs pixel by pixel
    #[arg(long)]
    verify: bool,

    /// Fail instead of falling back to CPU-only when no GPU is usable
    #[arg(long)]
    require_gpu: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    fn config(&self) -> Result<PipelineConfig, String> {
        let config = PipelineConfig {
            blur_ksize: self.blur_size,
            blur_sigma: self.blur_sigma,
            morph_ksize: self.morph_size,
            canny_low: self.canny_low,
            canny_high: self.canny_high,
        };
        if config.blur_ksize % 2 == 0 || config.blur_ksize > 15 {
            return Err(format!("--blur-size must be odd and at most 15, got {}", config.blur_ksize));
        }
        if config.blur_sigma <= 0.0 {
            return Err(format!("--blur-sigma must be positive, got {}", config.blur_sigma));
        }
        if config.morph_ksize % 2 == 0 {
            return Err(format!("--morph-size must be odd, got {}", config.morph_ksize));
        }
        if config.canny_low < 0.0 || config.canny_low > config.canny_high {
            return Err(format!(
                "Canny thresholds must satisfy 0 <= low <= high, got {} / {}",
                config.canny_low, config.canny_high
            ));
        }
        Ok(config)
    }

    fn log_level(&self) -> LevelFilter {
        match (self.quiet, self.verbose) {
            (true, _) => LevelFilter::ERROR,
            (false, 0) => LevelFilter::INFO,
            (false, 1) => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

fn print_report(report: &BenchmarkReport) {
    let rule = "=".repeat(31);
    println!("\n{rule}");
    println!("Images: {}", report.image_count);
    println!("Total CPU time: {} ms", report.cpu_elapsed_ms);
    println!("Total GPU time: {} ms", report.accelerated_elapsed_ms);
    println!("GPU setup (not timed): {} ms", report.accelerated_setup_ms);
    match report.speedup {
        Some(s) => println!("Speedup: {s:.2}x"),
        None => println!("Speedup: n/a (GPU time rounded to 0 ms)"),
    }
    println!("{rule}");
}

fn write_results(writer: &FrameWriter, frames: &[ProcessedFrame], path: ExecutionPath) -> bool {
    match writer.write_all(frames, path) {
        Ok(()) => {
            info!(count = frames.len(), dir = %writer.dir_for(path).display(), "{path} results written");
            true
        }
        Err(e) => {
            error!(error = %e, "{path} results could not be written");
            false
        }
    }
}

fn run(args: &Args) -> Result<(), ExitCode> {
    let config = args.config().map_err(|msg| {
        error!("{msg}");
        ExitCode::from(2)
    })?;

    let frames = load_frames(&args.input, &args.extensions).map_err(|e| {
        error!(error = %e, "cannot load input images");
        ExitCode::FAILURE
    })?;
    if frames.is_empty() {
        error!(dir = %args.input.display(), exts = ?args.extensions, "{}", PipelineError::EmptyBatch);
        return Err(ExitCode::FAILURE);
    }
    info!(count = frames.len(), dir = %args.input.display(), "images loaded");

    let writer = FrameWriter::new(Path::new(&args.output)).map_err(|e| {
        error!(error = %e, "cannot prepare output directory");
        ExitCode::FAILURE
    })?;

    let sequential = SequentialPipeline::new(config);
    let accelerated = match AcceleratedPipeline::with_profile(args.profile.into(), config) {
        Ok(p) => Some(p),
        Err(e) if args.require_gpu => {
            error!(error = %e, "GPU required but unavailable");
            return Err(ExitCode::FAILURE);
        }
        Err(e) => {
            warn!(error = %e, "GPU unavailable, running CPU only");
            None
        }
    };

    let Some(accelerated) = accelerated else {
        let start = Instant::now();
        let outputs = sequential.process_batch(&frames);
        println!("Total CPU time: {} ms", start.elapsed().as_millis());
        return if write_results(&writer, &outputs, ExecutionPath::Host) {
            Ok(())
        } else {
            Err(ExitCode::FAILURE)
        };
    };

    let harness = BenchmarkHarness::new(&sequential, &accelerated);
    let cpu = harness.run_sequential(&frames).map_err(|_| ExitCode::FAILURE)?;
    let cpu_written = write_results(&writer, &cpu.outputs, ExecutionPath::Host);

    let (acc, setup) = match harness.run_accelerated(&frames) {
        Ok(run) => run,
        Err(PipelineError::AcceleratorUnavailable(e)) if !args.require_gpu => {
            warn!(error = %e, "GPU failed, keeping CPU results only");
            println!("Total CPU time: {} ms", cpu.elapsed.as_millis());
            return if cpu_written { Ok(()) } else { Err(ExitCode::FAILURE) };
        }
        Err(e) => {
            error!(error = %e, "GPU batch failed");
            return Err(ExitCode::FAILURE);
        }
    };
    let outcome = harness.outcome(cpu, acc, setup);
    let gpu_written = write_results(&writer, &outcome.accelerated_outputs, ExecutionPath::Accelerated);

    if args.json {
        match serde_json::to_string_pretty(&outcome.report) {
            Ok(s) => println!("{s}"),
            Err(e) => error!(error = %e, "cannot serialise report"),
        }
    } else {
        print_report(&outcome.report);
    }

    let mut equivalent = true;
    if args.verify {
        for cmp in compare_outputs(&outcome.cpu_outputs, &outcome.accelerated_outputs, DEFAULT_TOLERANCE) {
            if cmp.result.is_equivalent(DEFAULT_MAX_MISMATCH_RATIO) {
                info!(id = %cmp.id, ratio = cmp.result.mismatch_ratio(), "outputs agree");
            } else {
                warn!(id = %cmp.id, result = ?cmp.result, "outputs differ");
                equivalent = false;
            }
        }
    }

    if cpu_written && gpu_written && equivalent {
        Ok(())
    } else {
        Err(ExitCode::FAILURE)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => code,
    }
}
