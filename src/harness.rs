// harness.rs — Times both execution paths over the same batch.
//
// run():
//   1. reject an empty batch (before any clock starts)
//   2. time the host loop over every frame         → cpu_elapsed_ms
//   3. build the accelerated kernel set once        → accelerated_setup_ms
//   4. time one accelerated batch call              → accelerated_elapsed_ms
//   5. speedup = cpu / accelerated, if accelerated > 0
//
// Kernel construction is timed on its own and kept out of both windows.
// Writing results to disk is the caller's business and also stays outside.
//
// The accelerated side is a trait so the harness can be driven by a mock
// in tests and by `gpu::AcceleratedPipeline` in the binary.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::image::{ColorImage, Frame, ProcessedFrame};
use crate::pipeline::SequentialPipeline;
use crate::stages::Stage;

/// A batch-oriented accelerated execution path.
pub trait AcceleratedBackend {
    /// Reusable, immutable operator handles.
    type KernelSet;

    /// Build the kernel set for frames shaped like `reference`.
    fn build_kernels(&self, reference: &ColorImage) -> Result<Self::KernelSet, PipelineError>;

    /// Process every frame, returning outputs in input order. Either all
    /// frames succeed or the call fails.
    fn process_batch(
        &self,
        frames: &[Frame],
        kernels: &Self::KernelSet,
    ) -> Result<Vec<ProcessedFrame>, PipelineError>;

    /// The stage list this backend runs.
    fn stage_sequence(&self) -> [Stage; 6];
}

/// Result of one timed batch run.
#[derive(Debug, Clone)]
pub struct TimedRun {
    pub outputs: Vec<ProcessedFrame>,
    pub elapsed: Duration,
}

/// Timing summary for one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkReport {
    pub image_count: usize,
    pub cpu_elapsed_ms: u64,
    pub accelerated_elapsed_ms: u64,
    /// Kernel-set construction. Reported, never folded into a window.
    pub accelerated_setup_ms: u64,
    /// `cpu / accelerated`; absent when the accelerated time rounds to 0.
    pub speedup: Option<f64>,
    pub stages: Vec<Stage>,
}

impl BenchmarkReport {
    pub fn new(
        image_count: usize,
        cpu_elapsed_ms: u64,
        accelerated_elapsed_ms: u64,
        accelerated_setup_ms: u64,
        stages: Vec<Stage>,
    ) -> Self {
        BenchmarkReport {
            image_count,
            cpu_elapsed_ms,
            accelerated_elapsed_ms,
            accelerated_setup_ms,
            speedup: speedup(cpu_elapsed_ms, accelerated_elapsed_ms),
            stages,
        }
    }
}

/// Everything a run produced: the report plus both output sequences.
#[derive(Debug, Clone)]
pub struct BenchmarkOutcome {
    pub report: BenchmarkReport,
    pub cpu_outputs: Vec<ProcessedFrame>,
    pub accelerated_outputs: Vec<ProcessedFrame>,
}

/// `cpu / accelerated`, or `None` when the accelerated duration is 0.
pub fn speedup(cpu_ms: u64, accelerated_ms: u64) -> Option<f64> {
    if accelerated_ms > 0 {
        Some(cpu_ms as f64 / accelerated_ms as f64)
    } else {
        None
    }
}

fn whole_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Drives the host pipeline and an accelerated backend over one batch.
pub struct BenchmarkHarness<'a, B: AcceleratedBackend> {
    sequential: &'a SequentialPipeline,
    backend: &'a B,
}

impl<'a, B: AcceleratedBackend> BenchmarkHarness<'a, B> {
    pub fn new(sequential: &'a SequentialPipeline, backend: &'a B) -> Self {
        BenchmarkHarness { sequential, backend }
    }

    /// Time the host pipeline over the whole batch (one window, not per image).
    pub fn run_sequential(&self, frames: &[Frame]) -> Result<TimedRun, PipelineError> {
        if frames.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }
        let start = Instant::now();
        let outputs = self.sequential.process_batch(frames);
        let elapsed = start.elapsed();
        debug!(?elapsed, "host pass done");
        Ok(TimedRun { outputs, elapsed })
    }

    /// Build kernels from the first frame, then time one batch call.
    /// Returns the run and the (untimed-window) setup duration.
    pub fn run_accelerated(&self, frames: &[Frame]) -> Result<(TimedRun, Duration), PipelineError> {
        let reference = frames.first().ok_or(PipelineError::EmptyBatch)?;

        let setup_start = Instant::now();
        let kernels = self.backend.build_kernels(&reference.image)?;
        let setup = setup_start.elapsed();
        debug!(?setup, "kernel set built");

        let start = Instant::now();
        let outputs = self.backend.process_batch(frames, &kernels)?;
        let elapsed = start.elapsed();
        debug!(?elapsed, "accelerated pass done");
        Ok((TimedRun { outputs, elapsed }, setup))
    }

    /// Full comparison run. The host path finishes before the accelerated
    /// clock starts.
    pub fn run(&self, frames: &[Frame]) -> Result<BenchmarkOutcome, PipelineError> {
        let cpu = self.run_sequential(frames)?;
        let (acc, setup) = self.run_accelerated(frames)?;
        Ok(self.outcome(cpu, acc, setup))
    }

    /// Combine two timed runs of the same batch into an outcome.
    pub fn outcome(&self, cpu: TimedRun, acc: TimedRun, setup: Duration) -> BenchmarkOutcome {
        let report = BenchmarkReport::new(
            cpu.outputs.len(),
            whole_millis(cpu.elapsed),
            whole_millis(acc.elapsed),
            whole_millis(setup),
            self.sequential.stage_sequence().to_vec(),
        );
        info!(
            images = report.image_count,
            cpu_ms = report.cpu_elapsed_ms,
            accelerated_ms = report.accelerated_elapsed_ms,
            setup_ms = report.accelerated_setup_ms,
            "benchmark finished"
        );
        BenchmarkOutcome {
            report,
            cpu_outputs: cpu.outputs,
            accelerated_outputs: acc.outputs,
        }
    }
}
