//! Parallel file-to-file PPG computation over a bounded worker pool.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, error, info};

use crate::engine::InferenceEngine;
use crate::error::{PpgError, Result};
use crate::paths::pair_paths;
use crate::types::ModelIdentity;

/// What a batch does when one file fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop starting new files and return the first failure.
    #[default]
    FailFast,
    /// Record the failure and keep going.
    Isolate,
}

/// Shared flag that stops a batch before its next file.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct FileFailure {
    pub input: PathBuf,
    pub output: PathBuf,
    pub error: PpgError,
}

/// Per-file results, each list in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub completed: Vec<PathBuf>,
    pub failures: Vec<FileFailure>,
    /// Inputs never started because the batch was cancelled or aborted.
    pub skipped: Vec<PathBuf>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }
}

enum Outcome {
    Written,
    Failed(PpgError),
    Skipped,
}

pub struct BatchOrchestrator<'e> {
    engine: &'e InferenceEngine,
    workers: usize,
    policy: FailurePolicy,
    cancel: CancellationToken,
}

impl<'e> BatchOrchestrator<'e> {
    /// Orchestrator using the engine's configured worker count.
    pub fn new(engine: &'e InferenceEngine) -> Self {
        Self {
            engine,
            workers: engine.config().num_workers,
            policy: FailurePolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Pair `inputs` with `outputs` (or derived paths) and run them.
    pub fn run_paths(
        &self,
        inputs: &[PathBuf],
        outputs: Option<&[PathBuf]>,
        identity: &ModelIdentity,
    ) -> Result<BatchReport> {
        let pairs = pair_paths(inputs, outputs)?;
        self.run(&pairs, identity)
    }

    /// Compute every `(input, output)` pair with at most `workers` in flight.
    ///
    /// Under [`FailurePolicy::FailFast`] the first failing input (by position)
    /// is returned as [`PpgError::BatchFile`]. Files already running when a
    /// failure happens are allowed to finish.
    pub fn run(&self, pairs: &[(PathBuf, PathBuf)], identity: &ModelIdentity) -> Result<BatchReport> {
        if self.workers == 0 {
            return Err(PpgError::Config("worker count must be at least 1".into()));
        }
        if pairs.is_empty() {
            return Ok(BatchReport::default());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("ppgs-worker-{i}"))
            .build()
            .map_err(|err| PpgError::WorkerPool(err.to_string()))?;
        info!(
            files = pairs.len(),
            workers = self.workers,
            policy = ?self.policy,
            "starting batch"
        );

        let aborted = AtomicBool::new(false);
        let outcomes: Vec<Outcome> = pool.install(|| {
            pairs
                .par_iter()
                .map(|(input, output)| {
                    if self.cancel.is_cancelled() || aborted.load(Ordering::SeqCst) {
                        return Outcome::Skipped;
                    }
                    debug!(input = %input.display(), "processing");
                    match self.engine.from_file_to_file(input, output, identity) {
                        Ok(()) => Outcome::Written,
                        Err(err) => {
                            error!(input = %input.display(), error = %err, "failed to compute ppg");
                            if self.policy == FailurePolicy::FailFast {
                                aborted.store(true, Ordering::SeqCst);
                            }
                            Outcome::Failed(err)
                        }
                    }
                })
                .collect()
        });

        let mut report = BatchReport::default();
        for ((input, output), outcome) in pairs.iter().zip(outcomes) {
            match outcome {
                Outcome::Written => report.completed.push(output.clone()),
                Outcome::Skipped => report.skipped.push(input.clone()),
                Outcome::Failed(error) => report.failures.push(FileFailure {
                    input: input.clone(),
                    output: output.clone(),
                    error,
                }),
            }
        }
        info!(
            completed = report.completed.len(),
            failed = report.failures.len(),
            skipped = report.skipped.len(),
            "batch finished"
        );

        if self.policy == FailurePolicy::FailFast && !report.failures.is_empty() {
            let first = report.failures.swap_remove(0);
            return Err(PpgError::BatchFile {
                input: first.input,
                source: Box::new(first.error),
            });
        }
        Ok(report)
    }
}
