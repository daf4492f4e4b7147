//! Bulk scrubbing: fan a batch out over workers, fan results back in order.
//!
//! Every worker owns one [`crate::pipeline::Scrubber`] (and so one classifier)
//! for its whole life. Workers pull the next unclaimed index from a shared
//! counter, so a slow item never holds up the rest of the batch. Whatever
//! happens to an item, its slot in the result ends up filled: with the
//! scrubbed buffer, or with the original bytes when anything went wrong.

mod protocol;
mod worker;

pub use protocol::serve;
pub use worker::{ProcessWorker, ScrubWorker, ThreadWorker, WorkerSpec};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::WorkerError;
use crate::pipeline::ScrubberConfig;
use crate::types::ProcessingStats;

/// Where bulk workers run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parallelism {
    /// Worker threads in this process
    #[default]
    Threads,
    /// Worker child processes, one pipeline each
    Processes,
}

/// Called with the number of finished items after each one completes.
pub type ProgressFn = Arc<dyn Fn(usize) + Send + Sync>;

/// Outcome for one position in a batch.
#[derive(Debug, Clone)]
pub struct BulkItem {
    /// Position in the input batch
    pub index: usize,
    /// Scrubbed bytes, or the original bytes when `error` is set
    pub output: Vec<u8>,
    /// Present when the item was scrubbed
    pub stats: Option<ProcessingStats>,
    /// Why the item fell back to its original bytes
    pub error: Option<String>,
}

impl BulkItem {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Stats to report for this item; fallback items report zero faces and no stripping.
    pub fn stats_or_fallback(&self) -> ProcessingStats {
        self.stats.unwrap_or_else(ProcessingStats::fallback)
    }
}

type Outcome = (usize, Result<(Vec<u8>, ProcessingStats), WorkerError>);

/// Runs the scrub pipeline over batches of buffers.
pub struct BulkOrchestrator {
    config: ScrubberConfig,
    worker_program: Option<(PathBuf, Vec<String>)>,
    progress: Option<ProgressFn>,
}

impl BulkOrchestrator {
    pub fn new(config: ScrubberConfig) -> Self {
        Self {
            config,
            worker_program: None,
            progress: None,
        }
    }

    /// Command used to start process workers.
    ///
    /// Defaults to the current executable with a `worker` argument. The
    /// command must run [`serve`] on its stdin and stdout.
    pub fn with_worker_program(mut self, program: PathBuf, args: Vec<String>) -> Self {
        self.worker_program = Some((program, args));
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Scrub every buffer and return the outputs in input order.
    ///
    /// Items that fail anywhere in the pipeline come back as their original
    /// bytes. The batch itself never fails.
    pub async fn bulk_process(
        &self,
        buffers: Vec<Vec<u8>>,
        parallelism: Parallelism,
        worker_count: Option<usize>,
    ) -> Vec<Vec<u8>> {
        self.bulk_process_with_stats(buffers, parallelism, worker_count)
            .await
            .into_iter()
            .map(|item| item.output)
            .collect()
    }

    /// Like [`Self::bulk_process`], with per-item stats and failure reasons.
    pub async fn bulk_process_with_stats(
        &self,
        buffers: Vec<Vec<u8>>,
        parallelism: Parallelism,
        worker_count: Option<usize>,
    ) -> Vec<BulkItem> {
        let total = buffers.len();
        if total == 0 {
            return Vec::new();
        }

        let workers = worker_count
            .unwrap_or_else(default_worker_count)
            .clamp(1, total);
        let spec = match self.worker_spec(parallelism) {
            Ok(spec) => spec,
            Err(e) => {
                tracing::error!("Cannot start {:?} workers: {}", parallelism, e);
                return fallback_all(buffers, &e.to_string());
            }
        };
        tracing::info!(
            "Scrubbing {} image(s) with {} {:?} worker(s)",
            total,
            workers,
            parallelism
        );

        let inputs = Arc::new(buffers);
        let next = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let spec = spec.clone();
                let inputs = Arc::clone(&inputs);
                let next = Arc::clone(&next);
                let done = Arc::clone(&done);
                let progress = self.progress.clone();
                tokio::task::spawn_blocking(move || {
                    run_worker(id, &spec, &inputs, &next, &done, progress.as_deref())
                })
            })
            .collect();

        let mut slots: Vec<Option<Result<(Vec<u8>, ProcessingStats), WorkerError>>> =
            (0..total).map(|_| None).collect();
        for handle in handles {
            match handle.await {
                Ok(outcomes) => {
                    for (index, result) in outcomes {
                        slots[index] = Some(result);
                    }
                }
                Err(e) => tracing::error!("Bulk worker task failed: {}", e),
            }
        }

        let inputs = Arc::try_unwrap(inputs).unwrap_or_else(|shared| (*shared).clone());
        let items: Vec<BulkItem> = inputs
            .into_iter()
            .zip(slots)
            .enumerate()
            .map(|(index, (original, slot))| match slot {
                Some(Ok((output, stats))) => BulkItem {
                    index,
                    output,
                    stats: Some(stats),
                    error: None,
                },
                Some(Err(e)) => {
                    tracing::error!("Item {} kept original bytes: {}", index, e);
                    BulkItem {
                        index,
                        output: original,
                        stats: None,
                        error: Some(e.to_string()),
                    }
                }
                None => {
                    tracing::error!("Item {} was not processed; keeping original bytes", index);
                    BulkItem {
                        index,
                        output: original,
                        stats: None,
                        error: Some("no worker processed this item".into()),
                    }
                }
            })
            .collect();

        let failed = items.iter().filter(|i| !i.succeeded()).count();
        tracing::info!("Bulk scrub finished: {} ok, {} fell back", total - failed, failed);
        items
    }

    fn worker_spec(&self, parallelism: Parallelism) -> Result<WorkerSpec, WorkerError> {
        match parallelism {
            Parallelism::Threads => Ok(WorkerSpec::Thread(self.config.clone())),
            Parallelism::Processes => {
                let (program, args) = match &self.worker_program {
                    Some(command) => command.clone(),
                    None => (std::env::current_exe()?, vec!["worker".to_string()]),
                };
                Ok(WorkerSpec::Process {
                    program,
                    args,
                    config: self.config.clone(),
                })
            }
        }
    }
}

/// Host core count, or 1 when it cannot be determined.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn fallback_all(buffers: Vec<Vec<u8>>, reason: &str) -> Vec<BulkItem> {
    buffers
        .into_iter()
        .enumerate()
        .map(|(index, output)| BulkItem {
            index,
            output,
            stats: None,
            error: Some(reason.to_string()),
        })
        .collect()
}

/// Claim and scrub items until the batch is exhausted or the worker breaks.
fn run_worker(
    id: usize,
    spec: &WorkerSpec,
    inputs: &[Vec<u8>],
    next: &AtomicUsize,
    done: &AtomicUsize,
    progress: Option<&(dyn Fn(usize) + Send + Sync)>,
) -> Vec<Outcome> {
    let mut worker = match spec.start() {
        Ok(worker) => worker,
        Err(e) => {
            tracing::error!("Worker {} failed to start: {}", id, e);
            return Vec::new();
        }
    };

    let mut outcomes = Vec::new();
    loop {
        let index = next.fetch_add(1, Ordering::Relaxed);
        if index >= inputs.len() {
            break;
        }

        let result = worker.scrub(&inputs[index]);
        let fatal = matches!(&result, Err(e) if !e.is_recoverable());
        if let Err(e) = &result {
            tracing::debug!("Worker {} item {}: {}", id, index, e);
        }
        outcomes.push((index, result));

        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(progress) = progress {
            progress(finished);
        }

        if fatal {
            tracing::error!("Worker {} stopped after a broken channel", id);
            break;
        }
    }
    outcomes
}
