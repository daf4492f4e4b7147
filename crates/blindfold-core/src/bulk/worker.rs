//! Bulk workers: one [`Scrubber`] each, on a thread or in a child process.

use std::any::Any;
use std::io::{BufReader, BufWriter, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use crate::error::WorkerError;
use crate::pipeline::{Scrubber, ScrubberConfig};
use crate::types::ProcessingStats;

use super::protocol;

/// Something that scrubs items one at a time for the orchestrator.
pub trait ScrubWorker: Send {
    fn scrub(&mut self, bytes: &[u8]) -> Result<(Vec<u8>, ProcessingStats), WorkerError>;
}

/// How to start one worker.
#[derive(Debug, Clone)]
pub enum WorkerSpec {
    /// In-process, on the calling thread
    Thread(ScrubberConfig),
    /// A child process speaking [`protocol`] over stdin/stdout
    Process {
        program: PathBuf,
        args: Vec<String>,
        config: ScrubberConfig,
    },
}

impl WorkerSpec {
    pub fn start(&self) -> Result<Box<dyn ScrubWorker>, WorkerError> {
        match self {
            WorkerSpec::Thread(config) => Ok(Box::new(ThreadWorker::new(config))),
            WorkerSpec::Process {
                program,
                args,
                config,
            } => Ok(Box::new(ProcessWorker::spawn(program, args, config)?)),
        }
    }
}

/// Runs the pipeline on the current thread.
pub struct ThreadWorker {
    scrubber: Scrubber,
}

impl ThreadWorker {
    pub fn new(config: &ScrubberConfig) -> Self {
        Self {
            scrubber: Scrubber::new(config),
        }
    }
}

impl ScrubWorker for ThreadWorker {
    fn scrub(&mut self, bytes: &[u8]) -> Result<(Vec<u8>, ProcessingStats), WorkerError> {
        // A panic in a decoder must cost one item, not the worker.
        match panic::catch_unwind(AssertUnwindSafe(|| self.scrubber.process(bytes))) {
            Ok(result) => result.map_err(WorkerError::from),
            Err(payload) => Err(WorkerError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Forwards items to a child process running [`protocol::serve`].
pub struct ProcessWorker {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stdout: BufReader<ChildStdout>,
    /// The session is out of sync and the child may never exit on its own.
    broken: bool,
}

impl ProcessWorker {
    /// Spawn the child and send it the handshake.
    pub fn spawn(
        program: &Path,
        args: &[String],
        config: &ScrubberConfig,
    ) -> Result<Self, WorkerError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(WorkerError::Protocol("worker pipes unavailable".into()));
        };

        let mut worker = Self {
            child,
            stdin: Some(BufWriter::new(stdin)),
            stdout: BufReader::new(stdout),
            broken: false,
        };
        if let Some(stdin) = worker.stdin.as_mut() {
            if let Err(e) = protocol::write_handshake(stdin, config) {
                worker.broken = true;
                return Err(e);
            }
        }
        tracing::debug!("Spawned worker process {}", worker.child.id());
        Ok(worker)
    }
}

impl ScrubWorker for ProcessWorker {
    fn scrub(&mut self, bytes: &[u8]) -> Result<(Vec<u8>, ProcessingStats), WorkerError> {
        let result = self.exchange(bytes);
        if let Err(e) = &result {
            self.broken |= !e.is_recoverable();
        }
        result
    }
}

impl ProcessWorker {
    fn exchange(&mut self, bytes: &[u8]) -> Result<(Vec<u8>, ProcessingStats), WorkerError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| WorkerError::Protocol("worker stdin closed".into()))?;
        protocol::write_frame(stdin, bytes)?;
        stdin.flush()?;
        protocol::read_response(&mut self.stdout)
    }
}

impl Drop for ProcessWorker {
    fn drop(&mut self) {
        // Closing stdin ends the child's serve loop.
        drop(self.stdin.take());
        if self.broken {
            tracing::debug!("Killing worker process {}", self.child.id());
            let _ = self.child.kill();
        }
        match self.child.wait() {
            Ok(status) if !status.success() => {
                tracing::warn!("Worker process {} exited with {}", self.child.id(), status)
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to reap worker process: {}", e),
        }
    }
}
