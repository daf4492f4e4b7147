//! CLI enum types shared by the scrub and bulk commands.

use blindfold_core::{OutputFormat, Parallelism};
use clap::ValueEnum;

/// Report formats.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ReportFormat {
    /// Pretty JSON object or array
    Json,
    /// One JSON object per line
    Jsonl,
}

impl From<ReportFormat> for OutputFormat {
    fn from(format: ReportFormat) -> Self {
        match format {
            ReportFormat::Json => OutputFormat::Json,
            ReportFormat::Jsonl => OutputFormat::JsonLines,
        }
    }
}

/// Where bulk workers run.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Strategy {
    /// Threads in this process
    Threads,
    /// One child process per worker
    Processes,
}

impl From<Strategy> for Parallelism {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Threads => Parallelism::Threads,
            Strategy::Processes => Parallelism::Processes,
        }
    }
}
