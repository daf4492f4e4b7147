//! The `blindfold bulk` command: scrub many images with progress and a summary.

use clap::Args;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blindfold_core::{
    BulkItem, BulkOrchestrator, Config, DiscoveredFile, FileDiscovery, Hasher, IdentityCheck,
    OutputWriter, Parallelism,
};

use super::types::{ReportFormat, Strategy};

/// Arguments for the `bulk` command.
#[derive(Args, Debug)]
pub struct BulkArgs {
    /// Image files or directories to scrub
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory for the scrubbed images
    #[arg(short, long)]
    pub out_dir: PathBuf,

    /// Number of parallel workers (defaults to the config, then the core count)
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Run workers as threads or as child processes
    #[arg(long, value_enum)]
    pub strategy: Option<Strategy>,

    /// Report format (defaults to `output.format` from the config)
    #[arg(short, long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Write the report to this file instead of stdout
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Haar cascade XML to use instead of the configured one
    #[arg(long)]
    pub cascade: Option<PathBuf>,
}

/// One line of the bulk report.
#[derive(Debug, Serialize)]
pub struct BulkReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub faces_detected: usize,
    pub metadata_removed: bool,
    pub processing_time_ms: f64,
    #[serde(flatten)]
    pub identity: IdentityCheck,
    /// Set when the original bytes were written unchanged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Execute the bulk command.
pub async fn execute(args: BulkArgs, config: Config) -> anyhow::Result<()> {
    if args.parallel == Some(0) {
        anyhow::bail!("--parallel must be at least 1");
    }
    let scrubber_config = super::scrubber_config(&config, args.cascade.clone())?;
    let parallelism = args
        .strategy
        .map(Parallelism::from)
        .unwrap_or(config.processing.parallelism);
    let workers = args.parallel.or(config.processing.parallel_workers);

    let discovery = FileDiscovery::new(config.processing.clone());
    let files = discovery.discover_all(&args.inputs, Some(&args.out_dir));
    if files.is_empty() {
        tracing::warn!("Nothing to scrub");
        return Ok(());
    }
    tracing::info!(
        "Found {} image(s) ({:.1} MB)",
        files.len(),
        FileDiscovery::total_size(&files) as f64 / 1_000_000.0
    );

    let (files, buffers) = read_all(files).await;
    std::fs::create_dir_all(&args.out_dir)?;

    let progress = create_progress_bar(buffers.len() as u64);
    let bar = progress.clone();
    let orchestrator = BulkOrchestrator::new(scrubber_config)
        .with_progress(Arc::new(move |done| bar.set_position(done as u64)));

    let start_time = std::time::Instant::now();
    let original_hashes: Vec<String> = buffers
        .iter()
        .map(|b| Hasher::content_hash_from_bytes(b))
        .collect();
    let items = orchestrator
        .bulk_process_with_stats(buffers, parallelism, workers)
        .await;
    let elapsed = start_time.elapsed();
    progress.finish_and_clear();

    let reports = write_outputs(&files, &original_hashes, items, &args.out_dir)?;

    let format = super::report_format(&config, args.format);
    match &args.report {
        Some(path) => {
            let mut writer =
                OutputWriter::new(BufWriter::new(File::create(path)?), format, config.output.pretty);
            writer.write_all(&reports)?;
            writer.flush()?;
            tracing::info!("Report written to {:?}", path);
        }
        None => {
            let mut writer =
                OutputWriter::new(BufWriter::new(std::io::stdout()), format, config.output.pretty);
            writer.write_all(&reports)?;
            writer.flush()?;
        }
    }

    print_summary(&reports, elapsed);
    Ok(())
}

/// Read every discovered file; unreadable files are logged and left out of the batch.
async fn read_all(files: Vec<DiscoveredFile>) -> (Vec<DiscoveredFile>, Vec<Vec<u8>>) {
    let mut kept = Vec::with_capacity(files.len());
    let mut buffers = Vec::with_capacity(files.len());
    for file in files {
        match tokio::fs::read(&file.path).await {
            Ok(bytes) => {
                buffers.push(bytes);
                kept.push(file);
            }
            Err(e) => tracing::error!("Skipping {:?}: {}", file.path, e),
        }
    }
    (kept, buffers)
}

/// Write each item to the output directory and build its report line.
fn write_outputs(
    files: &[DiscoveredFile],
    original_hashes: &[String],
    items: Vec<BulkItem>,
    out_dir: &Path,
) -> anyhow::Result<Vec<BulkReport>> {
    let mut used = HashSet::new();
    let mut reports = Vec::with_capacity(items.len());

    for item in items {
        let input = &files[item.index].path;
        let name = unique_name(super::scrubbed_file_name(input, &item.output), item.index, &mut used);
        let output = out_dir.join(name);
        std::fs::write(&output, &item.output)?;

        let stats = item.stats_or_fallback();
        reports.push(BulkReport {
            input: input.clone(),
            output,
            faces_detected: stats.faces_detected,
            metadata_removed: stats.metadata_removed,
            processing_time_ms: stats.processing_time_ms,
            identity: identity(&original_hashes[item.index], &item.output),
            error: item.error,
        });
    }
    Ok(reports)
}

fn identity(original_hash: &str, output: &[u8]) -> IdentityCheck {
    let new_hash = Hasher::content_hash_from_bytes(output);
    IdentityCheck {
        identity_changed: new_hash != original_hash,
        original_hash: original_hash.to_string(),
        new_hash,
    }
}

/// Disambiguate inputs from different directories that share a file name.
fn unique_name(name: String, index: usize, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{}", ext)),
        None => (name.as_str(), String::new()),
    };
    let mut suffix = index.to_string();
    let mut attempt = 1;
    loop {
        let renamed = format!("{}_{}{}", stem, suffix, ext);
        if used.insert(renamed.clone()) {
            return renamed;
        }
        attempt += 1;
        suffix = format!("{}_{}", index, attempt);
    }
}

/// Create a progress bar for bulk scrubbing.
fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {per_sec}",
    ) {
        pb.set_style(style.progress_chars("##-"));
    }
    pb
}

/// Print a summary table after bulk scrubbing.
fn print_summary(reports: &[BulkReport], elapsed: std::time::Duration) {
    let total = reports.len();
    let fell_back = reports.iter().filter(|r| r.error.is_some()).count();
    let faces: usize = reports.iter().map(|r| r.faces_detected).sum();
    let unchanged = reports.iter().filter(|r| !r.identity.identity_changed).count();
    let rate = if elapsed.as_secs_f64() > 0.0 {
        total as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Scrubbed:     {:>8}", total - fell_back);
    if fell_back > 0 {
        eprintln!("    Unchanged:    {:>8}  (kept original bytes)", fell_back);
    }
    eprintln!("    Faces:        {:>8}", faces);
    if unchanged > fell_back {
        eprintln!("    Same hash:    {:>8}", unchanged);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Total:        {:>8}", total);
    eprintln!("    Duration:     {:>7.1}s", elapsed.as_secs_f64());
    eprintln!("    Rate:         {:>7.1} img/sec", rate);
    eprintln!("  ====================================");
    let _ = std::io::stderr().flush();
}
