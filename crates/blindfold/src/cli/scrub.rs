//! The `blindfold scrub` command: one image in, one scrubbed image out.

use clap::Args;
use serde::Serialize;
use std::io::BufWriter;
use std::path::PathBuf;

use blindfold_core::{Config, IdentityCheck, OutputWriter, ProcessingStats, Scrubber};

use super::types::ReportFormat;

/// Arguments for the `scrub` command.
#[derive(Args, Debug)]
pub struct ScrubArgs {
    /// Image file to scrub
    #[arg(required = true)]
    pub input: PathBuf,

    /// Where to write the scrubbed image (defaults to scrubbed_<name> next to the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Count faces and list metadata without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Report format (defaults to `output.format` from the config)
    #[arg(short, long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Haar cascade XML to use instead of the configured one
    #[arg(long)]
    pub cascade: Option<PathBuf>,
}

/// What `scrub` prints after writing an image.
#[derive(Debug, Serialize)]
pub struct ScrubReport {
    pub input: PathBuf,
    pub output: PathBuf,
    #[serde(flatten)]
    pub stats: ProcessingStats,
    #[serde(flatten)]
    pub identity: IdentityCheck,
}

/// Execute the scrub command.
pub async fn execute(args: ScrubArgs, config: Config) -> anyhow::Result<()> {
    let scrubber_config = super::scrubber_config(&config, args.cascade.clone())?;
    let source = super::read_input(&args.input).await?;
    let mut writer = OutputWriter::new(
        BufWriter::new(std::io::stdout()),
        super::report_format(&config, args.format),
        config.output.pretty,
    );

    if args.dry_run {
        let summary = tokio::task::spawn_blocking(move || {
            Scrubber::new(&scrubber_config).summary(&source)
        })
        .await?;
        if let Some(error) = &summary.error {
            tracing::warn!("Face detection did not run: {}", error);
        }
        writer.write(&summary)?;
        writer.flush()?;
        return Ok(());
    }

    let (scrubbed, stats, source) = tokio::task::spawn_blocking(move || {
        Scrubber::new(&scrubber_config)
            .process(&source)
            .map(|(scrubbed, stats)| (scrubbed, stats, source))
    })
    .await??;

    let output = args.output.clone().unwrap_or_else(|| {
        args.input
            .with_file_name(super::scrubbed_file_name(&args.input, &scrubbed))
    });
    tokio::fs::write(&output, &scrubbed).await?;
    tracing::info!(
        "Wrote {:?} ({} face(s) blurred, {}ms)",
        output,
        stats.faces_detected,
        stats.processing_time_ms
    );

    let report = ScrubReport {
        input: args.input,
        output,
        stats,
        identity: IdentityCheck::compare(&source, &scrubbed),
    };
    writer.write(&report)?;
    writer.flush()?;
    Ok(())
}
