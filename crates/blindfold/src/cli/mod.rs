//! Command handlers.

pub mod bulk;
pub mod config;
pub mod models;
pub mod scrub;
pub mod types;
pub mod worker;

use anyhow::Context;
use blindfold_core::{Config, OutputFormat, ScrubberConfig};
use std::path::{Path, PathBuf};

use types::ReportFormat;

/// Pipeline settings for this run, with an optional `--cascade` override.
///
/// Fails early with a hint when the classifier is missing, rather than
/// letting every image fail at the detection stage.
pub(crate) fn scrubber_config(
    config: &Config,
    cascade_override: Option<PathBuf>,
) -> anyhow::Result<ScrubberConfig> {
    let mut scrubber_config = config.scrubber_config();
    if let Some(path) = cascade_override {
        scrubber_config.cascade_path = path;
    }

    if !scrubber_config.cascade_path.is_file() {
        anyhow::bail!(
            "Face classifier not found at {}\n  \
             Run `blindfold models download` or pass --cascade <file>.",
            scrubber_config.cascade_path.display()
        );
    }
    Ok(scrubber_config)
}

/// `scrubbed_<stem>.<ext>`, where `ext` matches the format of the scrubbed bytes.
pub(crate) fn scrubbed_file_name(input: &Path, output: &[u8]) -> String {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    format!(
        "scrubbed_{}.{}",
        stem,
        blindfold_core::pipeline::guess_extension(output)
    )
}

/// `--format` when given, otherwise the configured report format.
pub(crate) fn report_format(config: &Config, flag: Option<ReportFormat>) -> OutputFormat {
    flag.map(OutputFormat::from)
        .or_else(|| OutputFormat::parse(&config.output.format))
        .unwrap_or_default()
}

pub(crate) async fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrubbed_file_name_follows_output_format() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(
            scrubbed_file_name(Path::new("/photos/cat.png"), &png),
            "scrubbed_cat.png"
        );
        assert_eq!(
            scrubbed_file_name(Path::new("holiday.png"), &[0xFF, 0xD8, 0xFF, 0xE0]),
            "scrubbed_holiday.jpg"
        );
    }

    #[test]
    fn test_report_format_precedence() {
        let mut config = Config::default();
        config.output.format = "jsonl".into();
        assert_eq!(report_format(&config, None), OutputFormat::JsonLines);
        assert_eq!(
            report_format(&config, Some(ReportFormat::Json)),
            OutputFormat::Json
        );
    }

    #[test]
    fn test_missing_cascade_is_reported() {
        let config = Config::default();
        let err = scrubber_config(&config, Some(PathBuf::from("/nonexistent/face.xml")))
            .unwrap_err();
        assert!(err.to_string().contains("models download"));
    }
}
