//! Single-image orchestration: validate, strip, detect and blur.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

use crate::config::LimitsConfig;
use crate::error::ScrubError;
use crate::types::{round_ms, ProcessingStats, ScrubSummary};

use super::blur::FaceBlurrer;
use super::decode::DecodedImage;
use super::detect::FaceDetector;
use super::metadata::MetadataInspector;
use super::strip::MetadataStripper;
use super::validate::Validator;

/// Everything needed to build a [`Scrubber`].
///
/// Plain data, so it can be written to a worker process as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrubberConfig {
    /// Size limits applied by the validator
    pub limits: LimitsConfig,

    /// Haar cascade used for face detection
    pub cascade_path: PathBuf,
}

/// Where a buffer is in the pipeline. Each state owns the data the next
/// stage consumes.
enum Stage {
    Validating,
    Stripping(DecodedImage),
    Detecting(Vec<u8>),
    Done { output: Vec<u8>, faces: usize },
}

/// Runs one image through the whole de-identification pipeline.
///
/// A `Scrubber` owns its detector and therefore its classifier. Build one
/// per worker; it is not meant to be shared between threads.
pub struct Scrubber {
    validator: Validator,
    blurrer: FaceBlurrer,
}

impl Scrubber {
    /// Create a scrubber. The cascade is not read until the first detection.
    pub fn new(config: &ScrubberConfig) -> Self {
        Self::with_detector(
            config.limits.clone(),
            FaceDetector::new(config.cascade_path.clone()),
        )
    }

    /// Create a scrubber around an existing detector.
    pub fn with_detector(limits: LimitsConfig, detector: FaceDetector) -> Self {
        Self {
            validator: Validator::new(limits),
            blurrer: FaceBlurrer::new(detector),
        }
    }

    /// Scrub one encoded image.
    ///
    /// The first failing stage aborts the pipeline and its error is returned;
    /// no partial output is produced.
    pub fn process(&self, bytes: &[u8]) -> Result<(Vec<u8>, ProcessingStats), ScrubError> {
        let start = Instant::now();
        let mut stage = Stage::Validating;

        let (output, faces) = loop {
            stage = match stage {
                Stage::Validating => Stage::Stripping(self.validator.validate(bytes)?),
                Stage::Stripping(decoded) => {
                    Stage::Detecting(MetadataStripper::strip_validated(bytes, &decoded)?)
                }
                Stage::Detecting(stripped) => {
                    let (output, faces) = self.blurrer.blur(stripped)?;
                    Stage::Done { output, faces }
                }
                Stage::Done { output, faces } => break (output, faces),
            };
        };

        let stats = ProcessingStats {
            faces_detected: faces,
            metadata_removed: true,
            processing_time_ms: round_ms(start.elapsed().as_secs_f64() * 1000.0),
        };
        tracing::debug!(
            "Scrubbed {} bytes -> {} bytes, {} face(s) in {}ms",
            bytes.len(),
            output.len(),
            stats.faces_detected,
            stats.processing_time_ms
        );
        Ok((output, stats))
    }

    /// Report what a scrub would find, without producing any output.
    ///
    /// Detection problems are recorded in the summary instead of failing it.
    pub fn summary(&self, bytes: &[u8]) -> ScrubSummary {
        let (faces_detected, error) = match self.blurrer.detector().detect(bytes) {
            Ok((_, regions)) => (regions.len(), None),
            Err(e) => (0, Some(e.to_string())),
        };

        ScrubSummary {
            faces_detected,
            data_size_bytes: bytes.len(),
            exif: MetadataInspector::inspect(bytes),
            error,
        }
    }
}
