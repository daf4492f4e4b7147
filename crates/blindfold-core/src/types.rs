//! Core data types shared by the pipeline stages and the bulk orchestrator.

use serde::{Deserialize, Serialize};

/// Encoded image bytes. Never mutated in place: every stage returns a new buffer.
pub type ImageBuffer = Vec<u8>;

/// A detected face, in pixel coordinates of the decoded image.
///
/// Regions produced by the detector always have a non-zero size and lie
/// entirely inside the image they were detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceRegion {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width in pixels (> 0)
    pub width: u32,
    /// Height in pixels (> 0)
    pub height: u32,
}

impl FaceRegion {
    /// Create a region from its top-left corner and size.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the region is non-empty and fits inside a `width` × `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }
}

/// Statistics for one pass through the single-image pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Number of faces found and blurred
    pub faces_detected: usize,

    /// True when the metadata stripping stage completed
    pub metadata_removed: bool,

    /// Wall-clock time for the whole pipeline, rounded to 2 decimals
    pub processing_time_ms: f64,
}

impl ProcessingStats {
    /// Stats reported for a bulk item that fell back to its original bytes.
    pub fn fallback() -> Self {
        Self {
            faces_detected: 0,
            metadata_removed: false,
            processing_time_ms: 0.0,
        }
    }
}

/// Round a millisecond duration to two decimal places.
pub(crate) fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

/// Read-only report about an image, produced without modifying it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrubSummary {
    /// Faces the detector finds in the untouched input
    pub faces_detected: usize,

    /// Size of the input buffer
    pub data_size_bytes: usize,

    /// EXIF metadata that a scrub would remove
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exif: Option<ExifData>,

    /// Set when face detection could not run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// EXIF metadata found in an image.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ExifData {
    /// Number of EXIF fields across all IFDs
    pub field_count: usize,

    /// Whether an embedded thumbnail IFD is present
    pub has_thumbnail: bool,

    /// When the photo was captured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<String>,

    /// Camera manufacturer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,

    /// Camera model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,

    /// Software that last wrote the file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software: Option<String>,

    /// GPS latitude (decimal degrees)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps_latitude: Option<f64>,

    /// GPS longitude (decimal degrees)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps_longitude: Option<f64>,

    /// Image orientation (1-8)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<u32>,
}
