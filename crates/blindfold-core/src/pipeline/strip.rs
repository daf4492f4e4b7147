//! Metadata removal by decode and re-encode.
//!
//! The encoders in `image` write pixel data plus the minimum headers their
//! container needs. EXIF, XMP, ICC profiles, embedded thumbnails, and
//! comments in the source never reach the output.

use image::{DynamicImage, ImageFormat};
use std::borrow::Cow;
use std::io::Cursor;

use crate::error::ScrubError;

use super::decode::{decode_bytes, format_to_string, DecodedImage};
use super::metadata::MetadataInspector;

/// Re-encodes images without their ancillary metadata.
pub struct MetadataStripper;

impl MetadataStripper {
    /// Decode `bytes` and re-encode them, metadata-free, in the same format.
    pub fn strip(bytes: &[u8]) -> Result<Vec<u8>, ScrubError> {
        let decoded = decode_bytes(bytes).map_err(ScrubError::MetadataStripFailure)?;
        Self::strip_validated(bytes, &decoded)
    }

    /// Strip an image that has already been decoded from `source`.
    pub fn strip_validated(source: &[u8], decoded: &DecodedImage) -> Result<Vec<u8>, ScrubError> {
        if let Some(orientation) = MetadataInspector::orientation(source).filter(|&o| o != 1) {
            tracing::warn!(
                "Discarding EXIF orientation {} without rotating pixels; \
                 some viewers will show the output rotated",
                orientation
            );
        }
        Self::strip_decoded(decoded)
    }

    /// Re-encode a decoded image into a fresh buffer.
    ///
    /// Uses the detected source format, or JPEG when none was detected.
    pub fn strip_decoded(decoded: &DecodedImage) -> Result<Vec<u8>, ScrubError> {
        let format = decoded.format.unwrap_or(ImageFormat::Jpeg);
        let image = encodable_layout(&decoded.image, format);

        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, format).map_err(|e| {
            ScrubError::MetadataStripFailure(format!(
                "cannot re-encode as {}: {}",
                format_to_string(format),
                e
            ))
        })?;
        Ok(buffer.into_inner())
    }
}

/// Convert pixel layouts the target encoder cannot take.
///
/// JPEG has no alpha channel and no 16-bit mode.
fn encodable_layout(image: &DynamicImage, format: ImageFormat) -> Cow<'_, DynamicImage> {
    match (format, image) {
        (ImageFormat::Jpeg, DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_)) => {
            Cow::Borrowed(image)
        }
        (ImageFormat::Jpeg, DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA8(_)) => {
            Cow::Owned(DynamicImage::ImageLuma8(image.to_luma8()))
        }
        (ImageFormat::Jpeg, _) => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
        _ => Cow::Borrowed(image),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use image::GenericImageView;

    #[test]
    fn test_strip_removes_exif() {
        let source = test_support::jpeg_with_exif(24, 24);
        assert!(MetadataInspector::inspect(&source).is_some());

        let stripped = MetadataStripper::strip(&source).unwrap();
        assert!(MetadataInspector::inspect(&stripped).is_none());
        assert!(!stripped.windows(4).any(|w| w == b"Exif"));
    }

    #[test]
    fn test_strip_keeps_format_and_size() {
        let stripped = MetadataStripper::strip(&test_support::png_bytes(30, 20)).unwrap();
        let decoded = decode_bytes(&stripped).unwrap();
        assert_eq!(decoded.format, Some(ImageFormat::Png));
        assert_eq!(decoded.image.dimensions(), (30, 20));
    }

    #[test]
    fn test_strip_png_is_pixel_exact() {
        let source = test_support::png_bytes(17, 9);
        let stripped = MetadataStripper::strip(&source).unwrap();
        let before = decode_bytes(&source).unwrap().image.to_rgb8();
        let after = decode_bytes(&stripped).unwrap().image.to_rgb8();
        assert_eq!(before, after);
    }

    #[test]
    fn test_strip_failure_is_strip_error() {
        assert!(matches!(
            MetadataStripper::strip(b"garbage"),
            Err(ScrubError::MetadataStripFailure(_))
        ));
    }

    #[test]
    fn test_jpeg_layout_drops_alpha() {
        let rgba = DynamicImage::new_rgba8(4, 4);
        let layout = encodable_layout(&rgba, ImageFormat::Jpeg);
        assert!(matches!(layout.as_ref(), DynamicImage::ImageRgb8(_)));

        let png_layout = encodable_layout(&rgba, ImageFormat::Png);
        assert!(matches!(png_layout, Cow::Borrowed(_)));
    }
}
