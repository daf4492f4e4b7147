//! Input validation: is this buffer an image we can work with?

use crate::config::LimitsConfig;
use crate::error::ScrubError;

use super::decode::{decode_bytes, format_to_string, DecodedImage};

/// Validates encoded buffers before any transformation.
pub struct Validator {
    limits: LimitsConfig,
}

impl Validator {
    /// Create a new validator with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Confirm that `bytes` is a complete, supported raster image.
    ///
    /// Checks, in order:
    /// - the buffer is non-empty and within the size limit
    /// - the leading bytes carry a known image signature
    /// - the whole buffer decodes (catches truncation and corrupt payloads)
    /// - both dimensions are within the dimension limit
    ///
    /// The buffer is never modified. The decoded image is handed back so the
    /// next stage does not have to decode again.
    pub fn validate(&self, bytes: &[u8]) -> Result<DecodedImage, ScrubError> {
        if bytes.is_empty() {
            return Err(ScrubError::InvalidImage("buffer is empty".into()));
        }

        let max_bytes = self.limits.max_file_size_mb.saturating_mul(1024 * 1024);
        if bytes.len() as u64 > max_bytes {
            return Err(ScrubError::InvalidImage(format!(
                "buffer too large ({}MB > {}MB)",
                bytes.len() as u64 / (1024 * 1024),
                self.limits.max_file_size_mb
            )));
        }

        if !Self::is_valid_image_header(bytes) {
            return Err(ScrubError::InvalidImage(
                "unrecognized image format (invalid magic bytes)".into(),
            ));
        }

        let decoded = decode_bytes(bytes).map_err(ScrubError::InvalidImage)?;

        let max_dim = self.limits.max_image_dimension;
        if decoded.width > max_dim || decoded.height > max_dim {
            return Err(ScrubError::InvalidImage(format!(
                "image too large ({}x{} > {})",
                decoded.width, decoded.height, max_dim
            )));
        }

        tracing::trace!(
            "  Validated {} {}x{}",
            decoded.format.map(format_to_string).unwrap_or_default(),
            decoded.width,
            decoded.height
        );
        Ok(decoded)
    }

    /// Check if the header bytes match known image formats.
    fn is_valid_image_header(header: &[u8]) -> bool {
        match header {
            // JPEG
            [0xFF, 0xD8, 0xFF, ..] => true,
            // PNG
            [0x89, b'P', b'N', b'G', ..] => true,
            // GIF87a / GIF89a
            [b'G', b'I', b'F', b'8', ..] => true,
            // WebP: RIFF....WEBP
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => true,
            // BMP
            [b'B', b'M', ..] => true,
            // TIFF, little- and big-endian, version 42
            [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => true,
            // ISO-BMFF (AVIF/HEIF): ftyp box at offset 4
            [_, _, _, _, b'f', b't', b'y', b'p', ..] => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn validator() -> Validator {
        Validator::new(LimitsConfig::default())
    }

    #[test]
    fn test_magic_bytes_jpeg() {
        assert!(Validator::is_valid_image_header(&[0xFF, 0xD8, 0xFF, 0xE0]));
    }

    #[test]
    fn test_magic_bytes_png() {
        let header = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        assert!(Validator::is_valid_image_header(&header));
    }

    #[test]
    fn test_magic_bytes_webp() {
        let header = [b'R', b'I', b'F', b'F', 0, 0, 0, 0, b'W', b'E', b'B', b'P'];
        assert!(Validator::is_valid_image_header(&header));
    }

    #[test]
    fn test_magic_bytes_riff_without_webp_rejected() {
        let header = [b'R', b'I', b'F', b'F', 0, 0, 0, 0, b'A', b'V', b'I', b' '];
        assert!(!Validator::is_valid_image_header(&header));
    }

    #[test]
    fn test_magic_bytes_tiff() {
        assert!(Validator::is_valid_image_header(&[b'I', b'I', 0x2A, 0x00]));
        assert!(Validator::is_valid_image_header(&[b'M', b'M', 0x00, 0x2A]));
        assert!(!Validator::is_valid_image_header(&[b'I', b'I', 0x00, 0x00]));
    }

    #[test]
    fn test_magic_bytes_invalid() {
        assert!(!Validator::is_valid_image_header(&[0x00, 0x00, 0x00, 0x00]));
        assert!(!Validator::is_valid_image_header(&[0xFF]));
    }

    #[test]
    fn test_validate_png() {
        let decoded = validator().validate(&test_support::png_bytes(32, 24)).unwrap();
        assert_eq!((decoded.width, decoded.height), (32, 24));
    }

    #[test]
    fn test_validate_rejects_empty() {
        let err = validator().validate(&[]).err().unwrap();
        assert!(matches!(err, ScrubError::InvalidImage(ref m) if m.contains("empty")));
    }

    #[test]
    fn test_validate_rejects_truncated_png() {
        let bytes = test_support::png_bytes(64, 64);
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(
            validator().validate(truncated),
            Err(ScrubError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_validate_rejects_text() {
        assert!(matches!(
            validator().validate(b"hello, world"),
            Err(ScrubError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_validate_enforces_dimension_limit() {
        let validator = Validator::new(LimitsConfig {
            max_image_dimension: 16,
            ..LimitsConfig::default()
        });
        let err = validator.validate(&test_support::png_bytes(32, 8)).err().unwrap();
        assert!(err.to_string().contains("32x8"));
    }
}
