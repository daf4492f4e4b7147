//! In-memory image decoding with content-based format detection.

use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

/// A decoded pixel grid. Lives only inside a single pipeline call.
pub struct DecodedImage {
    /// The decoded image data
    pub image: DynamicImage,
    /// Format detected from the buffer contents, if any
    pub format: Option<ImageFormat>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

/// Decode an encoded buffer, guessing the container format from its bytes.
///
/// Errors are returned as plain messages; each stage wraps them in its own
/// [`crate::error::ScrubError`] variant.
pub fn decode_bytes(bytes: &[u8]) -> Result<DecodedImage, String> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| format!("Cannot detect image format: {}", e))?;
    let format = reader.format();
    let image = reader.decode().map_err(|e| e.to_string())?;

    let (width, height) = image.dimensions();
    Ok(DecodedImage {
        image,
        format,
        width,
        height,
    })
}

/// Preferred file extension for an encoded buffer, judged by its contents.
///
/// Falls back to `"jpg"`, the format the pipeline writes when it blurs.
pub fn guess_extension(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("jpg")
}

/// Convert an ImageFormat to a string representation.
pub fn format_to_string(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::Png => "png".to_string(),
        ImageFormat::WebP => "webp".to_string(),
        ImageFormat::Gif => "gif".to_string(),
        ImageFormat::Tiff => "tiff".to_string(),
        ImageFormat::Bmp => "bmp".to_string(),
        ImageFormat::Ico => "ico".to_string(),
        ImageFormat::Pnm => "pnm".to_string(),
        ImageFormat::Avif => "avif".to_string(),
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn test_format_to_string() {
        assert_eq!(format_to_string(ImageFormat::Jpeg), "jpeg");
        assert_eq!(format_to_string(ImageFormat::Png), "png");
        assert_eq!(format_to_string(ImageFormat::WebP), "webp");
    }

    #[test]
    fn test_decode_detects_format_by_content() {
        let decoded = decode_bytes(&test_support::png_bytes(40, 30)).unwrap();
        assert_eq!(decoded.format, Some(ImageFormat::Png));
        assert_eq!((decoded.width, decoded.height), (40, 30));

        let decoded = decode_bytes(&test_support::jpeg_bytes(16, 16)).unwrap();
        assert_eq!(decoded.format, Some(ImageFormat::Jpeg));
    }

    #[test]
    fn test_guess_extension() {
        assert_eq!(guess_extension(&test_support::png_bytes(4, 4)), "png");
        assert_eq!(guess_extension(&test_support::jpeg_bytes(4, 4)), "jpg");
        assert_eq!(guess_extension(b"????"), "jpg");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_bytes(b"definitely not an image").is_err());
        assert!(decode_bytes(&[]).is_err());
    }
}
