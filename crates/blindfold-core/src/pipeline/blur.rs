//! Face obscuring: Gaussian blur over every detected region.

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, RgbImage};

use crate::error::ScrubError;
use crate::types::FaceRegion;

use super::detect::FaceDetector;

/// Standard deviation of the blur, in pixels.
pub const BLUR_SIGMA: f64 = 30.0;

/// Quality of the JPEG written after blurring.
pub const JPEG_QUALITY: u8 = 95;

/// Blur kernel side length for a region: half its larger side, forced odd.
pub fn kernel_size(region: &FaceRegion) -> usize {
    (region.width.max(region.height) / 2) as usize | 1
}

/// Normalized 1-D Gaussian weights of length `size`.
pub fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f64> {
    let center = (size as f64 - 1.0) / 2.0;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Mirror an out-of-range index back into `0..len` without repeating the edge.
///
/// `-1 → 1`, `len → len - 2`.
pub fn reflect_101(index: i64, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as i64 - 1);
    let i = index.rem_euclid(period);
    if i < len as i64 {
        i as usize
    } else {
        (period - i) as usize
    }
}

/// Separable Gaussian blur of a whole image, borders mirrored.
fn gaussian_blur(image: &RgbImage, kernel: &[f64]) -> RgbImage {
    let (width, height) = image.dimensions();
    let radius = (kernel.len() / 2) as i64;

    let mut horizontal = vec![[0f64; 3]; (width * height) as usize];
    for y in 0..height {
        for x in 0..width {
            let mut acc = [0f64; 3];
            for (k, weight) in kernel.iter().enumerate() {
                let sx = reflect_101(x as i64 + k as i64 - radius, width as usize) as u32;
                let p = image.get_pixel(sx, y).0;
                for c in 0..3 {
                    acc[c] += weight * p[c] as f64;
                }
            }
            horizontal[(y * width + x) as usize] = acc;
        }
    }

    RgbImage::from_fn(width, height, |x, y| {
        let mut acc = [0f64; 3];
        for (k, weight) in kernel.iter().enumerate() {
            let sy = reflect_101(y as i64 + k as i64 - radius, height as usize) as u32;
            let p = horizontal[(sy * width + x) as usize];
            for c in 0..3 {
                acc[c] += weight * p[c];
            }
        }
        image::Rgb(acc.map(|v| v.round().clamp(0.0, 255.0) as u8))
    })
}

/// Blur each region of `image` in place.
///
/// Each region is blurred independently of the pixels around it; regions
/// that overlap are blurred in order.
pub fn blur_regions(image: &mut RgbImage, regions: &[FaceRegion]) {
    for region in regions {
        if !region.fits_within(image.width(), image.height()) {
            tracing::warn!("Skipping face region outside the image: {:?}", region);
            continue;
        }
        let kernel = gaussian_kernel(kernel_size(region), BLUR_SIGMA);
        let roi = imageops::crop_imm(&*image, region.x, region.y, region.width, region.height)
            .to_image();
        let blurred = gaussian_blur(&roi, &kernel);
        imageops::replace(image, &blurred, region.x as i64, region.y as i64);
    }
}

/// Detects faces and blurs them out.
pub struct FaceBlurrer {
    detector: FaceDetector,
}

impl FaceBlurrer {
    pub fn new(detector: FaceDetector) -> Self {
        Self { detector }
    }

    pub fn detector(&self) -> &FaceDetector {
        &self.detector
    }

    /// Blur every face in `bytes`.
    ///
    /// With no faces found, the input buffer is handed back untouched. With
    /// faces, the result is always a JPEG. Returns the buffer and the number
    /// of faces blurred.
    pub fn blur(&self, bytes: Vec<u8>) -> Result<(Vec<u8>, usize), ScrubError> {
        let (image, regions) = self.detector.detect(&bytes)?;
        let mut image = match image {
            Some(image) if !regions.is_empty() => image,
            _ => return Ok((bytes, 0)),
        };

        blur_regions(&mut image, &regions);

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
            .encode_image(&image)
            .map_err(|e| ScrubError::DetectionFailure(format!("cannot encode blurred image: {}", e)))?;

        tracing::debug!("Blurred {} face(s)", regions.len());
        Ok((out, regions.len()))
    }
}
