//! Fixture builders shared by unit tests. Everything is generated in memory.

use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use std::io::Cursor;
use std::path::PathBuf;

/// A horizontal colour ramp, dark to bright in luma. Every row is identical,
/// so the top/bottom edge feature of [`cascade_xml`] evaluates to zero on it.
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| {
        let ramp = (x * 255 / width.max(1)) as u8;
        Rgb([ramp, ramp, 255 - ramp])
    })
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Jpeg)
}

/// Mid-grey canvas with a dark-over-bright block at (`x`, `y`), `size` pixels square.
///
/// The block is what [`edge_cascade_xml`] is built to find.
pub fn edge_pattern(width: u32, height: u32, x: u32, y: u32, size: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |px, py| {
        let inside = px >= x && px < x + size && py >= y && py < y + size;
        if !inside {
            Luma([128])
        } else if py < y + size / 2 {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

pub fn edge_pattern_png(width: u32, height: u32, x: u32, y: u32, size: u32) -> Vec<u8> {
    let gray = edge_pattern(width, height, x, y, size);
    encode(
        &DynamicImage::ImageRgb8(DynamicImage::ImageLuma8(gray).to_rgb8()),
        ImageFormat::Png,
    )
}

/// Top half at luma `top`, bottom half at `bottom`.
pub fn two_tone_png(width: u32, height: u32, top: u8, bottom: u8) -> Vec<u8> {
    let gray = GrayImage::from_fn(width, height, |_, y| {
        Luma([if y < height / 2 { top } else { bottom }])
    });
    encode(
        &DynamicImage::ImageRgb8(DynamicImage::ImageLuma8(gray).to_rgb8()),
        ImageFormat::Png,
    )
}

/// A JPEG carrying an APP1 EXIF segment with Make = "Cam" and Orientation = 6.
pub fn jpeg_with_exif(width: u32, height: u32) -> Vec<u8> {
    let jpeg = jpeg_bytes(width, height);

    // Little-endian TIFF header followed by one IFD with two entries.
    let mut tiff: Vec<u8> = Vec::new();
    tiff.extend_from_slice(b"II");
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&8u32.to_le_bytes());
    tiff.extend_from_slice(&2u16.to_le_bytes());
    // Make, ASCII, 4 bytes inline
    tiff.extend_from_slice(&0x010Fu16.to_le_bytes());
    tiff.extend_from_slice(&2u16.to_le_bytes());
    tiff.extend_from_slice(&4u32.to_le_bytes());
    tiff.extend_from_slice(b"Cam\0");
    // Orientation, SHORT, value 6
    tiff.extend_from_slice(&0x0112u16.to_le_bytes());
    tiff.extend_from_slice(&3u16.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&6u16.to_le_bytes());
    tiff.extend_from_slice(&0u16.to_le_bytes());
    // No next IFD
    tiff.extend_from_slice(&0u32.to_le_bytes());

    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(&tiff);
    let segment_len = (payload.len() + 2) as u16;

    let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Single-stage, single-stump cascade over a 24×24 window.
///
/// The one feature is "bottom half minus top half"; the stump votes +1 when
/// the normalized value is at least `stump_threshold`, -1 otherwise, and the
/// stage accepts when the vote reaches `stage_threshold`.
pub fn cascade_xml(stump_threshold: f64, stage_threshold: f64) -> String {
    format!(
        r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier"><stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>24</height>
  <width>24</width>
  <stageParams>
    <maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>0</maxCatCount></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>{stage_threshold:e}</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 {stump_threshold:e}</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 24 12 -1.</_>
        <_>
          0 12 24 12 1.</_></rects></_></features></cascade>
</opencv_storage>
"#
    )
}

/// Accepts windows containing a strong dark-over-bright edge.
pub fn edge_cascade_xml() -> String {
    cascade_xml(0.5, 0.0)
}

/// Accepts every window.
pub fn accept_all_cascade_xml() -> String {
    cascade_xml(0.0, -1.0e9)
}

/// Rejects every window.
pub fn reject_all_cascade_xml() -> String {
    cascade_xml(0.0, 1.0e9)
}

/// Write a cascade into a fresh temp dir. Keep the `TempDir` alive while the path is used.
pub fn write_cascade(xml: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cascade.xml");
    std::fs::write(&path, xml).unwrap();
    (dir, path)
}
