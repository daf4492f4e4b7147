//! Read-only EXIF inspection of encoded buffers.
//!
//! Nothing here modifies a buffer; it reports what the strip stage is about
//! to throw away.

use exif::{Exif, In, Reader, Tag, Value};
use std::io::Cursor;

use crate::types::ExifData;

/// Reads EXIF metadata out of in-memory image buffers.
pub struct MetadataInspector;

impl MetadataInspector {
    /// Parse the EXIF block of `bytes`, if the container carries one.
    pub fn read(bytes: &[u8]) -> Option<Exif> {
        Reader::new()
            .read_from_container(&mut Cursor::new(bytes))
            .ok()
    }

    /// Summarize the EXIF metadata in `bytes`.
    ///
    /// Returns `None` when the buffer has no parseable EXIF block.
    pub fn inspect(bytes: &[u8]) -> Option<ExifData> {
        let exif = Self::read(bytes)?;
        let has_thumbnail = exif.fields().any(|f| f.ifd_num == In::THUMBNAIL);

        let data = ExifData {
            field_count: exif.fields().count(),
            has_thumbnail,
            captured_at: text(&exif, Tag::DateTimeOriginal).or_else(|| text(&exif, Tag::DateTime)),
            camera_make: text(&exif, Tag::Make),
            camera_model: text(&exif, Tag::Model),
            software: text(&exif, Tag::Software),
            gps_latitude: gps_coord(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef),
            gps_longitude: gps_coord(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef),
            orientation: orientation_of(&exif),
        };
        Some(data)
    }

    /// The EXIF orientation tag (1-8), if present.
    pub fn orientation(bytes: &[u8]) -> Option<u32> {
        Self::read(bytes).as_ref().and_then(orientation_of)
    }
}

fn orientation_of(exif: &Exif) -> Option<u32> {
    match &exif.get_field(Tag::Orientation, In::PRIMARY)?.value {
        Value::Short(v) => v.first().map(|&o| o as u32),
        Value::Long(v) => v.first().copied(),
        _ => None,
    }
}

fn text(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let shown = field.display_value().to_string();
    let trimmed = shown.trim_matches('"').trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Degrees/minutes/seconds rationals to signed decimal degrees.
fn gps_coord(exif: &Exif, coord_tag: Tag, ref_tag: Tag) -> Option<f64> {
    let coord = exif.get_field(coord_tag, In::PRIMARY)?;
    let reference = exif.get_field(ref_tag, In::PRIMARY)?;

    let degrees = match &coord.value {
        Value::Rational(r) if r.len() >= 3 => {
            r[0].to_f64() + r[1].to_f64() / 60.0 + r[2].to_f64() / 3600.0
        }
        _ => return None,
    };

    let hemisphere = reference.display_value().to_string();
    if hemisphere.contains('S') || hemisphere.contains('W') {
        Some(-degrees)
    } else {
        Some(degrees)
    }
}
