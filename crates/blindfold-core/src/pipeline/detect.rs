//! Face detection: multi-scale sliding window over a Haar cascade.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use crate::error::ScrubError;
use crate::types::FaceRegion;

use super::cascade::{Cascade, IntegralImage, Verdict};
use super::decode::decode_bytes;

/// Growth of the search window between scales.
pub const SCALE_FACTOR: f64 = 1.1;

/// Overlapping hits a group needs before it counts as a face.
pub const MIN_NEIGHBORS: usize = 5;

/// Smallest face reported, in pixels per side.
pub const MIN_FACE_SIZE: u32 = 30;

/// Relative tolerance used when grouping overlapping hits.
pub const GROUP_EPS: f64 = 0.2;

/// Finds frontal faces in encoded images.
///
/// The cascade is read from disk on first use and kept for the lifetime of
/// the detector, so each worker pays the load cost once.
pub struct FaceDetector {
    cascade_path: PathBuf,
    cascade: OnceCell<Cascade>,
}

impl FaceDetector {
    /// Create a detector that loads its cascade from `cascade_path` when first needed.
    pub fn new(cascade_path: impl Into<PathBuf>) -> Self {
        Self {
            cascade_path: cascade_path.into(),
            cascade: OnceCell::new(),
        }
    }

    /// Create a detector around an already loaded cascade.
    pub fn with_cascade(cascade: Cascade) -> Self {
        Self {
            cascade_path: PathBuf::new(),
            cascade: OnceCell::from(cascade),
        }
    }

    pub fn cascade_path(&self) -> &Path {
        &self.cascade_path
    }

    fn cascade(&self) -> Result<&Cascade, ScrubError> {
        if let Some(cascade) = self.cascade.get() {
            return Ok(cascade);
        }
        let loaded = Cascade::load(&self.cascade_path)?;
        tracing::debug!(
            "Loaded cascade {} ({} stages)",
            self.cascade_path.display(),
            loaded.stage_count()
        );
        Ok(self.cascade.get_or_init(|| loaded))
    }

    /// Decode `bytes` and find the faces in it.
    ///
    /// A buffer that does not decode is not an error here: it is logged and
    /// reported as having no faces, with no decoded image. A cascade that
    /// cannot be loaded is a [`ScrubError::DetectionFailure`].
    pub fn detect(&self, bytes: &[u8]) -> Result<(Option<RgbImage>, Vec<FaceRegion>), ScrubError> {
        let decoded = match decode_bytes(bytes) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!("Cannot decode image for face detection: {}", e);
                return Ok((None, Vec::new()));
            }
        };

        let rgb = decoded.image.to_rgb8();
        let regions = self.detect_in(&rgb)?;
        Ok((Some(rgb), regions))
    }

    /// Find the faces in a decoded image.
    pub fn detect_in(&self, rgb: &RgbImage) -> Result<Vec<FaceRegion>, ScrubError> {
        let cascade = self.cascade()?;
        let gray = to_gray(rgb);
        let regions = detect_multi_scale(cascade, &gray);
        tracing::trace!("  Found {} face(s)", regions.len());
        Ok(regions)
    }
}

/// ITU-R BT.601 luma.
fn to_gray(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
        Luma([luma.round().min(255.0) as u8])
    })
}

/// Slide the cascade window over a pyramid of downscaled copies of `gray`
/// and merge the raw hits into face regions.
fn detect_multi_scale(cascade: &Cascade, gray: &GrayImage) -> Vec<FaceRegion> {
    let (base_w, base_h) = cascade.window_size();
    let (img_w, img_h) = gray.dimensions();
    let mut hits = Vec::new();

    let mut factor = 1.0f64;
    loop {
        let win_w = (base_w as f64 * factor).round() as u32;
        let win_h = (base_h as f64 * factor).round() as u32;
        let scaled_w = (img_w as f64 / factor).round() as u32;
        let scaled_h = (img_h as f64 / factor).round() as u32;

        if scaled_w < base_w || scaled_h < base_h {
            break;
        }
        if win_w >= MIN_FACE_SIZE && win_h >= MIN_FACE_SIZE {
            let scaled = if factor == 1.0 {
                gray.clone()
            } else {
                imageops::resize(gray, scaled_w, scaled_h, FilterType::Triangle)
            };
            scan(cascade, &scaled, factor, (win_w, win_h), &mut hits);
        }

        factor *= SCALE_FACTOR;
    }

    group_rectangles(&hits, MIN_NEIGHBORS, GROUP_EPS)
        .into_iter()
        .filter_map(|r| clamp(r, img_w, img_h))
        .collect()
}

fn scan(cascade: &Cascade, scaled: &GrayImage, factor: f64, window: (u32, u32), hits: &mut Vec<Rect>) {
    let (base_w, base_h) = cascade.window_size();
    let integral = IntegralImage::new(scaled);
    let range_w = scaled.width() - base_w;
    let range_h = scaled.height() - base_h;
    let step = if factor >= 2.0 { 1 } else { 2 };

    let mut y = 0;
    while y <= range_h {
        let mut x = 0;
        while x <= range_w {
            match cascade.evaluate(&integral, x, y) {
                Verdict::Accept => hits.push(Rect {
                    x: (x as f64 * factor).round() as i64,
                    y: (y as f64 * factor).round() as i64,
                    width: window.0 as i64,
                    height: window.1 as i64,
                }),
                // Rejected outright: the neighbour is very likely rejected too.
                Verdict::RejectedAt(0) => x += step,
                Verdict::RejectedAt(_) | Verdict::LowContrast => {}
            }
            x += step;
        }
        y += step;
    }
}

/// Signed rectangle used while grouping; averages may drift outside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rect {
    x: i64,
    y: i64,
    width: i64,
    height: i64,
}

fn similar(a: &Rect, b: &Rect, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    let close = |p: i64, q: i64| ((p - q).abs() as f64) <= delta;
    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.x + a.width, b.x + b.width)
        && close(a.y + a.height, b.y + b.height)
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Cluster similar hits, average each cluster, and drop weak or nested clusters.
///
/// A cluster survives when it has more than `min_neighbors` members and is
/// not contained in a stronger cluster.
fn group_rectangles(hits: &[Rect], min_neighbors: usize, eps: f64) -> Vec<Rect> {
    let mut parent: Vec<usize> = (0..hits.len()).collect();
    for i in 0..hits.len() {
        for j in 0..i {
            if similar(&hits[i], &hits[j], eps) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[ri] = rj;
                }
            }
        }
    }

    // Clusters are numbered in order of first appearance.
    let mut labels: Vec<usize> = Vec::new();
    let mut totals: Vec<([i64; 4], usize)> = Vec::new();
    for i in 0..hits.len() {
        let root = find(&mut parent, i);
        let class = match labels.iter().position(|&l| l == root) {
            Some(class) => class,
            None => {
                labels.push(root);
                totals.push(([0; 4], 0));
                labels.len() - 1
            }
        };
        let (sum, count) = &mut totals[class];
        let r = hits[i];
        sum[0] += r.x;
        sum[1] += r.y;
        sum[2] += r.width;
        sum[3] += r.height;
        *count += 1;
    }

    let clusters: Vec<(Rect, usize)> = totals
        .iter()
        .map(|(sum, count)| {
            let avg = |v: i64| (v as f64 / *count as f64).round() as i64;
            (
                Rect {
                    x: avg(sum[0]),
                    y: avg(sum[1]),
                    width: avg(sum[2]),
                    height: avg(sum[3]),
                },
                *count,
            )
        })
        .collect();

    clusters
        .iter()
        .enumerate()
        .filter(|(_, (_, n))| *n > min_neighbors)
        .filter(|&(i, &(r1, n1))| {
            !clusters.iter().enumerate().any(|(j, &(r2, n2))| {
                if j == i || n2 <= min_neighbors {
                    return false;
                }
                let dx = (r2.width as f64 * eps).round() as i64;
                let dy = (r2.height as f64 * eps).round() as i64;
                r1.x >= r2.x - dx
                    && r1.y >= r2.y - dy
                    && r1.x + r1.width <= r2.x + r2.width + dx
                    && r1.y + r1.height <= r2.y + r2.height + dy
                    && (n2 > n1.max(3) || n1 < 3)
            })
        })
        .map(|(_, &(r, _))| r)
        .collect()
}

/// Intersect a rectangle with the image; `None` when nothing is left.
fn clamp(r: Rect, width: u32, height: u32) -> Option<FaceRegion> {
    let (w, h) = (width as i64, height as i64);
    let x0 = r.x.clamp(0, w);
    let y0 = r.y.clamp(0, h);
    let x1 = (r.x + r.width).clamp(0, w);
    let y1 = (r.y + r.height).clamp(0, h);
    (x1 > x0 && y1 > y0)
        .then(|| FaceRegion::new(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use image::Rgb;

    fn rect(x: i64, y: i64, width: i64, height: i64) -> Rect {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    fn edge_detector() -> FaceDetector {
        FaceDetector::with_cascade(Cascade::from_xml(&test_support::edge_cascade_xml()).unwrap())
    }

    #[test]
    fn test_group_needs_more_than_min_neighbors() {
        let six = vec![rect(10, 10, 40, 40); 6];
        assert_eq!(group_rectangles(&six, 5, 0.2), vec![rect(10, 10, 40, 40)]);

        let five = vec![rect(10, 10, 40, 40); 5];
        assert!(group_rectangles(&five, 5, 0.2).is_empty());
    }

    #[test]
    fn test_group_averages_cluster() {
        let mut hits = vec![rect(10, 10, 40, 40); 3];
        hits.extend(vec![rect(12, 12, 40, 40); 3]);
        assert_eq!(group_rectangles(&hits, 5, 0.2), vec![rect(11, 11, 40, 40)]);
    }

    #[test]
    fn test_group_keeps_separate_clusters() {
        let mut hits = vec![rect(0, 0, 30, 30); 6];
        hits.extend(vec![rect(200, 200, 30, 30); 7]);
        let grouped = group_rectangles(&hits, 5, 0.2);
        assert_eq!(grouped, vec![rect(0, 0, 30, 30), rect(200, 200, 30, 30)]);
    }

    #[test]
    fn test_group_drops_nested_weaker_cluster() {
        let mut hits = vec![rect(0, 0, 100, 100); 10];
        hits.extend(vec![rect(30, 30, 40, 40); 6]);
        assert_eq!(group_rectangles(&hits, 5, 0.2), vec![rect(0, 0, 100, 100)]);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(
            clamp(rect(-5, 90, 20, 20), 100, 100),
            Some(FaceRegion::new(0, 90, 15, 10))
        );
        assert_eq!(clamp(rect(120, 0, 10, 10), 100, 100), None);
    }

    #[test]
    fn test_gray_conversion() {
        let rgb = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        assert_eq!(to_gray(&rgb).get_pixel(0, 0)[0], 76);
        let white = RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]));
        assert_eq!(to_gray(&white).get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn test_detects_edge_pattern() {
        let (bx, by, size) = (30, 30, 48);
        let bytes = test_support::edge_pattern_png(120, 120, bx, by, size);
        let (image, regions) = edge_detector().detect(&bytes).unwrap();

        assert!(image.is_some());
        assert!(!regions.is_empty());
        for r in &regions {
            assert!(r.fits_within(120, 120));
            let overlaps = r.x < bx + size && r.x + r.width > bx && r.y < by + size && r.y + r.height > by;
            assert!(overlaps, "{:?} misses the pattern", r);
        }
    }

    #[test]
    fn test_flat_image_has_no_faces() {
        let (_, regions) = edge_detector().detect(&test_support::png_bytes(120, 90)).unwrap();
        assert!(regions.is_empty());
    }

    #[test]
    fn test_faint_edge_has_no_faces() {
        // Right polarity everywhere along the seam, but only 4 levels apart.
        let bytes = test_support::two_tone_png(120, 120, 126, 130);
        let (_, regions) = edge_detector().detect(&bytes).unwrap();
        assert!(regions.is_empty(), "unexpected faces {:?}", regions);

        let bytes = test_support::two_tone_png(120, 120, 0, 255);
        assert!(!edge_detector().detect(&bytes).unwrap().1.is_empty());
    }

    #[test]
    fn test_scan_reaches_last_window() {
        let cascade = Cascade::from_xml(&test_support::edge_cascade_xml()).unwrap();

        // The image is exactly one window: a single position, and it is a hit.
        let exact = test_support::edge_pattern(24, 24, 0, 0, 24);
        let mut hits = Vec::new();
        scan(&cascade, &exact, 1.0, (24, 24), &mut hits);
        assert_eq!(hits, vec![rect(0, 0, 24, 24)]);

        // The block sits flush with the bottom-right corner.
        let corner = test_support::edge_pattern(26, 26, 2, 2, 24);
        let mut hits = Vec::new();
        scan(&cascade, &corner, 1.0, (24, 24), &mut hits);
        assert!(hits.contains(&rect(2, 2, 24, 24)), "hits: {:?}", hits);
    }

    #[test]
    fn test_scan_step_is_one_from_factor_two() {
        let cascade = Cascade::from_xml(&test_support::edge_cascade_xml()).unwrap();

        // Only the window at (1, 1) covers the block exactly.
        let shifted = test_support::edge_pattern(25, 25, 1, 1, 24);
        let mut hits = Vec::new();
        scan(&cascade, &shifted, 2.0, (48, 48), &mut hits);
        assert!(hits.contains(&rect(2, 2, 48, 48)), "hits: {:?}", hits);
    }

    #[test]
    fn test_detection_is_repeatable() {
        let bytes = test_support::edge_pattern_png(100, 100, 20, 20, 50);
        let detector = edge_detector();
        let first = detector.detect(&bytes).unwrap().1;
        let second = detector.detect(&bytes).unwrap().1;
        assert_eq!(first, second);
    }

    #[test]
    fn test_tiny_image_has_no_faces() {
        let (_, regions) = edge_detector().detect(&test_support::png_bytes(20, 20)).unwrap();
        assert!(regions.is_empty());
    }

    #[test]
    fn test_undecodable_buffer_has_no_faces() {
        let detector = FaceDetector::new("/nonexistent/cascade.xml");
        let (image, regions) = detector.detect(b"not an image").unwrap();
        assert!(image.is_none());
        assert!(regions.is_empty());
    }

    #[test]
    fn test_missing_cascade_fails_detection() {
        let detector = FaceDetector::new("/nonexistent/cascade.xml");
        let err = detector.detect(&test_support::png_bytes(64, 64)).unwrap_err();
        assert!(matches!(err, ScrubError::DetectionFailure(_)));
    }

    #[test]
    fn test_cascade_loaded_from_disk_once() {
        let (dir, path) = test_support::write_cascade(&test_support::reject_all_cascade_xml());
        let detector = FaceDetector::new(&path);
        let bytes = test_support::png_bytes(64, 64);
        assert!(detector.detect(&bytes).unwrap().1.is_empty());

        // Still works after the file is gone.
        drop(dir);
        assert!(detector.detect(&bytes).unwrap().1.is_empty());
    }
}
