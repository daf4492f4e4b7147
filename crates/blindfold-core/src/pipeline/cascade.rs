//! Boosted Haar cascade classifier.
//!
//! Reads the OpenCV XML storage format (`stageType` BOOST, `featureType` HAAR,
//! stump weak classifiers) and evaluates it on integral images. A `Cascade`
//! is immutable once loaded; all per-image state lives in [`IntegralImage`].

use image::GrayImage;
use roxmltree::{Document, Node};
use std::path::Path;

use crate::error::ScrubError;

/// One weighted rectangle of a Haar feature, in window coordinates.
#[derive(Debug, Clone, Copy)]
struct WeightedRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f64,
}

#[derive(Debug, Clone)]
struct Feature {
    rects: Vec<WeightedRect>,
}

/// Depth-one decision tree over a single feature.
#[derive(Debug, Clone, Copy)]
struct Stump {
    feature: usize,
    threshold: f64,
    left: f64,
    right: f64,
}

#[derive(Debug, Clone)]
struct Stage {
    threshold: f64,
    stumps: Vec<Stump>,
}

/// Outcome of running the cascade on one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The window passed every stage
    Accept,
    /// The window was rejected by the stage at this index
    RejectedAt(usize),
    /// The window is too flat to evaluate; no stage ran
    LowContrast,
}

/// Windows whose `1 / standard deviation` reaches this are not evaluated.
const MIN_INV_STD: f64 = 0.1;

/// A loaded cascade classifier.
#[derive(Debug, Clone)]
pub struct Cascade {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
    features: Vec<Feature>,
}

impl Cascade {
    /// Load a cascade from an XML file.
    ///
    /// A missing or unreadable file is a [`ScrubError::DetectionFailure`].
    pub fn load(path: &Path) -> Result<Self, ScrubError> {
        let xml = std::fs::read_to_string(path).map_err(|e| {
            ScrubError::DetectionFailure(format!(
                "cannot read cascade {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_xml(&xml).map_err(|e| match e {
            ScrubError::DetectionFailure(msg) => {
                ScrubError::DetectionFailure(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse a cascade from OpenCV XML storage text.
    pub fn from_xml(xml: &str) -> Result<Self, ScrubError> {
        let doc = Document::parse(xml).map_err(|e| invalid(format!("malformed XML: {}", e)))?;
        let cascade = elements(doc.root_element())
            .next()
            .ok_or_else(|| invalid("empty opencv_storage"))?;

        let stage_type = child_text(cascade, "stageType")?;
        if stage_type != "BOOST" {
            return Err(invalid(format!("unsupported stage type {}", stage_type)));
        }
        let feature_type = child_text(cascade, "featureType")?;
        if feature_type != "HAAR" {
            return Err(invalid(format!("unsupported feature type {}", feature_type)));
        }

        let window_width: u32 = parse_one(child_text(cascade, "width")?)?;
        let window_height: u32 = parse_one(child_text(cascade, "height")?)?;
        if window_width < 3 || window_height < 3 {
            return Err(invalid("window must be at least 3x3"));
        }

        let features = elements(child(cascade, "features")?)
            .map(|node| parse_feature(node, window_width, window_height))
            .collect::<Result<Vec<_>, _>>()?;

        let stages = elements(child(cascade, "stages")?)
            .map(|node| parse_stage(node, features.len()))
            .collect::<Result<Vec<_>, _>>()?;
        if stages.is_empty() {
            return Err(invalid("cascade has no stages"));
        }

        Ok(Self {
            window_width,
            window_height,
            stages,
            features,
        })
    }

    /// Size of the training window, in pixels.
    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    /// Number of boosting stages.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run every stage on the window whose top-left corner is at (`x`, `y`).
    ///
    /// The window must lie inside the image the integral was built from.
    pub fn evaluate(&self, integral: &IntegralImage, x: u32, y: u32) -> Verdict {
        // Variance is measured on the window shrunk by one pixel on every side.
        let (inner_w, inner_h) = (self.window_width - 2, self.window_height - 2);
        let inv_norm = match integral.inv_variance_norm(x + 1, y + 1, inner_w, inner_h) {
            // Standard deviation of 10 or less.
            Some(inv_norm) if (inner_w * inner_h) as f64 * inv_norm < MIN_INV_STD => inv_norm,
            _ => return Verdict::LowContrast,
        };

        for (index, stage) in self.stages.iter().enumerate() {
            let mut score = 0.0;
            for stump in &stage.stumps {
                let value = self.features[stump.feature]
                    .rects
                    .iter()
                    .map(|r| r.weight * integral.sum(x + r.x, y + r.y, r.width, r.height))
                    .sum::<f64>()
                    * inv_norm;
                score += if value < stump.threshold {
                    stump.left
                } else {
                    stump.right
                };
            }
            if score < stage.threshold {
                return Verdict::RejectedAt(index);
            }
        }
        Verdict::Accept
    }
}

/// Summed-area tables of pixel values and squared pixel values.
pub struct IntegralImage {
    stride: usize,
    sum: Vec<u64>,
    sq_sum: Vec<f64>,
}

impl IntegralImage {
    /// Build the tables for a grayscale image.
    pub fn new(gray: &GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        let stride = width as usize + 1;
        let mut sum = vec![0u64; stride * (height as usize + 1)];
        let mut sq_sum = vec![0f64; stride * (height as usize + 1)];

        for y in 0..height as usize {
            let mut row_sum = 0u64;
            let mut row_sq = 0f64;
            for x in 0..width as usize {
                let p = gray.get_pixel(x as u32, y as u32)[0] as u64;
                row_sum += p;
                row_sq += (p * p) as f64;
                let at = (y + 1) * stride + x + 1;
                sum[at] = sum[at - stride] + row_sum;
                sq_sum[at] = sq_sum[at - stride] + row_sq;
            }
        }

        Self {
            stride,
            sum,
            sq_sum,
        }
    }

    fn corners(&self, x: u32, y: u32, width: u32, height: u32) -> [usize; 4] {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + width as usize, y0 + height as usize);
        [
            y0 * self.stride + x0,
            y0 * self.stride + x1,
            y1 * self.stride + x0,
            y1 * self.stride + x1,
        ]
    }

    /// Sum of the pixels in a rectangle.
    pub fn sum(&self, x: u32, y: u32, width: u32, height: u32) -> f64 {
        let [a, b, c, d] = self.corners(x, y, width, height);
        (self.sum[d] + self.sum[a] - self.sum[b] - self.sum[c]) as f64
    }

    fn sq_sum(&self, x: u32, y: u32, width: u32, height: u32) -> f64 {
        let [a, b, c, d] = self.corners(x, y, width, height);
        self.sq_sum[d] + self.sq_sum[a] - self.sq_sum[b] - self.sq_sum[c]
    }

    /// `1 / (area × standard deviation)` of a rectangle, `None` for flat regions.
    fn inv_variance_norm(&self, x: u32, y: u32, width: u32, height: u32) -> Option<f64> {
        let area = (width * height) as f64;
        let sum = self.sum(x, y, width, height);
        let norm = area * self.sq_sum(x, y, width, height) - sum * sum;
        (norm > 0.0).then(|| 1.0 / norm.sqrt())
    }
}

fn invalid(message: impl Into<String>) -> ScrubError {
    ScrubError::DetectionFailure(format!("invalid cascade: {}", message.into()))
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>, ScrubError> {
    elements(node)
        .find(|n| n.tag_name().name() == name)
        .ok_or_else(|| invalid(format!("missing <{}>", name)))
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, ScrubError> {
    Ok(child(node, name)?.text().unwrap_or("").trim())
}

fn parse_one<T: std::str::FromStr>(text: &str) -> Result<T, ScrubError> {
    text.trim()
        .parse()
        .map_err(|_| invalid(format!("bad number {:?}", text)))
}

fn parse_numbers(text: &str) -> Result<Vec<f64>, ScrubError> {
    text.split_whitespace().map(parse_one).collect()
}

fn parse_feature(node: Node, window_width: u32, window_height: u32) -> Result<Feature, ScrubError> {
    if let Some(tilted) = elements(node).find(|n| n.tag_name().name() == "tilted") {
        if tilted.text().map(str::trim) == Some("1") {
            return Err(invalid("tilted features are not supported"));
        }
    }

    let rects = elements(child(node, "rects")?)
        .map(|rect| {
            let values = parse_numbers(rect.text().unwrap_or(""))?;
            let [x, y, w, h, weight] = values[..] else {
                return Err(invalid("feature rect needs 5 values"));
            };
            if x < 0.0 || y < 0.0 || w <= 0.0 || h <= 0.0 {
                return Err(invalid("feature rect must have a positive size"));
            }
            let rect = WeightedRect {
                x: x as u32,
                y: y as u32,
                width: w as u32,
                height: h as u32,
                weight,
            };
            if rect.x + rect.width > window_width || rect.y + rect.height > window_height {
                return Err(invalid("feature rect outside the window"));
            }
            Ok(rect)
        })
        .collect::<Result<Vec<_>, _>>()?;

    if rects.is_empty() {
        return Err(invalid("feature without rects"));
    }
    Ok(Feature { rects })
}

fn parse_stage(node: Node, feature_count: usize) -> Result<Stage, ScrubError> {
    let threshold = parse_one(child_text(node, "stageThreshold")?)?;

    let stumps = elements(child(node, "weakClassifiers")?)
        .map(|weak| {
            let nodes = parse_numbers(child_text(weak, "internalNodes")?)?;
            let leaves = parse_numbers(child_text(weak, "leafValues")?)?;
            let ([_, _, feature, threshold], [left, right]) = (&nodes[..], &leaves[..]) else {
                return Err(invalid("only stump weak classifiers are supported"));
            };
            let feature = *feature as usize;
            if feature >= feature_count {
                return Err(invalid(format!("feature index {} out of range", feature)));
            }
            Ok(Stump {
                feature,
                threshold: *threshold,
                left: *left,
                right: *right,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stage { threshold, stumps })
}
