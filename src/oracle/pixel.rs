//! Pixel-difference oracle.
//!
//! Pixels are compared in YIQ space the way `pixelmatch` does: a pixel
//! differs when its perceptual delta exceeds `MAX_YIQ_DELTA * threshold²`.
//! The comparison passes when the share of differing pixels stays within
//! `max_diff_ratio` (zero by default, so any differing pixel fails).

use image::{DynamicImage, GenericImageView, ImageEncoder, Rgba, RgbaImage};

use super::types::{AnalysisResult, ComparisonKind, ComparisonResult, Severity};
use super::{ComparisonContext, ComparisonMode, ComparisonOracle};
use crate::config::{DEFAULT_MAX_DIFF_RATIO, DEFAULT_PIXEL_THRESHOLD, PixelSettings};

/// Largest possible YIQ delta between two pixels
const MAX_YIQ_DELTA: f64 = 35215.0;

/// Statistics of one image comparison
#[derive(Debug, Clone, PartialEq)]
pub struct PixelDiff {
    pub width: u32,
    pub height: u32,
    pub diff_pixels: u64,
    pub total_pixels: u64,
    /// PNG with differing pixels in red over a faded copy of the baseline
    pub diff_image: Option<Vec<u8>>,
}

impl PixelDiff {
    pub fn diff_ratio(&self) -> f64 {
        if self.total_pixels == 0 {
            0.0
        } else {
            self.diff_pixels as f64 / self.total_pixels as f64
        }
    }
}

/// Outcome of comparing raw image bytes
#[derive(Debug, Clone, PartialEq)]
pub enum PixelOutcome {
    /// Both images decoded and share dimensions
    Compared(PixelDiff),
    /// Dimensions differ; no per-pixel comparison is possible
    SizeMismatch { current: (u32, u32), baseline: (u32, u32) },
    /// One of the images could not be decoded
    Undecodable(String),
}

/// Deterministic pixel comparison
#[derive(Debug, Clone)]
pub struct PixelOracle {
    threshold: f64,
    max_diff_ratio: f64,
}

impl PixelOracle {
    /// Both values are clamped to `0.0..=1.0`; non-finite values take the defaults
    pub fn new(threshold: f64, max_diff_ratio: f64) -> Self {
        Self {
            threshold: unit_or(threshold, DEFAULT_PIXEL_THRESHOLD),
            max_diff_ratio: unit_or(max_diff_ratio, DEFAULT_MAX_DIFF_RATIO),
        }
    }

    pub fn from_settings(settings: &PixelSettings) -> Self {
        Self::new(settings.threshold, settings.max_diff_ratio)
    }

    /// Compare two encoded images
    pub fn diff(&self, current: &[u8], baseline: &[u8]) -> PixelOutcome {
        let decode = |bytes: &[u8], which: &str| {
            image::load_from_memory(bytes).map_err(|e| format!("cannot decode {} image: {}", which, e))
        };
        let (current, baseline) = match (decode(current, "current"), decode(baseline, "baseline")) {
            (Ok(c), Ok(b)) => (c, b),
            (Err(e), _) | (_, Err(e)) => return PixelOutcome::Undecodable(e),
        };
        if current.dimensions() != baseline.dimensions() {
            return PixelOutcome::SizeMismatch {
                current: current.dimensions(),
                baseline: baseline.dimensions(),
            };
        }
        PixelOutcome::Compared(self.diff_images(&current, &baseline))
    }

    /// Compare two decoded images of equal size
    pub fn diff_images(&self, current: &DynamicImage, baseline: &DynamicImage) -> PixelDiff {
        let (width, height) = current.dimensions();
        let current = current.to_rgba8();
        let baseline = baseline.to_rgba8();
        let max_delta = MAX_YIQ_DELTA * self.threshold * self.threshold;

        let mut diff_img = RgbaImage::new(width, height);
        let mut diff_pixels = 0u64;

        for (x, y, cur) in current.enumerate_pixels() {
            let base = baseline.get_pixel(x, y);
            if yiq_delta(*cur, *base) > max_delta {
                diff_pixels += 1;
                diff_img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            } else {
                let gray = (luma(*base) * 0.1 + 255.0 * 0.9) as u8;
                diff_img.put_pixel(x, y, Rgba([gray, gray, gray, 255]));
            }
        }

        let diff_image = if diff_pixels > 0 { encode_png(&diff_img) } else { None };

        PixelDiff {
            width,
            height,
            diff_pixels,
            total_pixels: u64::from(width) * u64::from(height),
            diff_image,
        }
    }

    /// Whether a diff is within tolerance
    pub fn passes(&self, diff: &PixelDiff) -> bool {
        diff.diff_ratio() <= self.max_diff_ratio
    }
}

impl ComparisonOracle for PixelOracle {
    fn mode(&self) -> ComparisonMode {
        ComparisonMode::Pixel
    }

    fn compare(
        &self,
        current: &[u8],
        baseline: Option<&[u8]>,
        context: &ComparisonContext,
    ) -> ComparisonResult {
        let Some(baseline) = baseline else {
            return pixel_result(
                true,
                "No baseline; capture accepted as reference.".to_string(),
                None,
                ComparisonKind::BaselineCreation,
                context,
            );
        };

        match self.diff(current, baseline) {
            PixelOutcome::Compared(diff) => {
                let passed = self.passes(&diff);
                let text = format!(
                    "{} of {} pixels differ ({:.4}%, tolerance {:.4}%).",
                    diff.diff_pixels,
                    diff.total_pixels,
                    diff.diff_ratio() * 100.0,
                    self.max_diff_ratio * 100.0
                );
                pixel_result(passed, text, diff.diff_image, ComparisonKind::RegressionCheck, context)
            }
            PixelOutcome::SizeMismatch { current, baseline } => pixel_result(
                false,
                format!(
                    "Image size changed: expected {}x{}, captured {}x{}.",
                    baseline.0, baseline.1, current.0, current.1
                ),
                None,
                ComparisonKind::RegressionCheck,
                context,
            ),
            PixelOutcome::Undecodable(reason) => pixel_result(
                false,
                format!("{}.", reason),
                None,
                ComparisonKind::RegressionCheck,
                context,
            ),
        }
    }
}

/// Binary pass/fail mapped onto the comparison shape: 100/low or 0/critical
fn pixel_result(
    passed: bool,
    text: String,
    diff_image: Option<Vec<u8>>,
    kind: ComparisonKind,
    context: &ComparisonContext,
) -> ComparisonResult {
    let issues = if passed { Vec::new() } else { vec![text.trim_end_matches('.').to_string()] };
    ComparisonResult {
        analysis: AnalysisResult {
            is_valid: passed,
            analysis_text: text,
            issues,
            score: if passed { 100 } else { 0 },
        },
        comparison_kind: kind,
        visual_differences: Vec::new(),
        severity: if passed { Severity::Low } else { Severity::Critical },
        baseline_metadata: context.baseline_metadata.clone(),
        skipped: false,
        diff_image,
    }
}

fn unit_or(value: f64, default: f64) -> f64 {
    if value.is_finite() { value.clamp(0.0, 1.0) } else { default }
}

fn luma(p: Rgba<u8>) -> f64 {
    let [r, g, b, _] = blend(p);
    0.29889531 * r + 0.58662247 * g + 0.11448223 * b
}

/// Blend a pixel over white by its alpha
fn blend(p: Rgba<u8>) -> [f64; 4] {
    let Rgba([r, g, b, a]) = p;
    let alpha = f64::from(a) / 255.0;
    let mix = |c: u8| 255.0 + (f64::from(c) - 255.0) * alpha;
    [mix(r), mix(g), mix(b), alpha]
}

/// Squared perceptual distance in YIQ space
fn yiq_delta(a: Rgba<u8>, b: Rgba<u8>) -> f64 {
    if a == b {
        return 0.0;
    }
    let [r1, g1, b1, _] = blend(a);
    let [r2, g2, b2, _] = blend(b);

    let y = |r: f64, g: f64, b: f64| r * 0.29889531 + g * 0.58662247 + b * 0.11448223;
    let i = |r: f64, g: f64, b: f64| r * 0.59597799 - g * 0.27417610 - b * 0.32180189;
    let q = |r: f64, g: f64, b: f64| r * 0.21147017 - g * 0.52261711 + b * 0.31114694;

    let dy = y(r1, g1, b1) - y(r2, g2, b2);
    let di = i(r1, g1, b1) - i(r2, g2, b2);
    let dq = q(r1, g1, b1) - q(r2, g2, b2);

    0.5053 * dy * dy + 0.299 * di * di + 0.1957 * dq * dq
}

fn encode_png(img: &RgbaImage) -> Option<Vec<u8>> {
    let mut buffer = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buffer)
        .write_image(img.as_raw(), img.width(), img.height(), image::ColorType::Rgba8)
        .ok()?;
    Some(buffer)
}
