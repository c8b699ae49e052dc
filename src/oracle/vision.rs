//! Vision-model oracle.
//!
//! Sends one image (quality check) or two (baseline then current) to a
//! chat-completion endpoint and interprets the answer with the heuristics in
//! [`super::analysis`]. It never returns an error: a missing credential gives
//! a neutral result, and a failing or malformed service gives a worst-case one.

use tracing::{error, info, warn};

use super::analysis::{analyze_text, extract_visual_differences, severity};
use super::types::{AnalysisResult, ComparisonKind, ComparisonResult, Severity};
use super::{ComparisonContext, ComparisonMode, ComparisonOracle};
use crate::config::Config;
use crate::vlm::{ChatTransport, CurlTransport, VlmConfig, VlmError, analyze_images};

/// Score reported when scoring is skipped for lack of a credential
pub const SKIPPED_SCORE: u8 = 75;

/// Analysis text of a skipped result
pub const SKIPPED_ANALYSIS: &str = "AI analysis skipped - no API key provided";

/// The single issue of a failed analysis
pub const SERVICE_UNAVAILABLE_ISSUE: &str = "AI analysis service unavailable";

/// Vision oracle over a chat transport
pub struct VisionOracle<T: ChatTransport = CurlTransport> {
    transport: T,
    config: VlmConfig,
    api_key: Option<String>,
}

impl VisionOracle<CurlTransport> {
    /// Oracle talking to the configured endpoint through curl
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            CurlTransport,
            VlmConfig::from_settings(&config.vlm),
            config.oracle.api_key.clone(),
        )
    }
}

impl<T: ChatTransport> VisionOracle<T> {
    pub fn new(transport: T, config: VlmConfig, api_key: Option<String>) -> Self {
        Self {
            transport,
            config,
            api_key,
        }
    }

    /// Whether a credential is configured
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Judge a single screenshot of the scene page
    pub fn analyze_quality(&self, image: &[u8]) -> AnalysisResult {
        self.ask(&quality_prompt(), &[image]).into_analysis()
    }

    /// Judge the current capture against the baseline
    pub fn compare_with_baseline(
        &self,
        baseline: &[u8],
        current: &[u8],
        context: &ComparisonContext,
    ) -> ComparisonResult {
        let kind = ComparisonKind::RegressionCheck;
        match self.ask(&comparison_prompt(context), &[baseline, current]) {
            Ask::Answered(text) => ComparisonResult {
                visual_differences: extract_visual_differences(&text),
                severity: severity(&text),
                analysis: analyze_text(&text),
                comparison_kind: kind,
                baseline_metadata: context.baseline_metadata.clone(),
                skipped: false,
                diff_image: None,
            },
            Ask::Skipped => skipped_comparison(kind, context),
            Ask::Failed(e) => failed_comparison(&e, kind, context),
        }
    }

    fn ask(&self, prompt: &str, images: &[&[u8]]) -> Ask {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("no vision API key configured; skipping AI analysis");
            return Ask::Skipped;
        };
        match analyze_images(&self.transport, &self.config, api_key, prompt, images) {
            Ok(text) => {
                info!(chars = text.len(), "vision analysis received");
                Ask::Answered(text)
            }
            Err(e) => {
                error!(error = %e, "AI analysis failed");
                Ask::Failed(e)
            }
        }
    }
}

impl<T: ChatTransport> ComparisonOracle for VisionOracle<T> {
    fn mode(&self) -> ComparisonMode {
        ComparisonMode::Oracle
    }

    fn compare(
        &self,
        current: &[u8],
        baseline: Option<&[u8]>,
        context: &ComparisonContext,
    ) -> ComparisonResult {
        match baseline {
            Some(baseline) => self.compare_with_baseline(baseline, current, context),
            None => {
                let answer = self.ask(&quality_prompt(), &[current]);
                let skipped = matches!(answer, Ask::Skipped);
                ComparisonResult {
                    analysis: answer.into_analysis(),
                    comparison_kind: ComparisonKind::BaselineCreation,
                    visual_differences: Vec::new(),
                    severity: Severity::Low,
                    baseline_metadata: context.baseline_metadata.clone(),
                    skipped,
                    diff_image: None,
                }
            }
        }
    }
}

enum Ask {
    Answered(String),
    Skipped,
    Failed(VlmError),
}

impl Ask {
    fn into_analysis(self) -> AnalysisResult {
        match self {
            Ask::Answered(text) => analyze_text(&text),
            Ask::Skipped => skipped_analysis(),
            Ask::Failed(e) => failed_analysis(&e),
        }
    }
}

fn skipped_analysis() -> AnalysisResult {
    AnalysisResult {
        is_valid: true,
        analysis_text: SKIPPED_ANALYSIS.to_string(),
        issues: Vec::new(),
        score: SKIPPED_SCORE,
    }
}

fn failed_analysis(error: &VlmError) -> AnalysisResult {
    AnalysisResult {
        is_valid: false,
        analysis_text: format!("AI analysis failed: {}", error),
        issues: vec![SERVICE_UNAVAILABLE_ISSUE.to_string()],
        score: 0,
    }
}

fn skipped_comparison(kind: ComparisonKind, context: &ComparisonContext) -> ComparisonResult {
    ComparisonResult {
        analysis: skipped_analysis(),
        comparison_kind: kind,
        visual_differences: Vec::new(),
        severity: Severity::Low,
        baseline_metadata: context.baseline_metadata.clone(),
        skipped: true,
        diff_image: None,
    }
}

fn failed_comparison(error: &VlmError, kind: ComparisonKind, context: &ComparisonContext) -> ComparisonResult {
    ComparisonResult {
        analysis: failed_analysis(error),
        comparison_kind: kind,
        visual_differences: Vec::new(),
        severity: Severity::Critical,
        baseline_metadata: context.baseline_metadata.clone(),
        skipped: false,
        diff_image: None,
    }
}

/// Prompt for judging one screenshot of the 3D real-estate home page
pub fn quality_prompt() -> String {
    "You are analyzing a screenshot of a 3D real estate visualization website home page.
Please examine the image and provide a detailed analysis covering:

1. Navigation Elements:
   - Is there a visible navigation bar/menu?
   - Are navigation items (Home, Apartments, Amenities) visible and properly positioned?

2. 3D Visualization:
   - Is there a 3D canvas or viewer visible?
   - Does the 3D scene appear to be loaded properly?
   - Are there any 3D loading indicators or progress bars?

3. Layout and Design:
   - Is the overall layout professional and appropriate for a real estate website?
   - Are elements properly aligned and positioned?
   - Is the color scheme and typography consistent?

4. Technical Issues:
   - Are there any obvious visual bugs, overlapping elements, or broken layouts?
   - Are images and icons loading correctly?
   - Is the page fully rendered without missing content?

5. User Experience:
   - Does the page appear user-friendly and intuitive?
   - Are interactive elements clearly visible?

Please provide:
- A PASS/FAIL assessment
- Specific issues found (if any)
- Overall quality score (0-100)
- Detailed explanation of your findings

Format your response clearly with sections for each area analyzed."
        .to_string()
}

/// Prompt for judging a capture against its baseline
pub fn comparison_prompt(context: &ComparisonContext) -> String {
    format!(
        "You are performing visual regression testing on a 3D real estate visualization website.
Test: {test}
Page: {url}
Browser: {browser}

The FIRST image is the approved baseline. The SECOND image is the current capture.
Compare them and report:

1. Visual differences: elements that are different, changed, missing, added, moved or shifted.
2. Whether the 3D scene, navigation bar and layout render the same way in both images.
3. Ignore minor anti-aliasing and rendering noise inherent to 3D canvases.
4. Classify the regression severity as exactly one of: low, medium, high, critical.
   Use critical only for broken or unusable pages.

Describe each difference in its own sentence. If the images match, say so plainly.",
        test = context.test_name,
        url = context.url.as_deref().unwrap_or("unknown"),
        browser = context.browser_name,
    )
}
