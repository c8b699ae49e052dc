use serde::{Deserialize, Serialize};

use crate::baseline::BaselineMetadata;

/// Judgment of a single image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// No error-class keyword in the analysis
    pub is_valid: bool,
    /// Free text returned by the oracle
    #[serde(rename = "analysis")]
    pub analysis_text: String,
    /// Sentences mentioning problems, deduplicated, in text order
    pub issues: Vec<String>,
    /// Quality score 0-100
    pub score: u8,
}

/// What a comparison was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonKind {
    /// First run, no reference yet
    BaselineCreation,
    /// Current capture against a stored baseline
    RegressionCheck,
}

impl ComparisonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonKind::BaselineCreation => "baseline-creation",
            ComparisonKind::RegressionCheck => "regression-check",
        }
    }
}

impl std::fmt::Display for ComparisonKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinal seriousness of a detected regression
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Severities a passing test may carry
    pub fn is_acceptable(&self) -> bool {
        matches!(self, Severity::Low | Severity::Medium)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Judgment of a capture against its baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    #[serde(flatten)]
    pub analysis: AnalysisResult,
    #[serde(rename = "comparisonType")]
    pub comparison_kind: ComparisonKind,
    pub visual_differences: Vec<String>,
    #[serde(rename = "regressionSeverity")]
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_metadata: Option<BaselineMetadata>,
    /// Neutral result produced because scoring was not configured
    #[serde(default)]
    pub skipped: bool,
    /// PNG highlighting differing pixels (pixel mode only)
    #[serde(skip)]
    pub diff_image: Option<Vec<u8>>,
}

impl ComparisonResult {
    pub fn score(&self) -> u8 {
        self.analysis.score
    }

    pub fn issues(&self) -> &[String] {
        &self.analysis.issues
    }

    pub fn is_valid(&self) -> bool {
        self.analysis.is_valid
    }
}
