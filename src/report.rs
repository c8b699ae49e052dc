//! Verdict reporting.
//!
//! [`ResultReporter`] turns a [`TestVerdict`] into annotations and attachments
//! on a [`ReportSink`], then decides whether the test fails. Failing is
//! stricter than the engine's verdict: a test also fails on a score at or
//! below the threshold, on an issue naming a critical keyword, or on a
//! regression severity above medium.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::engine::TestVerdict;
use crate::oracle::analysis::CRITICAL_ISSUE_KEYWORDS;
use crate::oracle::{ComparisonKind, ComparisonMode};

/// Annotation types understood by the report consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnotationKind {
    #[serde(rename = "Comparison Mode")]
    ComparisonMode,
    #[serde(rename = "AI Analysis")]
    AiAnalysis,
    #[serde(rename = "Score")]
    Score,
    #[serde(rename = "Issues Detected")]
    IssuesDetected,
    #[serde(rename = "Comparison Type")]
    ComparisonType,
    #[serde(rename = "Regression Severity")]
    RegressionSeverity,
    #[serde(rename = "Visual Differences")]
    VisualDifferences,
}

impl AnnotationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationKind::ComparisonMode => "Comparison Mode",
            AnnotationKind::AiAnalysis => "AI Analysis",
            AnnotationKind::Score => "Score",
            AnnotationKind::IssuesDetected => "Issues Detected",
            AnnotationKind::ComparisonType => "Comparison Type",
            AnnotationKind::RegressionSeverity => "Regression Severity",
            AnnotationKind::VisualDifferences => "Visual Differences",
        }
    }
}

impl std::fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named key/value note on a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    pub description: String,
}

/// File attached to a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub path: PathBuf,
    pub content_type: String,
}

/// Destination for annotations and attachments
pub trait ReportSink {
    fn annotate(&mut self, annotation: Annotation);
    fn attach(&mut self, attachment: Attachment);
}

/// Sink that keeps everything in memory and can dump it as JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingSink {
    pub annotations: Vec<Annotation>,
    pub attachments: Vec<Attachment>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Description of the first annotation of `kind`
    pub fn annotation(&self, kind: AnnotationKind) -> Option<&str> {
        self.annotations
            .iter()
            .find(|a| a.kind == kind)
            .map(|a| a.description.as_str())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_json(&self, path: &Path) -> io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, self.to_json()?)
    }
}

impl ReportSink for RecordingSink {
    fn annotate(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }

    fn attach(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }
}

/// A test that must be marked failed, with every gate it failed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("visual check '{test_name}' failed: {}", .reasons.join("; "))]
pub struct AssertionFailure {
    pub test_name: String,
    pub reasons: Vec<String>,
}

/// Reports verdicts and applies the pass/fail gates
#[derive(Debug, Clone)]
pub struct ResultReporter {
    threshold: u8,
}

impl ResultReporter {
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold: threshold.min(100),
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Write annotations and attachments for `verdict`
    pub fn report(&self, verdict: &TestVerdict, sink: &mut dyn ReportSink) {
        sink.attach(Attachment {
            name: format!("{}-screenshot", verdict.test_name),
            path: verdict.screenshot_path.clone(),
            content_type: "image/png".to_string(),
        });
        if let Some(diff) = &verdict.diff_path {
            sink.attach(Attachment {
                name: format!("{}-diff", verdict.test_name),
                path: diff.clone(),
                content_type: "image/png".to_string(),
            });
        }

        if verdict.is_baseline {
            note(
                sink,
                AnnotationKind::ComparisonMode,
                format!("Baseline created at {}", verdict.baseline_path.display()),
            );
            return;
        }

        match (verdict.comparison_mode, &verdict.analysis_result) {
            (ComparisonMode::Pixel, _) => {
                note(sink, AnnotationKind::ComparisonMode, "Native screenshot comparison (pixel diff)".to_string());
            }
            (ComparisonMode::Oracle, None) => {
                note(sink, AnnotationKind::ComparisonMode, "AI vision comparison (no result)".to_string());
            }
            (ComparisonMode::Oracle, Some(result)) => {
                note(sink, AnnotationKind::AiAnalysis, result.analysis.analysis_text.clone());
                note(
                    sink,
                    AnnotationKind::Score,
                    format!("{}/100 (Valid: {})", result.score(), result.is_valid()),
                );
                if !result.issues().is_empty() {
                    note(sink, AnnotationKind::IssuesDetected, result.issues().join(", "));
                }
                note(sink, AnnotationKind::ComparisonType, result.comparison_kind.to_string());
                note(sink, AnnotationKind::RegressionSeverity, result.severity.to_string());
                if !result.visual_differences.is_empty() {
                    note(sink, AnnotationKind::VisualDifferences, result.visual_differences.join(", "));
                }
            }
        }
    }

    /// Apply every failure gate; `Ok` means the test passes
    pub fn assert(&self, verdict: &TestVerdict) -> Result<(), AssertionFailure> {
        if verdict.is_baseline {
            return Ok(());
        }

        let mut reasons = Vec::new();
        match (verdict.comparison_mode, &verdict.analysis_result) {
            (ComparisonMode::Pixel, _) => {
                if !verdict.success {
                    reasons.push("Native screenshot comparison failed".to_string());
                }
            }
            (ComparisonMode::Oracle, None) => {
                if !verdict.success {
                    reasons.push("Test failed - no analysis result".to_string());
                }
            }
            (ComparisonMode::Oracle, Some(result)) => {
                if !verdict.success {
                    reasons.push(format!(
                        "Test failed - Score: {}, Issues: {}",
                        result.score(),
                        result.issues().join(", ")
                    ));
                }
                if !result.skipped && result.score() <= self.threshold {
                    reasons.push(format!(
                        "Score too low: {} (must be above {})",
                        result.score(),
                        self.threshold
                    ));
                }
                let critical = critical_issues(result.issues());
                if !critical.is_empty() {
                    reasons.push(format!("Critical issues found: {}", critical.join(", ")));
                }
                if result.comparison_kind == ComparisonKind::RegressionCheck && !result.severity.is_acceptable() {
                    reasons.push(format!("Regression severity '{}' is not acceptable", result.severity));
                }
            }
        }

        if reasons.is_empty() {
            Ok(())
        } else {
            Err(AssertionFailure {
                test_name: verdict.test_name.clone(),
                reasons,
            })
        }
    }

    /// Report, then assert
    pub fn finish(&self, verdict: &TestVerdict, sink: &mut dyn ReportSink) -> Result<(), AssertionFailure> {
        self.report(verdict, sink);
        self.assert(verdict)
    }
}

fn note(sink: &mut dyn ReportSink, kind: AnnotationKind, description: String) {
    sink.annotate(Annotation { kind, description });
}

/// Issues mentioning a keyword that fails a test outright
fn critical_issues(issues: &[String]) -> Vec<&str> {
    issues
        .iter()
        .filter(|issue| {
            let lower = issue.to_lowercase();
            CRITICAL_ISSUE_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .map(String::as_str)
        .collect()
}
