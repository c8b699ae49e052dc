//! Comparison oracles.
//!
//! An oracle turns a capture (and, when one exists, its baseline) into a
//! [`ComparisonResult`]. Two strategies share the [`ComparisonOracle`] trait:
//! - [`PixelOracle`] for deterministic pixel diffs
//! - [`VisionOracle`] for vision-model scoring
//!
//! Which one runs is a configuration value, see [`ComparisonMode`].

pub mod analysis;
pub mod pixel;
pub mod types;
pub mod vision;

use serde::{Deserialize, Serialize};

use crate::baseline::BaselineMetadata;
use crate::config::Config;

pub use pixel::{PixelDiff, PixelOracle, PixelOutcome};
pub use types::{AnalysisResult, ComparisonKind, ComparisonResult, Severity};
pub use vision::VisionOracle;

/// Which strategy scores a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMode {
    Pixel,
    Oracle,
}

impl ComparisonMode {
    pub fn from_config(config: &Config) -> Self {
        if config.oracle.enable_ai {
            ComparisonMode::Oracle
        } else {
            ComparisonMode::Pixel
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonMode::Pixel => "pixel",
            ComparisonMode::Oracle => "oracle",
        }
    }
}

impl std::fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the oracle knows about the capture being judged
#[derive(Debug, Clone, Default)]
pub struct ComparisonContext {
    pub test_name: String,
    pub browser_name: String,
    pub url: Option<String>,
    pub baseline_metadata: Option<BaselineMetadata>,
}

impl ComparisonContext {
    pub fn new(test_name: impl Into<String>, browser_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            browser_name: browser_name.into(),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_baseline_metadata(mut self, metadata: Option<BaselineMetadata>) -> Self {
        self.baseline_metadata = metadata;
        self
    }
}

/// A strategy that judges a capture
pub trait ComparisonOracle {
    /// Mode reported in verdicts
    fn mode(&self) -> ComparisonMode;

    /// Judge `current`, against `baseline` when given. Never fails; faults become data.
    fn compare(
        &self,
        current: &[u8],
        baseline: Option<&[u8]>,
        context: &ComparisonContext,
    ) -> ComparisonResult;
}

/// Build the oracle selected by the configuration
pub fn oracle_from_config(config: &Config) -> Box<dyn ComparisonOracle> {
    match ComparisonMode::from_config(config) {
        ComparisonMode::Pixel => Box::new(PixelOracle::from_settings(&config.pixel)),
        ComparisonMode::Oracle => Box::new(VisionOracle::from_config(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_follows_config() {
        let mut config = Config::defaults();
        assert_eq!(ComparisonMode::from_config(&config), ComparisonMode::Pixel);
        assert_eq!(oracle_from_config(&config).mode(), ComparisonMode::Pixel);

        config.oracle.enable_ai = true;
        assert_eq!(ComparisonMode::from_config(&config), ComparisonMode::Oracle);
        assert_eq!(oracle_from_config(&config).mode(), ComparisonMode::Oracle);
    }
}
