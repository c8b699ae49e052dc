//! Comparison engine.
//!
//! One run per test: wait for the page to go quiet, capture, then either
//! seed the baseline (first run, never scored) or load it and ask the
//! configured oracle for a judgment.
//!
//! ```text
//! Capturing ─┬─ baseline missing ─> Seeding ─> Done
//!            └─ baseline found ───> Scoring ─> Done
//! ```
//!
//! Fatal faults (capture exhaustion, timeouts, a baseline vanishing between
//! the existence check and the read, unwritable directories) are
//! [`EngineError`]s. A failed comparison is not an error; it is a verdict.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::baseline::{BaselineError, BaselineMetadata, BaselineStore, ViewportSize};
use crate::config::{Config, DEFAULT_VIEWPORT, TimeoutSettings};
use crate::driver::{DriverError, PageDriver};
use crate::oracle::{
    ComparisonContext, ComparisonMode, ComparisonOracle, ComparisonResult, Severity, oracle_from_config,
};
use crate::session::ResultsDir;

/// Result type for engine runs
pub type EngineResult<T> = Result<T, EngineError>;

/// Fatal faults of a comparison run
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Capture kept failing
    #[error("screenshot capture failed after {attempts} attempt(s): {source}")]
    Capture {
        attempts: u32,
        #[source]
        source: DriverError,
    },

    /// Waiting for the network to go quiet failed for a reason other than time
    #[error("waiting for network idle failed: {0}")]
    NetworkIdle(#[source] DriverError),

    /// The page never settled or the capture hung
    #[error("screenshot capture timed out: {0}")]
    CaptureTimeout(#[source] DriverError),

    /// Baseline existed at the check but could not be found when read
    #[error("baseline {} disappeared between existence check and read; check the snapshot directory", .path.display())]
    BaselineVanished { path: PathBuf },

    /// Baseline directory or file could not be used
    #[error("baseline store error: {0}")]
    Baseline(#[from] BaselineError),

    /// Results directory could not be written
    #[error("cannot write test results: {0}")]
    Results(#[from] io::Error),

    /// The run exceeded its deadline
    #[error("test exceeded {limit:?} deadline during {phase} (elapsed {elapsed:?})")]
    Timeout {
        phase: EnginePhase,
        elapsed: Duration,
        limit: Duration,
    },
}

impl EngineError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::CaptureTimeout(_) | EngineError::Timeout { .. })
    }

    /// Faults caused by the environment rather than the page under test
    pub fn is_configuration_fault(&self) -> bool {
        matches!(
            self,
            EngineError::BaselineVanished { .. } | EngineError::Baseline(_) | EngineError::Results(_)
        )
    }
}

/// Steps of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnginePhase {
    Capturing,
    Seeding,
    Scoring,
    Done,
}

impl std::fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EnginePhase::Capturing => "capturing",
            EnginePhase::Seeding => "seeding",
            EnginePhase::Scoring => "scoring",
            EnginePhase::Done => "done",
        })
    }
}

/// Outcome of one test invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestVerdict {
    pub test_name: String,
    pub success: bool,
    /// First run: the capture became the baseline
    pub is_baseline: bool,
    pub comparison_mode: ComparisonMode,
    /// Threshold the verdict was decided with
    pub threshold: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_result: Option<ComparisonResult>,
    pub screenshot_path: PathBuf,
    pub baseline_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_path: Option<PathBuf>,
}

/// Runs capture, seeding and scoring for one test at a time
pub struct ComparisonEngine {
    store: BaselineStore,
    oracle: Box<dyn ComparisonOracle>,
    results: ResultsDir,
    timeouts: TimeoutSettings,
    threshold: u8,
}

impl ComparisonEngine {
    pub fn new(
        store: BaselineStore,
        oracle: Box<dyn ComparisonOracle>,
        results: ResultsDir,
        timeouts: TimeoutSettings,
        threshold: u8,
    ) -> Self {
        Self {
            store,
            oracle,
            results,
            timeouts,
            threshold: threshold.min(100),
        }
    }

    /// Engine wired from configuration; the oracle follows the AI switch
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            BaselineStore::from_settings(&config.baseline),
            oracle_from_config(config),
            ResultsDir::from_settings(&config.results),
            config.timeouts.clone(),
            config.oracle.threshold,
        )
    }

    pub fn mode(&self) -> ComparisonMode {
        self.oracle.mode()
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn store(&self) -> &BaselineStore {
        &self.store
    }

    pub fn results(&self) -> &ResultsDir {
        &self.results
    }

    /// Run with the configured threshold
    pub fn run<D: PageDriver + ?Sized>(&self, driver: &mut D, test_name: &str) -> EngineResult<TestVerdict> {
        self.run_with_threshold(driver, test_name, self.threshold)
    }

    /// Run with a per-call threshold
    pub fn run_with_threshold<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        test_name: &str,
        threshold: u8,
    ) -> EngineResult<TestVerdict> {
        let started = Instant::now();
        let threshold = threshold.min(100);
        let mode = self.mode();
        let browser = driver.browser_name().to_string();
        info!(test = test_name, browser = %browser, mode = %mode, "starting visual comparison");
        self.store.check_names(test_name, &browser)?;

        driver
            .wait_for_network_idle(self.timeouts.network_idle)
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::CaptureTimeout(e)
                } else {
                    EngineError::NetworkIdle(e)
                }
            })?;
        self.check_deadline(started, EnginePhase::Capturing)?;

        let image = self.capture(driver)?;
        let screenshot_path = self.results.screenshot_path(test_name);
        self.results.write(&screenshot_path, &image)?;
        debug!(path = %screenshot_path.display(), bytes = image.len(), "screenshot saved");
        self.check_deadline(started, EnginePhase::Capturing)?;

        if !self.store.has_baseline(test_name, &browser) {
            debug!(phase = %EnginePhase::Seeding, test = test_name, "entering phase");
            let viewport = driver.viewport().unwrap_or(ViewportSize {
                width: DEFAULT_VIEWPORT.0,
                height: DEFAULT_VIEWPORT.1,
            });
            let metadata = BaselineMetadata::new(test_name, &browser, viewport, driver.current_url());
            let baseline_path = self.store.save_baseline(test_name, &image, &metadata)?;
            info!(test = test_name, path = %baseline_path.display(), "no baseline found; capture stored as new baseline");

            return Ok(TestVerdict {
                test_name: test_name.to_string(),
                success: true,
                is_baseline: true,
                comparison_mode: mode,
                threshold,
                analysis_result: None,
                screenshot_path,
                baseline_path,
                diff_path: None,
            });
        }

        debug!(phase = %EnginePhase::Scoring, test = test_name, "entering phase");
        let baseline_path = self.store.resolve_path(test_name, &browser);
        let baseline = self
            .store
            .load_baseline(test_name, &browser)?
            .ok_or_else(|| EngineError::BaselineVanished {
                path: baseline_path.clone(),
            })?;
        let metadata = match self.store.load_metadata(test_name, &browser) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable baseline metadata");
                None
            }
        };

        let context = ComparisonContext::new(test_name, &browser)
            .with_url(driver.current_url())
            .with_baseline_metadata(metadata);
        let result = self.oracle.compare(&image, Some(&baseline), &context);
        self.check_deadline(started, EnginePhase::Scoring)?;

        let diff_path = match result.diff_image.as_deref() {
            Some(diff) => {
                let path = self.results.diff_path(test_name);
                self.results.write(&path, diff)?;
                Some(path)
            }
            None => None,
        };

        let success = decide(mode, &result, threshold);
        debug!(phase = %EnginePhase::Done, test = test_name, success, "entering phase");
        if success {
            info!(test = test_name, score = result.score(), severity = %result.severity, "visual comparison passed");
        } else {
            warn!(
                test = test_name,
                score = result.score(),
                severity = %result.severity,
                issues = result.issues().len(),
                "visual comparison failed"
            );
        }

        Ok(TestVerdict {
            test_name: test_name.to_string(),
            success,
            is_baseline: false,
            comparison_mode: mode,
            threshold,
            analysis_result: Some(result),
            screenshot_path,
            baseline_path,
            diff_path,
        })
    }

    /// Capture a full page, retrying transient faults
    pub fn capture<D: PageDriver + ?Sized>(&self, driver: &mut D) -> EngineResult<Vec<u8>> {
        let attempts = self.timeouts.capture_attempts.max(1);
        let mut attempt = 1;
        loop {
            match driver.capture_full_page() {
                Ok(capture) => {
                    debug!(attempt, width = capture.width, height = capture.height, "captured page");
                    return Ok(capture.image_data);
                }
                Err(e) if e.is_timeout() => return Err(EngineError::CaptureTimeout(e)),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(attempt, attempts, error = %e, "screenshot attempt failed; retrying");
                    driver.pause(self.timeouts.capture_retry_delay);
                    attempt += 1;
                }
                Err(source) => {
                    return Err(EngineError::Capture {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    fn check_deadline(&self, started: Instant, phase: EnginePhase) -> EngineResult<()> {
        let elapsed = started.elapsed();
        let limit = self.timeouts.test;
        if elapsed >= limit {
            return Err(EngineError::Timeout { phase, elapsed, limit });
        }
        Ok(())
    }
}

/// Oracle mode: score at least `threshold` and severity not critical. A
/// skipped (unscored) result is exempt from the score check.
/// Pixel mode: the pixel pass/fail, carried as validity.
pub fn decide(mode: ComparisonMode, result: &ComparisonResult, threshold: u8) -> bool {
    match mode {
        ComparisonMode::Oracle => {
            (result.skipped || result.score() >= threshold) && result.severity != Severity::Critical
        }
        ComparisonMode::Pixel => result.is_valid(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_THRESHOLD;
    use crate::driver::{Frame, MockPage};
    use crate::oracle::{AnalysisResult, ComparisonKind, PixelOracle};
    use std::cell::Cell;
    use std::rc::Rc;
    use tempfile::TempDir;

    /// Oracle returning a fixed result and counting calls
    struct FixedOracle {
        result: ComparisonResult,
        calls: Rc<Cell<u32>>,
    }

    impl ComparisonOracle for FixedOracle {
        fn mode(&self) -> ComparisonMode {
            ComparisonMode::Oracle
        }

        fn compare(&self, _: &[u8], _: Option<&[u8]>, _: &ComparisonContext) -> ComparisonResult {
            self.calls.set(self.calls.get() + 1);
            self.result.clone()
        }
    }

    fn comparison(score: u8, severity: Severity) -> ComparisonResult {
        ComparisonResult {
            analysis: AnalysisResult {
                is_valid: true,
                analysis_text: String::new(),
                issues: Vec::new(),
                score,
            },
            comparison_kind: ComparisonKind::RegressionCheck,
            visual_differences: Vec::new(),
            severity,
            baseline_metadata: None,
            skipped: false,
            diff_image: None,
        }
    }

    fn timeouts() -> TimeoutSettings {
        Config::defaults().timeouts
    }

    fn engine(tmp: &TempDir, oracle: Box<dyn ComparisonOracle>) -> ComparisonEngine {
        ComparisonEngine::new(
            BaselineStore::new(tmp.path().join("tests"), "home.spec.ts"),
            oracle,
            ResultsDir::new(tmp.path().join("results")),
            timeouts(),
            DEFAULT_THRESHOLD,
        )
    }

    fn page(color: [u8; 3]) -> MockPage {
        let mut page = MockPage::new("chromium");
        page.push_frame(Frame::new(8, 8, color).to_png());
        page
    }

    #[test]
    fn test_decide() {
        assert!(decide(ComparisonMode::Oracle, &comparison(75, Severity::High), 75));
        assert!(!decide(ComparisonMode::Oracle, &comparison(74, Severity::Low), 75));
        assert!(!decide(ComparisonMode::Oracle, &comparison(100, Severity::Critical), 75));
        assert!(decide(ComparisonMode::Pixel, &comparison(0, Severity::Critical), 75));

        let mut skipped = comparison(75, Severity::Low);
        skipped.skipped = true;
        assert!(decide(ComparisonMode::Oracle, &skipped, 90));
        skipped.severity = Severity::Critical;
        assert!(!decide(ComparisonMode::Oracle, &skipped, 90));
    }

    #[test]
    fn test_error_classification() {
        let vanished = EngineError::BaselineVanished {
            path: PathBuf::from("tests/home.spec.ts-snapshots/home-chromium-linux.png"),
        };
        assert!(vanished.is_configuration_fault());
        assert!(!vanished.is_timeout());
        assert!(vanished.to_string().contains("home-chromium-linux.png"));

        let capture = EngineError::Capture {
            attempts: 3,
            source: DriverError::Transient("busy".into()),
        };
        assert!(!capture.is_configuration_fault());
        assert!(capture.to_string().contains("after 3 attempt(s)"));
    }

    #[test]
    fn test_first_run_seeds_without_scoring() {
        let tmp = TempDir::new().unwrap();
        let calls = Rc::new(Cell::new(0));
        let engine = engine(
            &tmp,
            Box::new(FixedOracle {
                result: comparison(0, Severity::Critical),
                calls: calls.clone(),
            }),
        );

        let mut page = page([10, 20, 30]);
        let verdict = engine.run(&mut page, "seed").unwrap();

        assert!(verdict.success);
        assert!(verdict.is_baseline);
        assert!(verdict.analysis_result.is_none());
        assert_eq!(calls.get(), 0);
        assert_eq!(
            std::fs::read(&verdict.baseline_path).unwrap(),
            std::fs::read(&verdict.screenshot_path).unwrap()
        );
        assert!(engine.store().has_baseline("seed", "chromium"));
    }

    #[test]
    fn test_second_run_scores() {
        let tmp = TempDir::new().unwrap();
        let calls = Rc::new(Cell::new(0));
        let engine = engine(
            &tmp,
            Box::new(FixedOracle {
                result: comparison(90, Severity::High),
                calls: calls.clone(),
            }),
        );

        let mut page = page([10, 20, 30]);
        engine.run(&mut page, "scored").unwrap();
        let verdict = engine.run(&mut page, "scored").unwrap();

        assert!(!verdict.is_baseline);
        assert_eq!(calls.get(), 1);
        assert!(verdict.success);
        assert_eq!(verdict.analysis_result.unwrap().score(), 90);

        let strict = engine.run_with_threshold(&mut page, "scored", 95).unwrap();
        assert!(!strict.success);
        assert_eq!(strict.threshold, 95);
    }

    #[test]
    fn test_pixel_failure_writes_diff() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp, Box::new(PixelOracle::new(0.3, 0.0)));

        let mut page = MockPage::new("chromium");
        page.push_frame(Frame::new(8, 8, [255, 255, 255]).to_png());
        let mut changed = Frame::new(8, 8, [255, 255, 255]);
        changed.draw_rect(2, 2, 2, 2, [0, 0, 0]);
        page.push_frame(changed.to_png());

        assert!(engine.run(&mut page, "pixel").unwrap().is_baseline);
        let verdict = engine.run(&mut page, "pixel").unwrap();

        assert!(!verdict.success);
        assert_eq!(verdict.comparison_mode, ComparisonMode::Pixel);
        let diff = verdict.diff_path.expect("diff written");
        assert!(diff.is_file());
    }

    #[test]
    fn test_transient_capture_faults_are_retried() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp, Box::new(PixelOracle::new(0.3, 0.0)));

        let mut page = MockPage::new("chromium");
        page.push_fault(DriverError::Transient("renderer busy".into()))
            .push_fault(DriverError::Transient("renderer busy".into()))
            .push_frame(Frame::new(4, 4, [0, 0, 0]).to_png());

        let verdict = engine.run(&mut page, "retry").unwrap();
        assert!(verdict.is_baseline);
        assert_eq!(page.capture_attempts(), 3);
        assert_eq!(page.paused, timeouts().capture_retry_delay * 2);
    }

    #[test]
    fn test_capture_exhaustion_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp, Box::new(PixelOracle::new(0.3, 0.0)));

        let mut page = MockPage::new("chromium");
        for _ in 0..3 {
            page.push_fault(DriverError::Transient("renderer busy".into()));
        }

        match engine.run(&mut page, "exhausted") {
            Err(EngineError::Capture { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(page.capture_attempts(), 3);
        assert!(!engine.store().has_baseline("exhausted", "chromium"));
    }

    #[test]
    fn test_hard_capture_fault_is_not_retried() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp, Box::new(PixelOracle::new(0.3, 0.0)));

        let mut page = MockPage::new("chromium");
        page.push_fault(DriverError::Failed("page crashed".into()));

        match engine.run(&mut page, "crashed") {
            Err(EngineError::Capture { attempts, .. }) => assert_eq!(attempts, 1),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_network_idle_timeout() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp, Box::new(PixelOracle::new(0.3, 0.0)));

        let mut page = page([0, 0, 0]);
        page.stall_network();

        let err = engine.run(&mut page, "idle").unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("network idle"));
        assert_eq!(page.capture_attempts(), 0);
    }

    #[test]
    fn test_network_idle_fault_names_the_wait() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp, Box::new(PixelOracle::new(0.3, 0.0)));

        let mut page = page([0, 0, 0]);
        page.fail_network(DriverError::Failed("connection reset".into()));

        let err = engine.run(&mut page, "idle").unwrap_err();
        assert!(matches!(err, EngineError::NetworkIdle(_)));
        assert!(!err.is_timeout());
        assert!(err.to_string().starts_with("waiting for network idle failed"));
        assert!(!err.to_string().contains("attempt"));
        assert_eq!(page.capture_attempts(), 0);
    }

    #[test]
    fn test_unsafe_test_name_is_rejected_before_capture() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp, Box::new(PixelOracle::new(0.3, 0.0)));

        let mut page = page([0, 0, 0]);
        let err = engine.run(&mut page, "../../escape").unwrap_err();
        assert!(matches!(err, EngineError::Baseline(BaselineError::InvalidName { .. })));
        assert!(err.is_configuration_fault());
        assert_eq!(page.capture_attempts(), 0);
        assert!(!tmp.path().join("escape-chromium-linux.png").exists());
    }

    #[test]
    fn test_deadline_exceeded() {
        let tmp = TempDir::new().unwrap();
        let mut timeouts = timeouts();
        timeouts.test = Duration::ZERO;
        let engine = ComparisonEngine::new(
            BaselineStore::new(tmp.path().join("tests"), "home.spec.ts"),
            Box::new(PixelOracle::new(0.3, 0.0)),
            ResultsDir::new(tmp.path().join("results")),
            timeouts,
            DEFAULT_THRESHOLD,
        );

        let mut page = page([0, 0, 0]);
        match engine.run(&mut page, "slow") {
            Err(EngineError::Timeout { phase, .. }) => assert_eq!(phase, EnginePhase::Capturing),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
