//! Scene Vision - visual regression checks for a 3D web scene.
//!
//! This crate provides:
//! - Baseline storage keyed by test, browser and platform
//! - Pixel-diff and vision-model comparison oracles behind one trait
//! - A comparison engine that seeds baselines on first run and scores afterwards
//! - Reporting with annotations, attachments and pass/fail gates
//! - A page-object for the 3D scene (load sequence, section navigation)
//!
//! # Example
//!
//! ```rust,no_run
//! use scene_vision::{ComparisonEngine, Config, ImageFileDriver, RecordingSink, ResultReporter};
//!
//! let config = Config::from_env();
//! let engine = ComparisonEngine::from_config(&config);
//! let mut driver = ImageFileDriver::new("home.png", "chromium");
//!
//! let verdict = engine.run(&mut driver, "3d-homepage-base-view").unwrap();
//! let mut sink = RecordingSink::new();
//! ResultReporter::new(config.oracle.threshold).finish(&verdict, &mut sink).unwrap();
//! ```

pub mod baseline;
pub mod config;
pub mod driver;
pub mod engine;
pub mod oracle;
pub mod report;
pub mod scene;
pub mod session;
pub mod vlm;

// Re-export configuration
pub use config::Config;

// Re-export baseline storage
pub use baseline::{BaselineEntry, BaselineError, BaselineMetadata, BaselineResult, BaselineStore, Platform, ViewportSize};

// Re-export drivers
pub use driver::{CaptureResult, Condition, DriverError, DriverResult, Frame, ImageFileDriver, MockPage, PageDriver};

// Re-export oracles
pub use oracle::{
    AnalysisResult, ComparisonContext, ComparisonKind, ComparisonMode, ComparisonOracle, ComparisonResult, PixelOracle,
    Severity, VisionOracle, oracle_from_config,
};

// Re-export engine and reporting
pub use engine::{ComparisonEngine, EngineError, EnginePhase, EngineResult, TestVerdict};
pub use report::{Annotation, AnnotationKind, AssertionFailure, Attachment, RecordingSink, ReportSink, ResultReporter};

// Re-export scene page object
pub use scene::{ScenePage, SceneError, SceneResult, Section};

// Re-export results directory
pub use session::ResultsDir;

// Re-export VLM client
pub use vlm::{ChatTransport, CurlTransport, VlmConfig, VlmError, VlmResult};
