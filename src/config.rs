//! Configuration management with environment variable support.
//!
//! The configuration is built once at process start and handed to each
//! component by reference. Nothing below the binary reads the environment.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SCENE_VISION_ENABLE_AI` | Score with the vision oracle instead of pixel diff | `false` |
//! | `SCENE_VISION_API_KEY` | Bearer credential for the vision service | unset |
//! | `SCENE_VISION_THRESHOLD` | Pass/fail score threshold (0-100) | `75` |
//! | `SCENE_VISION_VLM_ENDPOINT` | Chat-completion endpoint URL | `https://api.openai.com/v1/chat/completions` |
//! | `SCENE_VISION_VLM_MODEL` | Model name | `gpt-4-vision-preview` |
//! | `SCENE_VISION_VLM_MAX_TOKENS` | Maximum tokens in the response | `1000` |
//! | `SCENE_VISION_VLM_CONNECT_TIMEOUT` | Connection timeout in seconds | `10` |
//! | `SCENE_VISION_VLM_TIMEOUT` | Whole-request timeout in seconds | `120` |
//! | `SCENE_VISION_SNAPSHOT_DIR` | Root directory holding `*-snapshots` dirs | `tests` |
//! | `SCENE_VISION_DEFAULT_SUITE` | Suite used when no snapshot dir exists yet | `home.spec.ts` |
//! | `SCENE_VISION_BROWSER` | Browser identity used in baseline names | `chromium` |
//! | `SCENE_VISION_RESULTS_DIR` | Directory for per-run diagnostics | `test-results` |
//! | `SCENE_VISION_PIXEL_THRESHOLD` | Per-pixel tolerance for pixel mode (0.0-1.0) | `0.3` |
//! | `SCENE_VISION_MAX_DIFF_RATIO` | Fraction of pixels allowed to differ | `0.0` |
//! | `SCENE_VISION_SCENE_URL` | URL of the 3D scene page | see [`DEFAULT_SCENE_URL`] |
//!
//! The variable names used by existing browser suites (`ENABLE_AI_ANALYSIS`,
//! `OPENAI_API_KEY`, `CI`) are still honoured as fallbacks.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Default Values
// ============================================================================

/// Default pass threshold for oracle scores
pub const DEFAULT_THRESHOLD: u8 = 75;

/// Default vision endpoint
pub const DEFAULT_VLM_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Default vision model
pub const DEFAULT_VLM_MODEL: &str = "gpt-4-vision-preview";

/// Default max tokens for vision responses
pub const DEFAULT_VLM_MAX_TOKENS: u32 = 1000;

/// Default vision connection timeout (seconds)
pub const DEFAULT_VLM_CONNECT_TIMEOUT: u64 = 10;

/// Default vision request timeout (seconds)
pub const DEFAULT_VLM_REQUEST_TIMEOUT: u64 = 120;

/// Default baseline root directory
pub const DEFAULT_SNAPSHOT_DIR: &str = "tests";

/// Suite name whose snapshot directory is used when none exists yet
pub const DEFAULT_SUITE: &str = "home.spec.ts";

/// Suffix identifying baseline directories
pub const SNAPSHOT_DIR_SUFFIX: &str = "-snapshots";

/// Default browser identity
pub const DEFAULT_BROWSER: &str = "chromium";

/// Default diagnostics directory
pub const DEFAULT_RESULTS_DIR: &str = "test-results";

/// Default per-pixel tolerance for pixel mode
pub const DEFAULT_PIXEL_THRESHOLD: f64 = 0.3;

/// Default fraction of pixels allowed to differ in pixel mode
pub const DEFAULT_MAX_DIFF_RATIO: f64 = 0.0;

/// Default 3D scene page
pub const DEFAULT_SCENE_URL: &str = "https://interpres.live/src/test_breig/index.html";

/// Asset whose successful download signals the splat scene is streaming
pub const DEFAULT_SCENE_ASSET: &str = "Breig_future_initial.ksplat";

/// Default viewport used when the driver cannot report one
pub const DEFAULT_VIEWPORT: (u32, u32) = (1280, 720);

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable enabling oracle mode
pub const ENV_ENABLE_AI: &str = "SCENE_VISION_ENABLE_AI";

/// Environment variable holding the vision credential
pub const ENV_API_KEY: &str = "SCENE_VISION_API_KEY";

/// Environment variable for the score threshold
pub const ENV_THRESHOLD: &str = "SCENE_VISION_THRESHOLD";

/// Environment variable for the vision endpoint
pub const ENV_VLM_ENDPOINT: &str = "SCENE_VISION_VLM_ENDPOINT";

/// Environment variable for the vision model
pub const ENV_VLM_MODEL: &str = "SCENE_VISION_VLM_MODEL";

/// Environment variable for vision max tokens
pub const ENV_VLM_MAX_TOKENS: &str = "SCENE_VISION_VLM_MAX_TOKENS";

/// Environment variable for the vision connection timeout
pub const ENV_VLM_CONNECT_TIMEOUT: &str = "SCENE_VISION_VLM_CONNECT_TIMEOUT";

/// Environment variable for the vision request timeout
pub const ENV_VLM_REQUEST_TIMEOUT: &str = "SCENE_VISION_VLM_TIMEOUT";

/// Environment variable for the baseline root
pub const ENV_SNAPSHOT_DIR: &str = "SCENE_VISION_SNAPSHOT_DIR";

/// Environment variable for the fallback suite
pub const ENV_DEFAULT_SUITE: &str = "SCENE_VISION_DEFAULT_SUITE";

/// Environment variable for the browser identity
pub const ENV_BROWSER: &str = "SCENE_VISION_BROWSER";

/// Environment variable for the diagnostics directory
pub const ENV_RESULTS_DIR: &str = "SCENE_VISION_RESULTS_DIR";

/// Environment variable for the pixel tolerance
pub const ENV_PIXEL_THRESHOLD: &str = "SCENE_VISION_PIXEL_THRESHOLD";

/// Environment variable for the allowed differing pixel fraction
pub const ENV_MAX_DIFF_RATIO: &str = "SCENE_VISION_MAX_DIFF_RATIO";

/// Environment variable for the scene URL
pub const ENV_SCENE_URL: &str = "SCENE_VISION_SCENE_URL";

// ============================================================================
// Legacy Environment Variable Support
// ============================================================================

/// Flag used by existing browser suites to switch on AI analysis
pub const ENV_ENABLE_AI_LEGACY: &str = "ENABLE_AI_ANALYSIS";

/// Credential variable used by existing browser suites
pub const ENV_API_KEY_LEGACY: &str = "OPENAI_API_KEY";

/// Set by CI providers
pub const ENV_CI: &str = "CI";

// ============================================================================
// Configuration
// ============================================================================

/// Centralized configuration for a scene-vision run
#[derive(Debug, Clone)]
pub struct Config {
    /// Comparison mode and scoring
    pub oracle: OracleSettings,
    /// Vision service transport
    pub vlm: VlmSettings,
    /// Baseline layout
    pub baseline: BaselineSettings,
    /// Pixel mode tolerances
    pub pixel: PixelSettings,
    /// Bounded waits
    pub timeouts: TimeoutSettings,
    /// Scene page
    pub scene: SceneSettings,
    /// Diagnostics output
    pub results: ResultsSettings,
    /// Running under CI
    pub ci: bool,
}

/// Comparison mode and scoring settings
#[derive(Debug, Clone)]
pub struct OracleSettings {
    /// Use the vision oracle instead of the pixel diff
    pub enable_ai: bool,
    /// Vision service credential
    pub api_key: Option<String>,
    /// Minimum passing score (0-100)
    pub threshold: u8,
}

/// Vision service settings
#[derive(Debug, Clone)]
pub struct VlmSettings {
    /// API endpoint URL
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Connection timeout (seconds)
    pub connect_timeout: u64,
    /// Whole-request timeout (seconds)
    pub request_timeout: u64,
}

/// Baseline directory layout
#[derive(Debug, Clone)]
pub struct BaselineSettings {
    /// Root directory scanned for `*-snapshots` directories
    pub snapshot_dir: PathBuf,
    /// Suite whose directory is used when none exists yet
    pub default_suite: String,
    /// Browser identity
    pub browser: String,
}

/// Pixel comparison tolerances
#[derive(Debug, Clone)]
pub struct PixelSettings {
    /// Per-pixel normalized color tolerance (0.0-1.0)
    pub threshold: f64,
    /// Fraction of pixels allowed to exceed the tolerance
    pub max_diff_ratio: f64,
}

/// Bounded waits for scene loading and capture
#[derive(Debug, Clone)]
pub struct TimeoutSettings {
    pub scene_load: Duration,
    pub progress_hidden: Duration,
    pub canvas_visible: Duration,
    pub navigation: Duration,
    pub network_idle: Duration,
    pub test: Duration,
    /// Pause after the scene reports ready, for the first frames to settle
    pub settle: Duration,
    pub capture_retry_delay: Duration,
    pub capture_attempts: u32,
}

/// Scene page settings
#[derive(Debug, Clone)]
pub struct SceneSettings {
    /// Page URL
    pub url: String,
    /// URL fragment of the scene asset
    pub asset: String,
}

/// Diagnostics output settings
#[derive(Debug, Clone)]
pub struct ResultsSettings {
    /// Directory for captured screenshots, diffs and reports
    pub dir: PathBuf,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            oracle: OracleSettings::from_lookup(&lookup),
            vlm: VlmSettings::from_lookup(&lookup),
            baseline: BaselineSettings::from_lookup(&lookup),
            pixel: PixelSettings::from_lookup(&lookup),
            timeouts: TimeoutSettings::defaults(),
            scene: SceneSettings::from_lookup(&lookup),
            results: ResultsSettings::from_lookup(&lookup),
            ci: lookup(ENV_CI).map(|v| parse_flag(&v)).unwrap_or(false),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl OracleSettings {
    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: &F) -> Self {
        Self {
            enable_ai: lookup(ENV_ENABLE_AI)
                .or_else(|| lookup(ENV_ENABLE_AI_LEGACY))
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            api_key: lookup(ENV_API_KEY)
                .or_else(|| lookup(ENV_API_KEY_LEGACY))
                .filter(|key| !key.trim().is_empty()),
            threshold: lookup(ENV_THRESHOLD)
                .and_then(|s| s.trim().parse::<u8>().ok())
                .map(|t| t.min(100))
                .unwrap_or(DEFAULT_THRESHOLD),
        }
    }
}

impl VlmSettings {
    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: &F) -> Self {
        Self {
            endpoint: lookup(ENV_VLM_ENDPOINT).unwrap_or_else(|| DEFAULT_VLM_ENDPOINT.to_string()),
            model: lookup(ENV_VLM_MODEL).unwrap_or_else(|| DEFAULT_VLM_MODEL.to_string()),
            max_tokens: parse_or(lookup(ENV_VLM_MAX_TOKENS), DEFAULT_VLM_MAX_TOKENS),
            connect_timeout: parse_or(lookup(ENV_VLM_CONNECT_TIMEOUT), DEFAULT_VLM_CONNECT_TIMEOUT),
            request_timeout: parse_or(lookup(ENV_VLM_REQUEST_TIMEOUT), DEFAULT_VLM_REQUEST_TIMEOUT),
        }
    }
}

impl BaselineSettings {
    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: &F) -> Self {
        Self {
            snapshot_dir: lookup(ENV_SNAPSHOT_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
            default_suite: lookup(ENV_DEFAULT_SUITE).unwrap_or_else(|| DEFAULT_SUITE.to_string()),
            browser: lookup(ENV_BROWSER).unwrap_or_else(|| DEFAULT_BROWSER.to_string()),
        }
    }
}

impl PixelSettings {
    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: &F) -> Self {
        Self {
            threshold: parse_fraction(lookup(ENV_PIXEL_THRESHOLD), DEFAULT_PIXEL_THRESHOLD),
            max_diff_ratio: parse_fraction(lookup(ENV_MAX_DIFF_RATIO), DEFAULT_MAX_DIFF_RATIO),
        }
    }
}

impl TimeoutSettings {
    /// The bounded waits used by the scene suite
    pub fn defaults() -> Self {
        Self {
            scene_load: Duration::from_secs(60),
            progress_hidden: Duration::from_secs(40),
            canvas_visible: Duration::from_secs(30),
            navigation: Duration::from_secs(45),
            network_idle: Duration::from_secs(30),
            test: Duration::from_secs(180),
            settle: Duration::from_millis(1000),
            capture_retry_delay: Duration::from_millis(1000),
            capture_attempts: 3,
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self::defaults()
    }
}

impl SceneSettings {
    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: &F) -> Self {
        Self {
            url: lookup(ENV_SCENE_URL).unwrap_or_else(|| DEFAULT_SCENE_URL.to_string()),
            asset: DEFAULT_SCENE_ASSET.to_string(),
        }
    }
}

impl ResultsSettings {
    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: &F) -> Self {
        Self {
            dir: lookup(ENV_RESULTS_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RESULTS_DIR)),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Interpret a boolean-ish environment value
fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

/// Parse a value in `0.0..=1.0`; `NaN` and infinities fall back to `default`
fn parse_fraction(value: Option<String>, default: f64) -> f64 {
    value
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(default)
}
