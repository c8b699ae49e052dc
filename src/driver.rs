//! Page driver abstraction for browser-hosted captures.
//!
//! The comparison engine and the scene page object only talk to a
//! [`PageDriver`]. A real browser binding lives outside this crate; two
//! drivers ship here:
//! - [`ImageFileDriver`] replays a screenshot already written to disk
//! - [`MockPage`] scripts frames, faults and element state for tests
//!
//! [`Frame`] is a small RGB framebuffer for building test images.

use image::{ImageBuffer, RgbImage};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::baseline::ViewportSize;
use crate::config::DEFAULT_VIEWPORT;

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors surfaced by a page driver
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriverError {
    /// A bounded wait expired
    #[error("timed out after {after:?} waiting for {operation}")]
    Timeout { operation: String, after: Duration },

    /// Momentary fault worth retrying (renderer busy, context lost)
    #[error("transient driver fault: {0}")]
    Transient(String),

    /// Anything else
    #[error("driver operation failed: {0}")]
    Failed(String),
}

impl DriverError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, DriverError::Transient(_))
    }
}

/// A page state to wait for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Condition {
    /// Element matching the selector is visible
    Visible(String),
    /// Element matching the selector is hidden or detached
    Hidden(String),
    /// Element text equals the given string
    TextEquals { selector: String, text: String },
    /// A response whose URL contains the fragment arrived with the status
    Response { url_contains: String, status: u16 },
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::Visible(sel) => write!(f, "'{}' to be visible", sel),
            Condition::Hidden(sel) => write!(f, "'{}' to be hidden", sel),
            Condition::TextEquals { selector, text } => {
                write!(f, "'{}' to read '{}'", selector, text)
            }
            Condition::Response { url_contains, status } => {
                write!(f, "response {} from '{}'", status, url_contains)
            }
        }
    }
}

/// Result of a full-page capture
#[derive(Debug, Clone)]
pub struct CaptureResult {
    /// PNG-encoded image data
    pub image_data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl CaptureResult {
    /// Wrap PNG bytes, reading the dimensions from the header
    pub fn from_png(image_data: Vec<u8>) -> DriverResult<Self> {
        let img = image::load_from_memory(&image_data)
            .map_err(|e| DriverError::Failed(format!("captured image is not a valid PNG: {}", e)))?;
        Ok(Self {
            width: img.width(),
            height: img.height(),
            image_data,
        })
    }
}

/// Browser page capability consumed by the engine and page objects.
///
/// Every wait takes an explicit bound and must fail with
/// [`DriverError::Timeout`] rather than hang.
pub trait PageDriver {
    /// Load a URL
    fn navigate(&mut self, url: &str, timeout: Duration) -> DriverResult<()>;

    /// Block until the condition holds
    fn wait_for(&mut self, condition: &Condition, timeout: Duration) -> DriverResult<()>;

    /// Click the element matching the selector
    fn click(&mut self, selector: &str, timeout: Duration) -> DriverResult<()>;

    /// Number of elements matching the selector
    fn count(&mut self, selector: &str) -> DriverResult<usize>;

    /// Text content of the first matching element
    fn text_content(&mut self, selector: &str) -> DriverResult<Option<String>>;

    /// Block until the network has been idle
    fn wait_for_network_idle(&mut self, timeout: Duration) -> DriverResult<()>;

    /// Fixed pause (scene transitions)
    fn pause(&mut self, duration: Duration);

    /// Capture the whole page as PNG
    fn capture_full_page(&mut self) -> DriverResult<CaptureResult>;

    /// Browser identity used in baseline names (e.g. "chromium")
    fn browser_name(&self) -> &str;

    /// URL of the current page
    fn current_url(&self) -> String;

    /// Viewport size, if known
    fn viewport(&self) -> Option<ViewportSize>;
}

// =============================================================================
// ImageFileDriver
// =============================================================================

/// Driver that "captures" a PNG produced elsewhere (CI artifacts, manual runs).
///
/// Waits and navigation succeed immediately; interactive operations fail.
#[derive(Debug, Clone)]
pub struct ImageFileDriver {
    path: PathBuf,
    browser: String,
    url: String,
}

impl ImageFileDriver {
    pub fn new(path: impl Into<PathBuf>, browser: impl Into<String>) -> Self {
        let path = path.into();
        let url = format!("file://{}", path.display());
        Self {
            path,
            browser: browser.into(),
            url,
        }
    }

    /// Record the page URL the image was taken from
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PageDriver for ImageFileDriver {
    fn navigate(&mut self, url: &str, _timeout: Duration) -> DriverResult<()> {
        self.url = url.to_string();
        Ok(())
    }

    fn wait_for(&mut self, _condition: &Condition, _timeout: Duration) -> DriverResult<()> {
        Ok(())
    }

    fn click(&mut self, selector: &str, _timeout: Duration) -> DriverResult<()> {
        Err(DriverError::Failed(format!(
            "cannot click '{}' on a static image",
            selector
        )))
    }

    fn count(&mut self, _selector: &str) -> DriverResult<usize> {
        Ok(0)
    }

    fn text_content(&mut self, _selector: &str) -> DriverResult<Option<String>> {
        Ok(None)
    }

    fn wait_for_network_idle(&mut self, _timeout: Duration) -> DriverResult<()> {
        Ok(())
    }

    fn pause(&mut self, _duration: Duration) {}

    fn capture_full_page(&mut self) -> DriverResult<CaptureResult> {
        let data = std::fs::read(&self.path).map_err(|e| {
            DriverError::Failed(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        CaptureResult::from_png(data)
    }

    fn browser_name(&self) -> &str {
        &self.browser
    }

    fn current_url(&self) -> String {
        self.url.clone()
    }

    fn viewport(&self) -> Option<ViewportSize> {
        image::image_dimensions(&self.path)
            .ok()
            .map(|(width, height)| ViewportSize { width, height })
    }
}

// =============================================================================
// MockPage
// =============================================================================

/// Scripted page for tests.
///
/// Captures pop from a queue of frames and faults; the last successful
/// frame is repeated once the queue is drained. Conditions listed in
/// `stalled` time out, everything else is satisfied at once.
#[derive(Debug, Default)]
pub struct MockPage {
    browser: String,
    url: String,
    frames: VecDeque<DriverResult<Vec<u8>>>,
    last_frame: Option<Vec<u8>>,
    stalled: HashSet<Condition>,
    counts: HashMap<String, usize>,
    texts: HashMap<String, String>,
    network_idle_stalls: bool,
    network_fault: Option<DriverError>,
    /// Every call made, in order, for assertions
    pub calls: Vec<String>,
    /// Total time spent in `pause`
    pub paused: Duration,
    capture_calls: u32,
}

impl MockPage {
    pub fn new(browser: impl Into<String>) -> Self {
        Self {
            browser: browser.into(),
            url: "about:blank".to_string(),
            ..Default::default()
        }
    }

    /// Queue a successful capture
    pub fn push_frame(&mut self, png: Vec<u8>) -> &mut Self {
        self.frames.push_back(Ok(png));
        self
    }

    /// Queue a failing capture
    pub fn push_fault(&mut self, error: DriverError) -> &mut Self {
        self.frames.push_back(Err(error));
        self
    }

    /// Make a condition time out
    pub fn stall(&mut self, condition: Condition) -> &mut Self {
        self.stalled.insert(condition);
        self
    }

    /// Make `wait_for_network_idle` time out
    pub fn stall_network(&mut self) -> &mut Self {
        self.network_idle_stalls = true;
        self
    }

    /// Make `wait_for_network_idle` fail with `error`
    pub fn fail_network(&mut self, error: DriverError) -> &mut Self {
        self.network_fault = Some(error);
        self
    }

    pub fn set_count(&mut self, selector: &str, count: usize) -> &mut Self {
        self.counts.insert(selector.to_string(), count);
        self
    }

    pub fn set_text(&mut self, selector: &str, text: &str) -> &mut Self {
        self.texts.insert(selector.to_string(), text.to_string());
        self
    }

    /// Number of capture attempts made so far
    pub fn capture_attempts(&self) -> u32 {
        self.capture_calls
    }
}

impl PageDriver for MockPage {
    fn navigate(&mut self, url: &str, timeout: Duration) -> DriverResult<()> {
        self.calls.push(format!("navigate {}", url));
        let pending = Condition::Response {
            url_contains: url.to_string(),
            status: 200,
        };
        if self.stalled.contains(&pending) {
            return Err(DriverError::Timeout {
                operation: format!("navigation to {}", url),
                after: timeout,
            });
        }
        self.url = url.to_string();
        Ok(())
    }

    fn wait_for(&mut self, condition: &Condition, timeout: Duration) -> DriverResult<()> {
        self.calls.push(format!("wait {}", condition));
        if self.stalled.contains(condition) {
            return Err(DriverError::Timeout {
                operation: condition.to_string(),
                after: timeout,
            });
        }
        Ok(())
    }

    fn click(&mut self, selector: &str, timeout: Duration) -> DriverResult<()> {
        self.calls.push(format!("click {}", selector));
        if self.stalled.contains(&Condition::Visible(selector.to_string())) {
            return Err(DriverError::Timeout {
                operation: format!("click on '{}'", selector),
                after: timeout,
            });
        }
        Ok(())
    }

    fn count(&mut self, selector: &str) -> DriverResult<usize> {
        Ok(self.counts.get(selector).copied().unwrap_or(0))
    }

    fn text_content(&mut self, selector: &str) -> DriverResult<Option<String>> {
        Ok(self.texts.get(selector).cloned())
    }

    fn wait_for_network_idle(&mut self, timeout: Duration) -> DriverResult<()> {
        self.calls.push("network idle".to_string());
        if self.network_idle_stalls {
            return Err(DriverError::Timeout {
                operation: "network idle".to_string(),
                after: timeout,
            });
        }
        match &self.network_fault {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn pause(&mut self, duration: Duration) {
        self.paused += duration;
    }

    fn capture_full_page(&mut self) -> DriverResult<CaptureResult> {
        self.capture_calls += 1;
        self.calls.push("capture".to_string());
        let next = match self.frames.pop_front() {
            Some(next) => next,
            None => self
                .last_frame
                .clone()
                .ok_or_else(|| DriverError::Failed("no frame scripted".to_string())),
        };
        let data = next?;
        self.last_frame = Some(data.clone());
        CaptureResult::from_png(data)
    }

    fn browser_name(&self) -> &str {
        &self.browser
    }

    fn current_url(&self) -> String {
        self.url.clone()
    }

    fn viewport(&self) -> Option<ViewportSize> {
        let (width, height) = DEFAULT_VIEWPORT;
        Some(ViewportSize { width, height })
    }
}

// =============================================================================
// Frame
// =============================================================================

/// RGB framebuffer for building deterministic test images
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    buffer: Vec<u8>,
}

impl Frame {
    /// A frame filled with one color
    pub fn new(width: u32, height: u32, color: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut buffer = Vec::with_capacity(pixels.saturating_mul(3));
        for _ in 0..pixels {
            buffer.extend_from_slice(&color);
        }
        Self {
            width,
            height,
            buffer,
        }
    }

    /// Draw a filled rectangle, clipped to the frame
    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) -> &mut Self {
        for py in y..y.saturating_add(h).min(self.height) {
            for px in x..x.saturating_add(w).min(self.width) {
                let idx = self.index(px, py);
                self.buffer[idx..idx + 3].copy_from_slice(&color);
            }
        }
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 3
    }

    /// Encode as PNG
    pub fn to_png(&self) -> Vec<u8> {
        let img: RgbImage = ImageBuffer::from_fn(self.width, self.height, |x, y| {
            let idx = self.index(x, y);
            image::Rgb([self.buffer[idx], self.buffer[idx + 1], self.buffer[idx + 2]])
        });
        let mut bytes = Vec::new();
        // Writing to an in-memory buffer cannot fail for a well-formed RGB image
        let _ = img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png);
        bytes
    }
}
