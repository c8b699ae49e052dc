//! Baseline image storage.
//!
//! Baselines live under a root directory in per-suite folders named
//! `<suite>-snapshots/`, one PNG per `(test, browser, platform)`:
//!
//! ```text
//! tests/
//!   home.spec.ts-snapshots/
//!     3d-homepage-base-view-chromium-linux.png
//!     3d-homepage-base-view-chromium-linux.png.json   (metadata sidecar)
//! ```
//!
//! Path resolution only reads the filesystem. Creation is gated by the caller
//! through [`BaselineStore::has_baseline`]; [`BaselineStore::save_baseline`]
//! overwrites whatever is already there.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{BaselineSettings, SNAPSHOT_DIR_SUFFIX};

/// Result type for baseline operations
pub type BaselineResult<T> = Result<T, BaselineError>;

/// Errors raised by the baseline store
#[derive(Debug, thiserror::Error)]
pub enum BaselineError {
    /// Could not create the directory that should hold the baseline
    #[error("cannot create baseline directory {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    /// Could not write the baseline image or its metadata
    #[error("cannot write baseline {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    /// The file exists but could not be read
    #[error("cannot read baseline {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    /// The file exists but could not be removed
    #[error("cannot delete baseline {}: {source}", .path.display())]
    Delete { path: PathBuf, source: io::Error },

    /// Test or browser name would place the file outside its suite directory
    #[error("invalid baseline name '{name}': path separators and '..' are not allowed")]
    InvalidName { name: String },

    /// Metadata sidecar could not be (de)serialized
    #[error("invalid baseline metadata {}: {source}", .path.display())]
    Metadata {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Host platform tag embedded in baseline file names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Win32,
    Linux,
}

impl Platform {
    /// Platform of the running process. Every non-Windows host shares the `linux` tag.
    pub fn current() -> Self {
        if cfg!(windows) { Platform::Win32 } else { Platform::Linux }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Win32 => "win32",
            Platform::Linux => "linux",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Viewport dimensions at capture time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

/// Facts recorded when a baseline is first seeded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineMetadata {
    pub test_name: String,
    pub created_at: DateTime<Utc>,
    pub browser_name: String,
    pub viewport_size: ViewportSize,
    #[serde(rename = "url")]
    pub source_url: String,
}

impl BaselineMetadata {
    /// Metadata stamped with the current time
    pub fn new(
        test_name: impl Into<String>,
        browser_name: impl Into<String>,
        viewport_size: ViewportSize,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            created_at: Utc::now(),
            browser_name: browser_name.into(),
            viewport_size,
            source_url: source_url.into(),
        }
    }
}

/// A baseline found on disk by [`BaselineStore::list_baselines`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineEntry {
    /// Suite directory name (e.g. `home.spec.ts-snapshots`)
    pub suite: String,
    /// Baseline file path
    pub path: PathBuf,
}

/// Persists reference images keyed by test, browser and platform
#[derive(Debug, Clone)]
pub struct BaselineStore {
    root: PathBuf,
    default_suite: String,
    platform: Platform,
}

impl BaselineStore {
    /// Store rooted at `root`, falling back to `<default_suite>-snapshots`
    pub fn new(root: impl Into<PathBuf>, default_suite: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            default_suite: default_suite.into(),
            platform: Platform::current(),
        }
    }

    pub fn from_settings(settings: &BaselineSettings) -> Self {
        Self::new(&settings.snapshot_dir, &settings.default_suite)
    }

    /// Override the platform tag (baselines recorded on another host)
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Reject names that could escape the suite directory
    pub fn check_names(&self, test_name: &str, browser_name: &str) -> BaselineResult<()> {
        for name in [test_name, browser_name] {
            if name.is_empty() || name.contains(['/', '\\', '\0']) || name.contains("..") {
                return Err(BaselineError::InvalidName { name: name.to_string() });
            }
        }
        Ok(())
    }

    /// File name for a baseline: `<test>-<browser>-<platform>.png`
    pub fn file_name(&self, test_name: &str, browser_name: &str) -> String {
        format!("{}-{}-{}.png", test_name, browser_name, self.platform)
    }

    /// Resolve where the baseline for `(test_name, browser_name)` lives.
    ///
    /// The first suite directory (in name order) already holding the file wins.
    /// Otherwise the file goes into the first suite directory, or into
    /// `<default_suite>-snapshots` when the root has none yet.
    pub fn resolve_path(&self, test_name: &str, browser_name: &str) -> PathBuf {
        let file_name = self.file_name(test_name, browser_name);
        let suites = self.suite_dirs();

        if let Some(existing) = suites
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
        {
            return existing;
        }

        let default_dir = suites.into_iter().next().unwrap_or_else(|| {
            self.root
                .join(format!("{}{}", self.default_suite, SNAPSHOT_DIR_SUFFIX))
        });
        default_dir.join(file_name)
    }

    /// Whether a baseline exists at the resolved path
    pub fn has_baseline(&self, test_name: &str, browser_name: &str) -> bool {
        self.check_names(test_name, browser_name).is_ok() && self.resolve_path(test_name, browser_name).is_file()
    }

    /// Write `image` as the baseline for `metadata.browser_name`, returning the path.
    pub fn save_baseline(
        &self,
        test_name: &str,
        image: &[u8],
        metadata: &BaselineMetadata,
    ) -> BaselineResult<PathBuf> {
        self.check_names(test_name, &metadata.browser_name)?;
        let path = self.resolve_path(test_name, &metadata.browser_name);

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| BaselineError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        fs::write(&path, image).map_err(|source| BaselineError::Write {
            path: path.clone(),
            source,
        })?;

        let sidecar = metadata_path(&path);
        let json = serde_json::to_string_pretty(metadata).map_err(|source| {
            BaselineError::Metadata {
                path: sidecar.clone(),
                source,
            }
        })?;
        fs::write(&sidecar, json).map_err(|source| BaselineError::Write {
            path: sidecar.clone(),
            source,
        })?;

        info!(test = test_name, path = %path.display(), bytes = image.len(), "saved baseline");
        Ok(path)
    }

    /// Stored bytes, or `None` when no baseline exists
    pub fn load_baseline(
        &self,
        test_name: &str,
        browser_name: &str,
    ) -> BaselineResult<Option<Vec<u8>>> {
        self.check_names(test_name, browser_name)?;
        let path = self.resolve_path(test_name, browser_name);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(BaselineError::Read { path, source }),
        }
    }

    /// Metadata recorded alongside the baseline, if any
    pub fn load_metadata(
        &self,
        test_name: &str,
        browser_name: &str,
    ) -> BaselineResult<Option<BaselineMetadata>> {
        self.check_names(test_name, browser_name)?;
        let path = metadata_path(&self.resolve_path(test_name, browser_name));
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(BaselineError::Read { path, source }),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| BaselineError::Metadata { path, source })
    }

    /// Remove the baseline and its metadata. Missing files are not an error.
    pub fn delete_baseline(&self, test_name: &str, browser_name: &str) -> BaselineResult<()> {
        self.check_names(test_name, browser_name)?;
        let path = self.resolve_path(test_name, browser_name);
        for target in [metadata_path(&path), path] {
            match fs::remove_file(&target) {
                Ok(()) => debug!(path = %target.display(), "removed baseline file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(BaselineError::Delete { path: target, source }),
            }
        }
        Ok(())
    }

    /// Every baseline image across all suite directories, in name order
    pub fn list_baselines(&self) -> BaselineResult<Vec<BaselineEntry>> {
        let mut entries = Vec::new();
        for dir in self.suite_dirs() {
            let suite = dir
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let read = fs::read_dir(&dir).map_err(|source| BaselineError::Read {
                path: dir.clone(),
                source,
            })?;
            let mut paths: Vec<PathBuf> = read
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().map(|e| e == "png").unwrap_or(false))
                .collect();
            paths.sort();
            entries.extend(paths.into_iter().map(|path| BaselineEntry {
                suite: suite.clone(),
                path,
            }));
        }
        Ok(entries)
    }

    /// Suite directories under the root, sorted by name
    fn suite_dirs(&self) -> Vec<PathBuf> {
        let Ok(read) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut dirs: Vec<PathBuf> = read
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .ends_with(SNAPSHOT_DIR_SUFFIX)
            })
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();
        dirs
    }
}

/// Sidecar path holding the serialized [`BaselineMetadata`]
fn metadata_path(image_path: &Path) -> PathBuf {
    let mut name = image_path.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn metadata(test: &str) -> BaselineMetadata {
        BaselineMetadata::new(
            test,
            "chromium",
            ViewportSize { width: 1280, height: 720 },
            "https://example.test/scene",
        )
    }

    fn store(dir: &TempDir) -> BaselineStore {
        BaselineStore::new(dir.path(), "home.spec.ts").with_platform(Platform::Linux)
    }

    #[test]
    fn test_file_name_includes_platform() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(store.file_name("hero", "chromium"), "hero-chromium-linux.png");
        let win = store.with_platform(Platform::Win32);
        assert_eq!(win.file_name("hero", "firefox"), "hero-firefox-win32.png");
    }

    #[test]
    fn test_resolve_falls_back_to_default_suite() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(
            store.resolve_path("hero", "chromium"),
            dir.path()
                .join("home.spec.ts-snapshots")
                .join("hero-chromium-linux.png")
        );
    }

    #[test]
    fn test_resolve_with_missing_root() {
        let store = BaselineStore::new("/nonexistent/scene-vision-root", "home")
            .with_platform(Platform::Linux);
        assert_eq!(
            store.resolve_path("a", "b"),
            PathBuf::from("/nonexistent/scene-vision-root/home-snapshots/a-b-linux.png")
        );
    }

    #[test]
    fn test_resolve_prefers_suite_holding_the_file() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("amenities.spec.ts-snapshots");
        let second = dir.path().join("home.spec.ts-snapshots");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        fs::create_dir_all(dir.path().join("fixtures")).unwrap();
        fs::write(second.join("hero-chromium-linux.png"), b"png").unwrap();

        let store = store(&dir);
        assert_eq!(
            store.resolve_path("hero", "chromium"),
            second.join("hero-chromium-linux.png")
        );
        // Unknown tests land in the first suite directory
        assert_eq!(
            store.resolve_path("other", "chromium"),
            first.join("other-chromium-linux.png")
        );
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("b-snapshots")).unwrap();
        fs::create_dir_all(dir.path().join("a-snapshots")).unwrap();
        let store = store(&dir);
        let first = store.resolve_path("hero", "chromium");
        let second = store.resolve_path("hero", "chromium");
        assert_eq!(first, second);
        assert!(first.starts_with(dir.path().join("a-snapshots")));
    }

    #[test]
    fn test_save_has_load_delete() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(!store.has_baseline("hero", "chromium"));
        assert_eq!(store.load_baseline("hero", "chromium").unwrap(), None);

        let path = store.save_baseline("hero", b"image-bytes", &metadata("hero")).unwrap();
        assert!(path.is_file());
        assert!(store.has_baseline("hero", "chromium"));
        assert_eq!(
            store.load_baseline("hero", "chromium").unwrap(),
            Some(b"image-bytes".to_vec())
        );

        store.delete_baseline("hero", "chromium").unwrap();
        assert!(!store.has_baseline("hero", "chromium"));
        assert!(!metadata_path(&path).exists());
    }

    #[test]
    fn test_save_overwrites_existing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let first = store.save_baseline("hero", b"one", &metadata("hero")).unwrap();
        let second = store.save_baseline("hero", b"two", &metadata("hero")).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read(&second).unwrap(), b"two");
    }

    #[test]
    fn test_metadata_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let meta = metadata("hero");
        store.save_baseline("hero", b"x", &meta).unwrap();
        assert_eq!(store.load_metadata("hero", "chromium").unwrap(), Some(meta));
        assert_eq!(store.load_metadata("missing", "chromium").unwrap(), None);
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.delete_baseline("never-saved", "chromium").unwrap();
    }

    #[test]
    fn test_names_cannot_escape_the_snapshot_root() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(dir.path().join("escape-chromium-linux.png"), b"outside").unwrap();

        for name in ["../../escape", "..\\escape", "nested/escape", "a..b", ""] {
            assert!(matches!(
                store.save_baseline(name, b"x", &metadata(name)),
                Err(BaselineError::InvalidName { .. })
            ));
            assert!(matches!(store.delete_baseline(name, "chromium"), Err(BaselineError::InvalidName { .. })));
            assert!(store.load_baseline(name, "chromium").is_err());
            assert!(!store.has_baseline(name, "chromium"));
        }
        assert!(store.check_names("hero", "../chromium").is_err());
        assert!(store.check_names("3d-homepage_base.view", "chromium").is_ok());
        assert_eq!(fs::read(dir.path().join("escape-chromium-linux.png")).unwrap(), b"outside");
    }

    #[test]
    fn test_list_baselines() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save_baseline("b", b"x", &metadata("b")).unwrap();
        store.save_baseline("a", b"y", &metadata("a")).unwrap();

        let names: Vec<String> = store
            .list_baselines()
            .unwrap()
            .into_iter()
            .map(|e| e.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a-chromium-linux.png", "b-chromium-linux.png"]);
    }
}
