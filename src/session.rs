//! Results directory for per-run diagnostics.
//!
//! Holds everything a run produces besides baselines:
//! - timestamped screenshots (`<test>_<millis>.png`)
//! - pixel diff images (`<test>-diff.png`)
//! - JSON reports (`<test>-report.json`)
//!
//! Files are never cleaned up here; the directory belongs to the host CI.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::ResultsSettings;

/// Directory receiving screenshots, diffs and reports
#[derive(Debug, Clone)]
pub struct ResultsDir {
    dir: PathBuf,
}

impl ResultsDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_settings(settings: &ResultsSettings) -> Self {
        Self::new(settings.dir.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory; succeeds if it already exists
    pub fn init(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    /// Fresh path for a capture of `test_name`
    pub fn screenshot_path(&self, test_name: &str) -> PathBuf {
        let millis = chrono::Utc::now().timestamp_millis();
        self.dir.join(format!("{}_{}.png", sanitize_name(test_name), millis))
    }

    pub fn diff_path(&self, test_name: &str) -> PathBuf {
        self.dir.join(format!("{}-diff.png", sanitize_name(test_name)))
    }

    pub fn report_path(&self, test_name: &str) -> PathBuf {
        self.dir.join(format!("{}-report.json", sanitize_name(test_name)))
    }

    /// Write `bytes` to `path`, creating the directory first
    pub fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.init()?;
        fs::write(path, bytes)
    }

    /// All PNG files in the directory, sorted
    pub fn list_captures(&self) -> io::Result<Vec<PathBuf>> {
        let mut captures = Vec::new();
        if self.dir.exists() {
            for entry in fs::read_dir(&self.dir)? {
                let path = entry?.path();
                if path.extension().map(|e| e == "png").unwrap_or(false) {
                    captures.push(path);
                }
            }
        }
        captures.sort();
        Ok(captures)
    }
}

/// Sanitize a name for use in filenames
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("home page"), "home_page");
        assert_eq!(sanitize_name("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_name("3d-homepage-base-view"), "3d-homepage-base-view");
    }

    #[test]
    fn test_paths() {
        let results = ResultsDir::new("out");
        let shot = results.screenshot_path("home view");
        let name = shot.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("home_view_"));
        assert!(name.ends_with(".png"));
        assert_eq!(results.diff_path("home"), PathBuf::from("out/home-diff.png"));
        assert_eq!(results.report_path("home"), PathBuf::from("out/home-report.json"));
    }

    #[test]
    fn test_write_creates_dir_and_lists_pngs() {
        let tmp = TempDir::new().unwrap();
        let results = ResultsDir::new(tmp.path().join("nested/results"));
        assert!(results.list_captures().unwrap().is_empty());

        results.write(&results.diff_path("b"), b"png").unwrap();
        results.write(&results.diff_path("a"), b"png").unwrap();
        results.write(&results.report_path("a"), b"{}").unwrap();

        let captures = results.list_captures().unwrap();
        assert_eq!(captures, vec![results.diff_path("a"), results.diff_path("b")]);
    }
}
