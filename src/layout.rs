// Output layout for screenshots and exported reports
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_REPORTS_DIR: &str = "reports";

/// `reports/{screenshots,json,html}` under a configurable root
#[derive(Debug, Clone)]
pub struct ReportLayout {
    root: PathBuf,
}

impl ReportLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.root.join("screenshots")
    }

    pub fn json_dir(&self) -> PathBuf {
        self.root.join("json")
    }

    pub fn html_dir(&self) -> PathBuf {
        self.root.join("html")
    }

    /// Create every directory. Safe to call repeatedly.
    pub fn ensure(&self) -> Result<()> {
        for dir in [self.screenshots_dir(), self.json_dir(), self.html_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn screenshot_path(&self, error_count: usize, at: DateTime<Local>) -> PathBuf {
        self.screenshots_dir()
            .join(format!("error_{}_{}.png", error_count, file_stamp(at)))
    }

    pub fn json_report_path(&self, at: DateTime<Local>) -> PathBuf {
        self.json_dir().join(format!("report_{}.json", file_stamp(at)))
    }

    pub fn html_report_path(&self, at: DateTime<Local>) -> PathBuf {
        self.html_dir().join(format!("report_{}.html", file_stamp(at)))
    }
}

impl Default for ReportLayout {
    fn default() -> Self {
        Self::new(DEFAULT_REPORTS_DIR)
    }
}

/// `YYYYMMDD_HHMMSS`. Two artifacts in the same second share a name.
pub fn file_stamp(at: DateTime<Local>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}
