//! Failure diagnostics.
//!
//! When a scenario step fails, the runner records what the browser looked
//! like: a screenshot named `{scenario}_{timestamp}.png`, a JSON manifest with
//! the page state and the error, and optionally the page source. Capture is
//! best effort: a browser that can no longer answer still gets a manifest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::config;
use crate::driver::BrowserBackend;
use crate::harness::{HarnessError, HarnessResult};

/// Configuration for failure capture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticConfig {
    /// Directory where screenshots will be saved
    pub output_dir: PathBuf,

    /// Whether to write a JSON manifest next to the screenshot
    pub include_manifest: bool,

    /// Whether to save the page source as `.html`
    pub include_page_source: bool,
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(&config::get().output.screenshot_dir),
            include_manifest: true,
            include_page_source: true,
        }
    }
}

impl DiagnosticConfig {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: dir.into(),
            ..Default::default()
        }
    }
}

/// What was captured for one failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub screenshot_path: Option<PathBuf>,
    pub manifest_path: Option<PathBuf>,
    pub page_source_path: Option<PathBuf>,
    pub url: Option<String>,
    pub title: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

/// Details of the failing step recorded in the manifest
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    pub scenario: &'a str,
    pub step_index: usize,
    pub step: &'a str,
    pub error: &'a HarnessError,
}

/// Generate a timestamp string in YYYYMMDD_HHMMSS format
pub fn generate_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Sanitize a name for use in filenames
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    if cleaned.is_empty() { "scenario".to_string() } else { cleaned }
}

/// `{scenario}_{timestamp}`, suffixed with a counter if that screenshot exists
fn unique_stem(dir: &Path, scenario: &str, timestamp: &str) -> String {
    let base = format!("{}_{}", sanitize_name(scenario), timestamp);
    if !dir.join(format!("{}.png", base)).exists() {
        return base;
    }
    (2..)
        .map(|n| format!("{}_{}", base, n))
        .find(|stem| !dir.join(format!("{}.png", stem)).exists())
        .unwrap_or(base)
}

/// Capture the browser state after a failed step
pub fn capture_failure(
    browser: &mut dyn BrowserBackend,
    config: &DiagnosticConfig,
    failure: FailureContext<'_>,
) -> HarnessResult<Diagnostic> {
    fs::create_dir_all(&config.output_dir)?;

    let timestamp = Utc::now();
    let stem = unique_stem(&config.output_dir, failure.scenario, &timestamp.format("%Y%m%d_%H%M%S").to_string());

    let mut dimensions = None;
    let screenshot_path = match browser.screenshot() {
        Ok(png) => {
            let path = config.output_dir.join(format!("{}.png", stem));
            let saved = write_artifact(&path, &png, failure.scenario);
            if saved.is_some() {
                dimensions = png_dimensions(&png);
                debug!(path = %path.display(), "failure screenshot saved");
            }
            saved
        }
        Err(err) => {
            warn!(scenario = failure.scenario, error = %err, "screenshot capture failed");
            None
        }
    };

    let url = browser.current_url().ok();
    let title = browser.title().ok();

    let page_source_path = if config.include_page_source {
        match browser.page_source() {
            Ok(source) => {
                let path = config.output_dir.join(format!("{}.html", stem));
                write_artifact(&path, source.as_bytes(), failure.scenario)
            }
            Err(err) => {
                warn!(scenario = failure.scenario, error = %err, "page source capture failed");
                None
            }
        }
    } else {
        None
    };

    let manifest_path = if config.include_manifest {
        let path = config.output_dir.join(format!("{}.json", stem));
        let manifest = serde_json::json!({
            "scenario": failure.scenario,
            "step": failure.step_index + 1,
            "step_description": failure.step,
            "error": failure.error.to_string(),
            "error_kind": failure.error.kind(),
            "url": url,
            "title": title,
            "source": browser.source_type(),
            "width": dimensions.map(|(w, _)| w),
            "height": dimensions.map(|(_, h)| h),
            "host": hostname::get().ok().map(|h| h.to_string_lossy().to_string()),
            "timestamp": timestamp.to_rfc3339(),
            "screenshot": screenshot_path,
            "page_source": page_source_path,
        });
        fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;
        Some(path)
    } else {
        None
    };

    Ok(Diagnostic {
        screenshot_path,
        manifest_path,
        page_source_path,
        url,
        title,
        timestamp,
    })
}

/// Write one capture file; a failed write is logged and skipped
fn write_artifact(path: &Path, contents: &[u8], scenario: &str) -> Option<PathBuf> {
    match fs::write(path, contents) {
        Ok(()) => Some(path.to_path_buf()),
        Err(err) => {
            warn!(scenario, path = %path.display(), error = %err, "diagnostic write failed");
            None
        }
    }
}

fn png_dimensions(png: &[u8]) -> Option<(u32, u32)> {
    image::io::Reader::with_format(Cursor::new(png), image::ImageFormat::Png)
        .into_dimensions()
        .ok()
}

/// List all PNG screenshots in a directory, sorted by name
pub fn list_screenshots(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut captures = Vec::new();
    if dir.exists() {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "png").unwrap_or(false) {
                captures.push(path);
            }
        }
    }
    captures.sort();
    Ok(captures)
}

/// Delete diagnostics (`.png`, `.json`, `.html`) older than `max_age`.
/// Returns the number of files removed.
pub fn cleanup_old_screenshots(dir: &Path, max_age: std::time::Duration) -> std::io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let mut cleaned = 0;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_diagnostic = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e, "png" | "json" | "html"))
            .unwrap_or(false);
        if !is_diagnostic {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if let Some(age) = age {
            if age > max_age && fs::remove_file(&path).is_ok() {
                cleaned += 1;
            }
        }
    }

    Ok(cleaned)
}
