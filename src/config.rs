//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for web-harness, supporting:
//! - Environment variables for all configurable values
//! - Sensible defaults for local headless runs
//! - Placeholder substitution for scenario URLs and credentials
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `WEB_HARNESS_BROWSER` | Browser to drive (`chrome` or `firefox`) | `chrome` |
//! | `WEB_HARNESS_DRIVER` | WebDriver binary to spawn | `chromedriver` / `geckodriver` |
//! | `WEB_HARNESS_DRIVER_PORT` | Fixed port for the spawned driver | any free port |
//! | `WEB_HARNESS_REMOTE_URL` | Existing WebDriver server (skips spawning) | unset |
//! | `WEB_HARNESS_HEADLESS` | Run the browser headless | `true` |
//! | `WEB_HARNESS_WINDOW_SIZE` | Window size preset or `WxH` | `desktop` |
//! | `WEB_HARNESS_IMPLICIT_WAIT_MS` | Driver implicit wait (ms) | `0` |
//! | `WEB_HARNESS_WAIT_TIMEOUT` | Default condition wait timeout (seconds) | `10` |
//! | `WEB_HARNESS_POLL_MS` | Condition polling interval (ms) | `250` |
//! | `WEB_HARNESS_STARTUP_TIMEOUT` | Driver readiness timeout (seconds) | `15` |
//! | `WEB_HARNESS_SCREENSHOT_DIR` | Directory for failure screenshots | `screenshots` |
//! | `WEB_HARNESS_BASE_URL` | Base URL for relative navigation | unset |
//!
//! # Example
//!
//! ```bash
//! # Reuse a Selenium server instead of spawning chromedriver
//! export WEB_HARNESS_REMOTE_URL="http://localhost:4444"
//! export WEB_HARNESS_HEADLESS=false
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::OnceLock;

// ============================================================================
// Default Values
// ============================================================================

/// Default browser
pub const DEFAULT_BROWSER: &str = "chrome";

/// Default headless flag
pub const DEFAULT_HEADLESS: bool = true;

/// Default window size preset
pub const DEFAULT_WINDOW_SIZE: &str = "desktop";

/// Default window width (pixels)
pub const DEFAULT_WINDOW_WIDTH: u32 = 1920;

/// Default window height (pixels)
pub const DEFAULT_WINDOW_HEIGHT: u32 = 1080;

/// Default implicit wait (milliseconds)
pub const DEFAULT_IMPLICIT_WAIT_MS: u64 = 0;

/// Default condition wait timeout (seconds)
pub const DEFAULT_WAIT_TIMEOUT: u64 = 10;

/// Default condition polling interval (milliseconds)
pub const DEFAULT_POLL_MS: u64 = 250;

/// Default driver startup timeout (seconds)
pub const DEFAULT_STARTUP_TIMEOUT: u64 = 15;

/// Default screenshot directory
pub const DEFAULT_SCREENSHOT_DIR: &str = "screenshots";

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_BROWSER: &str = "WEB_HARNESS_BROWSER";
pub const ENV_DRIVER: &str = "WEB_HARNESS_DRIVER";
pub const ENV_DRIVER_PORT: &str = "WEB_HARNESS_DRIVER_PORT";
pub const ENV_REMOTE_URL: &str = "WEB_HARNESS_REMOTE_URL";
pub const ENV_HEADLESS: &str = "WEB_HARNESS_HEADLESS";
pub const ENV_WINDOW_SIZE: &str = "WEB_HARNESS_WINDOW_SIZE";
pub const ENV_IMPLICIT_WAIT_MS: &str = "WEB_HARNESS_IMPLICIT_WAIT_MS";
pub const ENV_WAIT_TIMEOUT: &str = "WEB_HARNESS_WAIT_TIMEOUT";
pub const ENV_POLL_MS: &str = "WEB_HARNESS_POLL_MS";
pub const ENV_STARTUP_TIMEOUT: &str = "WEB_HARNESS_STARTUP_TIMEOUT";
pub const ENV_SCREENSHOT_DIR: &str = "WEB_HARNESS_SCREENSHOT_DIR";
pub const ENV_BASE_URL: &str = "WEB_HARNESS_BASE_URL";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Browser family, which decides the driver binary and capability keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    Chrome,
    Firefox,
}

impl BrowserKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "chrome" | "chromium" => Some(BrowserKind::Chrome),
            "firefox" | "gecko" => Some(BrowserKind::Firefox),
            _ => None,
        }
    }

    /// Driver binary looked up on `PATH` when none is configured
    pub fn default_driver(&self) -> &'static str {
        match self {
            BrowserKind::Chrome => "chromedriver",
            BrowserKind::Firefox => "geckodriver",
        }
    }

    /// W3C `browserName` capability
    pub fn browser_name(&self) -> &'static str {
        match self {
            BrowserKind::Chrome => "chrome",
            BrowserKind::Firefox => "firefox",
        }
    }

    /// Port argument(s) understood by the driver binary
    pub fn port_args(&self, port: u16) -> Vec<String> {
        match self {
            BrowserKind::Chrome => vec![format!("--port={}", port)],
            BrowserKind::Firefox => vec!["--port".to_string(), port.to_string()],
        }
    }
}

impl Default for BrowserKind {
    fn default() -> Self {
        BrowserKind::Chrome
    }
}

/// Centralized configuration for web-harness
#[derive(Debug, Clone)]
pub struct Config {
    pub driver: DriverSettings,
    pub browser: BrowserSettings,
    pub wait: WaitSettings,
    pub output: OutputSettings,
}

/// Where the WebDriver server comes from
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub browser: BrowserKind,
    /// Driver binary path or name; `None` uses the browser's default driver
    pub binary: Option<String>,
    /// Fixed port, `None` picks a free one
    pub port: Option<u16>,
    /// Existing server to connect to instead of spawning
    pub remote_url: Option<String>,
    /// Seconds to wait for the driver to report ready
    pub startup_timeout: u64,
}

/// Browser window options
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub implicit_wait_ms: u64,
    pub base_url: Option<String>,
}

/// Condition waiter defaults
#[derive(Debug, Clone)]
pub struct WaitSettings {
    /// Seconds
    pub timeout: u64,
    /// Milliseconds
    pub poll_interval: u64,
}

/// Diagnostic output
#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub screenshot_dir: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Create configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let browser = lookup(ENV_BROWSER)
            .and_then(|s| BrowserKind::parse(&s))
            .unwrap_or_default();
        let (window_width, window_height) = lookup(ENV_WINDOW_SIZE)
            .and_then(|s| parse_window_size(&s))
            .unwrap_or((DEFAULT_WINDOW_WIDTH, DEFAULT_WINDOW_HEIGHT));

        Self {
            driver: DriverSettings {
                browser,
                binary: lookup(ENV_DRIVER).filter(|s| !s.trim().is_empty()),
                port: lookup(ENV_DRIVER_PORT).and_then(|s| s.trim().parse().ok()),
                remote_url: lookup(ENV_REMOTE_URL).filter(|s| !s.trim().is_empty()),
                startup_timeout: parse_or(lookup(ENV_STARTUP_TIMEOUT), DEFAULT_STARTUP_TIMEOUT),
            },
            browser: BrowserSettings {
                headless: lookup(ENV_HEADLESS)
                    .and_then(|s| parse_bool(&s))
                    .unwrap_or(DEFAULT_HEADLESS),
                window_width,
                window_height,
                implicit_wait_ms: parse_or(lookup(ENV_IMPLICIT_WAIT_MS), DEFAULT_IMPLICIT_WAIT_MS),
                base_url: lookup(ENV_BASE_URL).filter(|s| !s.trim().is_empty()),
            },
            wait: WaitSettings {
                timeout: parse_or(lookup(ENV_WAIT_TIMEOUT), DEFAULT_WAIT_TIMEOUT),
                poll_interval: parse_or(lookup(ENV_POLL_MS), DEFAULT_POLL_MS),
            },
            output: OutputSettings {
                screenshot_dir: lookup(ENV_SCREENSHOT_DIR)
                    .unwrap_or_else(|| DEFAULT_SCREENSHOT_DIR.to_string()),
            },
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

/// Parse a boolean flag the way CI environments tend to spell it
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a window size string into (width, height)
/// Supports: "desktop" (1920x1080), "laptop" (1366x768), "tablet" (768x1024),
/// "mobile" (375x812), or "WxH" / "W,H"
pub fn parse_window_size(size: &str) -> Option<(u32, u32)> {
    match size.trim().to_lowercase().as_str() {
        "desktop" => Some((1920, 1080)),
        "laptop" => Some((1366, 768)),
        "tablet" => Some((768, 1024)),
        "mobile" => Some((375, 812)),
        custom => {
            let parts: Vec<&str> = custom.split(['x', ',']).collect();
            if parts.len() == 2 {
                let w: u32 = parts[0].trim().parse().ok()?;
                let h: u32 = parts[1].trim().parse().ok()?;
                if w == 0 || h == 0 {
                    return None;
                }
                Some((w, h))
            } else {
                None
            }
        }
    }
}

/// Read a named variable, substituting the documented default when unset
pub fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("placeholder pattern")
});

/// Expand `${NAME}` and `${NAME:-default}` placeholders from the environment.
/// Unset variables without a default expand to an empty string.
pub fn expand_env(template: &str) -> String {
    expand_with(template, |name| env::var(name).ok())
}

/// Placeholder expansion against an arbitrary variable source
pub fn expand_with<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            lookup(&caps[1])
                .or_else(|| caps.get(2).map(|m| m.as_str().to_string()))
                .unwrap_or_default()
        })
        .into_owned()
}
