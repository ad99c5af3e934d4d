//! Web Harness - browser-driven UI action and assertion scenarios.
//!
//! This crate provides:
//! - Scoped browser sessions over the W3C WebDriver protocol, released on every exit path
//! - Condition waits (present, visible, clickable, invisible, disabled state) with timeouts
//! - A scenario runner that stops at the first failing step and captures a screenshot
//! - A multi-scenario harness with one session per scenario
//! - `MockBrowser` for testing without a browser
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use web_harness::{ConditionKind, Locator, Scenario, ScenarioRunner, SessionConfig, Step, run_scenario};
//!
//! let scenario = Scenario::new("login")
//!     .base_url("http://localhost:8000")
//!     .step(Step::navigate("/login"))
//!     .step(Step::type_text(Locator::id("email"), "a@b.com"))
//!     .step(Step::type_text(Locator::id("password"), "secret"))
//!     .step(Step::click(Locator::text("Log in")))
//!     .step(Step::assert_condition(Locator::text("Dashboard"), ConditionKind::Visible))
//!     .timeout(Duration::from_secs(10));
//!
//! let config = SessionConfig::new().headless(true).window_size(1920, 1080);
//! let result = run_scenario(&config, &scenario, &ScenarioRunner::new()).unwrap();
//! result.assert_passed();
//! ```

pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod harness;
pub mod runner;
pub mod session;
pub mod wait;

// Re-export harness types
pub use harness::{HarnessConfig, HarnessError, HarnessResult, Scenario, Step, run_harness, run_harness_with};

// Re-export runner types
pub use runner::{ScenarioResult, ScenarioRunner, StepFailure, run_scenario};

// Re-export session management
pub use session::{Session, SessionConfig, with_backend_session, with_session};

// Re-export waits
pub use wait::{ConditionKind, MatchPolicy, Waiter, wait_for};

// Re-export driver boundary
pub use driver::{
    BrowserBackend, DriverError, DriverResult, ElementHandle, Locator, MockBrowser, MockElement, MockPage,
    Strategy, WebDriverBackend, WebDriverClient,
};

// Re-export diagnostics
pub use diagnostics::{DiagnosticConfig, Diagnostic, cleanup_old_screenshots, list_screenshots};
