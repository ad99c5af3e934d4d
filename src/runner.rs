//! Scenario execution and run results.
//!
//! The runner executes a scenario's steps strictly in order against one
//! session. The first failing step stops the run: diagnostics are captured,
//! later steps are skipped, and the failure is returned in the
//! [`ScenarioResult`] together with the screenshot path and page URL.

use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::config;
use crate::diagnostics::{self, DiagnosticConfig, FailureContext};
use crate::driver::{BrowserBackend, DriverError, Locator};
use crate::harness::{HarnessError, HarnessResult, Scenario, Step};
use crate::session::{Session, SessionConfig, with_session};
use crate::wait::{ConditionKind, Waiter};

/// Details of the step that stopped a scenario
#[derive(Debug, Serialize)]
pub struct StepFailure {
    /// Zero-based index of the failing step
    pub step_index: usize,

    /// Human-readable step description
    pub description: String,

    /// Stable error tag (`wait_timeout`, `assertion_failure`, ...)
    pub kind: &'static str,

    /// The originating error
    #[serde(serialize_with = "serialize_error")]
    pub error: HarnessError,

    /// Screenshot taken after the failure, if capture succeeded
    pub screenshot_path: Option<PathBuf>,

    /// Page URL at the time of failure
    pub url: Option<String>,
}

fn serialize_error<S: Serializer>(error: &HarnessError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&error.to_string())
}

/// Result of one scenario run
#[derive(Debug, Serialize)]
pub struct ScenarioResult {
    pub scenario: String,

    /// Whether every step passed
    pub passed: bool,

    /// Steps executed, including the failing one
    pub steps_run: usize,

    pub total_steps: usize,

    pub duration_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
}

impl ScenarioResult {
    fn passed(scenario: &Scenario, duration: Duration) -> Self {
        Self {
            scenario: scenario.name.clone(),
            passed: true,
            steps_run: scenario.steps.len(),
            total_steps: scenario.steps.len(),
            duration_ms: duration_ms(duration),
            failure: None,
        }
    }

    fn failed(scenario: &Scenario, duration: Duration, failure: StepFailure) -> Self {
        Self {
            scenario: scenario.name.clone(),
            passed: false,
            steps_run: failure.step_index + 1,
            total_steps: scenario.steps.len(),
            duration_ms: duration_ms(duration),
            failure: Some(failure),
        }
    }

    /// The originating error for a failed run
    pub fn error(&self) -> Option<&HarnessError> {
        self.failure.as_ref().map(|f| &f.error)
    }

    pub fn screenshot_path(&self) -> Option<&PathBuf> {
        self.failure.as_ref().and_then(|f| f.screenshot_path.as_ref())
    }

    /// Convert into a `Result`, surfacing the originating error of a failed run
    pub fn into_result(self) -> HarnessResult<()> {
        match self.failure {
            None => Ok(()),
            Some(failure) => Err(failure.error),
        }
    }

    /// Panic with the failure report unless the scenario passed
    pub fn assert_passed(&self) {
        if !self.passed {
            panic!("{}", self);
        }
    }
}

impl fmt::Display for ScenarioResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            None => write!(
                f,
                "PASS {} ({}/{} steps, {} ms)",
                self.scenario, self.steps_run, self.total_steps, self.duration_ms
            ),
            Some(failure) => {
                writeln!(
                    f,
                    "FAIL {} at step {}/{}: {}",
                    self.scenario,
                    failure.step_index + 1,
                    self.total_steps,
                    failure.description
                )?;
                write!(f, "  error: {}", failure.error)?;
                if let Some(url) = &failure.url {
                    write!(f, "\n  url: {}", url)?;
                }
                if let Some(path) = &failure.screenshot_path {
                    write!(f, "\n  screenshot: {}", path.display())?;
                }
                Ok(())
            }
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`
pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Executes scenarios step by step
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    pub waiter: Waiter,

    /// Wait timeout for steps of scenarios that do not set their own
    pub timeout: Duration,

    pub diagnostics: DiagnosticConfig,
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self {
            waiter: Waiter::default(),
            timeout: Duration::from_secs(config::get().wait.timeout),
            diagnostics: DiagnosticConfig::default(),
        }
    }
}

impl ScenarioRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_waiter(mut self, waiter: Waiter) -> Self {
        self.waiter = waiter;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticConfig) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diagnostics.output_dir = dir.into();
        self
    }

    /// Run every step in order, stopping at the first failure
    pub fn run(&self, scenario: &Scenario, session: &mut Session) -> ScenarioResult {
        let started = Instant::now();
        let timeout = scenario.timeout_secs.map(Duration::from_secs).unwrap_or(self.timeout);
        info!(scenario = %scenario.name, steps = scenario.steps.len(), session = %session.id, "running scenario");

        for (index, step) in scenario.steps.iter().enumerate() {
            let description = step.describe();
            debug!(scenario = %scenario.name, step = index + 1, "{}", description);

            if let Err(error) = self.run_step(scenario, step, session, timeout) {
                warn!(
                    scenario = %scenario.name,
                    step = index + 1,
                    kind = error.kind(),
                    error = %error,
                    "step failed"
                );
                let failure = self.record_failure(scenario, index, description, error, session);
                return ScenarioResult::failed(scenario, started.elapsed(), failure);
            }
        }

        let result = ScenarioResult::passed(scenario, started.elapsed());
        info!(scenario = %scenario.name, duration_ms = result.duration_ms, "scenario passed");
        result
    }

    fn record_failure(
        &self,
        scenario: &Scenario,
        step_index: usize,
        description: String,
        error: HarnessError,
        session: &mut Session,
    ) -> StepFailure {
        let context = FailureContext {
            scenario: &scenario.name,
            step_index,
            step: &description,
            error: &error,
        };
        let captured = session
            .browser()
            .and_then(|browser| diagnostics::capture_failure(browser, &self.diagnostics, context));
        let (screenshot_path, url) = match captured {
            Ok(diagnostic) => (diagnostic.screenshot_path, diagnostic.url),
            Err(capture_err) => {
                warn!(scenario = %scenario.name, error = %capture_err, "diagnostic capture failed");
                (None, None)
            }
        };

        StepFailure {
            step_index,
            description,
            kind: error.kind(),
            error,
            screenshot_path,
            url,
        }
    }

    fn run_step(&self, scenario: &Scenario, step: &Step, session: &mut Session, timeout: Duration) -> HarnessResult<()> {
        match step {
            Step::Navigate { url } => {
                let base = scenario.base_url.clone().or_else(|| session.config().base_url.clone());
                let target = resolve_url(url, base.as_deref())?;
                session.browser()?.navigate(&target)?;
            }
            Step::Type { locator, text } => {
                let element = self.waiter.wait_for_element(session, locator, ConditionKind::Visible, timeout)?;
                let browser = session.browser()?;
                interact(locator, browser.clear(&element))?;
                interact(locator, browser.send_keys(&element, text))?;
            }
            Step::Click { locator } => {
                let element = self.waiter.wait_for_element(session, locator, ConditionKind::Clickable, timeout)?;
                interact(locator, session.browser()?.click(&element))?;
            }
            Step::AssertCondition {
                locator,
                condition,
                expected_text: None,
            } => {
                self.waiter.wait_for(session, locator, *condition, timeout)?;
            }
            Step::AssertCondition {
                locator,
                condition,
                expected_text: Some(expected),
            } => {
                self.waiter.wait_for_text(session, locator, *condition, expected, timeout)?;
            }
            Step::AssertAnyText { locator, text } => {
                self.waiter.wait_for_any_text(session, locator, text, timeout)?;
            }
            Step::AssertCount { locator, at_least } => {
                self.waiter.wait_for_count(session, locator, *at_least, timeout)?;
            }
            Step::AcceptAlert { expected_text } => {
                self.handle_alert(session, expected_text.as_deref(), timeout, true)?;
            }
            Step::DismissAlert { expected_text } => {
                self.handle_alert(session, expected_text.as_deref(), timeout, false)?;
            }
            Step::AssertAttribute { locator, name, expected } => {
                let element = self.waiter.wait_for_element(session, locator, ConditionKind::Present, timeout)?;
                let actual = session.browser()?.attribute(&element, name)?;
                if actual.as_deref() != Some(expected.as_str()) {
                    return Err(HarnessError::AssertionFailure {
                        expected: format!("{}[{}] == '{}'", locator, name, expected),
                        actual: actual.map(|v| format!("'{}'", v)).unwrap_or_else(|| "no attribute".to_string()),
                    });
                }
            }
            Step::AssertPageContains { text } => {
                let source = session.browser()?.page_source()?;
                if !contains_ignore_case(&source, text) {
                    return Err(HarnessError::AssertionFailure {
                        expected: format!("page containing '{}'", text),
                        actual: "text not found".to_string(),
                    });
                }
            }
            Step::AssertPageNotContains { text } => {
                let source = session.browser()?.page_source()?;
                if contains_ignore_case(&source, text) {
                    return Err(HarnessError::AssertionFailure {
                        expected: format!("page without '{}'", text),
                        actual: "text found".to_string(),
                    });
                }
            }
            Step::AssertTitleContains { text } => {
                self.waiter.wait_for_title(session, text, timeout)?;
            }
            Step::WaitForUrl { fragment } => {
                self.waiter.wait_for_url(session, fragment, timeout)?;
            }
            Step::Pause { millis } => thread::sleep(Duration::from_millis(*millis)),
        }
        Ok(())
    }

    /// Wait for an alert, check its text, then accept or dismiss it. A text
    /// mismatch leaves the alert open.
    fn handle_alert(
        &self,
        session: &mut Session,
        expected_text: Option<&str>,
        timeout: Duration,
        accept: bool,
    ) -> HarnessResult<()> {
        let text = self.waiter.wait_for_alert(session, timeout)?;
        if let Some(expected) = expected_text {
            if !text.contains(expected) {
                return Err(HarnessError::AssertionFailure {
                    expected: format!("alert with text containing '{}'", expected),
                    actual: format!("'{}'", text),
                });
            }
        }
        let browser = session.browser()?;
        if accept {
            browser.accept_alert()?;
        } else {
            browser.dismiss_alert()?;
        }
        debug!(alert = %text, accept, "alert handled");
        Ok(())
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Driver refusals of a click or keystroke become `ElementNotInteractable`
fn interact(locator: &Locator, outcome: Result<(), DriverError>) -> HarnessResult<()> {
    match outcome {
        Ok(()) => Ok(()),
        Err(DriverError::NotInteractable(reason)) => Err(HarnessError::ElementNotInteractable {
            locator: locator.clone(),
            reason,
        }),
        Err(err) => Err(HarnessError::Driver(err)),
    }
}

/// Absolute URLs pass through; relative ones are joined onto `base`
pub fn resolve_url(url: &str, base: Option<&str>) -> HarnessResult<String> {
    if Url::parse(url).is_ok() {
        return Ok(url.to_string());
    }
    let base = base.ok_or_else(|| {
        HarnessError::InvalidScenario(format!("relative url '{}' without a base url", url))
    })?;
    Url::parse(base)
        .and_then(|base| base.join(url))
        .map(String::from)
        .map_err(|err| HarnessError::InvalidScenario(format!("cannot join '{}' onto '{}': {}", url, base, err)))
}

/// Acquire a scoped session, run `scenario` and release the session.
///
/// Acquisition failure is returned as `Err`; step failures are reported in
/// the `ScenarioResult`.
pub fn run_scenario(
    session_config: &SessionConfig,
    scenario: &Scenario,
    runner: &ScenarioRunner,
) -> HarnessResult<ScenarioResult> {
    with_session(session_config, |session| Ok(runner.run(scenario, session)))
}
