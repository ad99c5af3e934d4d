use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::config;
use crate::driver::{DriverError, Locator};
use crate::runner::ScenarioRunner;
use crate::session::SessionConfig;
use crate::wait::ConditionKind;

/// A single UI action or assertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Load a URL; relative URLs are joined onto the base URL
    Navigate { url: String },

    /// Wait for the field to be visible, clear it and type `text`
    Type { locator: Locator, text: String },

    /// Wait for the element to be clickable and click it
    Click { locator: Locator },

    /// Wait for a condition; with `expected_text`, also wait for the element
    /// text to contain it
    AssertCondition {
        locator: Locator,
        condition: ConditionKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_text: Option<String>,
    },

    /// Compare an attribute value once the element is present
    AssertAttribute {
        locator: Locator,
        name: String,
        expected: String,
    },

    /// Wait until some element matched by `locator` has text containing `text`
    AssertAnyText { locator: Locator, text: String },

    /// Wait until at least `at_least` elements match
    AssertCount { locator: Locator, at_least: usize },

    /// Wait for a JavaScript alert, check its text and accept it
    AcceptAlert {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_text: Option<String>,
    },

    /// Wait for a JavaScript alert, check its text and dismiss it
    DismissAlert {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_text: Option<String>,
    },

    /// Case-insensitive search of the page source
    AssertPageContains { text: String },

    AssertPageNotContains { text: String },

    AssertTitleContains { text: String },

    /// Wait until the current URL contains `fragment`
    WaitForUrl { fragment: String },

    /// Fixed sleep for page transitions
    Pause { millis: u64 },
}

impl Step {
    pub fn navigate(url: impl Into<String>) -> Self {
        Step::Navigate { url: url.into() }
    }

    pub fn type_text(locator: Locator, text: impl Into<String>) -> Self {
        Step::Type {
            locator,
            text: text.into(),
        }
    }

    pub fn click(locator: Locator) -> Self {
        Step::Click { locator }
    }

    pub fn assert_condition(locator: Locator, condition: ConditionKind) -> Self {
        Step::AssertCondition {
            locator,
            condition,
            expected_text: None,
        }
    }

    pub fn assert_text(locator: Locator, condition: ConditionKind, expected_text: impl Into<String>) -> Self {
        Step::AssertCondition {
            locator,
            condition,
            expected_text: Some(expected_text.into()),
        }
    }

    pub fn assert_attribute(locator: Locator, name: impl Into<String>, expected: impl Into<String>) -> Self {
        Step::AssertAttribute {
            locator,
            name: name.into(),
            expected: expected.into(),
        }
    }

    pub fn assert_any_text(locator: Locator, text: impl Into<String>) -> Self {
        Step::AssertAnyText {
            locator,
            text: text.into(),
        }
    }

    pub fn assert_count(locator: Locator, at_least: usize) -> Self {
        Step::AssertCount { locator, at_least }
    }

    pub fn accept_alert() -> Self {
        Step::AcceptAlert { expected_text: None }
    }

    /// Accept an alert whose text contains `expected_text`
    pub fn accept_alert_with(expected_text: impl Into<String>) -> Self {
        Step::AcceptAlert {
            expected_text: Some(expected_text.into()),
        }
    }

    pub fn dismiss_alert() -> Self {
        Step::DismissAlert { expected_text: None }
    }

    pub fn assert_page_contains(text: impl Into<String>) -> Self {
        Step::AssertPageContains { text: text.into() }
    }

    pub fn assert_page_not_contains(text: impl Into<String>) -> Self {
        Step::AssertPageNotContains { text: text.into() }
    }

    pub fn assert_title_contains(text: impl Into<String>) -> Self {
        Step::AssertTitleContains { text: text.into() }
    }

    pub fn wait_for_url(fragment: impl Into<String>) -> Self {
        Step::WaitForUrl {
            fragment: fragment.into(),
        }
    }

    pub fn pause(duration: Duration) -> Self {
        Step::Pause {
            millis: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// One-line description used in logs and failure reports. Typed text is
    /// reduced to its length, since it often carries credentials.
    pub fn describe(&self) -> String {
        match self {
            Step::Navigate { url } => format!("navigate {}", url),
            Step::Type { locator, text } => format!("type {} chars into {}", text.chars().count(), locator),
            Step::Click { locator } => format!("click {}", locator),
            Step::AssertCondition {
                locator,
                condition,
                expected_text: Some(text),
            } => format!("assert {} is {} with text '{}'", locator, condition, text),
            Step::AssertCondition { locator, condition, .. } => format!("assert {} is {}", locator, condition),
            Step::AssertAttribute { locator, name, expected } => {
                format!("assert {}[{}] == '{}'", locator, name, expected)
            }
            Step::AssertAnyText { locator, text } => format!("assert any {} has text '{}'", locator, text),
            Step::AssertCount { locator, at_least } => {
                format!("assert at least {} elements match {}", at_least, locator)
            }
            Step::AcceptAlert { expected_text } => alert_description("accept", expected_text),
            Step::DismissAlert { expected_text } => alert_description("dismiss", expected_text),
            Step::AssertPageContains { text } => format!("assert page contains '{}'", text),
            Step::AssertPageNotContains { text } => format!("assert page does not contain '{}'", text),
            Step::AssertTitleContains { text } => format!("assert title contains '{}'", text),
            Step::WaitForUrl { fragment } => format!("wait for url containing '{}'", fragment),
            Step::Pause { millis } => format!("pause {}ms", millis),
        }
    }

    fn expand_with<F>(self, lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let ex = |s: String| config::expand_with(&s, lookup);
        let exl = |l: Locator| Locator::new(l.by, config::expand_with(&l.value, lookup));
        match self {
            Step::Navigate { url } => Step::Navigate { url: ex(url) },
            Step::Type { locator, text } => Step::Type {
                locator: exl(locator),
                text: ex(text),
            },
            Step::Click { locator } => Step::Click { locator: exl(locator) },
            Step::AssertCondition {
                locator,
                condition,
                expected_text,
            } => Step::AssertCondition {
                locator: exl(locator),
                condition,
                expected_text: expected_text.map(ex),
            },
            Step::AssertAttribute { locator, name, expected } => Step::AssertAttribute {
                locator: exl(locator),
                name,
                expected: ex(expected),
            },
            Step::AssertAnyText { locator, text } => Step::AssertAnyText {
                locator: exl(locator),
                text: ex(text),
            },
            Step::AssertCount { locator, at_least } => Step::AssertCount {
                locator: exl(locator),
                at_least,
            },
            Step::AcceptAlert { expected_text } => Step::AcceptAlert {
                expected_text: expected_text.map(ex),
            },
            Step::DismissAlert { expected_text } => Step::DismissAlert {
                expected_text: expected_text.map(ex),
            },
            Step::AssertPageContains { text } => Step::AssertPageContains { text: ex(text) },
            Step::AssertPageNotContains { text } => Step::AssertPageNotContains { text: ex(text) },
            Step::AssertTitleContains { text } => Step::AssertTitleContains { text: ex(text) },
            Step::WaitForUrl { fragment } => Step::WaitForUrl { fragment: ex(fragment) },
            Step::Pause { millis } => Step::Pause { millis },
        }
    }
}

fn alert_description(verb: &str, expected_text: &Option<String>) -> String {
    match expected_text {
        Some(text) => format!("{} alert with text '{}'", verb, text),
        None => format!("{} alert", verb),
    }
}

/// An ordered list of UI actions and assertions executed against one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Name used in reports and screenshot filenames
    pub name: String,

    /// Base for relative `navigate` URLs; falls back to the session's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Per-scenario wait timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: None,
            timeout_secs: None,
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    /// Parse a scenario, expanding `${VAR:-default}` placeholders from the environment
    pub fn from_json(json: &str) -> HarnessResult<Self> {
        let scenario: Scenario = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario.expand_with(&|name: &str| std::env::var(name).ok()))
    }

    /// Load a scenario file. The file may hold one scenario or an array of them.
    pub fn load_file(path: &Path) -> HarnessResult<Vec<Self>> {
        let text = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        let raw: Vec<Scenario> = if value.is_array() {
            serde_json::from_value(value)?
        } else {
            vec![serde_json::from_value(value)?]
        };
        let lookup = |name: &str| std::env::var(name).ok();
        raw.into_iter()
            .map(|s| {
                s.validate()?;
                Ok(s.expand_with(&lookup))
            })
            .collect()
    }

    /// Substitute placeholders in every string field
    pub fn expand_with<F>(self, lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            name: self.name,
            base_url: self.base_url.map(|u| config::expand_with(&u, lookup)),
            timeout_secs: self.timeout_secs,
            steps: self.steps.into_iter().map(|s| s.expand_with(lookup)).collect(),
        }
    }

    fn validate(&self) -> HarnessResult<()> {
        if self.name.trim().is_empty() {
            return Err(HarnessError::InvalidScenario("scenario name is empty".to_string()));
        }
        Ok(())
    }
}

/// Configuration for a multi-scenario harness run
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Options for the session each scenario acquires
    pub session: SessionConfig,

    pub runner: ScenarioRunner,

    /// Scenarios to run, in report order
    pub scenarios: Vec<Scenario>,

    /// Number of scenarios run concurrently
    pub jobs: usize,
}

impl HarnessConfig {
    pub fn new(scenarios: Vec<Scenario>) -> Self {
        Self {
            session: SessionConfig::default(),
            runner: ScenarioRunner::default(),
            scenarios,
            jobs: 1,
        }
    }

    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn runner(mut self, runner: ScenarioRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Error types for harness operations
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Browser or driver could not be started; fatal for the scenario
    #[error("session acquisition failed: {0}")]
    SessionAcquisition(#[source] DriverError),

    /// Expected UI condition did not materialize in time
    #[error(
        "timed out after {elapsed:?} waiting for {locator} to be {condition}{}",
        text_clause(.expected_text)
    )]
    WaitTimeout {
        locator: Locator,
        condition: ConditionKind,
        /// Text the element had to contain, for text waits
        expected_text: Option<String>,
        elapsed: Duration,
    },

    /// Page-level expectation (URL, title) did not materialize in time
    #[error("timed out after {elapsed:?} waiting for {expectation} (last seen '{last_seen}')")]
    PageWaitTimeout {
        expectation: String,
        last_seen: String,
        elapsed: Duration,
    },

    /// Observed state did not match the expected value
    #[error("assertion failed: expected {expected}, got {actual}")]
    AssertionFailure { expected: String, actual: String },

    /// Element located but not in a clickable or editable state
    #[error("element {locator} not interactable: {reason}")]
    ElementNotInteractable { locator: Locator, reason: String },

    #[error("locator {locator} matched {count} elements, expected exactly one")]
    AmbiguousLocator { locator: Locator, count: usize },

    #[error("session already released")]
    SessionClosed,

    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    /// Infrastructure failure talking to the browser mid-scenario
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

fn text_clause(expected_text: &Option<String>) -> String {
    match expected_text {
        Some(text) => format!(" with text containing '{}'", text),
        None => String::new(),
    }
}

impl HarnessError {
    /// Stable tag for reports
    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::SessionAcquisition(_) => "session_acquisition",
            HarnessError::WaitTimeout { .. } | HarnessError::PageWaitTimeout { .. } => "wait_timeout",
            HarnessError::AssertionFailure { .. } => "assertion_failure",
            HarnessError::ElementNotInteractable { .. } => "element_not_interactable",
            HarnessError::AmbiguousLocator { .. } => "ambiguous_locator",
            HarnessError::SessionClosed => "session_closed",
            HarnessError::InvalidScenario(_) => "invalid_scenario",
            HarnessError::Driver(_) => "driver",
            HarnessError::Io(_) => "io",
            HarnessError::Json(_) => "serialization",
        }
    }

    /// Whether the failure reflects the application's behavior rather than
    /// the test infrastructure
    pub fn is_behavioral(&self) -> bool {
        matches!(
            self,
            HarnessError::WaitTimeout { .. }
                | HarnessError::PageWaitTimeout { .. }
                | HarnessError::AssertionFailure { .. }
                | HarnessError::ElementNotInteractable { .. }
                | HarnessError::AmbiguousLocator { .. }
        )
    }
}
