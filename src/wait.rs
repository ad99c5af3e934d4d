//! Condition waiter.
//!
//! Turns eventually-consistent UI state into a synchronous check: the probe is
//! evaluated at a fixed interval until it holds or the timeout elapses. The
//! probe always runs at least once, so a zero timeout checks exactly once.
//!
//! While polling, "no such element" and "stale element" answers from the
//! driver mean "not yet". Any other driver failure ends the wait at once.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::config;
use crate::driver::{BrowserBackend, DriverError, ElementHandle, Locator};
use crate::harness::{HarnessError, HarnessResult};
use crate::session::Session;

/// Predicate over an element's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// At least one element matches
    Present,
    /// Matched element is displayed
    Visible,
    /// Matched element is displayed and enabled
    Clickable,
    /// Nothing matches, or the match is not displayed
    Invisible,
    /// Matched element reports enabled
    Enabled,
    /// `disabled` attribute set
    DisabledAttribute,
    /// `disabled` token in the class list
    DisabledClass,
    /// `readonly` attribute set
    ReadOnly,
}

impl ConditionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionKind::Present => "present",
            ConditionKind::Visible => "visible",
            ConditionKind::Clickable => "clickable",
            ConditionKind::Invisible => "invisible",
            ConditionKind::Enabled => "enabled",
            ConditionKind::DisabledAttribute => "disabled_attribute",
            ConditionKind::DisabledClass => "disabled_class",
            ConditionKind::ReadOnly => "read_only",
        }
    }

    /// Evaluate against one element
    pub fn holds(&self, browser: &mut dyn BrowserBackend, element: &ElementHandle) -> Result<bool, DriverError> {
        Ok(match self {
            ConditionKind::Present => true,
            ConditionKind::Visible => browser.is_displayed(element)?,
            ConditionKind::Clickable => browser.is_displayed(element)? && browser.is_enabled(element)?,
            ConditionKind::Invisible => !browser.is_displayed(element)?,
            ConditionKind::Enabled => browser.is_enabled(element)?,
            ConditionKind::DisabledAttribute => flag_set(browser.attribute(element, "disabled")?),
            ConditionKind::DisabledClass => browser
                .attribute(element, "class")?
                .map(|classes| classes.split_whitespace().any(|c| c == "disabled"))
                .unwrap_or(false),
            ConditionKind::ReadOnly => flag_set(browser.attribute(element, "readonly")?),
        })
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean attributes come back as "true", "", or the attribute name
fn flag_set(value: Option<String>) -> bool {
    value.map(|v| !v.eq_ignore_ascii_case("false")).unwrap_or(false)
}

/// What to do when a locator matches more than one element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Evaluate the first match in document order
    #[default]
    First,
    /// Fail with `AmbiguousLocator` unless exactly one element matches
    Unique,
}

/// Default polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(config::DEFAULT_POLL_MS);

/// Polling parameters shared by every wait
#[derive(Debug, Clone, Copy)]
pub struct Waiter {
    pub poll_interval: Duration,
    pub policy: MatchPolicy,
}

impl Default for Waiter {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(config::get().wait.poll_interval),
            policy: MatchPolicy::First,
        }
    }
}

impl Waiter {
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            policy: MatchPolicy::First,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Poll until `condition` holds for the element matched by `locator`.
    ///
    /// Returns `Some(handle)` for every condition except `Invisible`, which
    /// returns `None` when nothing matches at all.
    pub fn wait_for(
        &self,
        session: &mut Session,
        locator: &Locator,
        condition: ConditionKind,
        timeout: Duration,
    ) -> HarnessResult<Option<ElementHandle>> {
        let browser = session.browser()?;
        let policy = self.policy;
        let outcome = poll(timeout, self.poll_interval, || {
            probe_element(browser, locator, condition, policy)
        });
        match outcome {
            Ok(found) => {
                debug!(%locator, %condition, "condition met");
                Ok(found)
            }
            Err(PollError::Elapsed(elapsed)) => Err(HarnessError::WaitTimeout {
                locator: locator.clone(),
                condition,
                expected_text: None,
                elapsed,
            }),
            Err(PollError::Failed(err)) => Err(err),
        }
    }

    /// Poll until `condition` holds for the matched element and its rendered
    /// text contains `expected`. Both are checked on every attempt, so text
    /// that renders after the element appears is still picked up.
    pub fn wait_for_text(
        &self,
        session: &mut Session,
        locator: &Locator,
        condition: ConditionKind,
        expected: &str,
        timeout: Duration,
    ) -> HarnessResult<ElementHandle> {
        let browser = session.browser()?;
        let policy = self.policy;
        let mut last_text = None;
        let outcome = poll(timeout, self.poll_interval, || {
            // Absence satisfies `Invisible` but leaves no text to match
            let Some(Some(element)) = probe_element(browser, locator, condition, policy)? else {
                return Ok(None);
            };
            match browser.text(&element) {
                Ok(text) if text.contains(expected) => Ok(Some(element)),
                Ok(text) => {
                    last_text = Some(text);
                    Ok(None)
                }
                Err(err) if err.is_transient() => Ok(None),
                Err(err) => Err(HarnessError::Driver(err)),
            }
        });
        match outcome {
            Ok(element) => {
                debug!(%locator, %condition, expected, "text present");
                Ok(element)
            }
            Err(PollError::Elapsed(elapsed)) => {
                debug!(%locator, last_text = ?last_text, "text never matched");
                Err(HarnessError::WaitTimeout {
                    locator: locator.clone(),
                    condition,
                    expected_text: Some(expected.to_string()),
                    elapsed,
                })
            }
            Err(PollError::Failed(err)) => Err(err),
        }
    }

    /// Poll until at least one element matches, then return every match in
    /// document order
    pub fn wait_for_all(
        &self,
        session: &mut Session,
        locator: &Locator,
        timeout: Duration,
    ) -> HarnessResult<Vec<ElementHandle>> {
        let browser = session.browser()?;
        let outcome = poll(timeout, self.poll_interval, || match browser.find_elements(locator) {
            Ok(elements) if !elements.is_empty() => Ok(Some(elements)),
            Ok(_) => Ok(None),
            Err(err) if err.is_transient() => Ok(None),
            Err(err) => Err(HarnessError::Driver(err)),
        });
        match outcome {
            Ok(elements) => Ok(elements),
            Err(PollError::Elapsed(elapsed)) => Err(HarnessError::WaitTimeout {
                locator: locator.clone(),
                condition: ConditionKind::Present,
                expected_text: None,
                elapsed,
            }),
            Err(PollError::Failed(err)) => Err(err),
        }
    }

    /// Poll until any element matched by `locator` has text containing
    /// `expected`.
    ///
    /// Times out with `WaitTimeout` when nothing ever matched, and with
    /// `AssertionFailure` listing the texts seen when matches existed but none
    /// carried the text.
    pub fn wait_for_any_text(
        &self,
        session: &mut Session,
        locator: &Locator,
        expected: &str,
        timeout: Duration,
    ) -> HarnessResult<ElementHandle> {
        let browser = session.browser()?;
        let mut seen: Vec<String> = Vec::new();
        let outcome = poll(timeout, self.poll_interval, || {
            let elements = match browser.find_elements(locator) {
                Ok(elements) => elements,
                Err(err) if err.is_transient() => return Ok(None),
                Err(err) => return Err(HarnessError::Driver(err)),
            };
            let mut texts = Vec::with_capacity(elements.len());
            for element in elements {
                match browser.text(&element) {
                    Ok(text) if text.contains(expected) => return Ok(Some(element)),
                    Ok(text) => texts.push(text),
                    // Row re-rendered mid-scan; the next attempt sees the new one
                    Err(err) if err.is_transient() => {}
                    Err(err) => return Err(HarnessError::Driver(err)),
                }
            }
            seen = texts;
            Ok(None)
        });
        match outcome {
            Ok(element) => Ok(element),
            Err(PollError::Elapsed(elapsed)) if seen.is_empty() => Err(HarnessError::WaitTimeout {
                locator: locator.clone(),
                condition: ConditionKind::Present,
                expected_text: Some(expected.to_string()),
                elapsed,
            }),
            Err(PollError::Elapsed(_)) => Err(HarnessError::AssertionFailure {
                expected: format!("an element matching {} with text containing '{}'", locator, expected),
                actual: format!("texts {:?}", seen),
            }),
            Err(PollError::Failed(err)) => Err(err),
        }
    }

    /// Poll until at least `at_least` elements match; returns the final count
    pub fn wait_for_count(
        &self,
        session: &mut Session,
        locator: &Locator,
        at_least: usize,
        timeout: Duration,
    ) -> HarnessResult<usize> {
        let browser = session.browser()?;
        let mut last_count = 0;
        let outcome = poll(timeout, self.poll_interval, || match browser.find_elements(locator) {
            Ok(elements) if elements.len() >= at_least => Ok(Some(elements.len())),
            Ok(elements) => {
                last_count = elements.len();
                Ok(None)
            }
            Err(err) if err.is_transient() => Ok(None),
            Err(err) => Err(HarnessError::Driver(err)),
        });
        match outcome {
            Ok(count) => Ok(count),
            Err(PollError::Elapsed(_)) => Err(HarnessError::AssertionFailure {
                expected: format!("at least {} elements matching {}", at_least, locator),
                actual: last_count.to_string(),
            }),
            Err(PollError::Failed(err)) => Err(err),
        }
    }

    /// Positive-condition wait that always yields a handle
    pub fn wait_for_element(
        &self,
        session: &mut Session,
        locator: &Locator,
        condition: ConditionKind,
        timeout: Duration,
    ) -> HarnessResult<ElementHandle> {
        match self.wait_for(session, locator, condition, timeout)? {
            Some(element) => Ok(element),
            // Only `Invisible` can succeed without a match
            None => Err(HarnessError::AssertionFailure {
                expected: format!("an element matching {}", locator),
                actual: "no element".to_string(),
            }),
        }
    }

    /// Poll until the current URL contains `fragment`
    pub fn wait_for_url(&self, session: &mut Session, fragment: &str, timeout: Duration) -> HarnessResult<String> {
        let browser = session.browser()?;
        self.wait_for_page(timeout, format!("url containing '{}'", fragment), || {
            let url = browser.current_url()?;
            Ok(if url.contains(fragment) { Ok(url) } else { Err(url) })
        })
    }

    /// Poll until the page title contains `fragment`
    pub fn wait_for_title(&self, session: &mut Session, fragment: &str, timeout: Duration) -> HarnessResult<String> {
        let browser = session.browser()?;
        self.wait_for_page(timeout, format!("title containing '{}'", fragment), || {
            let title = browser.title()?;
            Ok(if title.contains(fragment) { Ok(title) } else { Err(title) })
        })
    }

    /// Poll until a JavaScript alert is open and return its text
    pub fn wait_for_alert(&self, session: &mut Session, timeout: Duration) -> HarnessResult<String> {
        let browser = session.browser()?;
        self.wait_for_page(timeout, "an alert".to_string(), || match browser.alert_text() {
            Ok(text) => Ok(Ok(text)),
            Err(DriverError::NoSuchAlert(_)) => Ok(Err("no alert".to_string())),
            Err(err) => Err(err),
        })
    }

    /// The probe answers `Ok(value)` when satisfied or `Err(observed)` to keep
    /// waiting; the last observation goes into the timeout error.
    fn wait_for_page<F>(&self, timeout: Duration, expectation: String, mut probe: F) -> HarnessResult<String>
    where
        F: FnMut() -> Result<Result<String, String>, DriverError>,
    {
        let mut last_seen = String::new();
        let outcome = poll(timeout, self.poll_interval, || match probe() {
            Ok(Ok(value)) => Ok(Some(value)),
            Ok(Err(observed)) => {
                last_seen = observed;
                Ok(None)
            }
            Err(err) if err.is_transient() => Ok(None),
            Err(err) => Err(HarnessError::Driver(err)),
        });
        match outcome {
            Ok(value) => Ok(value),
            Err(PollError::Elapsed(elapsed)) => Err(HarnessError::PageWaitTimeout {
                expectation,
                last_seen,
                elapsed,
            }),
            Err(PollError::Failed(err)) => Err(err),
        }
    }
}

/// `wait_for` with default polling
pub fn wait_for(
    session: &mut Session,
    locator: &Locator,
    condition: ConditionKind,
    timeout: Duration,
) -> HarnessResult<Option<ElementHandle>> {
    Waiter::default().wait_for(session, locator, condition, timeout)
}

/// One evaluation of an element condition.
///
/// `Ok(Some(Some(h)))` satisfied with a handle, `Ok(Some(None))` satisfied by
/// absence (`Invisible` only), `Ok(None)` keep polling.
fn probe_element(
    browser: &mut dyn BrowserBackend,
    locator: &Locator,
    condition: ConditionKind,
    policy: MatchPolicy,
) -> HarnessResult<Option<Option<ElementHandle>>> {
    let elements = match browser.find_elements(locator) {
        Ok(elements) => elements,
        Err(err) if err.is_transient() => return Ok(None),
        Err(err) => return Err(HarnessError::Driver(err)),
    };

    if policy == MatchPolicy::Unique && elements.len() > 1 {
        return Err(HarnessError::AmbiguousLocator {
            locator: locator.clone(),
            count: elements.len(),
        });
    }

    let Some(first) = elements.into_iter().next() else {
        trace!(%locator, %condition, "no match yet");
        return Ok(if condition == ConditionKind::Invisible { Some(None) } else { None });
    };

    match condition.holds(browser, &first) {
        Ok(true) => Ok(Some(Some(first))),
        Ok(false) => Ok(None),
        // Element went away between lookup and check
        Err(err) if err.is_transient() => {
            Ok(if condition == ConditionKind::Invisible { Some(None) } else { None })
        }
        Err(err) => Err(HarnessError::Driver(err)),
    }
}

enum PollError {
    Elapsed(Duration),
    Failed(HarnessError),
}

/// Run `probe` until it yields a value. On timeout the reported elapsed time
/// is never shorter than `timeout`.
fn poll<T, F>(timeout: Duration, interval: Duration, mut probe: F) -> Result<T, PollError>
where
    F: FnMut() -> HarnessResult<Option<T>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        if let Some(value) = probe().map_err(PollError::Failed)? {
            return Ok(value);
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            trace!(attempts, ?elapsed, "wait elapsed");
            return Err(PollError::Elapsed(elapsed));
        }
        thread::sleep(interval.min(timeout - elapsed).max(Duration::from_millis(1)));
    }
}
